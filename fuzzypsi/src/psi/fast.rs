// This file is part of `fuzzypsi`.
// See LICENSE for licensing information.

//! OKVS/VOLE private set intersection.
//!
//! One round after the correlation setup: the receiver encodes its
//! fingerprints into a band-OKVS with the fingerprint itself as value and
//! masks the store with its VOLE share; the sender re-keys the store under
//! Δ and answers with one mask per item. Matching masks identify the
//! intersection; non-matching sender masks are pseudorandom in the
//! receiver's view.

use crate::{
    frame::{self, Reader, Tag, Writer},
    okvs::{self, BandOkvs, DEFAULT_BAND_LENGTH},
    vole, Error,
};
use bedrock::{AbstractChannel, Block, SemiHonest};
use rand::{CryptoRng, RngCore};
use std::collections::HashSet;

/// Private set intersection sender. The store size and band width are
/// negotiated by the receiver, so the sender carries no state of its own.
pub struct Sender;

/// Private set intersection receiver.
pub struct Receiver {
    band_length: usize,
}

impl Sender {
    pub fn new() -> Self {
        Sender
    }

    /// Run the protocol over `inputs`.
    pub fn send<C: AbstractChannel, RNG: CryptoRng + RngCore>(
        &mut self,
        inputs: &[Block],
        channel: &mut C,
        rng: &mut RNG,
    ) -> Result<(), Error> {
        let m = channel.read_u64()? as usize;
        let band_length = channel.read_u64()? as usize;
        if band_length == 0 || band_length > m {
            return Err(Error::ProtocolMismatch(format!(
                "band length {} incompatible with store size {}",
                band_length, m
            )));
        }

        let (b, delta) = vole::Sender::extend(channel, rng, m)?;

        let payload = frame::expect(channel, Tag::VoleAPrime)?;
        let mut r = Reader::new(&payload);
        let m2 = r.u64()? as usize;
        if m2 != m {
            return Err(Error::ProtocolMismatch(format!(
                "masked store has {} entries, correlation has {}",
                m2, m
            )));
        }
        let seed = r.block()?;
        let a_prime = r.blocks(m)?;
        r.finish()?;

        let k: Vec<Block> = b
            .iter()
            .zip(a_prime.iter())
            .map(|(&bi, &ai)| bi ^ delta.gf_mul(ai))
            .collect();

        let okvs = BandOkvs::with_seed(m, band_length, seed);
        let mut w = Writer::new();
        w.u32(inputs.len() as u32);
        for &s in inputs {
            w.block(okvs.decode(s, &k) ^ delta.gf_mul(s));
        }
        frame::send(channel, Tag::VoleMasks, &w.into_payload())?;
        log::info!("OKVS/VOLE sender: sent {} masks", inputs.len());
        Ok(())
    }
}

impl Default for Sender {
    fn default() -> Self {
        Self::new()
    }
}

impl Receiver {
    pub fn new() -> Self {
        Receiver {
            band_length: DEFAULT_BAND_LENGTH,
        }
    }

    /// Run the protocol over `inputs` (which must be distinct), returning
    /// the indices of inputs present in the sender's set.
    pub fn receive<C: AbstractChannel, RNG: CryptoRng + RngCore>(
        &mut self,
        inputs: &[Block],
        channel: &mut C,
        rng: &mut RNG,
    ) -> Result<Vec<usize>, Error> {
        let m = BandOkvs::okvs_size(inputs.len(), self.band_length);
        channel.write_u64(m as u64)?;
        channel.write_u64(self.band_length as u64)?;
        channel.flush()?;

        let (a, c) = vole::Receiver::extend(channel, rng, m)?;

        let (okvs, p) = okvs::encode(inputs, inputs, m, self.band_length, rng)?;
        let mut w = Writer::new();
        w.u64(m as u64);
        w.block(okvs.seed());
        for (&ai, &pi) in a.iter().zip(p.iter()) {
            w.block(ai ^ pi);
        }
        frame::send(channel, Tag::VoleAPrime, &w.into_payload())?;

        let payload = frame::expect(channel, Tag::VoleMasks)?;
        let mut r = Reader::new(&payload);
        let count = r.u32()? as usize;
        let sender_masks: HashSet<Block> = r.blocks(count)?.into_iter().collect();
        r.finish()?;

        let matched: Vec<usize> = inputs
            .iter()
            .enumerate()
            .filter(|(_, &fp)| sender_masks.contains(&okvs.decode(fp, &c)))
            .map(|(i, _)| i)
            .collect();
        log::info!(
            "OKVS/VOLE receiver: {} of {} inputs matched",
            matched.len(),
            inputs.len()
        );
        Ok(matched)
    }
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new()
    }
}

impl SemiHonest for Sender {}
impl SemiHonest for Receiver {}

#[cfg(test)]
mod tests {
    use super::*;
    use bedrock::{unix_channel_pair, AesRng};
    use rand::Rng;

    fn run(sender_set: Vec<Block>, receiver_set: Vec<Block>) -> Vec<usize> {
        let (mut c1, mut c2) = unix_channel_pair().unwrap();
        std::thread::scope(|s| {
            let handle = s.spawn(move || {
                let mut rng = AesRng::new();
                Sender::new().send(&sender_set, &mut c1, &mut rng).unwrap();
            });
            let mut rng = AesRng::new();
            let matched = Receiver::new()
                .receive(&receiver_set, &mut c2, &mut rng)
                .unwrap();
            handle.join().unwrap();
            matched
        })
    }

    #[test]
    fn test_planted_intersection() {
        let mut rng = AesRng::new();
        let common: Vec<Block> = (0..100).map(|_| rng.gen()).collect();
        let mut sender_set: Vec<Block> = (0..900).map(|_| rng.gen()).collect();
        sender_set.extend(common.iter().copied());
        let mut receiver_set: Vec<Block> = (0..150).map(|_| rng.gen()).collect();
        receiver_set.extend(common.iter().copied());

        let matched = run(sender_set, receiver_set.clone());
        assert_eq!(matched.len(), 100);
        for &i in &matched {
            assert!(i >= 150, "unplanted input {} reported as matched", i);
        }
    }

    #[test]
    fn test_empty_sender() {
        let mut rng = AesRng::new();
        let receiver_set: Vec<Block> = (0..64).map(|_| rng.gen()).collect();
        let matched = run(Vec::new(), receiver_set);
        assert!(matched.is_empty());
    }

    #[test]
    fn test_full_overlap() {
        let mut rng = AesRng::new();
        let set: Vec<Block> = (0..256).map(|_| rng.gen()).collect();
        let matched = run(set.clone(), set.clone());
        assert_eq!(matched, (0..set.len()).collect::<Vec<_>>());
    }
}
