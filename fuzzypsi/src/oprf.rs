// This file is part of `fuzzypsi`.
// See LICENSE for licensing information.

//! Diffie-Hellman OPRF over the Ristretto group.
//!
//! The receiver blinds each fingerprint's group encoding with a fresh
//! scalar; the sender exponentiates pointwise with its private key; the
//! receiver unblinds. Both parties then derive the PSI item as an AES hash
//! of the evaluated point, so the sender never sees a receiver fingerprint
//! and the receiver never sees the key.

use crate::{
    frame::{self, Reader, Tag, Writer},
    Error,
};
use bedrock::{AbstractChannel, Block};
use curve25519_dalek::{
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar::Scalar,
};
use rand::{CryptoRng, Rng};
use sha2::Sha512;

fn hash_to_point(fp: Block) -> RistrettoPoint {
    RistrettoPoint::hash_from_bytes::<Sha512>(&<[u8; 16]>::from(fp))
}

fn point_to_item(pt: &RistrettoPoint) -> Block {
    Block::hash_pt(0, pt)
}

/// OPRF sender, holding the private key for one session.
pub struct Sender {
    key: Scalar,
}

impl Sender {
    /// Sample a fresh key.
    pub fn new<RNG: CryptoRng + Rng>(rng: &mut RNG) -> Self {
        Sender {
            key: Scalar::random(rng),
        }
    }

    /// Apply the PRF to the sender's own fingerprints locally.
    pub fn evaluate(&self, fps: &[Block]) -> Vec<Block> {
        fps.iter()
            .map(|&fp| point_to_item(&(hash_to_point(fp) * self.key)))
            .collect()
    }

    /// Serve one OPRF request round: read blinded points, exponentiate,
    /// respond. Returns the number of points served.
    pub fn serve<C: AbstractChannel>(&self, channel: &mut C) -> Result<usize, Error> {
        let payload = frame::expect(channel, Tag::OprfRequest)?;
        let mut r = Reader::new(&payload);
        let count = r.u32()? as usize;
        let mut w = Writer::new();
        w.u32(count as u32);
        for _ in 0..count {
            let bytes = r.take(32)?;
            let pt = CompressedRistretto::from_slice(bytes)
                .ok()
                .and_then(|c| c.decompress())
                .ok_or_else(|| Error::ProtocolMismatch("invalid blinded point".into()))?;
            w.bytes((pt * self.key).compress().as_bytes());
        }
        r.finish()?;
        frame::send(channel, Tag::OprfResponse, &w.into_payload())?;
        log::debug!("OPRF: served {} points", count);
        Ok(count)
    }
}

/// Run the receiver side of the OPRF round for `fps`, returning the
/// evaluated items in input order.
pub fn receive<C: AbstractChannel, RNG: CryptoRng + Rng>(
    channel: &mut C,
    fps: &[Block],
    rng: &mut RNG,
) -> Result<Vec<Block>, Error> {
    let blinds: Vec<Scalar> = (0..fps.len()).map(|_| Scalar::random(rng)).collect();
    let mut w = Writer::new();
    w.u32(fps.len() as u32);
    for (&fp, r) in fps.iter().zip(blinds.iter()) {
        w.bytes((hash_to_point(fp) * r).compress().as_bytes());
    }
    frame::send(channel, Tag::OprfRequest, &w.into_payload())?;

    let payload = frame::expect(channel, Tag::OprfResponse)?;
    let mut r = Reader::new(&payload);
    let count = r.u32()? as usize;
    if count != fps.len() {
        return Err(Error::ProtocolMismatch(format!(
            "OPRF response carries {} points, expected {}",
            count,
            fps.len()
        )));
    }
    let mut out = Vec::with_capacity(count);
    for blind in blinds {
        let bytes = r.take(32)?;
        let pt = CompressedRistretto::from_slice(bytes)
            .ok()
            .and_then(|c| c.decompress())
            .ok_or_else(|| Error::ProtocolMismatch("invalid evaluated point".into()))?;
        out.push(point_to_item(&(pt * blind.invert())));
    }
    r.finish()?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bedrock::{unix_channel_pair, AesRng};

    #[test]
    fn test_oprf_consistency() {
        let (mut c1, mut c2) = unix_channel_pair().unwrap();
        let mut rng = AesRng::new();
        let fps: Vec<Block> = (0..50).map(|_| rng.gen()).collect();
        let fps_ = fps.clone();

        let handle = std::thread::spawn(move || {
            let mut rng = AesRng::new();
            let sender = Sender::new(&mut rng);
            let local = sender.evaluate(&fps_);
            sender.serve(&mut c1).unwrap();
            local
        });

        let mut rng = AesRng::new();
        let via_protocol = receive(&mut c2, &fps, &mut rng).unwrap();
        let local = handle.join().unwrap();
        assert_eq!(via_protocol, local);
    }

    #[test]
    fn test_distinct_inputs_distinct_outputs() {
        let mut rng = AesRng::new();
        let sender = Sender::new(&mut rng);
        let a = sender.evaluate(&[Block::from(1u128)]);
        let b = sender.evaluate(&[Block::from(2u128)]);
        assert_ne!(a[0], b[0]);
    }
}
