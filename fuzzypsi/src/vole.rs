// This file is part of `fuzzypsi`.
// See LICENSE for licensing information.

//! The VOLE correlation over GF(2¹²⁸): the sender obtains `(B, Δ)` and the
//! receiver `(A, C)` with `B = C ⊕ Δ·A` componentwise.
//!
//! Seeds move in one batched Chou-Orlandi exchange
//! (cf. <https://eprint.iacr.org/2015/267>) used as a *random* OT: the
//! derived Diffie-Hellman keys are the PRG seeds themselves, so there is
//! no encrypted payload round. The receiver offers a seed pair per bit of
//! Δ and the sender learns exactly the seed its bit selects; the hash
//! tweak binds each pair to its bit index so repeated blinding cannot
//! collapse transfers. On top of the seeds, Gilboa's construction: for
//! bit `j` the receiver sends the correction `u_j = PRG(s0_j) ⊕ PRG(s1_j)
//! ⊕ xʲ·A`; the sender folds `W_j = PRG(s_{Δ_j,j}) ⊕ Δ_j·u_j`, giving
//! `B = ⊕_j W_j` against `C = ⊕_j PRG(s0_j)`. This setup traffic runs
//! before the first framed protocol message, standing in for the external
//! silent-VOLE primitive.

use crate::Error;
use bedrock::{AbstractChannel, AesRng, Block};
use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_TABLE, ristretto::RistrettoBasepointTable, scalar::Scalar,
};
use rand::{CryptoRng, Rng, RngCore};

// One seed transfer per bit of Δ.
const DELTA_BITS: usize = 128;

fn expand(seed: Block, m: usize) -> Vec<Block> {
    let mut rng = AesRng::from_block_seed(seed);
    (0..m).map(|_| rng.gen()).collect()
}

// Offer a random seed pair per Δ bit. The offering party ends up knowing
// both seeds of every pair, which is exactly what building the correction
// vectors requires.
fn offer_seed_pairs<C: AbstractChannel, RNG: CryptoRng + Rng>(
    channel: &mut C,
    rng: &mut RNG,
) -> Result<Vec<(Block, Block)>, Error> {
    let secret = Scalar::random(rng);
    let anchor = &secret * RISTRETTO_BASEPOINT_TABLE;
    channel.write_pt(&anchor)?;
    channel.flush()?;
    let shift = secret * anchor;
    (0..DELTA_BITS)
        .map(|j| {
            let response = channel.read_pt()?;
            let shared = secret * response;
            Ok((
                Block::hash_pt(j as u128, &shared),
                Block::hash_pt(j as u128, &(shared - shift)),
            ))
        })
        .collect()
}

// Learn, for each bit of `delta`, the seed that bit selects. A set bit
// folds the anchor into the blinded response, which shifts the shared
// point onto the pair's second seed; either way the response is uniform
// to the offering party.
fn pick_seeds<C: AbstractChannel, RNG: CryptoRng + Rng>(
    channel: &mut C,
    rng: &mut RNG,
    delta: Block,
) -> Result<Vec<Block>, Error> {
    let anchor = channel.read_pt()?;
    let anchor_table = RistrettoBasepointTable::create(&anchor);
    let mut picked = Vec::with_capacity(DELTA_BITS);
    for j in 0..DELTA_BITS {
        let blind = Scalar::random(rng);
        let mut response = &blind * RISTRETTO_BASEPOINT_TABLE;
        if delta.bit(j as u32) {
            response += anchor;
        }
        channel.write_pt(&response)?;
        picked.push(Block::hash_pt(j as u128, &(&blind * &anchor_table)));
    }
    channel.flush()?;
    Ok(picked)
}

/// VOLE sender: obtains `(B, Δ)`.
pub struct Sender;

impl Sender {
    pub fn extend<C: AbstractChannel, RNG: CryptoRng + Rng>(
        channel: &mut C,
        rng: &mut RNG,
        m: usize,
    ) -> Result<(Vec<Block>, Block), Error> {
        let delta: Block = rng.gen();
        let seeds = pick_seeds(channel, rng, delta)?;

        let mut b = vec![Block::default(); m];
        let mut correction = vec![Block::default(); m];
        for (j, seed) in seeds.iter().enumerate() {
            let w = expand(*seed, m);
            for blk in correction.iter_mut() {
                *blk = channel.read_block()?;
            }
            let chosen = delta.bit(j as u32);
            for i in 0..m {
                let mut wi = w[i];
                if chosen {
                    wi ^= correction[i];
                }
                b[i] ^= wi;
            }
        }
        log::debug!("VOLE: sender folded {} correction vectors", seeds.len());
        Ok((b, delta))
    }
}

/// VOLE receiver: obtains `(A, C)`.
pub struct Receiver;

impl Receiver {
    pub fn extend<C: AbstractChannel, RNG: CryptoRng + RngCore>(
        channel: &mut C,
        rng: &mut RNG,
        m: usize,
    ) -> Result<(Vec<Block>, Vec<Block>), Error> {
        let a: Vec<Block> = (0..m).map(|_| rng.gen()).collect();
        let seed_pairs = offer_seed_pairs(channel, rng)?;

        let mut c = vec![Block::default(); m];
        for (j, (s0, s1)) in seed_pairs.iter().enumerate() {
            let t = expand(*s0, m);
            let t1 = expand(*s1, m);
            let xj = Block::monomial(j as u32);
            for i in 0..m {
                c[i] ^= t[i];
                let u = t[i] ^ t1[i] ^ xj.gf_mul(a[i]);
                channel.write_block(&u)?;
            }
        }
        channel.flush()?;
        Ok((a, c))
    }
}

impl bedrock::SemiHonest for Sender {}
impl bedrock::SemiHonest for Receiver {}

#[cfg(test)]
mod tests {
    use super::*;
    use bedrock::unix_channel_pair;

    #[test]
    fn test_seed_transfer_matches_delta_bits() {
        let (mut c1, mut c2) = unix_channel_pair().unwrap();
        let delta: Block = rand::random();
        let handle = std::thread::spawn(move || {
            let mut rng = AesRng::new();
            pick_seeds(&mut c1, &mut rng, delta).unwrap()
        });
        let mut rng = AesRng::new();
        let offered = offer_seed_pairs(&mut c2, &mut rng).unwrap();
        let picked = handle.join().unwrap();
        assert_eq!(offered.len(), picked.len());
        for (j, (pair, seed)) in offered.iter().zip(picked.iter()).enumerate() {
            let want = if delta.bit(j as u32) { pair.1 } else { pair.0 };
            assert_eq!(*seed, want);
            assert_ne!(pair.0, pair.1);
        }
    }

    #[test]
    fn test_correlation() {
        let m = 512;
        let (mut c1, mut c2) = unix_channel_pair().unwrap();
        let handle = std::thread::spawn(move || {
            let mut rng = AesRng::new();
            Sender::extend(&mut c1, &mut rng, m).unwrap()
        });
        let mut rng = AesRng::new();
        let (a, c) = Receiver::extend(&mut c2, &mut rng, m).unwrap();
        let (b, delta) = handle.join().unwrap();
        for i in 0..m {
            assert_eq!(b[i], c[i] ^ delta.gf_mul(a[i]));
        }
    }
}
