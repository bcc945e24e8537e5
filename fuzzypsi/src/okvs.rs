// This file is part of `fuzzypsi`.
// See LICENSE for licensing information.

//! Banded oblivious key-value store.
//!
//! `encode` produces a vector `P` such that `decode(kᵢ, P) = vᵢ` for every
//! input pair, while keys outside the input set decode to pseudorandom
//! values (free columns are filled from the caller's RNG). Decoding XORs
//! the subset of `P` selected by a key's band, so it is linear: decoding
//! against `X ⊕ Y` equals decoding against `X` xor decoding against `Y`,
//! and a GF(2¹²⁸) scalar factor distributes through.

use crate::Error;
use bedrock::{AesHash, AesRng, Block};
use rand::{CryptoRng, Rng, RngCore};

/// Retries with fresh seeds before reporting the system singular.
pub const K_RETRY: usize = 4;

/// Default band width in bits.
pub const DEFAULT_BAND_LENGTH: usize = 128;

/// A band-OKVS instance: sizes plus the seed deriving band positions.
pub struct BandOkvs {
    m: usize,
    band_len: usize,
    seed: Block,
    hasher: AesHash,
}

impl BandOkvs {
    /// Instantiate with a known seed (the decoding side of the protocol).
    pub fn with_seed(m: usize, band_len: usize, seed: Block) -> Self {
        BandOkvs {
            m,
            band_len,
            seed,
            hasher: AesHash::new(seed),
        }
    }

    /// Store size for `n_items` keys: the usual 27% expansion, floored so a
    /// band always fits.
    pub fn okvs_size(n_items: usize, band_len: usize) -> usize {
        ((n_items * 127 + 99) / 100).max(band_len + 16)
    }

    pub fn seed(&self) -> Block {
        self.seed
    }

    pub fn size(&self) -> usize {
        self.m
    }

    // Band start position and band bits for `key`.
    fn row(&self, key: Block) -> (usize, Vec<u64>) {
        let span = self.m - self.band_len + 1;
        let start = (u128::from(self.hasher.tccr_hash(Block::from(0u128), key)) as u64 as usize)
            % span;
        let mut prg = AesRng::from_block_seed(self.hasher.tccr_hash(Block::from(1u128), key));
        let words = self.band_len.div_ceil(64);
        let mut bits: Vec<u64> = (0..words).map(|_| prg.gen()).collect();
        let tail = self.band_len % 64;
        if tail != 0 {
            bits[words - 1] &= (1u64 << tail) - 1;
        }
        if bits.iter().all(|&w| w == 0) {
            bits[0] = 1;
        }
        (start, bits)
    }

    /// Decode `key` against the vector `p` (length `m`).
    pub fn decode(&self, key: Block, p: &[Block]) -> Block {
        debug_assert_eq!(p.len(), self.m);
        let (start, bits) = self.row(key);
        let mut acc = Block::default();
        for off in 0..self.band_len {
            if bit_set(&bits, off) {
                acc ^= p[start + off];
            }
        }
        acc
    }

    fn try_encode<RNG: CryptoRng + RngCore>(
        &self,
        keys: &[Block],
        values: &[Block],
        rng: &mut RNG,
    ) -> Option<Vec<Block>> {
        debug_assert_eq!(keys.len(), values.len());
        struct Row {
            start: usize,
            bits: Vec<u64>,
            value: Block,
        }
        let mut rows: Vec<Row> = keys
            .iter()
            .zip(values.iter())
            .map(|(&k, &v)| {
                let (start, bits) = self.row(k);
                Row {
                    start,
                    bits,
                    value: v,
                }
            })
            .collect();
        rows.sort_by_key(|r| r.start);

        let mut pivots: Vec<Option<(Vec<u64>, Block)>> = (0..self.m).map(|_| None).collect();
        for mut row in rows {
            loop {
                let off = first_set(&row.bits)?;
                if off > 0 {
                    shift_right(&mut row.bits, off);
                    row.start += off;
                }
                match &pivots[row.start] {
                    Some((pb, pv)) => {
                        xor_into(&mut row.bits, pb);
                        row.value ^= *pv;
                        // The pivot bit cancels; keep reducing.
                    }
                    None => {
                        pivots[row.start] = Some((row.bits, row.value));
                        break;
                    }
                }
            }
        }

        let mut out: Vec<Block> = (0..self.m).map(|_| rng.gen()).collect();
        for col in (0..self.m).rev() {
            if let Some((bits, value)) = &pivots[col] {
                let mut v = *value;
                for off in 1..self.band_len {
                    if col + off >= self.m {
                        break;
                    }
                    if bit_set(bits, off) {
                        v ^= out[col + off];
                    }
                }
                out[col] = v;
            }
        }
        Some(out)
    }
}

/// Encode `(key, value)` pairs into a store of size `m`, retrying with
/// fresh seeds on the rare singular band matrix.
pub fn encode<RNG: CryptoRng + RngCore>(
    keys: &[Block],
    values: &[Block],
    m: usize,
    band_len: usize,
    rng: &mut RNG,
) -> Result<(BandOkvs, Vec<Block>), Error> {
    for _ in 0..K_RETRY {
        let okvs = BandOkvs::with_seed(m, band_len, rng.gen());
        if let Some(p) = okvs.try_encode(keys, values, rng) {
            return Ok((okvs, p));
        }
        log::debug!("OKVS encode singular, reseeding");
    }
    Err(Error::EncodingFailure { attempts: K_RETRY })
}

#[inline]
fn bit_set(words: &[u64], off: usize) -> bool {
    (words[off / 64] >> (off % 64)) & 1 == 1
}

fn first_set(words: &[u64]) -> Option<usize> {
    for (i, &w) in words.iter().enumerate() {
        if w != 0 {
            return Some(i * 64 + w.trailing_zeros() as usize);
        }
    }
    None
}

fn shift_right(words: &mut [u64], k: usize) {
    let word_shift = k / 64;
    let bit_shift = k % 64;
    let len = words.len();
    for i in 0..len {
        let src = i + word_shift;
        let mut w = if src < len { words[src] } else { 0 };
        if bit_shift != 0 {
            w >>= bit_shift;
            if src + 1 < len {
                w |= words[src + 1] << (64 - bit_shift);
            }
        }
        words[i] = w;
    }
}

fn xor_into(dst: &mut [u64], src: &[u64]) {
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d ^= *s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bedrock::AesRng;

    fn sample_pairs(n: usize, rng: &mut AesRng) -> (Vec<Block>, Vec<Block>) {
        let mut keys = std::collections::HashSet::new();
        while keys.len() < n {
            keys.insert(rng.gen::<Block>());
        }
        let keys: Vec<Block> = keys.into_iter().collect();
        let values: Vec<Block> = (0..n).map(|_| rng.gen()).collect();
        (keys, values)
    }

    #[test]
    fn test_roundtrip() {
        let mut rng = AesRng::new();
        let n = 500;
        let (keys, values) = sample_pairs(n, &mut rng);
        let m = BandOkvs::okvs_size(n, DEFAULT_BAND_LENGTH);
        let (okvs, p) = encode(&keys, &values, m, DEFAULT_BAND_LENGTH, &mut rng).unwrap();
        for (k, v) in keys.iter().zip(values.iter()) {
            assert_eq!(okvs.decode(*k, &p), *v);
        }
    }

    #[test]
    fn test_decode_is_linear() {
        let mut rng = AesRng::new();
        let n = 200;
        let (keys, values) = sample_pairs(n, &mut rng);
        let m = BandOkvs::okvs_size(n, DEFAULT_BAND_LENGTH);
        let (okvs, p) = encode(&keys, &values, m, DEFAULT_BAND_LENGTH, &mut rng).unwrap();

        let mask: Vec<Block> = (0..m).map(|_| rng.gen()).collect();
        let masked: Vec<Block> = p.iter().zip(mask.iter()).map(|(&a, &b)| a ^ b).collect();
        let delta: Block = rng.gen();
        let scaled: Vec<Block> = p.iter().map(|&a| delta.gf_mul(a)).collect();

        for &k in keys.iter().take(32) {
            assert_eq!(
                okvs.decode(k, &masked),
                okvs.decode(k, &p) ^ okvs.decode(k, &mask)
            );
            assert_eq!(okvs.decode(k, &scaled), delta.gf_mul(okvs.decode(k, &p)));
        }
    }

    #[test]
    fn test_seeded_instances_agree() {
        let mut rng = AesRng::new();
        let n = 100;
        let (keys, values) = sample_pairs(n, &mut rng);
        let m = BandOkvs::okvs_size(n, DEFAULT_BAND_LENGTH);
        let (okvs, p) = encode(&keys, &values, m, DEFAULT_BAND_LENGTH, &mut rng).unwrap();
        // A second instance built only from (m, band, seed) decodes the same.
        let mirror = BandOkvs::with_seed(m, DEFAULT_BAND_LENGTH, okvs.seed());
        for (k, v) in keys.iter().zip(values.iter()) {
            assert_eq!(mirror.decode(*k, &p), *v);
        }
    }
}
