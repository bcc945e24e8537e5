// This file is part of `bedrock`.
// See LICENSE for licensing information.

//! AES-based random number generator.

use crate::{Aes128, Block};
use rand::{CryptoRng, Rng, RngCore, SeedableRng};

/// Random number generator running AES-128 in counter mode.
#[derive(Clone)]
pub struct AesRng {
    aes: Aes128,
    counter: u64,
    buffer: [u8; 16],
    used: usize,
}

impl RngCore for AesRng {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.fill_bytes(&mut buf);
        u32::from_le_bytes(buf)
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.fill_bytes(&mut buf);
        u64::from_le_bytes(buf)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut filled = 0;
        while filled < dest.len() {
            if self.used == 16 {
                let block = self.aes.encrypt(Block::from(self.counter as u128));
                self.counter += 1;
                self.buffer = <[u8; 16]>::from(block);
                self.used = 0;
            }
            let n = (dest.len() - filled).min(16 - self.used);
            dest[filled..filled + n].copy_from_slice(&self.buffer[self.used..self.used + n]);
            self.used += n;
            filled += n;
        }
    }

    #[inline]
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for AesRng {
    type Seed = [u8; 16];

    #[inline]
    fn from_seed(seed: Self::Seed) -> Self {
        AesRng {
            aes: Aes128::new(Block::from(seed)),
            counter: 0,
            buffer: [0u8; 16],
            used: 16,
        }
    }
}

impl CryptoRng for AesRng {}

impl AesRng {
    /// Create a new random number generator using a random seed from
    /// `rand::random`.
    #[inline]
    pub fn new() -> Self {
        AesRng::from_seed(rand::random::<[u8; 16]>())
    }

    /// Create a new RNG using a random seed from this one.
    #[inline]
    pub fn fork(&mut self) -> Self {
        AesRng::from_seed(self.gen::<[u8; 16]>())
    }

    /// Create a new RNG from a `Block` seed.
    #[inline]
    pub fn from_block_seed(seed: Block) -> Self {
        AesRng::from_seed(<[u8; 16]>::from(seed))
    }
}

impl Default for AesRng {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate() {
        let mut rng = AesRng::new();
        let a = rng.gen::<[Block; 8]>();
        let b = rng.gen::<[Block; 8]>();
        assert_ne!(a, b);
    }

    #[test]
    fn test_seeded_reproducible() {
        let mut a = AesRng::seed_from_u64(42);
        let mut b = AesRng::seed_from_u64(42);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn test_unaligned_fills() {
        let mut a = AesRng::seed_from_u64(7);
        let mut b = AesRng::seed_from_u64(7);
        let mut long = [0u8; 40];
        a.fill_bytes(&mut long);
        let mut pieces = [0u8; 40];
        for chunk in pieces.chunks_mut(5) {
            b.fill_bytes(chunk);
        }
        assert_eq!(long, pieces);
    }
}
