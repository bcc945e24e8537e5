// This file is part of `bedrock`.
// See LICENSE for licensing information.

//! Correlation-robust hash functions based on fixed-key AES
//! (cf. <https://eprint.iacr.org/2019/074>).

use crate::{Aes128, Block};

/// AES-based correlation-robust hash function.
#[derive(Clone)]
pub struct AesHash {
    aes: Aes128,
}

impl AesHash {
    /// Initialize the hash function using `key`.
    #[inline]
    pub fn new(key: Block) -> Self {
        AesHash {
            aes: Aes128::new(key),
        }
    }

    /// Correlation-robust hash function for 128-bit inputs.
    ///
    /// The function computes `π(x) ⊕ x`.
    #[inline]
    pub fn cr_hash(&self, x: Block) -> Block {
        self.aes.encrypt(x) ^ x
    }

    /// Tweakable circular correlation robust hash function.
    ///
    /// The function computes `π(π(x) ⊕ i) ⊕ π(x)`.
    #[inline]
    pub fn tccr_hash(&self, i: Block, x: Block) -> Block {
        let y = self.aes.encrypt(x);
        let z = self.aes.encrypt(y ^ i);
        y ^ z
    }
}
