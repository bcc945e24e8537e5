// This file is part of `bedrock`.
// See LICENSE for licensing information.

//! Thin wrappers over the RustCrypto AES implementations, operating on
//! [`Block`]s.

use crate::Block;
use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};

/// AES-128, encryption only.
#[derive(Clone)]
pub struct Aes128(aes::Aes128);

impl Aes128 {
    /// Create a new cipher with key `key`.
    #[inline]
    pub fn new(key: Block) -> Self {
        let key = <[u8; 16]>::from(key);
        Aes128(aes::Aes128::new(GenericArray::from_slice(&key)))
    }

    /// Encrypt a single block.
    #[inline]
    pub fn encrypt(&self, m: Block) -> Block {
        let mut buf = GenericArray::clone_from_slice(&<[u8; 16]>::from(m));
        self.0.encrypt_block(&mut buf);
        let mut out = [0u8; 16];
        out.copy_from_slice(&buf);
        Block::from(out)
    }
}

/// AES-256, encryption only.
#[derive(Clone)]
pub struct Aes256(aes::Aes256);

impl Aes256 {
    /// Create a new cipher with key `key`.
    #[inline]
    pub fn new(key: &[u8; 32]) -> Self {
        Aes256(aes::Aes256::new(GenericArray::from_slice(key)))
    }

    /// Encrypt a single block.
    #[inline]
    pub fn encrypt(&self, m: Block) -> Block {
        let mut buf = GenericArray::clone_from_slice(&<[u8; 16]>::from(m));
        self.0.encrypt_block(&mut buf);
        let mut out = [0u8; 16];
        out.copy_from_slice(&buf);
        Block::from(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let key = rand::random::<Block>();
        let m = rand::random::<Block>();
        let aes = Aes128::new(key);
        assert_eq!(aes.encrypt(m), aes.encrypt(m));
        assert_ne!(aes.encrypt(m), aes.encrypt(m.flip()));
    }
}
