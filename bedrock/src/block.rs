// This file is part of `bedrock`.
// See LICENSE for licensing information.

//! Defines a block as a 128-bit value, and implements block-related functions.

use crate::Aes256;
use curve25519_dalek::ristretto::RistrettoPoint;

/// A 128-bit chunk.
///
/// Bit `i` of the underlying integer is the coefficient of `xⁱ` when the
/// block is interpreted as an element of GF(2¹²⁸) with reduction polynomial
/// `x¹²⁸ + x⁷ + x² + x + 1`.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Block(u128);

impl Block {
    /// Carryless multiplication, returning the low and high 128-bit halves of
    /// the 256-bit product.
    #[inline]
    pub fn clmul(self, rhs: Self) -> (Self, Self) {
        let x0 = self.0 as u64;
        let x1 = (self.0 >> 64) as u64;
        let y0 = rhs.0 as u64;
        let y1 = (rhs.0 >> 64) as u64;
        let lo = clmul64(x0, y0);
        let mid = clmul64(x0, y1) ^ clmul64(x1, y0);
        let hi = clmul64(x1, y1);
        (Block(lo ^ (mid << 64)), Block(hi ^ (mid >> 64)))
    }

    /// Multiplication in GF(2¹²⁸).
    #[inline]
    pub fn gf_mul(self, rhs: Self) -> Self {
        let (lo, hi) = self.clmul(rhs);
        Block(reduce(hi.0, lo.0))
    }

    /// The monomial `xʲ`, `j < 128`.
    #[inline]
    pub fn monomial(j: u32) -> Self {
        debug_assert!(j < 128);
        Block(1u128 << j)
    }

    /// Hash an elliptic curve point `pt` and tweak `tweak`.
    ///
    /// Computes the hash by computing `E_{pt}(tweak)`, where `E` is AES-256.
    #[inline]
    pub fn hash_pt(tweak: u128, pt: &RistrettoPoint) -> Self {
        let k = pt.compress();
        let c = Aes256::new(k.as_bytes());
        c.encrypt(Block::from(tweak))
    }

    /// Return the least significant bit.
    #[inline]
    pub fn lsb(&self) -> bool {
        self.0 & 1 == 1
    }

    /// Return bit `i` of the block.
    #[inline]
    pub fn bit(&self, i: u32) -> bool {
        (self.0 >> i) & 1 == 1
    }

    /// Flip all bits.
    #[inline]
    pub fn flip(&self) -> Self {
        Block(!self.0)
    }

    /// Try to create a `Block` from a slice of bytes. The slice must have
    /// exactly 16 bytes.
    #[inline]
    pub fn try_from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 16 {
            return None;
        }
        let mut buf = [0u8; 16];
        buf.copy_from_slice(bytes);
        Some(Block::from(buf))
    }
}

#[inline]
fn clmul64(a: u64, b: u64) -> u128 {
    let a = a as u128;
    let mut r = 0u128;
    let mut b = b;
    let mut shift = 0;
    while b != 0 {
        if b & 1 == 1 {
            r ^= a << shift;
        }
        b >>= 1;
        shift += 1;
    }
    r
}

// Reduce a 256-bit carryless product modulo `x¹²⁸ + x⁷ + x² + x + 1`.
#[inline]
fn reduce(hi: u128, lo: u128) -> u128 {
    let mut r = lo ^ (hi << 7) ^ (hi << 2) ^ (hi << 1) ^ hi;
    // Bits of `hi` shifted past position 127 wrap around once more; the
    // second fold cannot overflow since the remainder is below 2^14.
    let t = (hi >> 121) ^ (hi >> 126) ^ (hi >> 127);
    r ^= (t << 7) ^ (t << 2) ^ (t << 1) ^ t;
    r
}

impl std::ops::BitAnd for Block {
    type Output = Block;
    #[inline]
    fn bitand(self, rhs: Self) -> Self {
        Block(self.0 & rhs.0)
    }
}

impl std::ops::BitAndAssign for Block {
    #[inline]
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl std::ops::BitOr for Block {
    type Output = Block;
    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Block(self.0 | rhs.0)
    }
}

impl std::ops::BitXor for Block {
    type Output = Block;
    #[inline]
    fn bitxor(self, rhs: Self) -> Self {
        Block(self.0 ^ rhs.0)
    }
}

impl std::ops::BitXorAssign for Block {
    #[inline]
    fn bitxor_assign(&mut self, rhs: Self) {
        self.0 ^= rhs.0;
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for byte in <[u8; 16]>::from(*self).iter() {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl rand::distributions::Distribution<Block> for rand::distributions::Standard {
    #[inline]
    fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> Block {
        Block::from(rng.gen::<u128>())
    }
}

impl From<Block> for u128 {
    #[inline]
    fn from(m: Block) -> u128 {
        m.0
    }
}

impl From<u128> for Block {
    #[inline]
    fn from(m: u128) -> Self {
        Block(m)
    }
}

impl From<Block> for [u8; 16] {
    #[inline]
    fn from(m: Block) -> [u8; 16] {
        m.0.to_le_bytes()
    }
}

impl From<[u8; 16]> for Block {
    #[inline]
    fn from(m: [u8; 16]) -> Self {
        Block(u128::from_le_bytes(m))
    }
}
