// This file is part of `prefixer`.
// See LICENSE for licensing information.

//! Prefix fingerprints.

use sha2::{Digest, Sha256};

/// Map a prefix string to a 128-bit fingerprint: the first sixteen bytes of
/// `SHA-256(p)`, assembled as two little-endian 64-bit words. Equal strings
/// map to equal fingerprints; distinct strings collide with negligible
/// probability, and no further collision handling is done anywhere
/// downstream.
pub fn fingerprint(prefix: &str) -> u128 {
    let digest = Sha256::digest(prefix.as_bytes());
    let mut lo = [0u8; 8];
    let mut hi = [0u8; 8];
    lo.copy_from_slice(&digest[0..8]);
    hi.copy_from_slice(&digest[8..16]);
    ((u64::from_le_bytes(hi) as u128) << 64) | u64::from_le_bytes(lo) as u128
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{receiver_prefixes, sender_prefixes};
    use std::collections::HashSet;

    #[test]
    fn test_equal_strings_equal_fingerprints() {
        assert_eq!(fingerprint("0101**"), fingerprint("0101**"));
    }

    #[test]
    fn test_distinct_strings_distinct_fingerprints() {
        // Same denoted interval, different canonical length: must differ.
        assert_ne!(fingerprint("0101**"), fingerprint("0101***"));
        assert_ne!(fingerprint("0"), fingerprint("1"));
    }

    #[test]
    fn test_no_collisions_over_encodings() {
        let mut seen: HashSet<u128> = HashSet::new();
        let mut strings: HashSet<String> = HashSet::new();
        for v in 0u128..200 {
            for p in sender_prefixes(v, 50, 32)
                .into_iter()
                .chain(receiver_prefixes(v, 50, 32))
            {
                if strings.insert(p.clone()) {
                    assert!(seen.insert(fingerprint(&p)), "collision on {}", p);
                }
            }
        }
    }
}
