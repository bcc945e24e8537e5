// This file is part of `prefixer`.
// See LICENSE for licensing information.

//! Minimal cover of an integer interval by aligned power-of-two blocks.

/// Decompose the closed interval `[lo, hi]` over `[0, 2^bits)` into the
/// unique minimal ordered sequence of aligned blocks `(base, w)`, each
/// denoting `[base, base + 2^w)` with `base ≡ 0 (mod 2^w)`.
///
/// The cover is built greedily from the left: at each step the widest block
/// that is aligned at the current position and still fits inside the
/// interval is emitted. Block widths are clamped below 128 so the block
/// size is representable; `lo > hi` yields an empty cover.
pub fn decompose(lo: u128, hi: u128, bits: u32) -> Vec<(u128, u32)> {
    debug_assert!(bits >= 1 && bits <= 128);
    debug_assert!(bits == 128 || hi < (1u128 << bits));
    let mut blocks = Vec::new();
    if lo > hi {
        return blocks;
    }
    let mut cur = lo;
    loop {
        let mut w = 0u32;
        while w + 1 < 128 && w + 1 <= bits {
            let size = 1u128 << (w + 1);
            if cur & (size - 1) != 0 {
                break;
            }
            match cur.checked_add(size - 1) {
                Some(end) if end <= hi => w += 1,
                _ => break,
            }
        }
        blocks.push((cur, w));
        cur = match cur.checked_add(1u128 << w) {
            Some(next) => next,
            None => break,
        };
        if cur > hi {
            break;
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cover_len(blocks: &[(u128, u32)]) -> u128 {
        blocks.iter().map(|&(_, w)| 1u128 << w).sum()
    }

    #[test]
    fn test_empty_when_inverted() {
        assert!(decompose(10, 9, 32).is_empty());
    }

    #[test]
    fn test_single_point() {
        assert_eq!(decompose(7, 7, 32), vec![(7, 0)]);
        assert_eq!(decompose(0, 0, 32), vec![(0, 0)]);
    }

    #[test]
    fn test_aligned_block() {
        assert_eq!(decompose(8, 15, 32), vec![(8, 3)]);
        assert_eq!(decompose(0, 255, 32), vec![(0, 8)]);
    }

    #[test]
    fn test_straddling_interval() {
        // [3, 12] = {3} ∪ [4, 8) ∪ [8, 12) ∪ {12}
        assert_eq!(decompose(3, 12, 32), vec![(3, 0), (4, 2), (8, 2), (12, 0)]);
    }

    #[test]
    fn test_top_of_domain() {
        let hi = u32::MAX as u128;
        let blocks = decompose(hi - 3, hi, 32);
        assert_eq!(blocks, vec![(hi - 3, 2)]);
    }

    proptest! {
        #[test]
        fn prop_partition(lo in 0u128..1u128 << 32, len in 0u128..10_000) {
            let hi = (lo + len).min((1u128 << 32) - 1);
            let blocks = decompose(lo, hi, 32);
            // Contiguous from the left, aligned, and exactly covering.
            let mut cur = lo;
            for &(base, w) in &blocks {
                prop_assert_eq!(base, cur);
                prop_assert_eq!(base & ((1u128 << w) - 1), 0);
                cur = base + (1u128 << w);
            }
            prop_assert_eq!(cur, hi + 1);
            prop_assert_eq!(cover_len(&blocks), hi - lo + 1);
        }

        #[test]
        fn prop_greedy_is_maximal(lo in 0u128..1u128 << 32, len in 0u128..10_000) {
            let hi = (lo + len).min((1u128 << 32) - 1);
            let blocks = decompose(lo, hi, 32);
            for &(base, w) in &blocks {
                // The next wider block must fail alignment or overflow [lo, hi].
                let wider = 1u128 << (w + 1);
                let fits = base & (wider - 1) == 0 && base + wider - 1 <= hi;
                prop_assert!(!fits);
            }
        }
    }
}
