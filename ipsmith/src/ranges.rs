// This file is part of `ipsmith`.
// See LICENSE for licensing information.

//! The weighted address-range table and samplers over it.

use rand::{
    distributions::{Distribution, WeightedIndex},
    Rng,
};

/// A network range with a sampling weight.
#[derive(Clone, Copy, Debug)]
pub struct IpRange {
    /// Network address (host order).
    pub network: u32,
    /// Prefix length in bits.
    pub prefix_len: u32,
    /// Relative sampling weight.
    pub weight: f64,
    /// Owning organization, for reports.
    pub organization: &'static str,
}

const fn ip(a: u32, b: u32, c: u32, d: u32) -> u32 {
    (a << 24) | (b << 16) | (c << 8) | d
}

const fn range(a: u32, b: u32, c: u32, d: u32, prefix_len: u32, weight: f64, org: &'static str) -> IpRange {
    IpRange {
        network: ip(a, b, c, d),
        prefix_len,
        weight,
        organization: org,
    }
}

/// The address distribution used by the synthesizer. Carrier /8 blocks
/// dominate; institutional and cloud ranges trail off with lower weights.
pub const RANGES: &[IpRange] = &[
    range(218, 0, 0, 0, 8, 25.0, "telecom"),
    range(222, 0, 0, 0, 8, 20.0, "telecom"),
    range(202, 96, 0, 0, 16, 15.0, "telecom"),
    range(210, 0, 0, 0, 8, 16.0, "telecom"),
    range(211, 0, 0, 0, 8, 14.0, "telecom"),
    range(221, 0, 0, 0, 8, 20.0, "unicom"),
    range(125, 0, 0, 0, 8, 12.0, "unicom"),
    range(112, 0, 0, 0, 8, 10.0, "unicom"),
    range(183, 0, 0, 0, 8, 18.0, "mobile"),
    range(120, 0, 0, 0, 8, 15.0, "mobile"),
    range(117, 0, 0, 0, 8, 12.0, "mobile"),
    range(216, 0, 0, 0, 8, 8.0, "us-carrier"),
    range(18, 0, 0, 0, 8, 8.0, "mit"),
    range(198, 0, 0, 0, 8, 7.0, "na-carrier"),
    range(173, 0, 0, 0, 8, 6.0, "us-carrier"),
    range(151, 0, 0, 0, 8, 5.0, "eu-carrier"),
    range(104, 0, 0, 0, 8, 6.0, "cdn"),
    range(8, 8, 8, 0, 24, 5.0, "google-dns"),
    range(8, 8, 4, 0, 24, 3.0, "google-dns"),
    range(142, 250, 0, 0, 15, 4.0, "google"),
    range(52, 0, 0, 0, 11, 4.0, "aws"),
    range(13, 64, 0, 0, 11, 3.0, "azure"),
    range(166, 111, 0, 0, 16, 2.0, "edu"),
    range(128, 32, 0, 0, 16, 2.0, "edu"),
    range(129, 105, 0, 0, 16, 2.0, "edu"),
    range(140, 0, 0, 0, 8, 3.0, "enterprise"),
    range(192, 168, 0, 0, 16, 1.0, "rfc1918"),
    range(10, 0, 0, 0, 8, 0.5, "rfc1918"),
];

/// Weighted sampler over [`RANGES`].
pub struct RangeSampler {
    index: WeightedIndex<f64>,
}

impl RangeSampler {
    pub fn new() -> Self {
        let index = WeightedIndex::new(RANGES.iter().map(|r| r.weight))
            .expect("the static range table has positive weights");
        RangeSampler { index }
    }

    /// Draw one address: a weighted range pick, then a uniform host part.
    /// Host parts ending in .0 or .255 are rejected and redrawn.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> u32 {
        loop {
            let r = &RANGES[self.index.sample(rng)];
            let host_bits = 32 - r.prefix_len;
            let host = if host_bits == 0 {
                0
            } else {
                (rng.gen::<u64>() & ((1u64 << host_bits) - 1)) as u32
            };
            let addr = r.network | host;
            let last = addr & 0xFF;
            if last != 0 && last != 255 {
                return addr;
            }
        }
    }
}

impl Default for RangeSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Uniform sampler over a handful of wide (128-bit) id ranges, for corpora
/// beyond the 32-bit domain.
pub fn sample_wide<R: Rng>(rng: &mut R, count: usize) -> Vec<u128> {
    const PREFIXES: &[(u128, u32)] = &[
        (0x2001_0db8 << 96, 32),
        (0x2400_cb00 << 96, 32),
        (0x2606_4700 << 96, 32),
        (0xfd00 << 112, 16),
    ];
    let mut out = std::collections::BTreeSet::new();
    while out.len() < count {
        let (prefix, len) = PREFIXES[rng.gen_range(0..PREFIXES.len())];
        let host_mask = if len == 0 { u128::MAX } else { u128::MAX >> len };
        out.insert(prefix | (rng.gen::<u128>() & host_mask));
    }
    out.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bedrock::AesRng;
    use rand::SeedableRng;

    #[test]
    fn test_samples_fall_in_some_range() {
        let sampler = RangeSampler::new();
        let mut rng = AesRng::seed_from_u64(1);
        for _ in 0..1000 {
            let addr = sampler.sample(&mut rng);
            let hit = RANGES.iter().any(|r| {
                let mask = if r.prefix_len == 0 {
                    0
                } else {
                    !0u32 << (32 - r.prefix_len)
                };
                addr & mask == r.network
            });
            assert!(hit, "address {:#x} outside every range", addr);
            assert_ne!(addr & 0xFF, 0);
            assert_ne!(addr & 0xFF, 255);
        }
    }

    #[test]
    fn test_wide_sampler_unique_sorted() {
        let mut rng = AesRng::seed_from_u64(2);
        let ids = sample_wide(&mut rng, 100);
        assert_eq!(ids.len(), 100);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }
}
