// This file is part of `ipsmith`.
// See LICENSE for licensing information.

use crate::{Error, RangeSampler};
use bedrock::AesRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

/// Synthesizer parameters.
#[derive(Clone, Debug)]
pub struct SynthConfig {
    /// Number of sender ids to draw.
    pub sender_size: usize,
    /// Number of receiver ids to draw.
    pub receiver_size: usize,
    /// Distance threshold.
    pub delta: u32,
    /// Exact number of receivers that must have a sender within `delta`.
    pub target_matches: usize,
    /// Require pairwise-disjoint receiver neighborhoods `[y−δ, y+δ]`.
    pub disjoint: bool,
    /// Return a partial dataset (with a warning) instead of failing when the
    /// target cannot be met within `max_attempts`.
    pub allow_partial: bool,
    /// RNG seed; equal seeds give equal datasets.
    pub seed: u64,
    /// Global rejection-sampling budget.
    pub max_attempts: usize,
}

impl Default for SynthConfig {
    fn default() -> Self {
        SynthConfig {
            sender_size: 1 << 10,
            receiver_size: 1 << 10,
            delta: 50,
            target_matches: 100,
            disjoint: false,
            allow_partial: false,
            seed: 42,
            max_attempts: 1_000_000,
        }
    }
}

/// A synthesized corpus. Both id vectors are sorted ascending and
/// duplicate-free; `ground_truth` holds every pair with `|x − y| ≤ delta`.
#[derive(Clone, Debug)]
pub struct Dataset {
    pub senders: Vec<u32>,
    pub receivers: Vec<u32>,
    pub matched_receivers: usize,
    pub ground_truth: Vec<(u32, u32)>,
}

/// Draw a dataset satisfying the config's match-count and disjointness
/// constraints.
pub fn synthesize(cfg: &SynthConfig) -> Result<Dataset, Error> {
    if cfg.delta == 0 {
        return Err(Error::InvalidConfig("delta must be positive".into()));
    }
    if cfg.target_matches > cfg.receiver_size {
        return Err(Error::InvalidConfig(
            "target_matches exceeds receiver_size".into(),
        ));
    }
    if cfg.disjoint && cfg.target_matches > cfg.sender_size {
        return Err(Error::InvalidConfig(
            "disjoint windows need a distinct sender per match".into(),
        ));
    }

    let mut rng = AesRng::seed_from_u64(cfg.seed);
    let sampler = RangeSampler::new();
    let mut attempts = 0usize;

    let mut xs: BTreeSet<u32> = BTreeSet::new();
    while xs.len() < cfg.sender_size {
        attempts += 1;
        if attempts > cfg.max_attempts {
            return Err(Error::InvalidConfig(
                "sender sampling exhausted the attempt budget".into(),
            ));
        }
        xs.insert(sampler.sample(&mut rng));
    }
    let senders: Vec<u32> = xs.into_iter().collect();

    let delta = cfg.delta as u64;
    let has_sender_within = |y: u32| -> bool {
        let lo = (y as u64).saturating_sub(delta) as u32;
        let idx = senders.partition_point(|&x| x < lo);
        senders
            .get(idx)
            .map_or(false, |&x| x as u64 <= y as u64 + delta)
    };
    let window_clear = |placed: &BTreeSet<u32>, y: u32| -> bool {
        let before = placed.range(..=y).next_back();
        let after = placed.range(y..).next();
        before.map_or(true, |&p| y as u64 - p as u64 > 2 * delta)
            && after.map_or(true, |&n| n as u64 - y as u64 > 2 * delta)
    };

    let mut placed: BTreeSet<u32> = BTreeSet::new();
    let mut matched = 0usize;

    // Match slots: a neighbor offset of a random sender stays within delta
    // even after clamping toward the picked sender.
    while matched < cfg.target_matches && attempts < cfg.max_attempts {
        attempts += 1;
        let x = senders[rng.gen_range(0..senders.len())];
        let offset = rng.gen_range(-(cfg.delta as i64)..=cfg.delta as i64);
        let y = (x as i64 + offset).clamp(0, u32::MAX as i64) as u32;
        if placed.contains(&y) || !has_sender_within(y) {
            continue;
        }
        if cfg.disjoint && !window_clear(&placed, y) {
            continue;
        }
        placed.insert(y);
        matched += 1;
    }

    // Fill the rest with receivers whose window contains no sender.
    while placed.len() < cfg.receiver_size && attempts < cfg.max_attempts {
        attempts += 1;
        let y = sampler.sample(&mut rng);
        if placed.contains(&y) || has_sender_within(y) {
            continue;
        }
        if cfg.disjoint && !window_clear(&placed, y) {
            continue;
        }
        placed.insert(y);
    }

    if matched < cfg.target_matches || placed.len() < cfg.receiver_size {
        if !cfg.allow_partial {
            return Err(Error::TargetMissed {
                target: cfg.target_matches,
                achieved: matched,
            });
        }
        log::warn!(
            "attempt budget exhausted: {} of {} matching receivers, {} of {} total",
            matched,
            cfg.target_matches,
            placed.len(),
            cfg.receiver_size
        );
    }

    let receivers: Vec<u32> = placed.into_iter().collect();
    let mut ground_truth = Vec::new();
    for &y in &receivers {
        let lo = (y as u64).saturating_sub(delta) as u32;
        let start = senders.partition_point(|&x| x < lo);
        for &x in &senders[start..] {
            if x as u64 > y as u64 + delta {
                break;
            }
            ground_truth.push((x, y));
        }
    }
    log::info!(
        "synthesized {} senders / {} receivers, {} matching ({} ground-truth pairs)",
        senders.len(),
        receivers.len(),
        matched,
        ground_truth.len()
    );

    Ok(Dataset {
        senders,
        receivers,
        matched_receivers: matched,
        ground_truth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_matching(senders: &[u32], receivers: &[u32], delta: u64) -> usize {
        receivers
            .iter()
            .filter(|&&y| {
                senders
                    .iter()
                    .any(|&x| (x as u64).abs_diff(y as u64) <= delta)
            })
            .count()
    }

    #[test]
    fn test_exact_target() {
        let cfg = SynthConfig {
            sender_size: 4096,
            receiver_size: 512,
            target_matches: 100,
            ..SynthConfig::default()
        };
        let ds = synthesize(&cfg).unwrap();
        assert_eq!(ds.senders.len(), 4096);
        assert_eq!(ds.receivers.len(), 512);
        assert_eq!(ds.matched_receivers, 100);
        assert_eq!(brute_matching(&ds.senders, &ds.receivers, 50), 100);
        assert!(!ds.ground_truth.is_empty());
        for &(x, y) in &ds.ground_truth {
            assert!((x as u64).abs_diff(y as u64) <= 50);
        }
    }

    #[test]
    fn test_sorted_unique() {
        let ds = synthesize(&SynthConfig::default()).unwrap();
        assert!(ds.senders.windows(2).all(|w| w[0] < w[1]));
        assert!(ds.receivers.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_disjoint_windows() {
        let cfg = SynthConfig {
            sender_size: 8192,
            receiver_size: 256,
            target_matches: 64,
            disjoint: true,
            ..SynthConfig::default()
        };
        let ds = synthesize(&cfg).unwrap();
        assert_eq!(ds.matched_receivers, 64);
        // Sorted receivers: adjacent distance beyond 2δ implies all pairs.
        assert!(ds
            .receivers
            .windows(2)
            .all(|w| w[1] as u64 - w[0] as u64 > 100));
    }

    #[test]
    fn test_same_seed_same_dataset() {
        let cfg = SynthConfig {
            seed: 777,
            ..SynthConfig::default()
        };
        let a = synthesize(&cfg).unwrap();
        let b = synthesize(&cfg).unwrap();
        assert_eq!(a.senders, b.senders);
        assert_eq!(a.receivers, b.receivers);
        assert_eq!(a.ground_truth, b.ground_truth);
    }

    #[test]
    fn test_partial_modes() {
        // The sender draw alone consumes most of the budget, so the match
        // phase cannot reach its target.
        let tight = SynthConfig {
            sender_size: 64,
            receiver_size: 64,
            target_matches: 64,
            max_attempts: 80,
            ..SynthConfig::default()
        };
        assert!(matches!(
            synthesize(&tight),
            Err(Error::TargetMissed { .. })
        ));
        let lenient = SynthConfig {
            allow_partial: true,
            ..tight
        };
        let ds = synthesize(&lenient).unwrap();
        assert!(ds.matched_receivers < 64);
    }
}
