// This file is part of `fuzzypsi`.
// See LICENSE for licensing information.

//! The end-to-end pipeline: encode ids into role-specific wildcard
//! prefixes, fingerprint them, run the selected PSI back-end over the
//! fingerprint sets, lift matched fingerprints back to receiver ids, and
//! apply the exact distance post-filter.
//!
//! The prefix encoding admits no false negatives, so every true pair
//! survives to the post-filter; the post-filter discards anything beyond
//! the threshold, making the final output bit-exact equal to the
//! ground-truth fuzzy intersection.

use crate::{
    params::PsiParams,
    psi::{self, Backend},
    Error,
};
use bedrock::{AbstractChannel, AesRng, Block};
use itertools::Itertools;
use prefixer::{fingerprint, receiver_prefixes, sender_prefixes};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// Per-session resource bounds. Worker threads are created from this
/// struct; there is no process-wide pool.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Worker threads for batch-parallel stages and HE evaluation.
    pub workers: usize,
    /// Bound on each network receive (honored by the TCP channels the CLI
    /// constructs; in-process socketpairs don't time out).
    pub timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            workers: 8,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Pipeline configuration.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Distance threshold δ.
    pub delta: u64,
    /// Id width in bits, 32 or 128.
    pub bits: u32,
    /// Which PSI back-end computes the prefix intersection.
    pub backend: Backend,
    /// Labeled-HE parameters; derived from the sender set size when absent.
    pub params: Option<PsiParams>,
    /// Resource bounds.
    pub session: SessionConfig,
}

impl PipelineConfig {
    pub fn new(delta: u64, bits: u32, backend: Backend) -> Self {
        PipelineConfig {
            delta,
            bits,
            backend,
            params: None,
            session: SessionConfig::default(),
        }
    }
}

/// The fuzzy intersection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Intersection {
    /// All pairs with `|x − y| ≤ δ`, sorted.
    pub pairs: Vec<(u128, u128)>,
    /// Receiver ids appearing in at least one pair, sorted.
    pub matched_receivers: Vec<u128>,
}

fn validate(values: &[u128], delta: u64, bits: u32) -> Result<(), Error> {
    if bits != 32 && bits != 128 {
        return Err(Error::InvalidInput(format!(
            "id width must be 32 or 128 bits, got {}",
            bits
        )));
    }
    if delta == 0 {
        return Err(Error::InvalidInput("delta must be positive".into()));
    }
    if bits < 128 && delta as u128 >= 1u128 << (bits - 1) {
        return Err(Error::InvalidInput(format!(
            "delta {} too large for {}-bit ids",
            delta, bits
        )));
    }
    if bits < 128 {
        if let Some(v) = values.iter().find(|&&v| v >> bits != 0) {
            return Err(Error::InvalidInput(format!(
                "id {} does not fit in {} bits",
                v, bits
            )));
        }
    }
    Ok(())
}

enum Role {
    Sender,
    Receiver,
}

// Encode and fingerprint one party's ids. Returns the deduplicated
// fingerprints in first-seen order plus the fingerprint → source-id
// multimap used to reverse PSI hits. Both parallel maps are
// order-preserving, so the result is deterministic.
fn encode_party(
    pool: &rayon::ThreadPool,
    values: &[u128],
    delta: u64,
    bits: u32,
    role: Role,
) -> (Vec<Block>, HashMap<Block, Vec<u128>>) {
    let per_value: Vec<Vec<u128>> = pool.install(|| {
        values
            .par_iter()
            .map(|&v| {
                let prefixes = match role {
                    Role::Sender => sender_prefixes(v, delta, bits),
                    Role::Receiver => receiver_prefixes(v, delta, bits),
                };
                prefixes.iter().map(|p| fingerprint(p)).collect()
            })
            .collect()
    });
    let mut unique = Vec::new();
    let mut sources: HashMap<Block, Vec<u128>> = HashMap::new();
    for (&v, fps) in values.iter().zip(per_value.iter()) {
        for &fp in fps {
            let fp = Block::from(fp);
            let entry = sources.entry(fp).or_default();
            if entry.is_empty() {
                unique.push(fp);
            }
            if !entry.contains(&v) {
                entry.push(v);
            }
        }
    }
    (unique, sources)
}

fn build_pool(workers: usize) -> Result<rayon::ThreadPool, Error> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| Error::Internal(format!("worker pool: {}", e)))
}

fn dedup_sorted(values: Vec<u128>) -> Vec<u128> {
    values.into_iter().sorted_unstable().dedup().collect_vec()
}

/// Run the whole pipeline in-process, driving both parties of the selected
/// back-end over a socketpair. On any back-end error the intersection is
/// empty and the error is returned to the caller.
pub fn run(
    senders: &[u128],
    receivers: &[u128],
    cfg: &PipelineConfig,
) -> Result<Intersection, Error> {
    validate(senders, cfg.delta, cfg.bits)?;
    validate(receivers, cfg.delta, cfg.bits)?;
    let pool = build_pool(cfg.session.workers)?;
    let senders = dedup_sorted(senders.to_vec());
    let receivers = dedup_sorted(receivers.to_vec());

    let (sender_fps, _) = encode_party(&pool, &senders, cfg.delta, cfg.bits, Role::Sender);
    let (receiver_fps, receiver_sources) =
        encode_party(&pool, &receivers, cfg.delta, cfg.bits, Role::Receiver);
    log::info!(
        "pipeline: {} sender ids -> {} prefixes, {} receiver ids -> {} prefixes",
        senders.len(),
        sender_fps.len(),
        receivers.len(),
        receiver_fps.len()
    );

    let matched = psi::intersect_in_process(
        cfg.backend,
        cfg.params.clone(),
        sender_fps,
        &receiver_fps,
        cfg.session.workers,
    )?;

    let mut candidates: BTreeSet<u128> = BTreeSet::new();
    for idx in matched {
        if let Some(ids) = receiver_sources.get(&receiver_fps[idx]) {
            candidates.extend(ids.iter().copied());
        }
    }

    Ok(post_filter(&senders, candidates, cfg.delta))
}

// Lift candidate receiver ids to exact pairs. `senders` must be sorted.
fn post_filter(senders: &[u128], candidates: BTreeSet<u128>, delta: u64) -> Intersection {
    let mut pairs = Vec::new();
    let mut matched_receivers = Vec::new();
    for &y in &candidates {
        let lo = y.saturating_sub(delta as u128);
        let hi = y.saturating_add(delta as u128);
        let start = senders.partition_point(|&x| x < lo);
        let before = pairs.len();
        for &x in &senders[start..] {
            if x > hi {
                break;
            }
            pairs.push((x, y));
        }
        if pairs.len() > before {
            matched_receivers.push(y);
        }
    }
    pairs.sort_unstable();
    Intersection {
        pairs,
        matched_receivers,
    }
}

/// Two-party operation, sender side: encode, fingerprint, and serve the
/// PSI stage over `channel`.
pub fn run_sender<C: AbstractChannel>(
    senders: &[u128],
    cfg: &PipelineConfig,
    channel: &mut C,
) -> Result<(), Error> {
    validate(senders, cfg.delta, cfg.bits)?;
    let pool = build_pool(cfg.session.workers)?;
    let senders = dedup_sorted(senders.to_vec());
    let (fps, _) = encode_party(&pool, &senders, cfg.delta, cfg.bits, Role::Sender);
    let mut rng = AesRng::new();
    match cfg.backend {
        Backend::LabeledHe => {
            let params = cfg
                .params
                .clone()
                .unwrap_or_else(|| PsiParams::for_set_size(fps.len()));
            let initial_table = params.table_params.table_size;
            let mut sender = psi::labeled::Sender::new(params, cfg.session.workers, &mut rng)?;
            sender.build_db(&fps)?;
            if sender.params().table_params.table_size != initial_table {
                log::warn!(
                    "sender table expanded to {} bins; the receiver must use the effective parameters",
                    sender.params().table_params.table_size
                );
            }
            sender.run(channel)
        }
        Backend::OkvsVole => psi::fast::Sender::new().send(&fps, channel, &mut rng),
    }
}

/// Two-party operation, receiver side: run the PSI stage over `channel`
/// and return the candidate receiver ids whose prefixes matched. The
/// coordinator holding both id sets applies the exact distance check.
pub fn run_receiver<C: AbstractChannel>(
    receivers: &[u128],
    cfg: &PipelineConfig,
    channel: &mut C,
) -> Result<Vec<u128>, Error> {
    validate(receivers, cfg.delta, cfg.bits)?;
    let pool = build_pool(cfg.session.workers)?;
    let receivers = dedup_sorted(receivers.to_vec());
    let (fps, sources) = encode_party(&pool, &receivers, cfg.delta, cfg.bits, Role::Receiver);
    let mut rng = AesRng::new();
    let matched = match cfg.backend {
        Backend::LabeledHe => {
            let params = cfg
                .params
                .clone()
                .unwrap_or_else(|| PsiParams::for_set_size(fps.len()));
            let mut receiver = psi::labeled::Receiver::new(params, &mut rng)?;
            receiver.receive(&fps, channel, &mut rng)?
        }
        Backend::OkvsVole => psi::fast::Receiver::new().receive(&fps, channel, &mut rng)?,
    };
    let mut out: BTreeSet<u128> = BTreeSet::new();
    for idx in matched {
        if let Some(ids) = sources.get(&fps[idx]) {
            out.extend(ids.iter().copied());
        }
    }
    Ok(out.into_iter().collect())
}
