// This file is part of `ipsmith`.
// See LICENSE for licensing information.

//! Test-corpus synthesis for fuzzy set intersection: weighted sampling over
//! realistic IPv4 ranges, constrained so that exactly a target number of
//! receiver ids have a sender within the distance threshold, optionally
//! with pairwise-disjoint receiver neighborhoods.

mod ranges;
mod synth;

pub use crate::{
    ranges::{RangeSampler, sample_wide, IpRange, RANGES},
    synth::{synthesize, Dataset, SynthConfig},
};

/// Errors produced by the dataset synthesizer.
#[derive(Debug)]
pub enum Error {
    /// The target match count could not be met within the attempt budget.
    TargetMissed {
        /// Requested number of matching receivers.
        target: usize,
        /// Number actually placed.
        achieved: usize,
    },
    /// A configuration parameter is out of range.
    InvalidConfig(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::TargetMissed { target, achieved } => write!(
                f,
                "could not meet target of {} matching receivers (achieved {})",
                target, achieved
            ),
            Error::InvalidConfig(s) => write!(f, "invalid synthesizer config: {}", s),
        }
    }
}

impl std::error::Error for Error {}
