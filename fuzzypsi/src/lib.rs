// This file is part of `fuzzypsi`.
// See LICENSE for licensing information.

//! Two-party fuzzy private set intersection.
//!
//! The crate operates on 128-bit prefix fingerprints (see the `prefixer`
//! crate) and offers two interchangeable back-ends: a labeled-HE protocol
//! with OPRF pre-hashing and a cuckoo-hashed sender database, and an
//! OKVS/VOLE protocol trading rounds for per-item compute. The pipeline
//! module composes encoding, fingerprinting, a back-end, and the exact
//! distance post-filter into the end-to-end fuzzy intersection.

mod cuckoo;
mod errors;
pub mod files;
pub mod frame;
pub mod okvs;
mod oprf;
pub mod params;
pub mod pipeline;
mod poly;
mod psi;
mod vole;

pub use crate::{
    errors::Error,
    params::PsiParams,
    pipeline::{Intersection, PipelineConfig, SessionConfig},
    psi::*,
};
