// This file is part of `fuzzypsi`.
// See LICENSE for licensing information.

pub mod fast;
pub mod labeled;

use crate::{params::PsiParams, Error};
use bedrock::{unix_channel_pair, AesRng, Block};

/// Private set intersection sender (labeled-HE path).
pub type LabeledSender = labeled::Sender;
/// Private set intersection receiver (labeled-HE path).
pub type LabeledReceiver = labeled::Receiver;
/// Private set intersection sender (OKVS/VOLE path).
pub type FastSender = fast::Sender;
/// Private set intersection receiver (OKVS/VOLE path).
pub type FastReceiver = fast::Receiver;

/// Back-end selection. Both variants expose the same operation: intersect
/// two fingerprint sets and report the matched receiver indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// Batched-HE with OPRF pre-hashing and a cuckoo-hashed sender DB.
    LabeledHe,
    /// Band-OKVS over a VOLE correlation.
    OkvsVole,
}

impl std::str::FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "labeled" | "labeled-he" | "he" => Ok(Backend::LabeledHe),
            "vole" | "okvs" | "okvs-vole" => Ok(Backend::OkvsVole),
            other => Err(Error::InvalidInput(format!("unknown backend `{}`", other))),
        }
    }
}

/// Drive both parties of the selected back-end in-process over a Unix
/// socketpair, one thread per role. Returns the sorted indices of
/// `receiver_fps` present in `sender_fps`.
pub fn intersect_in_process(
    backend: Backend,
    params: Option<PsiParams>,
    sender_fps: Vec<Block>,
    receiver_fps: &[Block],
    workers: usize,
) -> Result<Vec<usize>, Error> {
    let (mut c1, mut c2) = unix_channel_pair()?;
    match backend {
        Backend::LabeledHe => {
            let params = params.unwrap_or_else(|| PsiParams::for_set_size(sender_fps.len()));
            let mut rng = AesRng::new();
            let mut sender = labeled::Sender::new(params, workers, &mut rng)?;
            sender.build_db(&sender_fps)?;
            let effective = sender.params().clone();
            std::thread::scope(|s| {
                let handle = s.spawn(move || sender.run(&mut c1));
                let mut rng = AesRng::new();
                let matched = labeled::Receiver::new(effective, &mut rng)
                    .and_then(|mut receiver| receiver.receive(receiver_fps, &mut c2, &mut rng));
                // Close our end before joining so an early receiver error
                // cannot leave the sender blocked on a read.
                drop(c2);
                let sent = handle
                    .join()
                    .map_err(|_| Error::Internal("sender thread panicked".into()))?;
                merge(matched, sent)
            })
        }
        Backend::OkvsVole => std::thread::scope(|s| {
            let handle = s.spawn(move || {
                let mut rng = AesRng::new();
                fast::Sender::new().send(&sender_fps, &mut c1, &mut rng)
            });
            let mut rng = AesRng::new();
            let matched = fast::Receiver::new().receive(receiver_fps, &mut c2, &mut rng);
            drop(c2);
            let sent = handle
                .join()
                .map_err(|_| Error::Internal("sender thread panicked".into()))?;
            merge(matched, sent)
        }),
    }
}

// A failure on one side usually surfaces on the other as the EOF it
// caused; report the substantive error.
fn merge(matched: Result<Vec<usize>, Error>, sent: Result<(), Error>) -> Result<Vec<usize>, Error> {
    match (matched, sent) {
        (matched, Ok(())) => matched,
        (Ok(_), Err(e)) => Err(e),
        (Err(Error::Io(_)), Err(e)) | (Err(Error::Timeout), Err(e)) => Err(e),
        (Err(e), Err(_)) => Err(e),
    }
}
