// This file is part of `fuzzypsi`.
// See LICENSE for licensing information.

/// Errors produced by the private set intersection protocols.
#[derive(Debug)]
pub enum Error {
    /// An input file line or caller-supplied value could not be parsed or is
    /// out of range.
    InvalidInput(String),
    /// An HE parameter set failed a validation predicate.
    ParameterInvalid(String),
    /// The cuckoo table cannot accommodate the sender set, even after
    /// expanding the table by whole bundles.
    CapacityExceeded {
        /// Number of items being inserted.
        items: usize,
        /// Final table size tried.
        table_size: usize,
    },
    /// The OKVS system stayed singular across all encoding retries.
    EncodingFailure {
        /// Number of seeds tried.
        attempts: usize,
    },
    /// A malformed response, or a frame tag out of protocol order.
    ProtocolMismatch(String),
    /// Fewer result packages arrived than the response header announced.
    Truncated {
        /// Announced package count.
        expected: usize,
        /// Packages actually received.
        received: usize,
    },
    /// A network receive exceeded its bound.
    Timeout,
    /// An input/output error occurred.
    Io(std::io::Error),
    /// An invariant that should be unreachable was violated.
    Internal(String),
}

impl Error {
    /// Process exit code for this error kind: 1 for invariant violations,
    /// 2 for I/O failures, 3 for protocol failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Io(_) => 2,
            Error::ProtocolMismatch(_) | Error::Truncated { .. } | Error::Timeout => 3,
            _ => 1,
        }
    }
}

impl From<std::io::Error> for Error {
    #[inline]
    fn from(e: std::io::Error) -> Error {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Error::Timeout,
            _ => Error::Io(e),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::InvalidInput(s) => write!(f, "invalid input: {}", s),
            Error::ParameterInvalid(s) => write!(f, "invalid parameters: {}", s),
            Error::CapacityExceeded { items, table_size } => write!(
                f,
                "cuckoo table full: {} items do not fit a table of {} bins",
                items, table_size
            ),
            Error::EncodingFailure { attempts } => {
                write!(f, "OKVS encoding singular after {} attempts", attempts)
            }
            Error::ProtocolMismatch(s) => write!(f, "protocol mismatch: {}", s),
            Error::Truncated { expected, received } => write!(
                f,
                "response truncated: expected {} result packages, received {}",
                expected, received
            ),
            Error::Timeout => write!(f, "network receive timed out"),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Internal(s) => write!(f, "internal error: {}", s),
        }
    }
}

impl std::error::Error for Error {}
