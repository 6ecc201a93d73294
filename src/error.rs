use crate::transport::{HandleId, TransportError};
use thiserror::Error;

/// Unified error type for the batch engine.
///
/// Configuration and preflight errors are reported synchronously, before any
/// network activity. Mid-batch transport failures abort the remaining batch
/// but do not roll back callbacks that already fired; partial progress is an
/// accepted semantic, not a bug.
#[derive(Debug, Error)]
pub enum Error {
    /// `execute()` was called with nothing queued.
    #[error("nothing to execute: the request queue is empty")]
    EmptyQueue,

    /// Some queued request has no reachable callback. Detected before any
    /// transport handle is created, so a rejected batch has no side effects.
    #[error("{missing} of {total} queued requests have no callback and no default callback is configured")]
    MissingCallback { missing: usize, total: usize },

    /// `config()` was given an option name outside the recognized set. The
    /// whole call is rejected and none of its entries are applied.
    #[error("unrecognized config key: {key}")]
    UnknownConfigKey { key: String },

    /// `config()` was given a recognized key with a value of the wrong shape
    /// (e.g. a callback where an integer is expected).
    #[error("invalid value for config key: {key}")]
    InvalidConfigValue { key: String },

    /// The transport adapter reported a fatal engine-level failure mid-loop.
    /// Not retried; callbacks from earlier completions have already run.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// A completed handle had no matching in-flight entry. Indicates a bug
    /// in handle bookkeeping; surfaced as a fatal error rather than swallowed.
    #[error("completed handle {0:?} has no in-flight entry")]
    HandleBookkeeping(HandleId),
}
