//! Transport adapter contract.
//!
//! The engine treats the HTTP layer as an external collaborator behind the
//! [`Transport`] trait: it allocates handles, starts them, drives progress,
//! and drains completions, but never touches sockets itself. The shipped
//! implementation is [`HttpTransport`], built on `reqwest` and `tokio`;
//! tests substitute deterministic adapters through the same trait.

mod http;

pub use http::HttpTransport;

use crate::options::EffectiveOptions;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Opaque identity of one transport-layer request. Used directly as the
/// in-flight table key; never stringified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

impl HandleId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// One newly finished handle, yielded exactly once by
/// [`Transport::poll_completions`]. Per-transfer success or failure is
/// carried in the handle's [`ResponseInfo`], not here: a failed transfer is
/// still a completed transfer.
#[derive(Debug, Clone, Copy)]
pub struct Completion {
    pub handle: HandleId,
}

/// Result of one non-blocking drive step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Progress was made and another immediate step may yield more.
    Progressed,
    /// No further immediate progress available.
    Idle,
}

/// Metadata about a completed transfer, passed to callbacks alongside the
/// response body.
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    /// Final URL of the transfer (after any redirects).
    pub url: String,
    /// HTTP status code; 0 when the transfer failed before a response.
    pub status: u16,
    pub content_length: Option<u64>,
    pub elapsed: Duration,
    /// Transfer-level failure, if any. The callback still runs.
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Engine-level failure: the multi-transfer machinery itself broke, as
    /// opposed to a single transfer failing.
    #[error("engine failure: {0}")]
    Engine(String),
}

/// Multi-transfer HTTP engine abstraction.
///
/// Lifecycle per handle: `create_handle` (cheap, no I/O) →
/// `register_and_start` → appears once in `poll_completions` →
/// `content`/`info` extraction → `release` (exactly once).
#[async_trait]
pub trait Transport: Send {
    /// Allocate a handle configured with the merged options. Must not start
    /// network I/O.
    fn create_handle(&mut self, options: &EffectiveOptions) -> Result<HandleId, TransportError>;

    /// Hand the handle to the engine for asynchronous execution.
    fn register_and_start(&mut self, handle: HandleId) -> Result<(), TransportError>;

    /// Advance in-flight transfers without blocking. Called repeatedly while
    /// it reports [`StepStatus::Progressed`]; a returned error is fatal for
    /// the whole batch.
    fn drive_step(&mut self) -> Result<StepStatus, TransportError>;

    /// Handles newly finished since the last call, each yielded exactly once.
    fn poll_completions(&mut self) -> Vec<Completion>;

    /// Response body of a completed handle; `None` if the handle is unknown.
    fn content(&self, handle: HandleId) -> Option<Bytes>;

    /// Response metadata of a completed handle.
    fn info(&self, handle: HandleId) -> Option<ResponseInfo>;

    /// Detach a completed handle, freeing its resources. Exactly once per
    /// handle, after extraction.
    fn release(&mut self, handle: HandleId);

    /// Block until the transport reports activity or the timeout elapses.
    /// The engine's only suspension point.
    async fn wait_for_activity(&mut self, timeout: Duration);
}
