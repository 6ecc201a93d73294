//! # fetchq
//!
//! A windowed concurrent HTTP request batcher: enqueue any number of
//! requests, execute them with at most `window` in flight at once, and get a
//! completion callback as each response arrives. The sweet spot between
//! fetching URLs one by one (slow) and firing them all at once (resource
//! exhaustion, server throttling).
//!
//! ## Overview
//!
//! The engine is a single-task control loop over a pluggable multi-transfer
//! transport: it fills the concurrency window in FIFO order, drains
//! completions as the transport reports them, and refills one-in-one-out
//! until everything queued has run. Preflight validation rejects a batch
//! before any network activity if it is empty or if some request would
//! complete without a callback to receive its response.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fetchq::{ConfigValue, FetchQueue};
//!
//! #[tokio::main]
//! async fn main() -> fetchq::Result<()> {
//!     let mut queue = FetchQueue::new()?;
//!     queue.config(vec![
//!         ("window".into(), ConfigValue::Int(5)),
//!         ("callback".into(), ConfigValue::callback(|body, info| {
//!             println!("{} {} ({} bytes)", info.status, info.url, body.len());
//!         })),
//!     ])?;
//!
//!     for page in 1..=50 {
//!         queue.get(format!("https://example.com/page/{page}"));
//!     }
//!     queue.execute().await?;
//!     Ok(())
//! }
//! ```
//!
//! A single queued request takes a fast path and returns the response body
//! directly from `execute()`, so the batcher doubles as a simple fetch.
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`scheduler`] | The windowed engine: queue, in-flight table, control loop |
//! | [`transport`] | Transport adapter contract and the reqwest-backed default |
//! | [`request`] | Request records and completion callbacks |
//! | [`options`] | Flat transport option map and the per-dispatch merge |

pub mod error;
pub mod options;
pub mod request;
pub mod scheduler;
pub mod transport;

pub use error::Error;
pub use options::{EffectiveOptions, OptionKey, OptionValue, RequestOptions};
pub use request::{Callback, Method, Request};
pub use scheduler::{ConfigValue, Executed, FetchQueue};
pub use transport::{
    Completion, HandleId, HttpTransport, ResponseInfo, StepStatus, Transport, TransportError,
};

/// Result type alias for the library.
pub type Result<T> = std::result::Result<T, Error>;
