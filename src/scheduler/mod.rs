//! Windowed batch scheduling.
//!
//! # Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`FetchQueue`] | The engine: preflight, fast path, windowed control loop |
//! | [`SchedulerConfig`] | Window size, timeout, default options and callback |
//! | [`PendingQueue`] | FIFO requests awaiting dispatch |
//! | [`InFlightTable`] | Requests currently executing, keyed by handle identity |

mod config;
mod core;
mod queue;

pub use config::{ConfigValue, SchedulerConfig};
pub use core::{Executed, FetchQueue};
pub use queue::{InFlightTable, PendingQueue};
