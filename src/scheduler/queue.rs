//! Pending queue and in-flight table.

use crate::request::Request;
use crate::transport::HandleId;
use std::collections::{HashMap, VecDeque};

/// FIFO queue of requests awaiting dispatch. Insertion order is dispatch
/// order; that is the engine's fairness guarantee.
#[derive(Debug, Default)]
pub struct PendingQueue {
    items: VecDeque<Request>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, request: Request) {
        self.items.push_back(request);
    }

    pub fn next(&mut self) -> Option<Request> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Requests currently executing, keyed by transport handle identity.
///
/// A key exists here iff the corresponding request is outstanding at the
/// transport layer. Reads are destructive: each handle completes exactly
/// once, so taking on read collapses "read completion" and "free the slot"
/// into one step.
#[derive(Debug, Default)]
pub struct InFlightTable {
    entries: HashMap<HandleId, Request>,
}

impl InFlightTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert under a fresh handle. The engine guarantees the key is not
    /// already present; the table does not enforce it.
    pub fn add(&mut self, handle: HandleId, request: Request) {
        self.entries.insert(handle, request);
    }

    /// Remove and return the entry for a completed handle.
    pub fn take(&mut self, handle: HandleId) -> Option<Request> {
        self.entries.remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
