//! Scheduler configuration.

use crate::error::Error;
use crate::options::RequestOptions;
use crate::request::Callback;
use crate::transport::ResponseInfo;
use crate::Result;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// Value accepted by [`FetchQueue::config`](crate::FetchQueue::config).
///
/// Keys are strings so misconfiguration is reportable rather than a compile
/// error; the recognized set is `window`, `timeout`, `options`, `callback`.
#[derive(Clone)]
pub enum ConfigValue {
    Int(i64),
    Options(RequestOptions),
    Callback(Callback),
}

impl ConfigValue {
    /// Wrap a plain closure as a default-callback value.
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&Bytes, &ResponseInfo) + Send + Sync + 'static,
    {
        ConfigValue::Callback(Arc::new(f))
    }
}

impl fmt::Debug for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Int(n) => f.debug_tuple("Int").field(n).finish(),
            ConfigValue::Options(o) => f.debug_tuple("Options").field(o).finish(),
            ConfigValue::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Engine configuration. Set at construction via defaults, mutable only
/// through `config()` before `execute()`; the control loop never rewrites it
/// beyond preflight window normalization.
pub struct SchedulerConfig {
    /// Max concurrent in-flight requests.
    pub(crate) window: usize,
    /// Per-poll wait bound and default per-request timeout, in seconds.
    pub(crate) timeout: u64,
    pub(crate) default_callback: Option<Callback>,
    pub(crate) default_options: RequestOptions,
    /// Queued requests carrying their own callback; consulted only by
    /// preflight. Incremented on enqueue, decremented on dequeue so the
    /// count stays accurate across successive `execute()` calls.
    pub(crate) callback_count: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            window: 10,
            timeout: 15,
            default_callback: None,
            default_options: RequestOptions::new(),
            callback_count: 0,
        }
    }
}

enum Setting {
    Window(usize),
    Timeout(u64),
    Options(RequestOptions),
    Callback(Callback),
}

impl SchedulerConfig {
    /// Apply a set of key/value entries, all-or-nothing.
    ///
    /// Every entry is validated before any is applied: an unrecognized key
    /// or a value of the wrong shape rejects the whole call and leaves the
    /// configuration untouched.
    pub(crate) fn apply(&mut self, entries: Vec<(String, ConfigValue)>) -> Result<()> {
        let mut staged = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let setting = match (key.as_str(), value) {
                ("window", ConfigValue::Int(n)) => Setting::Window(n.max(0) as usize),
                ("timeout", ConfigValue::Int(n)) => Setting::Timeout(n.max(0) as u64),
                ("options", ConfigValue::Options(options)) => Setting::Options(options),
                ("callback", ConfigValue::Callback(callback)) => Setting::Callback(callback),
                ("window" | "timeout" | "options" | "callback", _) => {
                    return Err(Error::InvalidConfigValue { key });
                }
                _ => return Err(Error::UnknownConfigKey { key }),
            };
            staged.push(setting);
        }

        for setting in staged {
            match setting {
                Setting::Window(w) => self.window = w,
                Setting::Timeout(t) => self.timeout = t,
                Setting::Options(o) => self.default_options = o,
                Setting::Callback(c) => self.default_callback = Some(c),
            }
        }
        Ok(())
    }
}
