//! Flat transport option map and the per-dispatch merge.
//!
//! Options are a key-effect mapping: each recognized key changes one aspect
//! of how the transport performs a transfer. Scheduler-level defaults are
//! merged under per-request options by a pure function at dispatch time;
//! there is no shared mutable defaults state.

use crate::request::{Method, Request};
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

/// Recognized per-transfer option keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKey {
    /// Whole-transfer timeout, in seconds.
    Timeout,
    /// `User-Agent` sent with the transfer.
    UserAgent,
    /// `Referer` sent with the transfer.
    Referer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Int(u64),
    Str(String),
}

impl OptionValue {
    pub fn as_secs(&self) -> Option<u64> {
        match self {
            OptionValue::Int(n) => Some(*n),
            OptionValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            OptionValue::Int(_) => None,
        }
    }
}

pub type RequestOptions = HashMap<OptionKey, OptionValue>;

/// Fully merged transfer configuration handed to the transport adapter.
///
/// URL, method, body and headers are forced from the request itself and
/// cannot be overridden through the option map.
#[derive(Debug, Clone)]
pub struct EffectiveOptions {
    pub url: String,
    pub method: Method,
    pub body: Option<Bytes>,
    pub headers: Vec<String>,
    pub options: RequestOptions,
}

impl EffectiveOptions {
    /// Merge scheduler defaults under per-request options.
    ///
    /// Precedence, lowest to highest: implicit `Timeout(base_timeout)`,
    /// scheduler `defaults`, the request's own `options`. The request's
    /// URL and headers always win; a body is attached whenever the request
    /// carries one or its method is POST.
    pub fn assemble(defaults: &RequestOptions, base_timeout: u64, request: &Request) -> Self {
        let mut options = RequestOptions::new();
        options.insert(OptionKey::Timeout, OptionValue::Int(base_timeout));
        for (k, v) in defaults {
            options.insert(*k, v.clone());
        }
        if let Some(own) = &request.options {
            for (k, v) in own {
                options.insert(*k, v.clone());
            }
        }

        let body = if request.body.is_some() || request.method == Method::Post {
            Some(request.body.clone().unwrap_or_default())
        } else {
            None
        };

        Self {
            url: request.url.clone(),
            method: request.method,
            body,
            headers: request.headers.clone().unwrap_or_default(),
            options,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.options
            .get(&OptionKey::Timeout)
            .and_then(OptionValue::as_secs)
            .map(Duration::from_secs)
    }
}
