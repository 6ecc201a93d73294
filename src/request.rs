//! Pending request records.

use crate::options::RequestOptions;
use crate::transport::ResponseInfo;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// HTTP method of a queued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Completion callback invoked with the response body and metadata.
///
/// Callbacks are plain function values; the engine consults no return value
/// and does not catch panics, so a panicking callback terminates the batch
/// at that point.
pub type Callback = Arc<dyn Fn(&Bytes, &ResponseInfo) + Send + Sync>;

/// A single pending request.
///
/// Immutable after construction: the engine reads `url`, `method` and
/// `callback` but never reassigns them. Ownership moves from the pending
/// queue to the in-flight table at dispatch, and the record is dropped after
/// its callback runs.
pub struct Request {
    pub(crate) url: String,
    pub(crate) method: Method,
    pub(crate) body: Option<Bytes>,
    pub(crate) headers: Option<Vec<String>>,
    pub(crate) options: Option<RequestOptions>,
    pub(crate) callback: Option<Callback>,
    pub(crate) id: Uuid,
}

impl Request {
    pub fn new(url: impl Into<String>, method: Method) -> Self {
        Self {
            url: url.into(),
            method,
            body: None,
            headers: None,
            options: None,
            callback: None,
            id: Uuid::new_v4(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url, Method::Get)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(url, Method::Post)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Append one raw header line in `Name: value` form.
    pub fn with_header(mut self, line: impl Into<String>) -> Self {
        self.headers.get_or_insert_with(Vec::new).push(line.into());
        self
    }

    pub fn with_headers(mut self, lines: Vec<String>) -> Self {
        self.headers = Some(lines);
        self
    }

    /// Set one per-request transport option; overrides the scheduler default
    /// for the same key at dispatch time.
    pub fn with_option(
        mut self,
        key: crate::options::OptionKey,
        value: crate::options::OptionValue,
    ) -> Self {
        self.options
            .get_or_insert_with(RequestOptions::new)
            .insert(key, value);
        self
    }

    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Bytes, &ResponseInfo) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Opaque unique identifier, generated at construction. Used only for
    /// diagnostics; the engine never keys lookups on it.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("method", &self.method)
            .field("body", &self.body.as_ref().map(|b| b.len()))
            .field("headers", &self.headers)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{OptionKey, OptionValue};

    #[test]
    fn test_request_builder() {
        let req = Request::post("http://example.com/upload")
            .with_body("payload")
            .with_header("Accept: application/json")
            .with_option(OptionKey::Timeout, OptionValue::Int(5));

        assert_eq!(req.url(), "http://example.com/upload");
        assert_eq!(req.method(), Method::Post);
        assert_eq!(req.body.as_deref(), Some(&b"payload"[..]));
        assert_eq!(
            req.headers.as_deref(),
            Some(&["Accept: application/json".to_string()][..])
        );
        assert!(!req.has_callback());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = Request::get("http://example.com/a");
        let b = Request::get("http://example.com/a");
        assert_ne!(a.id(), b.id());
    }
}
