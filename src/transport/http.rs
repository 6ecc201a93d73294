//! reqwest-backed multi-transfer adapter.

use super::{Completion, HandleId, ResponseInfo, StepStatus, Transport, TransportError};
use crate::options::{EffectiveOptions, OptionKey, OptionValue};
use crate::request::Method;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderName, HeaderValue, REFERER, USER_AGENT};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TryRecvError};

struct TransferResult {
    body: Bytes,
    info: ResponseInfo,
}

/// Transport over a shared `reqwest::Client`.
///
/// Each started handle becomes one spawned tokio task performing the
/// transfer; finished tasks report on an internal channel. `drive_step`
/// drains that channel without blocking and `wait_for_activity` awaits one
/// report, bounded by the caller's timeout. Per-transfer failures surface as
/// completions with empty content and `status: 0`; only machinery failures
/// (a closed result channel with transfers outstanding) are fatal.
pub struct HttpTransport {
    client: reqwest::Client,
    next_id: u64,
    prepared: HashMap<HandleId, reqwest::Request>,
    results: HashMap<HandleId, TransferResult>,
    completed: Vec<Completion>,
    outstanding: usize,
    tx: mpsc::UnboundedSender<(HandleId, TransferResult)>,
    rx: mpsc::UnboundedReceiver<(HandleId, TransferResult)>,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()?;
        Ok(Self::with_client(client))
    }

    /// Build the adapter over a caller-supplied client (custom proxy, TLS or
    /// pool settings).
    pub fn with_client(client: reqwest::Client) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            client,
            next_id: 0,
            prepared: HashMap::new(),
            results: HashMap::new(),
            completed: Vec::new(),
            outstanding: 0,
            tx,
            rx,
        }
    }

    fn finish(&mut self, handle: HandleId, result: TransferResult) {
        tracing::debug!(
            handle = handle.raw(),
            status = result.info.status,
            url = %result.info.url,
            "transfer finished"
        );
        self.outstanding = self.outstanding.saturating_sub(1);
        self.results.insert(handle, result);
        self.completed.push(Completion { handle });
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn create_handle(&mut self, options: &EffectiveOptions) -> Result<HandleId, TransportError> {
        let url = url::Url::parse(&options.url).map_err(|source| TransportError::InvalidUrl {
            url: options.url.clone(),
            source,
        })?;

        let method = match options.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        let mut builder = self.client.request(method, url);

        if let Some(timeout) = options.timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(agent) = self
            .option_str(options, OptionKey::UserAgent)
        {
            builder = builder.header(USER_AGENT, agent);
        }
        if let Some(referer) = self.option_str(options, OptionKey::Referer) {
            builder = builder.header(REFERER, referer);
        }

        for line in &options.headers {
            match parse_header_line(line) {
                Some((name, value)) => builder = builder.header(name, value),
                None => tracing::warn!(line = %line, "skipping malformed header line"),
            }
        }

        if let Some(body) = &options.body {
            builder = builder.body(body.clone());
        }

        let request = builder.build()?;
        self.next_id += 1;
        let handle = HandleId::from_raw(self.next_id);
        self.prepared.insert(handle, request);
        Ok(handle)
    }

    fn register_and_start(&mut self, handle: HandleId) -> Result<(), TransportError> {
        let request = self.prepared.remove(&handle).ok_or_else(|| {
            TransportError::Engine(format!("handle {} was never created", handle.raw()))
        })?;

        let client = self.client.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let requested_url = request.url().to_string();
            let started = Instant::now();
            let result = match client.execute(request).await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let final_url = response.url().to_string();
                    let content_length = response.content_length();
                    match response.bytes().await {
                        Ok(body) => TransferResult {
                            info: ResponseInfo {
                                url: final_url,
                                status,
                                content_length: content_length.or(Some(body.len() as u64)),
                                elapsed: started.elapsed(),
                                error: None,
                            },
                            body,
                        },
                        Err(e) => TransferResult {
                            body: Bytes::new(),
                            info: ResponseInfo {
                                url: final_url,
                                status,
                                content_length: None,
                                elapsed: started.elapsed(),
                                error: Some(e.to_string()),
                            },
                        },
                    }
                }
                Err(e) => TransferResult {
                    body: Bytes::new(),
                    info: ResponseInfo {
                        url: requested_url,
                        status: 0,
                        content_length: None,
                        elapsed: started.elapsed(),
                        error: Some(e.to_string()),
                    },
                },
            };
            // Receiver dropped means the whole transport is gone; nothing to report to.
            let _ = tx.send((handle, result));
        });

        self.outstanding += 1;
        Ok(())
    }

    fn drive_step(&mut self) -> Result<StepStatus, TransportError> {
        let mut progressed = false;
        loop {
            match self.rx.try_recv() {
                Ok((handle, result)) => {
                    self.finish(handle, result);
                    progressed = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.outstanding > 0 {
                        return Err(TransportError::Engine(
                            "result channel closed with transfers outstanding".into(),
                        ));
                    }
                    break;
                }
            }
        }
        Ok(if progressed {
            StepStatus::Progressed
        } else {
            StepStatus::Idle
        })
    }

    fn poll_completions(&mut self) -> Vec<Completion> {
        std::mem::take(&mut self.completed)
    }

    fn content(&self, handle: HandleId) -> Option<Bytes> {
        self.results.get(&handle).map(|r| r.body.clone())
    }

    fn info(&self, handle: HandleId) -> Option<ResponseInfo> {
        self.results.get(&handle).map(|r| r.info.clone())
    }

    fn release(&mut self, handle: HandleId) {
        self.results.remove(&handle);
    }

    async fn wait_for_activity(&mut self, timeout: Duration) {
        if self.outstanding == 0 {
            return;
        }
        if let Ok(Some((handle, result))) = tokio::time::timeout(timeout, self.rx.recv()).await {
            self.finish(handle, result);
        }
    }
}

impl HttpTransport {
    fn option_str<'a>(&self, options: &'a EffectiveOptions, key: OptionKey) -> Option<&'a str> {
        options.options.get(&key).and_then(OptionValue::as_str)
    }
}

fn parse_header_line(line: &str) -> Option<(HeaderName, HeaderValue)> {
    let (name, value) = line.split_once(':')?;
    let name = HeaderName::from_bytes(name.trim().as_bytes()).ok()?;
    let value = HeaderValue::from_str(value.trim()).ok()?;
    Some((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::RequestOptions;
    use crate::request::Request;

    fn assemble(request: &Request) -> EffectiveOptions {
        EffectiveOptions::assemble(&RequestOptions::new(), 15, request)
    }

    #[test]
    fn test_parse_header_line() {
        let (name, value) = parse_header_line("Accept: application/json").unwrap();
        assert_eq!(name.as_str(), "accept");
        assert_eq!(value.to_str().unwrap(), "application/json");

        assert!(parse_header_line("no colon here").is_none());
    }

    #[tokio::test]
    async fn test_create_handle_rejects_bad_url() {
        let mut transport = HttpTransport::new().unwrap();
        let opts = assemble(&Request::get("not a url"));
        match transport.create_handle(&opts) {
            Err(TransportError::InvalidUrl { url, .. }) => assert_eq!(url, "not a url"),
            other => panic!("expected InvalidUrl, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_handle_is_side_effect_free() {
        let mut transport = HttpTransport::new().unwrap();
        // Nothing listens on this address; creation must still succeed
        // because no I/O happens before register_and_start.
        let opts = assemble(&Request::get("http://127.0.0.1:1/never"));
        let handle = transport.create_handle(&opts).unwrap();
        assert!(transport.prepared.contains_key(&handle));
        assert_eq!(transport.outstanding, 0);
    }

    #[tokio::test]
    async fn test_start_unknown_handle_is_engine_error() {
        let mut transport = HttpTransport::new().unwrap();
        let err = transport
            .register_and_start(HandleId::from_raw(42))
            .unwrap_err();
        assert!(matches!(err, TransportError::Engine(_)));
    }
}
