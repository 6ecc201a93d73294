//! The windowed batch engine.

use crate::error::Error;
use crate::options::EffectiveOptions;
use crate::request::Request;
use crate::scheduler::config::{ConfigValue, SchedulerConfig};
use crate::scheduler::queue::{InFlightTable, PendingQueue};
use crate::transport::{HttpTransport, ResponseInfo, StepStatus, Transport};
use crate::Result;
use bytes::Bytes;
use std::time::Duration;

/// Outcome of a successful [`FetchQueue::execute`] call.
///
/// A deliberate API asymmetry: when exactly one request was queued the
/// engine doubles as a plain synchronous fetch and hands back the raw body;
/// a multi-request batch only reports that it drained, since its results
/// were delivered through callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum Executed {
    /// Single-request fast path: the fetched response body.
    Body(Bytes),
    /// Windowed batch: every queued request completed and ran its callback.
    Drained,
}

/// Bounded-concurrency HTTP request batcher.
///
/// Callers enqueue any number of requests; `execute()` runs them with at
/// most `window` in flight at once, invoking each request's callback (or the
/// configured default) as its response arrives. Dispatch follows enqueue
/// order; callbacks follow transport completion order.
///
/// The queue, in-flight table and configuration are owned by the single
/// scheduling task, so the engine itself needs no locking; concurrency lives
/// entirely inside the transport adapter.
///
/// ```no_run
/// use fetchq::{ConfigValue, FetchQueue, Request};
///
/// # async fn run() -> fetchq::Result<()> {
/// let mut queue = FetchQueue::new()?;
/// queue.config(vec![
///     ("window".into(), ConfigValue::Int(4)),
///     ("callback".into(), ConfigValue::callback(|body, info| {
///         println!("{} -> {} ({} bytes)", info.url, info.status, body.len());
///     })),
/// ])?;
///
/// for n in 0..20 {
///     queue.get(format!("https://example.com/item/{n}"));
/// }
/// queue.execute().await?;
/// # Ok(())
/// # }
/// ```
pub struct FetchQueue<T: Transport> {
    transport: T,
    queue: PendingQueue,
    in_flight: InFlightTable,
    config: SchedulerConfig,
}

impl FetchQueue<HttpTransport> {
    /// Batcher over the default reqwest-backed transport.
    pub fn new() -> Result<Self> {
        Ok(Self::with_transport(HttpTransport::new()?))
    }
}

impl<T: Transport> FetchQueue<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            queue: PendingQueue::new(),
            in_flight: InFlightTable::new(),
            config: SchedulerConfig::default(),
        }
    }

    /// Update configuration, all-or-nothing.
    ///
    /// Recognized keys: `window`, `timeout`, `options`, `callback`. An
    /// unrecognized key or wrongly shaped value rejects the whole call and
    /// applies none of the entries.
    pub fn config(&mut self, entries: Vec<(String, ConfigValue)>) -> Result<()> {
        self.config.apply(entries)
    }

    /// Append a request to the pending queue. Always succeeds; validation
    /// happens in preflight when `execute()` runs.
    pub fn enqueue(&mut self, request: Request) {
        if request.has_callback() {
            self.config.callback_count += 1;
        }
        self.queue.add(request);
    }

    /// Enqueue a plain GET with no per-request callback.
    pub fn get(&mut self, url: impl Into<String>) {
        self.enqueue(Request::get(url));
    }

    /// Enqueue a POST carrying `body`, with no per-request callback.
    pub fn post(&mut self, url: impl Into<String>, body: impl Into<Bytes>) {
        self.enqueue(Request::post(url).with_body(body));
    }

    /// Requests awaiting dispatch.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Run every queued request to completion.
    ///
    /// Fails fast with [`Error::EmptyQueue`] or [`Error::MissingCallback`]
    /// before any dispatch. A fatal transport error aborts the remaining
    /// batch; callbacks that already fired are not rolled back.
    pub async fn execute(&mut self) -> Result<Executed> {
        self.preflight()?;
        if self.queue.len() == 1 {
            Ok(Executed::Body(self.process_one().await?))
        } else {
            self.process_queue().await?;
            Ok(Executed::Drained)
        }
    }

    /// Validation and window normalization, run before any dispatch.
    ///
    /// Idempotent; its only side effect is clamping the window. Note the
    /// self-healed window is capped at 10 even when more requests are
    /// queued — a historical constant, preserved as-is.
    fn preflight(&mut self) -> Result<()> {
        let queued = self.queue.len();
        let requested = self.config.window;

        if self.config.window < 1 {
            self.config.window = 10;
        }
        if queued > 1 && self.config.window < 2 {
            self.config.window = queued.min(10);
        }
        if queued < self.config.window {
            self.config.window = queued;
        }
        if self.config.window != requested {
            tracing::debug!(
                requested,
                effective = self.config.window,
                queued,
                "normalized window size"
            );
        }

        if queued == 0 {
            return Err(Error::EmptyQueue);
        }
        if self.config.default_callback.is_none() && self.config.callback_count < queued {
            return Err(Error::MissingCallback {
                missing: queued - self.config.callback_count,
                total: queued,
            });
        }
        Ok(())
    }

    /// Single-request fast path: dispatch, wait, run the callback, and hand
    /// the raw body back to the caller.
    async fn process_one(&mut self) -> Result<Bytes> {
        let request = self.take_next().ok_or(Error::EmptyQueue)?;
        self.dispatch(request)?;

        loop {
            while self.transport.drive_step()? == StepStatus::Progressed {}

            if let Some(done) = self.transport.poll_completions().into_iter().next() {
                let request = self
                    .in_flight
                    .take(done.handle)
                    .ok_or(Error::HandleBookkeeping(done.handle))?;
                let output = self
                    .transport
                    .content(done.handle)
                    .ok_or(Error::HandleBookkeeping(done.handle))?;
                let info = self
                    .transport
                    .info(done.handle)
                    .ok_or(Error::HandleBookkeeping(done.handle))?;
                self.run_callback(&request, &output, &info);
                self.transport.release(done.handle);
                return Ok(output);
            }

            self.wait().await;
        }
    }

    /// Windowed control loop: fill the window, then drain completions and
    /// refill one-in-one-out until both the queue and the table are empty.
    async fn process_queue(&mut self) -> Result<()> {
        while self.in_flight.len() < self.config.window {
            match self.take_next() {
                Some(request) => self.dispatch(request)?,
                None => break,
            }
        }

        loop {
            // Busy-poll the transport until no more immediate progress.
            while self.transport.drive_step()? == StepStatus::Progressed {}

            for done in self.transport.poll_completions() {
                let request = self
                    .in_flight
                    .take(done.handle)
                    .ok_or(Error::HandleBookkeeping(done.handle))?;
                let output = self
                    .transport
                    .content(done.handle)
                    .ok_or(Error::HandleBookkeeping(done.handle))?;
                let info = self
                    .transport
                    .info(done.handle)
                    .ok_or(Error::HandleBookkeeping(done.handle))?;

                self.run_callback(&request, &output, &info);

                // Refill the freed slot immediately to keep the window
                // saturated while anything is still pending.
                if let Some(next) = self.take_next() {
                    self.dispatch(next)?;
                }

                self.transport.release(done.handle);
            }

            if self.in_flight.is_empty() {
                break;
            }
            self.wait().await;
        }
        Ok(())
    }

    fn take_next(&mut self) -> Option<Request> {
        let request = self.queue.next()?;
        if request.has_callback() {
            self.config.callback_count = self.config.callback_count.saturating_sub(1);
        }
        Some(request)
    }

    fn dispatch(&mut self, request: Request) -> Result<()> {
        let effective = EffectiveOptions::assemble(
            &self.config.default_options,
            self.config.timeout,
            &request,
        );
        let handle = self.transport.create_handle(&effective)?;
        self.transport.register_and_start(handle)?;
        tracing::debug!(
            id = %request.id(),
            url = %request.url(),
            method = ?request.method(),
            in_flight = self.in_flight.len() + 1,
            "dispatched request"
        );
        self.in_flight.add(handle, request);
        Ok(())
    }

    fn run_callback(&self, request: &Request, output: &Bytes, info: &ResponseInfo) {
        let callback = request
            .callback
            .as_ref()
            .or(self.config.default_callback.as_ref());
        match callback {
            Some(cb) => cb(output, info),
            // Preflight guarantees every request a callback; stay quiet if
            // the configuration was mutated out from under us.
            None => {}
        }
    }

    async fn wait(&mut self) {
        self.transport
            .wait_for_activity(Duration::from_secs(self.config.timeout))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Completion, HandleId, TransportError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Deterministic in-memory transport. Completes `per_step` transfers on
    /// each drive call (0 = all active), optionally newest-first, and can
    /// simulate engine failures and bookkeeping bugs.
    struct MockTransport {
        next_id: u64,
        created: usize,
        prepared: HashMap<HandleId, String>,
        active: Vec<(HandleId, String)>,
        results: HashMap<HandleId, (Bytes, ResponseInfo)>,
        done: Vec<Completion>,
        started_urls: Vec<String>,
        max_active: usize,
        per_step: usize,
        reverse: bool,
        fail_after: Option<usize>,
        completed_total: usize,
        rogue_completion: bool,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                next_id: 0,
                created: 0,
                prepared: HashMap::new(),
                active: Vec::new(),
                results: HashMap::new(),
                done: Vec::new(),
                started_urls: Vec::new(),
                max_active: 0,
                per_step: 0,
                reverse: false,
                fail_after: None,
                completed_total: 0,
                rogue_completion: false,
            }
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        fn create_handle(
            &mut self,
            options: &EffectiveOptions,
        ) -> std::result::Result<HandleId, TransportError> {
            self.created += 1;
            self.next_id += 1;
            let handle = HandleId::from_raw(self.next_id);
            self.prepared.insert(handle, options.url.clone());
            Ok(handle)
        }

        fn register_and_start(
            &mut self,
            handle: HandleId,
        ) -> std::result::Result<(), TransportError> {
            let url = self
                .prepared
                .remove(&handle)
                .expect("handle started before creation");
            self.started_urls.push(url.clone());
            self.active.push((handle, url));
            self.max_active = self.max_active.max(self.active.len());
            Ok(())
        }

        fn drive_step(&mut self) -> std::result::Result<StepStatus, TransportError> {
            if let Some(limit) = self.fail_after {
                if self.completed_total >= limit {
                    return Err(TransportError::Engine("simulated engine failure".into()));
                }
            }
            if self.rogue_completion {
                self.rogue_completion = false;
                self.done.push(Completion {
                    handle: HandleId::from_raw(u64::MAX),
                });
                return Ok(StepStatus::Idle);
            }

            let count = if self.per_step == 0 {
                self.active.len()
            } else {
                self.per_step.min(self.active.len())
            };
            for _ in 0..count {
                let (handle, url) = if self.reverse {
                    self.active.pop().unwrap()
                } else {
                    self.active.remove(0)
                };
                let body = Bytes::from(format!("ok:{url}"));
                let info = ResponseInfo {
                    url,
                    status: 200,
                    content_length: Some(body.len() as u64),
                    elapsed: Duration::ZERO,
                    error: None,
                };
                self.results.insert(handle, (body, info));
                self.done.push(Completion { handle });
                self.completed_total += 1;
            }
            Ok(StepStatus::Idle)
        }

        fn poll_completions(&mut self) -> Vec<Completion> {
            std::mem::take(&mut self.done)
        }

        fn content(&self, handle: HandleId) -> Option<Bytes> {
            self.results.get(&handle).map(|(body, _)| body.clone())
        }

        fn info(&self, handle: HandleId) -> Option<ResponseInfo> {
            self.results.get(&handle).map(|(_, info)| info.clone())
        }

        fn release(&mut self, handle: HandleId) {
            self.results.remove(&handle);
        }

        async fn wait_for_activity(&mut self, _timeout: Duration) {}
    }

    fn mock_queue() -> FetchQueue<MockTransport> {
        FetchQueue::with_transport(MockTransport::new())
    }

    fn counting_callback(counter: &Arc<AtomicUsize>) -> crate::request::Callback {
        let counter = Arc::clone(counter);
        Arc::new(move |_: &Bytes, _: &ResponseInfo| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_empty_queue_rejected() {
        let mut queue = mock_queue();
        assert!(matches!(queue.execute().await, Err(Error::EmptyQueue)));
    }

    #[tokio::test]
    async fn test_second_execute_after_drain_is_empty_queue() {
        let mut queue = mock_queue();
        queue
            .config(vec![("callback".into(), ConfigValue::callback(|_, _| {}))])
            .unwrap();
        queue.get("http://test/a");
        queue.get("http://test/b");

        assert_eq!(queue.execute().await.unwrap(), Executed::Drained);
        assert!(matches!(queue.execute().await, Err(Error::EmptyQueue)));
    }

    #[tokio::test]
    async fn test_missing_callback_rejected_before_any_dispatch() {
        let mut queue = mock_queue();
        queue.enqueue(Request::get("http://test/1").with_callback(|_, _| {}));
        queue.enqueue(Request::get("http://test/2").with_callback(|_, _| {}));
        queue.get("http://test/3");

        match queue.execute().await {
            Err(Error::MissingCallback { missing, total }) => {
                assert_eq!(missing, 1);
                assert_eq!(total, 3);
            }
            other => panic!("expected MissingCallback, got {other:?}"),
        }
        // Fails fast: no transport handle was ever created.
        assert_eq!(queue.transport.created, 0);
    }

    #[tokio::test]
    async fn test_callback_count_survives_previous_drain() {
        let mut queue = mock_queue();
        queue.enqueue(Request::get("http://test/1").with_callback(|_, _| {}));
        queue.enqueue(Request::get("http://test/2").with_callback(|_, _| {}));
        assert_eq!(queue.execute().await.unwrap(), Executed::Drained);

        // A fresh callback-less request must not ride on the earlier count.
        queue.get("http://test/3");
        assert!(matches!(
            queue.execute().await,
            Err(Error::MissingCallback { .. })
        ));
    }

    #[tokio::test]
    async fn test_single_request_fast_path_returns_body() {
        let mut queue = mock_queue();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        queue.enqueue(
            Request::get("http://test/solo").with_callback(move |body, info| {
                assert_eq!(&body[..], b"ok:http://test/solo");
                assert_eq!(info.status, 200);
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let outcome = queue.execute().await.unwrap();
        assert_eq!(outcome, Executed::Body(Bytes::from("ok:http://test/solo")));
        // Callback ran before execute() returned.
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fast_path_uses_default_callback() {
        let mut queue = mock_queue();
        let fired = Arc::new(AtomicUsize::new(0));
        queue
            .config(vec![(
                "callback".into(),
                ConfigValue::Callback(counting_callback(&fired)),
            )])
            .unwrap();
        queue.get("http://test/solo");

        assert!(matches!(queue.execute().await.unwrap(), Executed::Body(_)));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_window_bound_and_conservation() {
        let mut queue = mock_queue();
        queue.transport.per_step = 1;
        let fired = Arc::new(AtomicUsize::new(0));
        queue
            .config(vec![
                ("window".into(), ConfigValue::Int(3)),
                (
                    "callback".into(),
                    ConfigValue::Callback(counting_callback(&fired)),
                ),
            ])
            .unwrap();

        for n in 0..7 {
            queue.get(format!("http://test/{n}"));
        }
        assert_eq!(queue.execute().await.unwrap(), Executed::Drained);

        // Never more than the window in flight, every request exactly one
        // callback, and nothing left behind.
        assert_eq!(queue.transport.max_active, 3);
        assert_eq!(fired.load(Ordering::SeqCst), 7);
        assert_eq!(queue.pending(), 0);
        assert!(queue.in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_admission_is_fifo() {
        let mut queue = mock_queue();
        queue.transport.per_step = 1;
        queue
            .config(vec![
                ("window".into(), ConfigValue::Int(2)),
                ("callback".into(), ConfigValue::callback(|_, _| {})),
            ])
            .unwrap();

        let urls: Vec<String> = (0..5).map(|n| format!("http://test/{n}")).collect();
        for url in &urls {
            queue.get(url.clone());
        }
        queue.execute().await.unwrap();

        assert_eq!(queue.transport.started_urls, urls);
    }

    #[tokio::test]
    async fn test_callbacks_follow_completion_order() {
        let mut queue = mock_queue();
        queue.transport.reverse = true;
        let order = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&order);
        queue
            .config(vec![(
                "callback".into(),
                ConfigValue::callback(move |_, info| {
                    seen.lock().unwrap().push(info.url.clone());
                }),
            )])
            .unwrap();

        queue.get("http://test/a");
        queue.get("http://test/b");
        queue.get("http://test/c");
        queue.execute().await.unwrap();

        // Admission was FIFO but the transport finished newest-first; the
        // engine imposes no ordering on completions.
        assert_eq!(
            *order.lock().unwrap(),
            vec![
                "http://test/c".to_string(),
                "http://test/b".to_string(),
                "http://test/a".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_own_callback_wins_over_default() {
        let mut queue = mock_queue();
        let own = Arc::new(AtomicUsize::new(0));
        let default = Arc::new(AtomicUsize::new(0));
        queue
            .config(vec![(
                "callback".into(),
                ConfigValue::Callback(counting_callback(&default)),
            )])
            .unwrap();

        let own_counter = Arc::clone(&own);
        queue.enqueue(Request::get("http://test/own").with_callback(move |_, _| {
            own_counter.fetch_add(1, Ordering::SeqCst);
        }));
        queue.get("http://test/plain");
        queue.execute().await.unwrap();

        assert_eq!(own.load(Ordering::SeqCst), 1);
        assert_eq!(default.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fatal_transport_error_aborts_after_partial_progress() {
        let mut queue = mock_queue();
        queue.transport.per_step = 1;
        queue.transport.fail_after = Some(2);
        let fired = Arc::new(AtomicUsize::new(0));
        queue
            .config(vec![
                ("window".into(), ConfigValue::Int(2)),
                (
                    "callback".into(),
                    ConfigValue::Callback(counting_callback(&fired)),
                ),
            ])
            .unwrap();

        for n in 0..4 {
            queue.get(format!("http://test/{n}"));
        }

        assert!(matches!(
            queue.execute().await,
            Err(Error::Transport(TransportError::Engine(_)))
        ));
        // Earlier completions already ran their callbacks; the rest never do.
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_completed_handle_is_bookkeeping_error() {
        let mut queue = mock_queue();
        queue.transport.rogue_completion = true;
        queue
            .config(vec![("callback".into(), ConfigValue::callback(|_, _| {}))])
            .unwrap();
        queue.get("http://test/a");
        queue.get("http://test/b");

        assert!(matches!(
            queue.execute().await,
            Err(Error::HandleBookkeeping(_))
        ));
    }

    #[tokio::test]
    async fn test_preflight_heals_zero_window() {
        let mut queue = mock_queue();
        queue
            .config(vec![
                ("window".into(), ConfigValue::Int(0)),
                ("callback".into(), ConfigValue::callback(|_, _| {})),
            ])
            .unwrap();
        for n in 0..5 {
            queue.get(format!("http://test/{n}"));
        }

        queue.preflight().unwrap();
        // 0 -> 10 by rule one, then clamped to the queue size.
        assert_eq!(queue.config.window, 5);
    }

    #[tokio::test]
    async fn test_preflight_self_heal_caps_at_ten() {
        let mut queue = mock_queue();
        queue
            .config(vec![
                ("window".into(), ConfigValue::Int(1)),
                ("callback".into(), ConfigValue::callback(|_, _| {})),
            ])
            .unwrap();
        for n in 0..25 {
            queue.get(format!("http://test/{n}"));
        }

        queue.preflight().unwrap();
        // Documented quirk: a window of 1 with a multi-request queue heals
        // to min(queued, 10), never beyond 10, even with 25 queued.
        assert_eq!(queue.config.window, 10);
    }

    #[tokio::test]
    async fn test_preflight_leaves_valid_window_alone() {
        let mut queue = mock_queue();
        queue
            .config(vec![
                ("window".into(), ConfigValue::Int(3)),
                ("callback".into(), ConfigValue::callback(|_, _| {})),
            ])
            .unwrap();
        for n in 0..5 {
            queue.get(format!("http://test/{n}"));
        }

        queue.preflight().unwrap();
        assert_eq!(queue.config.window, 3);
    }

    #[tokio::test]
    async fn test_preflight_clamps_window_to_queue_size() {
        let mut queue = mock_queue();
        queue
            .config(vec![
                ("window".into(), ConfigValue::Int(50)),
                ("callback".into(), ConfigValue::callback(|_, _| {})),
            ])
            .unwrap();
        for n in 0..4 {
            queue.get(format!("http://test/{n}"));
        }

        queue.preflight().unwrap();
        assert_eq!(queue.config.window, 4);
    }

    #[tokio::test]
    async fn test_post_convenience_sends_body() {
        let mut queue = mock_queue();
        let fired = Arc::new(AtomicUsize::new(0));
        queue
            .config(vec![(
                "callback".into(),
                ConfigValue::Callback(counting_callback(&fired)),
            )])
            .unwrap();
        queue.post("http://test/submit", "name=fetchq");

        assert!(matches!(queue.execute().await.unwrap(), Executed::Body(_)));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
