//! SSE client: connection lifecycle and reconnect loop
//!
//! `SseClient` owns the full lifecycle of one logical stream:
//! - connecting with the configured request spec
//! - feeding the response stream through the parser and dispatching events
//! - reconnecting with capped exponential backoff and jitter, carrying the
//!   last seen event ID into the next attempt
//! - prompt, idempotent shutdown from any calling context

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::{BackoffPolicy, DEFAULT_INITIAL_RETRY, DEFAULT_MAX_RETRY, DEFAULT_MIN_RETRY};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::handler::{EventDispatcher, EventHandler};
use crate::parser::{SseFrame, StreamParser};
use crate::request::{ProxySpec, RequestBody, RequestSpec, Timeouts};
use crate::transport::{ReqwestTransport, Transport};

/// Lifecycle states of a client
///
/// `Shutdown` is terminal; no transition ever leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Built but not started
    Raw,
    /// A connection attempt is in flight
    Connecting,
    /// The stream is open and being read
    Open,
    /// The stream ended; a reconnect may follow
    Closed,
    /// Shut down by request; no further reconnects
    Shutdown,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Raw => "raw",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
            ConnectionState::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Decides whether a protocol error (non-2xx status, wrong content type)
/// should trigger a reconnect. Transport errors never consult the policy;
/// they are always retryable.
pub type RetryPolicy = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

struct ClientConfig {
    request: RequestSpec,
    initial_retry_delay: Duration,
    min_retry_delay: Duration,
    max_retry_delay: Duration,
    validate_content_type: bool,
    retry_policy: RetryPolicy,
}

/// State shared between the public surface and the connection task
struct Shared {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    dispatcher: EventDispatcher,
    state: Mutex<ConnectionState>,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    last_event_id: Mutex<Option<String>>,
}

/// Control-flow outcome of one connection epoch. All handler notifications
/// and state transitions for the epoch have already been dispatched.
enum Epoch {
    /// Shutdown was requested
    Cancelled,
    /// The epoch ended; schedule a reconnect
    Retry,
    /// The epoch ended with a non-retryable error
    Fatal,
}

/// A Server-Sent Events client with automatic reconnection
///
/// Created via [`SseClient::builder`]. `start` spawns a background task that
/// drives connect → read → parse → dispatch and keeps reconnecting until
/// `close` is called or the configured retry policy gives up.
pub struct SseClient {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SseClient {
    /// Create a builder targeting `url`, delivering to `handler`
    pub fn builder(url: impl Into<String>, handler: impl EventHandler) -> SseClientBuilder {
        SseClientBuilder::new(url, handler)
    }

    /// Start the connection loop
    ///
    /// Transitions `Raw -> Connecting` and spawns the background task.
    /// Calling `start` on an already started or shut down client is a
    /// logged no-op.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock().await;
            match *state {
                ConnectionState::Raw => {
                    info!("connection state: {} -> {}", *state, ConnectionState::Connecting);
                    *state = ConnectionState::Connecting;
                    let _ = self.shared.state_tx.send(ConnectionState::Connecting);
                }
                other => {
                    debug!(state = %other, "start ignored, client not in raw state");
                    return Ok(());
                }
            }
        }

        let shared = self.shared.clone();
        let handle = tokio::spawn(async move { shared.run().await });
        *self.task.lock().await = Some(handle);
        Ok(())
    }

    /// Shut down the client
    ///
    /// Cancels any in-flight connection attempt, read, or backoff wait, and
    /// prevents all further reconnect scheduling. Idempotent; safe to call
    /// from any state and any task.
    pub async fn close(&self) {
        if self.shared.cancel.is_cancelled() {
            debug!("close ignored, already shut down");
            return;
        }
        self.shared.cancel.cancel();
        {
            let mut state = self.shared.state.lock().await;
            if *state != ConnectionState::Shutdown {
                info!("connection state: {} -> {}", *state, ConnectionState::Shutdown);
                *state = ConnectionState::Shutdown;
                let _ = self.shared.state_tx.send(ConnectionState::Shutdown);
            }
        }
        // The worker observes the cancelled token at its next suspension
        // point and winds down on its own; close() must not block on it,
        // since it may be called from inside a handler callback.
        let _ = self.task.lock().await.take();
    }

    /// Current connection state
    pub async fn state(&self) -> ConnectionState {
        *self.shared.state.lock().await
    }

    /// Subscribe to connection state changes
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// The last event ID seen on the stream, if any
    pub async fn last_event_id(&self) -> Option<String> {
        self.shared.last_event_id.lock().await.clone()
    }

    /// The base request spec each connection attempt is derived from
    pub fn request_spec(&self) -> &RequestSpec {
        &self.shared.config.request
    }
}

impl Shared {
    /// Update the connection state and notify watchers. `Shutdown` is
    /// terminal and never overwritten.
    async fn set_state(&self, new_state: ConnectionState) {
        let mut state = self.state.lock().await;
        if *state == new_state || *state == ConnectionState::Shutdown {
            return;
        }
        info!("connection state: {} -> {}", *state, new_state);
        *state = new_state;
        let _ = self.state_tx.send(new_state);
    }

    /// The reconnect loop. Explicit iteration with a cancellation check at
    /// every boundary: before each attempt, before each backoff wait, and
    /// inside every stream read.
    async fn run(&self) {
        let backoff = BackoffPolicy::new(self.config.max_retry_delay);
        let mut attempt: u32 = 0;
        let mut reconnection_time = self.config.initial_retry_delay;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.set_state(ConnectionState::Connecting).await;

            match self
                .connect_and_read(&mut reconnection_time, &mut attempt)
                .await
            {
                Epoch::Cancelled | Epoch::Fatal => break,
                Epoch::Retry => {}
            }

            if self.cancel.is_cancelled() {
                break;
            }
            let delay = backoff.delay(attempt.saturating_sub(1), reconnection_time);
            debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "scheduling reconnect"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        if self.cancel.is_cancelled() {
            self.set_state(ConnectionState::Shutdown).await;
        }
        debug!("connection loop exited");
    }

    /// Run one connection epoch: issue the request, read the stream to its
    /// end, dispatch everything it yields.
    async fn connect_and_read(
        &self,
        reconnection_time: &mut Duration,
        attempt: &mut u32,
    ) -> Epoch {
        let last_id = self.last_event_id.lock().await.clone();
        let spec = self.config.request.with_last_event_id(last_id.as_deref());
        debug!(url = %spec.url, method = %spec.method, "issuing connection attempt");

        let result = tokio::select! {
            _ = self.cancel.cancelled() => return Epoch::Cancelled,
            r = self.transport.connect(&spec) => r,
        };
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                *attempt = attempt.saturating_add(1);
                return self.fail(Error::Transport(e), false).await;
            }
        };

        if !(200..300).contains(&response.status) {
            *attempt = attempt.saturating_add(1);
            return self.fail(Error::HttpStatus(response.status), false).await;
        }
        if self.config.validate_content_type && !is_event_stream(response.content_type.as_deref())
        {
            *attempt = attempt.saturating_add(1);
            let content_type = response.content_type.unwrap_or_default();
            return self.fail(Error::ContentType(content_type), false).await;
        }

        *attempt = 0;
        self.set_state(ConnectionState::Open).await;
        self.dispatcher.open().await;
        info!(transport = self.transport.name(), "stream open");

        let mut parser = StreamParser::with_last_event_id(last_id);
        let mut stream = response.stream;
        loop {
            let chunk = tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.dispatcher.closed().await;
                    return Epoch::Cancelled;
                }
                chunk = stream.next() => chunk,
            };
            let bytes = match chunk {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    parser.end_of_stream();
                    *attempt = attempt.saturating_add(1);
                    return self.fail(Error::Transport(e), true).await;
                }
                None => {
                    parser.end_of_stream();
                    *attempt = attempt.saturating_add(1);
                    return self.fail(Error::StreamClosed, true).await;
                }
            };

            for frame in parser.feed(&bytes) {
                match frame {
                    SseFrame::Event(event) => self.deliver(event).await,
                    SseFrame::Comment(comment) => self.dispatcher.comment(comment).await,
                    SseFrame::Retry(ms) => {
                        let updated = Duration::from_millis(ms)
                            .clamp(self.config.min_retry_delay, self.config.max_retry_delay);
                        debug!(retry_ms = ms, "server supplied reconnection time");
                        *reconnection_time = updated;
                    }
                }
            }
            // The retained ID only becomes visible to the next attempt;
            // the in-flight request spec is already built.
            *self.last_event_id.lock().await = parser.last_event_id().map(str::to_owned);
        }
    }

    async fn deliver(&self, event: Event) {
        debug!(event_type = %event.event_type, id = ?event.id, "event received");
        self.dispatcher.message(event).await;
    }

    /// Notify the handler about an epoch-ending error and decide whether to
    /// reconnect
    async fn fail(&self, error: Error, was_open: bool) -> Epoch {
        let retryable = if error.is_protocol_error() {
            (self.config.retry_policy)(&error)
        } else {
            true
        };
        warn!(error = %error, retryable, "connection ended");
        self.dispatcher.error(&error).await;
        if was_open {
            self.dispatcher.closed().await;
        }
        self.set_state(ConnectionState::Closed).await;
        if retryable {
            Epoch::Retry
        } else {
            Epoch::Fatal
        }
    }
}

fn is_event_stream(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().eq_ignore_ascii_case("text/event-stream"))
        .unwrap_or(false)
}

/// Builder for [`SseClient`]
///
/// All configuration errors surface at `build()`, before any connection
/// attempt is made.
pub struct SseClientBuilder {
    url: String,
    handler: Arc<dyn EventHandler>,
    method: Option<String>,
    body: Option<RequestBody>,
    headers: Vec<(String, String)>,
    proxy: Option<ProxySpec>,
    timeouts: Timeouts,
    initial_retry_delay: Duration,
    min_retry_delay: Duration,
    max_retry_delay: Duration,
    validate_content_type: bool,
    retry_policy: RetryPolicy,
    transport: Option<Arc<dyn Transport>>,
}

impl SseClientBuilder {
    pub fn new(url: impl Into<String>, handler: impl EventHandler) -> Self {
        Self {
            url: url.into(),
            handler: Arc::new(handler),
            method: None,
            body: None,
            headers: Vec::new(),
            proxy: None,
            timeouts: Timeouts::default(),
            initial_retry_delay: DEFAULT_INITIAL_RETRY,
            min_retry_delay: DEFAULT_MIN_RETRY,
            max_retry_delay: DEFAULT_MAX_RETRY,
            validate_content_type: false,
            retry_policy: Arc::new(|_| true),
            transport: None,
        }
    }

    /// Use a custom HTTP method (uppercased per HTTP convention)
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Attach a request body with its content type
    pub fn body(mut self, content_type: impl Into<String>, content: impl Into<bytes::Bytes>) -> Self {
        self.body = Some(RequestBody::new(content_type, content));
        self
    }

    /// Add a request header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Route connections through a proxy given as host and port
    pub fn proxy(mut self, host: impl Into<String>, port: u16) -> Self {
        self.proxy = Some(ProxySpec::HostPort {
            host: host.into(),
            port,
        });
        self
    }

    /// Route connections through a fully custom proxy, passed through to
    /// the transport unchanged
    pub fn proxy_custom(mut self, proxy: reqwest::Proxy) -> Self {
        self.proxy = Some(ProxySpec::Custom(proxy));
        self
    }

    /// Override the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect = timeout;
        self
    }

    /// Override the read timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.read = timeout;
        self
    }

    /// Override the write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.write = timeout;
        self
    }

    /// Base reconnection interval before the server supplies one
    pub fn initial_retry_delay(mut self, delay: Duration) -> Self {
        self.initial_retry_delay = delay;
        self
    }

    /// Floor applied to server-supplied `retry:` values
    pub fn min_retry_delay(mut self, delay: Duration) -> Self {
        self.min_retry_delay = delay;
        self
    }

    /// Backoff ceiling; no computed delay ever exceeds it
    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay = delay;
        self
    }

    /// Reject responses whose content type is not `text/event-stream`
    pub fn validate_content_type(mut self, validate: bool) -> Self {
        self.validate_content_type = validate;
        self
    }

    /// Decide whether protocol errors trigger a reconnect
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// // Treat client errors as fatal, retry everything else
    /// builder.retry_policy(|error| !matches!(error, Error::HttpStatus(400..=499)))
    /// ```
    pub fn retry_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.retry_policy = Arc::new(policy);
        self
    }

    /// Replace the default reqwest-backed transport
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Validate the configuration and build the client
    pub fn build(self) -> Result<SseClient> {
        let url = reqwest::Url::parse(&self.url)
            .map_err(|e| Error::Config(format!("invalid URL {:?}: {e}", self.url)))?;
        if self.timeouts.connect.is_zero()
            || self.timeouts.read.is_zero()
            || self.timeouts.write.is_zero()
        {
            return Err(Error::Config("timeouts must be greater than zero".into()));
        }
        if self.initial_retry_delay.is_zero() {
            return Err(Error::Config(
                "initial retry delay must be greater than zero".into(),
            ));
        }
        if self.min_retry_delay > self.max_retry_delay {
            return Err(Error::Config(
                "min retry delay exceeds max retry delay".into(),
            ));
        }

        let mut request = RequestSpec::new(url);
        request.timeouts = self.timeouts;
        request.proxy = self.proxy;
        request.body = self.body;
        if let Some(method) = &self.method {
            request.set_method(method)?;
        }
        for (name, value) in &self.headers {
            request.set_header(name, value)?;
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(
                &request.timeouts,
                request.proxy.as_ref(),
            )?),
        };

        let initial_retry_delay = self
            .initial_retry_delay
            .clamp(self.min_retry_delay, self.max_retry_delay);
        let (state_tx, _) = watch::channel(ConnectionState::Raw);

        Ok(SseClient {
            shared: Arc::new(Shared {
                config: ClientConfig {
                    request,
                    initial_retry_delay,
                    min_retry_delay: self.min_retry_delay,
                    max_retry_delay: self.max_retry_delay,
                    validate_content_type: self.validate_content_type,
                    retry_policy: self.retry_policy,
                },
                transport,
                dispatcher: EventDispatcher::new(self.handler),
                state: Mutex::new(ConnectionState::Raw),
                state_tx,
                cancel: CancellationToken::new(),
                last_event_id: Mutex::new(None),
            }),
            task: Mutex::new(None),
        })
    }
}
