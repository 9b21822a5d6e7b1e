//! Application handler interface and event dispatch
//!
//! Implement `EventHandler` to receive parsed events and lifecycle
//! notifications. Delivery is synchronous with the read loop: a slow handler
//! delays further reads, which is the intended flow control.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::warn;

use crate::error::Error;
use crate::event::Event;

/// Callbacks invoked by the client as the stream progresses
///
/// All callbacks except `on_message` have no-op defaults. Returning an error
/// from any callback is logged and absorbed; it never aborts the connection.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// The connection reached the open state
    async fn on_open(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// A complete event frame was parsed
    async fn on_message(&self, event: Event) -> anyhow::Result<()>;

    /// A comment line was received (often used as keepalive)
    async fn on_comment(&self, comment: String) -> anyhow::Result<()> {
        let _ = comment;
        Ok(())
    }

    /// A transport or protocol error occurred
    async fn on_error(&self, error: &Error) -> anyhow::Result<()> {
        let _ = error;
        Ok(())
    }

    /// The connection closed (it may be reopened by the reconnect loop)
    async fn on_closed(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Wraps handler invocation so that a failing or panicking callback cannot
/// propagate into the connection state machine or the parser
#[derive(Clone)]
pub struct EventDispatcher {
    handler: Arc<dyn EventHandler>,
}

impl EventDispatcher {
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self { handler }
    }

    pub async fn open(&self) {
        guard("on_open", self.handler.on_open()).await;
    }

    pub async fn message(&self, event: Event) {
        guard("on_message", self.handler.on_message(event)).await;
    }

    pub async fn comment(&self, comment: String) {
        guard("on_comment", self.handler.on_comment(comment)).await;
    }

    pub async fn error(&self, error: &Error) {
        guard("on_error", self.handler.on_error(error)).await;
    }

    pub async fn closed(&self) {
        guard("on_closed", self.handler.on_closed()).await;
    }
}

async fn guard<F>(callback: &str, fut: F)
where
    F: Future<Output = anyhow::Result<()>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(callback, error = %e, "handler callback failed"),
        Err(_) => warn!(callback, "handler callback panicked"),
    }
}
