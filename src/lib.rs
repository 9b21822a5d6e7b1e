//! # SSE Client
//!
//! A resilient Server-Sent Events (SSE) client library for Rust.
//!
//! ## Features
//!
//! - **Automatic Reconnection**: Capped exponential backoff with jitter;
//!   resumes streams via the `Last-Event-ID` header
//! - **Incremental Parsing**: A complete event is delivered exactly once;
//!   partial frames at disconnect are never delivered
//! - **Pluggable Transport**: Implement `Transport` to use any HTTP client;
//!   a reqwest-backed default is built in
//! - **Isolated Handlers**: Failing or panicking application callbacks are
//!   logged and absorbed, never corrupting the connection state machine
//! - **Prompt Cancellation**: `close()` interrupts in-flight reads and
//!   backoff waits from any task
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sse_client::{async_trait, Event, EventHandler, SseClient};
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl EventHandler for Printer {
//!     async fn on_message(&self, event: Event) -> anyhow::Result<()> {
//!         println!("{}: {}", event.event_type, event.data);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = SseClient::builder("https://example.com/stream", Printer).build()?;
//!     client.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Custom Request
//!
//! ```rust,ignore
//! let client = SseClient::builder(url, handler)
//!     .method("REPORT")
//!     .body("text/plain; charset=utf-8", "hello world")
//!     .header("Authorization", "Bearer token")
//!     .proxy("proxy.example.com", 8080)
//!     .initial_retry_delay(Duration::from_secs(2))
//!     .retry_policy(|error| !matches!(error, sse_client::Error::HttpStatus(400..=499)))
//!     .build()?;
//! ```

mod backoff;
mod client;
mod error;
mod event;
mod handler;
mod parser;
mod request;
mod transport;

// Re-exports
pub use backoff::{BackoffPolicy, DEFAULT_INITIAL_RETRY, DEFAULT_MAX_RETRY, DEFAULT_MIN_RETRY};
pub use client::{ConnectionState, RetryPolicy, SseClient, SseClientBuilder};
pub use error::{Error, Result};
pub use event::Event;
pub use handler::{EventDispatcher, EventHandler};
pub use parser::{SseFrame, StreamParser};
pub use request::{
    ProxySpec, RequestBody, RequestSpec, Timeouts, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT,
    DEFAULT_WRITE_TIMEOUT, LAST_EVENT_ID_HEADER,
};
pub use transport::{ReqwestTransport, Transport, TransportResponse};

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;
pub use bytes::Bytes;
pub use reqwest::Url;
