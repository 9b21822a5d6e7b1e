//! Unit tests for sse-client

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sse_client::{
    async_trait, BackoffPolicy, Error, Event, EventDispatcher, EventHandler, ProxySpec,
    RequestSpec, SseClient, SseFrame, StreamParser, Timeouts, Url, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_READ_TIMEOUT, DEFAULT_WRITE_TIMEOUT,
};

struct NoopHandler;

#[async_trait]
impl EventHandler for NoopHandler {
    async fn on_message(&self, _event: Event) -> anyhow::Result<()> {
        Ok(())
    }
}

// ============== BackoffPolicy Tests ==============

#[test]
fn test_backoff_within_jitter_bounds() {
    let policy = BackoffPolicy::new(Duration::from_millis(30_000));
    for attempt in 0..16 {
        let base = 1_000u64;
        let capped = base.saturating_mul(1 << attempt).min(30_000);
        for _ in 0..50 {
            let delay = policy.delay(attempt, Duration::from_millis(base)).as_millis() as u64;
            assert!(delay >= capped / 2, "attempt {attempt}: {delay} < {}", capped / 2);
            assert!(delay <= capped, "attempt {attempt}: {delay} > {capped}");
        }
    }
}

#[test]
fn test_backoff_respects_maximum() {
    let policy = BackoffPolicy::new(Duration::from_millis(30_000));
    for attempt in 0..=300 {
        let delay = policy.delay(attempt, Duration::from_millis(2_000));
        assert!(delay <= Duration::from_millis(30_000));
    }
}

#[test]
fn test_backoff_huge_attempt_does_not_overflow() {
    // An astronomically large exponent must still clamp to the ceiling
    let policy = BackoffPolicy::new(Duration::from_millis(30_000));
    let delay = policy.delay(300, Duration::from_millis(2_000));
    assert!(delay <= Duration::from_millis(30_000));
    assert!(delay >= Duration::from_millis(15_000));
}

#[test]
fn test_backoff_generally_increases() {
    let policy = BackoffPolicy::new(Duration::from_secs(30));
    let base = Duration::from_secs(1);
    // With jitter in [x/2, x], attempt 4 (16s) always exceeds attempt 0 (1s)
    let d0 = policy.delay(0, base);
    let d4 = policy.delay(4, base);
    assert!(d0 <= Duration::from_secs(1));
    assert!(d4 >= Duration::from_secs(8));
}

// ============== StreamParser Tests ==============

#[test]
fn test_parser_multiline_data_joined() {
    let mut parser = StreamParser::new();
    let frames = parser.feed(b"data: hello\ndata: world\n\n");
    assert_eq!(
        frames,
        vec![SseFrame::Event(Event::message("hello\nworld"))]
    );
}

#[test]
fn test_parser_default_event_type() {
    let mut parser = StreamParser::new();
    let frames = parser.feed(b"data: x\n\n");
    match &frames[0] {
        SseFrame::Event(event) => assert_eq!(event.event_type, "message"),
        other => panic!("expected event, got {other:?}"),
    }
}

#[test]
fn test_parser_custom_event_type() {
    let mut parser = StreamParser::new();
    let frames = parser.feed(b"event: update\ndata: {\"n\":1}\n\n");
    assert_eq!(
        frames,
        vec![SseFrame::Event(Event::new("update", "{\"n\":1}"))]
    );
}

#[test]
fn test_parser_event_type_resets_between_frames() {
    let mut parser = StreamParser::new();
    let frames = parser.feed(b"event: update\ndata: a\n\ndata: b\n\n");
    assert_eq!(
        frames,
        vec![
            SseFrame::Event(Event::new("update", "a")),
            SseFrame::Event(Event::message("b")),
        ]
    );
}

#[test]
fn test_parser_id_persists_across_frames() {
    let mut parser = StreamParser::new();
    let frames = parser.feed(b"id: 5\n\ndata: x\n\n");
    // The id-only frame emits nothing; the retained id stamps later events
    assert_eq!(
        frames,
        vec![SseFrame::Event(Event::message("x").with_id("5"))]
    );
    assert_eq!(parser.last_event_id(), Some("5"));
}

#[test]
fn test_parser_empty_id_resets() {
    let mut parser = StreamParser::new();
    let frames = parser.feed(b"id: 5\ndata: a\n\nid:\ndata: b\n\n");
    assert_eq!(
        frames,
        vec![
            SseFrame::Event(Event::message("a").with_id("5")),
            SseFrame::Event(Event::message("b")),
        ]
    );
    assert_eq!(parser.last_event_id(), None);
}

#[test]
fn test_parser_seeded_id_carries_over() {
    let mut parser = StreamParser::with_last_event_id(Some("abc".to_string()));
    let frames = parser.feed(b"data: x\n\n");
    assert_eq!(
        frames,
        vec![SseFrame::Event(Event::message("x").with_id("abc"))]
    );
}

#[test]
fn test_parser_comment_surfaced_without_event() {
    let mut parser = StreamParser::new();
    let frames = parser.feed(b": keepalive\n\n");
    assert_eq!(frames, vec![SseFrame::Comment("keepalive".to_string())]);
}

#[test]
fn test_parser_retry_frame() {
    let mut parser = StreamParser::new();
    let frames = parser.feed(b"retry: 3000\ndata: x\n\n");
    assert_eq!(
        frames,
        vec![
            SseFrame::Retry(3000),
            SseFrame::Event(Event::message("x").with_retry(3000)),
        ]
    );
}

#[test]
fn test_parser_malformed_retry_ignored() {
    let mut parser = StreamParser::new();
    let frames = parser.feed(b"retry: soon\ndata: x\n\n");
    assert_eq!(frames, vec![SseFrame::Event(Event::message("x"))]);
}

#[test]
fn test_parser_retry_only_frame_emits_no_event() {
    let mut parser = StreamParser::new();
    let frames = parser.feed(b"retry: 250\n\n");
    assert_eq!(frames, vec![SseFrame::Retry(250)]);
}

#[test]
fn test_parser_unknown_field_ignored() {
    let mut parser = StreamParser::new();
    let frames = parser.feed(b"banner: hi\ndata: x\n\n");
    assert_eq!(frames, vec![SseFrame::Event(Event::message("x"))]);
}

#[test]
fn test_parser_field_without_colon_has_empty_value() {
    let mut parser = StreamParser::new();
    let frames = parser.feed(b"data\n\n");
    assert_eq!(frames, vec![SseFrame::Event(Event::message(""))]);
}

#[test]
fn test_parser_event_only_frame_flushes_empty_data() {
    let mut parser = StreamParser::new();
    let frames = parser.feed(b"event: ping\n\n");
    assert_eq!(frames, vec![SseFrame::Event(Event::new("ping", ""))]);
}

#[test]
fn test_parser_blank_frame_emits_nothing() {
    let mut parser = StreamParser::new();
    assert!(parser.feed(b"\n\n\n").is_empty());
}

#[test]
fn test_parser_value_space_stripping() {
    let mut parser = StreamParser::new();
    // At most one leading space is stripped from the value
    let frames = parser.feed(b"data:no-space\ndata:  padded\n\n");
    assert_eq!(
        frames,
        vec![SseFrame::Event(Event::message("no-space\n padded"))]
    );
}

#[test]
fn test_parser_crlf_and_lone_cr_line_endings() {
    let mut parser = StreamParser::new();
    let frames = parser.feed(b"data: a\r\ndata: b\rdata: c\n\r\n");
    assert_eq!(frames, vec![SseFrame::Event(Event::message("a\nb\nc"))]);
}

#[test]
fn test_parser_cr_split_across_chunks() {
    let mut parser = StreamParser::new();
    assert!(parser.feed(b"data: a\r").is_empty());
    // The LF completing the CRLF pair must not count as a blank line
    assert!(parser.feed(b"\ndata: b\n").is_empty());
    let frames = parser.feed(b"\n");
    assert_eq!(frames, vec![SseFrame::Event(Event::message("a\nb"))]);
}

#[test]
fn test_parser_partial_lines_across_chunks() {
    let mut parser = StreamParser::new();
    assert!(parser.feed(b"event: mess").is_empty());
    assert!(parser.feed(b"age\ndata: hi\n").is_empty());
    let frames = parser.feed(b"\n");
    assert_eq!(frames, vec![SseFrame::Event(Event::new("message", "hi"))]);
}

#[test]
fn test_parser_utf8_split_across_chunks() {
    let text = "data: héllo\n\n".as_bytes();
    // Split inside the two-byte 'é' sequence
    let split = text.iter().position(|&b| b == 0xc3).unwrap() + 1;
    let mut parser = StreamParser::new();
    assert!(parser.feed(&text[..split]).is_empty());
    let frames = parser.feed(&text[split..]);
    assert_eq!(frames, vec![SseFrame::Event(Event::message("héllo"))]);
}

#[test]
fn test_parser_partial_frame_discarded_at_end_of_stream() {
    let mut parser = StreamParser::new();
    assert!(parser.feed(b"data: partial").is_empty());
    parser.end_of_stream();
    // A new terminator after the discard must not resurrect the frame
    assert!(parser.feed(b"\n\n").is_empty());
}

#[test]
fn test_parser_id_survives_end_of_stream() {
    let mut parser = StreamParser::new();
    parser.feed(b"id: 7\ndata: x\n\ndata: partial");
    parser.end_of_stream();
    assert_eq!(parser.last_event_id(), Some("7"));
}

// ============== Event Tests ==============

#[test]
fn test_event_constructors() {
    let event = Event::message("hi");
    assert_eq!(event.event_type, "message");
    assert_eq!(event.data, "hi");
    assert!(event.id.is_none());
    assert!(event.retry.is_none());

    let event = Event::new("update", "x").with_id("1").with_retry(500);
    assert_eq!(event.id, Some("1".to_string()));
    assert_eq!(event.retry, Some(500));
}

#[test]
fn test_event_serializes_with_renamed_type() {
    let event = Event::message("hi").with_id("1");
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["event"], "message");
    assert_eq!(json["data"], "hi");
    assert_eq!(json["id"], "1");
    assert!(json.get("retry").is_none());
}

// ============== RequestSpec Tests ==============

#[test]
fn test_request_spec_defaults() {
    let spec = RequestSpec::new(Url::parse("http://example.com/stream").unwrap());
    assert_eq!(spec.method.as_str(), "GET");
    assert!(spec.body.is_none());
    assert_eq!(spec.headers["accept"], "text/event-stream");
    assert_eq!(spec.timeouts, Timeouts::default());
}

#[test]
fn test_request_spec_custom_method_uppercased() {
    let mut spec = RequestSpec::new(Url::parse("http://example.com").unwrap());
    spec.set_method("report").unwrap();
    assert_eq!(spec.method.as_str(), "REPORT");
}

#[test]
fn test_request_spec_build_is_repeatable() {
    let mut spec = RequestSpec::new(Url::parse("http://example.com").unwrap());
    spec.set_method("report").unwrap();
    spec.body = Some(sse_client::RequestBody::new(
        "text/plain; charset=utf-8",
        "hello world",
    ));

    // Deriving the per-attempt spec twice yields independent, equal requests;
    // the body is not exhausted by the first build
    let first = spec.with_last_event_id(Some("42"));
    let second = spec.with_last_event_id(Some("42"));
    assert_eq!(first.method, second.method);
    assert_eq!(first.headers, second.headers);
    assert_eq!(first.body, second.body);
    let body = first.body.unwrap();
    assert_eq!(body.content_type, "text/plain; charset=utf-8");
    assert_eq!(body.content.as_ref(), b"hello world");
}

#[test]
fn test_request_spec_last_event_id_header() {
    let spec = RequestSpec::new(Url::parse("http://example.com").unwrap());

    let without = spec.with_last_event_id(None);
    assert!(without.headers.get("last-event-id").is_none());

    let with = spec.with_last_event_id(Some("abc"));
    assert_eq!(with.headers["last-event-id"], "abc");
    // Replaces, never accumulates
    let replaced = with.with_last_event_id(Some("def"));
    assert_eq!(replaced.headers["last-event-id"], "def");
    assert_eq!(
        replaced
            .headers
            .get_all("last-event-id")
            .iter()
            .count(),
        1
    );
    // The base spec never mutates
    assert!(spec.headers.get("last-event-id").is_none());
}

#[test]
fn test_proxy_host_port_address() {
    let proxy = ProxySpec::HostPort {
        host: "http://proxy.example.com".to_string(),
        port: 8080,
    };
    assert_eq!(
        proxy.address(),
        Some("http://proxy.example.com:8080".to_string())
    );
    assert_eq!(proxy.to_string(), "http://proxy.example.com:8080");
}

#[test]
fn test_proxy_custom_passed_through() {
    let proxy = ProxySpec::Custom(reqwest::Proxy::all("http://proxy.example.com:8080").unwrap());
    assert_eq!(proxy.address(), None);
    assert!(proxy.to_proxy().is_ok());
}

#[test]
fn test_timeout_defaults() {
    let timeouts = Timeouts::default();
    assert_eq!(timeouts.connect, DEFAULT_CONNECT_TIMEOUT);
    assert_eq!(timeouts.read, DEFAULT_READ_TIMEOUT);
    assert_eq!(timeouts.write, DEFAULT_WRITE_TIMEOUT);
}

// ============== Builder Tests ==============

#[test]
fn test_builder_defaults() {
    let client = SseClient::builder("http://example.com/stream", NoopHandler)
        .build()
        .unwrap();
    let spec = client.request_spec();
    assert_eq!(spec.method.as_str(), "GET");
    assert!(spec.body.is_none());
    assert!(spec.proxy.is_none());
    assert_eq!(spec.timeouts, Timeouts::default());
}

#[test]
fn test_builder_custom_request() {
    let client = SseClient::builder("http://example.com/stream", NoopHandler)
        .method("report")
        .body("text/plain; charset=utf-8", "hello world")
        .header("authorization", "Bearer token")
        .proxy("http://proxy.example.com", 8080)
        .connect_timeout(Duration::from_millis(100))
        .read_timeout(Duration::from_millis(1_000))
        .write_timeout(Duration::from_millis(10_000))
        .build()
        .unwrap();
    let spec = client.request_spec();
    assert_eq!(spec.method.as_str(), "REPORT");
    assert_eq!(spec.headers["authorization"], "Bearer token");
    assert_eq!(spec.timeouts.connect, Duration::from_millis(100));
    assert_eq!(spec.timeouts.read, Duration::from_millis(1_000));
    assert_eq!(spec.timeouts.write, Duration::from_millis(10_000));
    assert_eq!(
        spec.proxy.as_ref().and_then(|p| p.address()),
        Some("http://proxy.example.com:8080".to_string())
    );
    assert_eq!(
        spec.body.as_ref().unwrap().content.as_ref(),
        b"hello world"
    );
}

#[test]
fn test_builder_rejects_invalid_url() {
    let result = SseClient::builder("not a url", NoopHandler).build();
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_builder_rejects_invalid_method() {
    let result = SseClient::builder("http://example.com", NoopHandler)
        .method("bad method")
        .build();
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_builder_rejects_zero_timeout() {
    let result = SseClient::builder("http://example.com", NoopHandler)
        .read_timeout(Duration::ZERO)
        .build();
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_builder_rejects_inverted_retry_bounds() {
    let result = SseClient::builder("http://example.com", NoopHandler)
        .min_retry_delay(Duration::from_secs(60))
        .max_retry_delay(Duration::from_secs(30))
        .build();
    assert!(matches!(result, Err(Error::Config(_))));
}

// ============== EventDispatcher Tests ==============

struct FailingHandler {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl EventHandler for FailingHandler {
    async fn on_message(&self, _event: Event) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("application bug")
    }

    async fn on_comment(&self, _comment: String) -> anyhow::Result<()> {
        panic!("application panic")
    }
}

#[tokio::test]
async fn test_dispatcher_absorbs_handler_errors() {
    let calls = Arc::new(AtomicUsize::new(0));
    let dispatcher = EventDispatcher::new(Arc::new(FailingHandler {
        calls: calls.clone(),
    }));

    // Neither an error return nor a panic propagates to the caller
    dispatcher.message(Event::message("a")).await;
    dispatcher.message(Event::message("b")).await;
    dispatcher.comment("keepalive".to_string()).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
