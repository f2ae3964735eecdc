//! End-to-end tests: a real agent connected to a real control server.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

use chat_relay::network::EVENT_STREAM_CONTENT_TYPE;
use chat_relay::operations::chat::APPLY_CHAT;
use chat_relay::protocol::DECODE_ERROR_KIND;
use chat_relay::{
    Agent, ConnectionState, ControlServer, Error, Fetch, FetchRequest, FetchResponse, MemoryPage,
    OperationRecord, OperationTable, Result, SseDecoder,
};

// ============================================================================
// Helpers
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fetch replaying a fixed event stream in the given chunks.
struct ScriptedStream {
    chunks: Vec<&'static str>,
}

#[async_trait]
impl Fetch for ScriptedStream {
    async fn fetch(&self, _request: FetchRequest) -> Result<FetchResponse> {
        let items: Vec<Result<Vec<u8>>> =
            self.chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        Ok(FetchResponse::new(
            200,
            vec![("content-type".into(), EVENT_STREAM_CONTENT_TYPE.into())],
            Some(stream::iter(items).boxed()),
        ))
    }
}

/// Fetch answering every request with a two-event stream naming its url.
struct UrlEcho;

#[async_trait]
impl Fetch for UrlEcho {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        let start = format!(
            "event: message_start\ndata: {}\n\n",
            json!({ "type": "message_start", "src": request.url })
        );
        let stop = "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n".to_string();
        let items: Vec<Result<Vec<u8>>> = vec![Ok(start.into_bytes()), Ok(stop.into_bytes())];
        Ok(FetchResponse::new(
            200,
            vec![("content-type".into(), EVENT_STREAM_CONTENT_TYPE.into())],
            Some(stream::iter(items).boxed()),
        ))
    }
}

/// Builds an agent whose `apply_chat` reads a response through the
/// installed fetch, the way the page would after a submit.
fn streaming_agent(url: String, chunks: Vec<&'static str>) -> Agent {
    relaying_agent(url, Arc::new(ScriptedStream { chunks }))
}

fn relaying_agent(url: String, network: Arc<dyn Fetch>) -> Agent {
    let installed: Arc<OnceLock<Arc<dyn Fetch>>> = Arc::new(OnceLock::new());

    let mut table = OperationTable::new();
    {
        let installed = Arc::clone(&installed);
        table.register_fn(APPLY_CHAT, move |_| {
            let fetch = installed.get().cloned();
            async move {
                let fetch = fetch.ok_or_else(|| Error::capability(APPLY_CHAT, "no fetch"))?;
                let response = fetch
                    .fetch(FetchRequest::post("https://chat.invalid/completion", b"{}".to_vec()))
                    .await?;
                if let Some(mut body) = response.body {
                    while let Some(chunk) = body.next().await {
                        chunk?;
                    }
                }
                Ok(())
            }
        });
    }

    let agent = Agent::builder()
        .server_url(url)
        .page(Arc::new(MemoryPage::new()))
        .operations(table)
        .build()
        .expect("build agent");

    let tee = agent.install_fetch(network);
    let _ = installed.set(tee);
    agent
}

// ============================================================================
// Connection
// ============================================================================

#[tokio::test]
async fn test_agent_connects_and_sends_ping() {
    init_tracing();
    let server = ControlServer::bind_localhost(0).await.expect("bind");
    let agent = Agent::builder()
        .server_url(server.ws_url())
        .build()
        .expect("build");

    assert!(agent.start());
    assert!(!agent.start());

    // accept() fails unless the first frame is the ping.
    let _session = server.accept().await.expect("accept");
    assert_eq!(agent.connection_state(), ConnectionState::Open);
    assert_eq!(agent.connection_attempts(), 1);

    agent.shutdown();
}

#[tokio::test]
async fn test_reconnects_once_after_delay() {
    init_tracing();
    let delay = Duration::from_millis(300);
    let server = ControlServer::bind_localhost(0).await.expect("bind");
    let agent = Agent::builder()
        .server_url(server.ws_url())
        .reconnect_delay(delay)
        .build()
        .expect("build");
    agent.start();

    let session = server.accept().await.expect("first accept");
    let first_id = agent.connection_id().expect("connected");

    let dropped_at = Instant::now();
    session.close().await.expect("close");

    let _session = server
        .accept_timeout(Duration::from_secs(5))
        .await
        .expect("second accept");
    let waited = dropped_at.elapsed();

    assert!(waited >= delay, "reconnected after {waited:?}, before {delay:?}");
    assert_eq!(agent.connection_attempts(), 2);
    assert_ne!(agent.connection_id(), Some(first_id));

    agent.shutdown();
}

// ============================================================================
// Execution
// ============================================================================

#[tokio::test]
async fn test_operations_run_in_arrival_order() {
    init_tracing();
    let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));

    let mut table = OperationTable::new();
    {
        let seen = Arc::clone(&seen);
        table.register_fn("record", move |args| {
            let seen = Arc::clone(&seen);
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                seen.lock().push(args.first().cloned().unwrap_or(Value::Null));
                Ok(())
            }
        });
    }

    let server = ControlServer::bind_localhost(0).await.expect("bind");
    let agent = Agent::builder()
        .server_url(server.ws_url())
        .operations(table)
        .build()
        .expect("build");
    agent.start();

    let mut session = server.accept().await.expect("accept");
    for i in 0..10 {
        session
            .send_operation(&OperationRecord::new("record", vec![json!(i)]))
            .await
            .expect("send");
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while seen.lock().len() < 10 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(*seen.lock(), (0..10).map(|i| json!(i)).collect::<Vec<_>>());
    agent.shutdown();
}

#[tokio::test]
async fn test_decode_fault_clears_queue_and_reports_once() {
    init_tracing();
    let noop_calls = Arc::new(AtomicUsize::new(0));

    let mut table = OperationTable::new();
    table.register_fn("block", |_| async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(())
    });
    {
        let noop_calls = Arc::clone(&noop_calls);
        table.register_fn("noop", move |_| {
            noop_calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });
    }

    let server = ControlServer::bind_localhost(0).await.expect("bind");
    let agent = Agent::builder()
        .server_url(server.ws_url())
        .operations(table)
        .build()
        .expect("build");
    agent.start();

    let mut session = server.accept().await.expect("accept");
    session.send_operation(&OperationRecord::bare("block")).await.expect("send");
    session.send_operation(&OperationRecord::bare("noop")).await.expect("send");
    session.send_operation(&OperationRecord::bare("noop")).await.expect("send");
    session.send_raw("{ not json").await.expect("send");

    let frame = session.next_frame().await.expect("error frame");
    let events = SseDecoder::new().push(&frame);
    assert_eq!(events.len(), 1);
    assert!(events[0].is_error());
    match events[0].to_remote_error() {
        Error::Remote { kind, .. } => assert_eq!(kind, DECODE_ERROR_KIND),
        other => panic!("unexpected error: {other}"),
    }
    assert!(agent.queue().is_empty());

    // The blocked head settles after the clear; nothing behind it runs.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(noop_calls.load(Ordering::SeqCst), 0);
    assert!(
        session
            .next_frame_timeout(Duration::from_millis(100))
            .await
            .expect("read")
            .is_none()
    );

    // The loop keeps serving operations after the fault.
    session.send_operation(&OperationRecord::bare("noop")).await.expect("send");
    let deadline = Instant::now() + Duration::from_secs(5);
    while noop_calls.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(noop_calls.load(Ordering::SeqCst), 1);

    agent.shutdown();
}

#[tokio::test]
async fn test_invalid_utf8_binary_frame_is_a_decode_fault() {
    init_tracing();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut table = OperationTable::new();
    {
        let calls = Arc::clone(&calls);
        table.register_fn("noop", move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });
    }

    let server = ControlServer::bind_localhost(0).await.expect("bind");
    let agent = Agent::builder()
        .server_url(server.ws_url())
        .operations(table)
        .build()
        .expect("build");
    agent.start();

    let mut session = server.accept().await.expect("accept");
    session
        .send_raw_binary(b"{\"op\":\"noop\",\"args\":[\"ok\xFF\"]}")
        .await
        .expect("send");

    let frame = session.next_frame().await.expect("error frame");
    let events = SseDecoder::new().push(&frame);
    assert_eq!(events.len(), 1);
    match events[0].to_remote_error() {
        Error::Remote { kind, .. } => assert_eq!(kind, DECODE_ERROR_KIND),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Well-formed binary frames are still operations.
    session.send_raw_binary(br#"{"op":"noop"}"#).await.expect("send");
    let deadline = Instant::now() + Duration::from_secs(5);
    while calls.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    agent.shutdown();
}

// ============================================================================
// Relay
// ============================================================================

#[tokio::test]
async fn test_communicate_collects_relayed_events() {
    init_tracing();
    let server = ControlServer::bind_localhost(0).await.expect("bind");
    let agent = streaming_agent(
        server.ws_url(),
        vec![
            "event: message_start\ndata: {\"type\":\"message_start\"}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_",
            "block_delta\",\"delta\":{\"text\":\"Hi\"}}\n\n",
            "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
        ],
    );
    agent.start();

    let mut session = server.accept().await.expect("accept");
    let events = session.communicate("Hello").await.expect("communicate");

    let names: Vec<&str> = events.iter().map(|e| e.event_name()).collect();
    assert_eq!(names, vec!["message_start", "content_block_delta", "message_stop"]);

    let delta: Value = events[1].json().expect("delta json");
    assert_eq!(delta["delta"]["text"], "Hi");

    agent.shutdown();
}

#[tokio::test]
async fn test_communicate_surfaces_stream_error() {
    init_tracing();
    let server = ControlServer::bind_localhost(0).await.expect("bind");
    let agent = streaming_agent(
        server.ws_url(),
        vec![
            "event: message_start\ndata: {\"type\":\"message_start\"}\n\n",
            "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
        ],
    );
    agent.start();

    let mut session = server.accept().await.expect("accept");
    let err = session.communicate("Hello").await.unwrap_err();

    match err {
        Error::Remote { kind, message } => {
            assert_eq!(kind, "overloaded_error");
            assert_eq!(message, "Overloaded");
        }
        other => panic!("unexpected error: {other}"),
    }

    agent.shutdown();
}

#[tokio::test]
async fn test_communicate_ignores_earlier_relayed_stream() {
    init_tracing();
    let server = ControlServer::bind_localhost(0).await.expect("bind");
    let agent = relaying_agent(server.ws_url(), Arc::new(UrlEcho));
    agent.start();

    let mut session = server.accept().await.expect("accept");

    // A response the page fetched on its own, relayed before the exchange.
    let tee = agent.install_fetch(Arc::new(UrlEcho));
    let response = tee
        .fetch(FetchRequest::get("https://chat.invalid/stale"))
        .await
        .expect("fetch");
    response.body.expect("body").for_each(|_| async {}).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let events = session.communicate("hi").await.expect("communicate");
    let sources: Vec<Value> = events
        .iter()
        .map(|e| {
            let data: Value = e.json().expect("event json");
            data["src"].clone()
        })
        .collect();
    assert_eq!(
        sources,
        vec![json!("https://chat.invalid/completion"), Value::Null]
    );

    agent.shutdown();
}

#[tokio::test]
async fn test_tee_is_transparent_without_connection() {
    init_tracing();
    let agent = Agent::builder()
        .server_url("ws://127.0.0.1:1")
        .reconnect_delay(Duration::from_secs(60))
        .build()
        .expect("build");

    let chunks = vec!["event: a\ndata: 1\n\n", "event: b\ndata: 2\n\n"];
    let fetch = agent.install_fetch(Arc::new(ScriptedStream {
        chunks: chunks.clone(),
    }));

    let response = fetch.fetch(FetchRequest::get("https://x.invalid")).await.expect("fetch");
    let seen: Vec<Vec<u8>> = response
        .body
        .expect("body")
        .map(|c| c.expect("chunk"))
        .collect()
        .await;

    let expected: Vec<Vec<u8>> = chunks.iter().map(|c| c.as_bytes().to_vec()).collect();
    assert_eq!(seen, expected);
}
