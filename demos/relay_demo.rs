//! Relay demo: a controller and an agent in one process.
//!
//! Starts a control server on a random port, connects an agent driving an
//! in-memory chat page, opens a project chat, and runs one exchange whose
//! response is relayed from a scripted event stream.
//!
//! Usage:
//!   cargo run --example relay_demo
//!   cargo run --example relay_demo -- --debug

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use tracing_subscriber::EnvFilter;

use chat_relay::network::EVENT_STREAM_CONTENT_TYPE;
use chat_relay::operations::chat::{APPLY_CHAT, chat_table};
use chat_relay::{
    Agent, ChatOptions, ControlServer, Error, Fetch, FetchRequest, FetchResponse, MemoryPage,
    OperationTable, Page, Result,
};

// ============================================================================
// Constants
// ============================================================================

const PROJECT_ID: &str = "a1b2c3d4-e5f6-a7b8-c9d0-e1f2a3b4c5d6";

const RESPONSE: &[&str] = &[
    "event: message_start\ndata: {\"type\":\"message_start\"}\n\n",
    "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",",
    "\"delta\":{\"text\":\"Hello from the page\"}}\n\n",
    "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
];

// ============================================================================
// Scripted Network
// ============================================================================

/// Stands in for the page's network: every request streams `RESPONSE`.
struct ScriptedNetwork;

#[async_trait]
impl Fetch for ScriptedNetwork {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        tracing::debug!(url = %request.url, "Scripted fetch");
        let chunks = RESPONSE.iter().map(|c| Ok(c.as_bytes().to_vec()));
        Ok(FetchResponse::new(
            200,
            vec![("content-type".into(), EVENT_STREAM_CONTENT_TYPE.into())],
            Some(stream::iter(chunks).boxed()),
        ))
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let debug = std::env::args().any(|a| a == "--debug");
    let filter = if debug { "chat_relay=debug" } else { "chat_relay=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    // Controller side
    let server = ControlServer::bind_localhost(0).await?;
    println!("[1] Control server listening on {}", server.ws_url());

    // Agent side: built-in chat capabilities, with apply_chat also reading
    // the response through the page's (tee'd) network.
    let page = MemoryPage::new()
        .with_project(PROJECT_ID, "Research")
        .with_submit_delay(Duration::from_millis(30));
    let page_handle: Arc<dyn Page> = Arc::new(page.clone());

    let network: Arc<OnceLock<Arc<dyn Fetch>>> = Arc::new(OnceLock::new());
    let submit = chat_table(Arc::clone(&page_handle), ChatOptions::default())
        .get(APPLY_CHAT)
        .ok_or_else(|| Error::config("apply_chat missing"))?;

    let mut extra = OperationTable::new();
    {
        let network = Arc::clone(&network);
        extra.register_fn(APPLY_CHAT, move |args| {
            let submit = Arc::clone(&submit);
            let fetch = network.get().cloned();
            async move {
                submit.invoke(&args).await?;
                let fetch = fetch.ok_or_else(|| Error::capability(APPLY_CHAT, "no network"))?;
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
        .server_url(server.ws_url())
        .page(page_handle)
        .operations(extra)
        .trusted_tool("read_file")
        .build()?;
    let _ = network.set(agent.install_fetch(Arc::new(ScriptedNetwork)));
    agent.start();

    let mut session = server.accept().await?;
    println!("[2] Agent connected from {}", session.peer());

    // Open a chat inside the project, then talk.
    session.new_chat(Some("Research")).await?;
    let events = session.communicate("What changed since yesterday?").await?;

    println!("[3] Page path: {}", page.location_path());
    println!("[4] Submitted: {:?}", page.submitted());
    println!("[5] Relayed {} events:", events.len());
    for event in &events {
        println!("      {} {}", event.event_name(), event.data);
    }

    // A trusted tool request is approved without the controller's help.
    page.show_dialog("Run read_file from filesystem", &["Deny", "Allow for This Chat"]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("[6] Auto-approved: {:?}", page.clicked_buttons());

    session.close().await?;
    agent.shutdown();
    Ok(())
}
