//! Agent context.
//!
//! The [`Agent`] owns every piece of the relay: the connection manager, the
//! operation queue, the operation table, the execution loop, the optional
//! auto-approver, and the installed fetch tee. It is created once, started
//! once, and torn down explicitly or on drop.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use chat_relay::{Agent, network::HttpFetch, page::MemoryPage};
//!
//! let agent = Agent::builder()
//!     .page(Arc::new(MemoryPage::new()))
//!     .build()?;
//!
//! assert!(agent.start());
//! let fetch = agent.install_fetch(Arc::new(HttpFetch::new()));
//! // hand `fetch` to whatever issues the page's requests ...
//! agent.shutdown();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::approve::AutoApprover;
use crate::identifiers::ConnectionId;
use crate::network::{Fetch, TeeFetch};
use crate::operations::OperationTable;
use crate::page::Page;
use crate::transport::{ConnectionManager, ConnectionState, FrameSink, SendOutcome};

use super::builder::AgentBuilder;
use super::config::AgentConfig;
use super::dispatcher::InboundDispatcher;
use super::executor::ExecutionLoop;
use super::fault::FaultReporter;
use super::queue::OperationQueue;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the agent.
pub(crate) struct AgentInner {
    /// Settings the agent was built with.
    config: AgentConfig,

    /// The single connection to the control server.
    connection: Arc<ConnectionManager>,

    /// Pending operations.
    queue: OperationQueue,

    /// Capabilities by name.
    table: OperationTable,

    /// Page for the auto-approver.
    page: Option<Arc<dyn Page>>,

    /// Auto-approver, present when a page and trusted tools are configured.
    approver: Option<Arc<AutoApprover>>,

    /// Init-once guard for [`Agent::start`].
    started: AtomicBool,

    /// Execution loop and approver tasks.
    tasks: Mutex<Vec<JoinHandle<()>>>,

    /// The wrapped fetch, installed at most once.
    fetch: OnceLock<Arc<TeeFetch>>,
}

impl AgentInner {
    fn teardown(&self) {
        self.connection.shutdown();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.started.store(false, Ordering::Release);
    }
}

impl Drop for AgentInner {
    fn drop(&mut self) {
        self.teardown();
    }
}

// ============================================================================
// Agent
// ============================================================================

/// The relay-and-execution agent.
///
/// Cheap to clone; clones share the same agent. Everything stops when
/// [`shutdown`](Self::shutdown) is called or the last clone is dropped.
#[derive(Clone)]
pub struct Agent {
    /// Shared inner state.
    pub(crate) inner: Arc<AgentInner>,
}

// ============================================================================
// Agent - Display
// ============================================================================

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("server_url", &self.inner.config.server_url)
            .field("state", &self.connection_state())
            .field("queued", &self.inner.queue.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Agent - Public API
// ============================================================================

impl Agent {
    /// Creates a configuration builder for the agent.
    #[inline]
    #[must_use]
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    /// Starts the connection, the execution loop and the auto-approver.
    ///
    /// Must be called within a tokio runtime. Returns `false` without doing
    /// anything if the agent is already running.
    pub fn start(&self) -> bool {
        let inner = &self.inner;
        if inner
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Agent already started");
            return false;
        }

        let faults = self.fault_reporter();
        let dispatcher = InboundDispatcher::new(inner.queue.clone(), faults.clone());
        inner.connection.start(dispatcher.into_handler());

        let executor = ExecutionLoop::new(
            inner.queue.clone(),
            inner.table.clone(),
            faults,
            inner.config.tick_interval,
        );

        let mut tasks = inner.tasks.lock();
        tasks.push(tokio::spawn(executor.run()));

        if let (Some(approver), Some(page)) = (&inner.approver, &inner.page) {
            tasks.push(tokio::spawn(
                Arc::clone(approver).observe(Arc::clone(page)),
            ));
        }

        info!(
            url = %inner.config.server_url,
            operations = inner.table.len(),
            auto_approve = inner.approver.is_some(),
            "Agent started"
        );
        true
    }

    /// Stops every task and closes the connection.
    ///
    /// The agent can be started again afterwards.
    pub fn shutdown(&self) {
        self.inner.teardown();
        info!("Agent shut down");
    }

    /// Wraps `inner` so event-stream bodies are relayed to the controller.
    ///
    /// Only the first call installs a wrapper; later calls return the same
    /// wrapper and ignore their argument.
    pub fn install_fetch(&self, inner: Arc<dyn Fetch>) -> Arc<dyn Fetch> {
        let mut installed = false;
        let tee = self.inner.fetch.get_or_init(|| {
            installed = true;
            let sink: Arc<dyn FrameSink> = self.inner.connection.clone();
            Arc::new(TeeFetch::new(inner, sink))
        });

        if installed {
            debug!("Fetch tee installed");
        } else {
            debug!("Fetch tee already installed");
        }

        Arc::clone(tee) as Arc<dyn Fetch>
    }

    /// Sends one frame to the controller if connected.
    #[inline]
    pub fn try_send(&self, bytes: Vec<u8>) -> SendOutcome {
        self.inner.connection.try_send(bytes)
    }

    /// Returns `true` while the agent is running.
    #[inline]
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.inner.config
    }

    /// Returns the operation queue.
    #[inline]
    #[must_use]
    pub fn queue(&self) -> &OperationQueue {
        &self.inner.queue
    }

    /// Returns the operation table.
    #[inline]
    #[must_use]
    pub fn operations(&self) -> &OperationTable {
        &self.inner.table
    }

    /// Returns the auto-approver, if enabled.
    #[inline]
    #[must_use]
    pub fn approver(&self) -> Option<&Arc<AutoApprover>> {
        self.inner.approver.as_ref()
    }

    /// Returns the state of the current connection.
    #[inline]
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Returns the id of the current connection.
    #[inline]
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.inner.connection.connection_id()
    }

    /// Returns how many connection attempts have been made.
    #[inline]
    #[must_use]
    pub fn connection_attempts(&self) -> u64 {
        self.inner.connection.attempts()
    }
}

// ============================================================================
// Agent - Internal API
// ============================================================================

impl Agent {
    /// Creates a new agent; nothing runs until [`start`](Self::start).
    pub(crate) fn new(
        config: AgentConfig,
        page: Option<Arc<dyn Page>>,
        table: OperationTable,
    ) -> Self {
        let connection = ConnectionManager::new(config.server_url.clone(), config.reconnect_delay);

        let approver = match &page {
            Some(_) if !config.trusted_tools.is_empty() => Some(Arc::new(AutoApprover::new(
                config.trusted_tools.iter().cloned(),
                config.approval_cooldown,
            ))),
            _ => None,
        };

        let inner = Arc::new(AgentInner {
            config,
            connection,
            queue: OperationQueue::new(),
            table,
            page,
            approver,
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            fetch: OnceLock::new(),
        });

        Self { inner }
    }

    fn fault_reporter(&self) -> FaultReporter {
        let sink: Arc<dyn FrameSink> = self.inner.connection.clone();
        FaultReporter::new(self.inner.queue.clone(), sink)
    }
}

// ============================================================================
// Tests
// ============================================================================
