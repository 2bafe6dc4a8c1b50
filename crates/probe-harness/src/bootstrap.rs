//! # Consumer Bootstrapper
//!
//! Establishes a live, subscribed consuming session with bounded retries.
//!
//! ## Attempt Isolation
//!
//! ```text
//! attempt 1 ── group "<base>-1" ── connect ── subscribe ──✗── release ── sleep
//! attempt 2 ── group "<base>-2" ── connect ──✗─────────────── sleep
//!    ...
//! attempt k ── group "<base>-k" ── connect ── subscribe ── spawn consume loop ──→ session
//! ```
//!
//! Every attempt gets a brand-new connection and consumer group, so a
//! half-joined group from a failed attempt never leaks offsets or
//! membership into the next one.

use crate::config::RetryPolicy;
use crate::error::{ProbeError, Result};
use parking_lot::Mutex;
use probe_bus::{BrokerConnector, BrokerIdentity, BusError, ConsumerConnection, Record};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Callback invoked once per delivered record, in delivery order.
///
/// Runs inside the session's consume loop: it must not await the session's
/// own teardown.
pub type RecordHandler = Arc<dyn Fn(&Record) + Send + Sync>;

/// Lifecycle of a consuming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Subscribed,
    Running,
    /// Held while `shutdown` runs. Internal: `shutdown` consumes the session.
    TearingDown,
    /// The consume loop exited and the connection was released.
    Closed,
}

struct SessionShared {
    state: Mutex<SessionState>,
    delivered: AtomicU64,
}

impl SessionShared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SessionState::Connecting),
            delivered: AtomicU64::new(0),
        })
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }
}

/// A subscribed consumer with a running consume loop.
///
/// Owned by exactly one operation. Released by [`ConsumingSession::shutdown`]
/// (awaited) or [`ConsumingSession::shutdown_detached`] (spawned). Dropping
/// the session also stops the loop and releases the connection, without
/// waiting for it.
pub struct ConsumingSession {
    topic: String,
    group_id: String,
    shared: Arc<SessionShared>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<std::result::Result<(), BusError>>,
}

impl ConsumingSession {
    fn spawn(
        topic: &str,
        connection: Box<dyn ConsumerConnection>,
        handler: RecordHandler,
        shared: Arc<SessionShared>,
    ) -> Self {
        let (stop, stop_rx) = oneshot::channel();
        let group_id = connection.group_id().to_string();

        shared.set_state(SessionState::Running);
        let task = tokio::spawn(consume(connection, handler, shared.clone(), stop_rx));

        Self {
            topic: topic.to_string(),
            group_id,
            shared,
            stop,
            task,
        }
    }

    /// Topic this session is subscribed to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Consumer group this session joined.
    #[must_use]
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Current lifecycle state.
    ///
    /// Reports `Closed` once the record stream ended on its own and the
    /// connection was released.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.shared.state.lock()
    }

    /// Records handed to the handler so far.
    #[must_use]
    pub fn records_delivered(&self) -> u64 {
        self.shared.delivered.load(Ordering::Relaxed)
    }

    /// Stop the consume loop and wait until the connection is released.
    ///
    /// Waits for any in-flight handler call to return, so it must never be
    /// awaited from inside this session's handler or from a callback the
    /// handler is racing against. Use [`Self::shutdown_detached`] there.
    pub async fn shutdown(self) -> std::result::Result<(), BusError> {
        self.shared.set_state(SessionState::TearingDown);
        // The loop may already have exited on its own.
        let _ = self.stop.send(());

        let result = match self.task.await {
            Ok(result) => result,
            Err(e) => Err(BusError::Client(format!("consume loop failed: {}", e))),
        };
        self.shared.set_state(SessionState::Closed);
        debug!(topic = %self.topic, group_id = %self.group_id, "Consuming session closed");
        result
    }

    /// Spawn the teardown and return immediately. Errors are logged.
    pub fn shutdown_detached(self) {
        tokio::spawn(async move {
            let topic = self.topic.clone();
            if let Err(e) = self.shutdown().await {
                debug!(topic = %topic, error = %e, "Detached teardown failed, ignoring");
            }
        });
    }
}

async fn consume(
    mut connection: Box<dyn ConsumerConnection>,
    handler: RecordHandler,
    shared: Arc<SessionShared>,
    mut stop: oneshot::Receiver<()>,
) -> std::result::Result<(), BusError> {
    loop {
        tokio::select! {
            biased;

            // Fires on an explicit stop and when the session is dropped.
            _ = &mut stop => break,

            next = connection.next_record() => match next {
                Some(Ok(record)) => {
                    shared.delivered.fetch_add(1, Ordering::Relaxed);
                    handler(&record);
                }
                Some(Err(BusError::Closed)) | None => {
                    debug!(group_id = connection.group_id(), "Record stream ended");
                    break;
                }
                Some(Err(e)) => {
                    warn!(group_id = connection.group_id(), error = %e, "Consume error");
                }
            },
        }
    }

    let released = connection.disconnect().await;
    shared.set_state(SessionState::Closed);
    released
}

/// Shared, take-once holder for a session that racing callbacks may release.
#[derive(Clone, Default)]
pub(crate) struct SessionSlot {
    inner: Arc<Mutex<Option<ConsumingSession>>>,
}

impl SessionSlot {
    pub(crate) fn fill(&self, session: ConsumingSession) {
        *self.inner.lock() = Some(session);
    }

    pub(crate) fn take(&self) -> Option<ConsumingSession> {
        self.inner.lock().take()
    }

    /// Fire-and-forget teardown of the held session, if still present.
    pub(crate) fn release_detached(&self) {
        if let Some(session) = self.take() {
            session.shutdown_detached();
        }
    }
}

/// Start a consuming session on `topic`, retrying per `retry`.
///
/// Attempt `k` uses consumer group `"{base_group_id}-{k}"`. A failed
/// attempt's connection is released (errors ignored) before the backoff.
/// After the last attempt the final error is returned as
/// [`ProbeError::BootstrapExhausted`].
pub async fn start_consumer(
    connector: &dyn BrokerConnector,
    identity: &BrokerIdentity,
    topic: &str,
    base_group_id: &str,
    handler: RecordHandler,
    retry: RetryPolicy,
) -> Result<ConsumingSession> {
    let attempts = retry.attempts.max(1);
    let mut attempt = 1;

    loop {
        let group_id = format!("{}-{}", base_group_id, attempt);

        match try_start(connector, identity, topic, &group_id, handler.clone()).await {
            Ok(session) => {
                info!(
                    topic = topic,
                    group_id = %group_id,
                    attempt = attempt,
                    "Consumer session running"
                );
                return Ok(session);
            }
            Err(source) => {
                warn!(
                    topic = topic,
                    group_id = %group_id,
                    attempt = attempt,
                    error = %source,
                    "Consumer bootstrap attempt failed"
                );
                if attempt >= attempts {
                    return Err(ProbeError::BootstrapExhausted {
                        topic: topic.to_string(),
                        attempts,
                        last_group_id: group_id,
                        source,
                    });
                }
            }
        }

        tokio::time::sleep(retry.backoff).await;
        attempt += 1;
    }
}

async fn try_start(
    connector: &dyn BrokerConnector,
    identity: &BrokerIdentity,
    topic: &str,
    group_id: &str,
    handler: RecordHandler,
) -> std::result::Result<ConsumingSession, BusError> {
    let shared = SessionShared::new();
    let mut connection = connector.connect_consumer(identity, group_id).await?;

    if let Err(e) = connection.subscribe(topic, true).await {
        if let Err(release) = connection.disconnect().await {
            debug!(group_id = group_id, error = %release, "Release after failed attempt failed");
        }
        return Err(e);
    }
    shared.set_state(SessionState::Subscribed);

    Ok(ConsumingSession::spawn(topic, connection, handler, shared))
}
