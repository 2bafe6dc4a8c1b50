//! # WaitForEvent
//!
//! Races "a matching message arrives" against "the deadline expires".
//!
//! ```text
//!                       ┌──────────── Matched   (handler settles, detached teardown)
//! Idle ──→ Listening ───┼──────────── TimedOut  (timer settles, detached teardown)
//!                       └──────────── TriggerFailed (awaited teardown, then settles)
//! ```
//!
//! The handler and the timer run as separate tasks, so the outcome goes
//! through a single-assignment [`Settlement`]; whichever writes second is a
//! no-op. Teardown issued from either of them is spawned, never awaited:
//! awaiting the session's shutdown from inside its own handler would wait
//! on itself.

use crate::bootstrap::{start_consumer, RecordHandler, SessionSlot};
use crate::config::HarnessConfig;
use crate::deadline::DeadlineTimer;
use crate::error::{ProbeError, Result};
use crate::provision::ensure_topic_exists;
use crate::settlement::Settlement;
use probe_bus::{BrokerConnector, BusMessage, Record};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pure test applied to each decoded message. May run any number of times.
pub type Predicate = Arc<dyn Fn(&BusMessage) -> bool + Send + Sync>;

/// Options for [`wait_for_message`].
#[derive(Clone)]
pub struct WaitOptions {
    pub(crate) predicate: Predicate,
    pub(crate) timeout: Option<Duration>,
}

impl WaitOptions {
    /// Wait for the first message satisfying `predicate`.
    pub fn matching<P>(predicate: P) -> Self
    where
        P: Fn(&BusMessage) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            timeout: None,
        }
    }

    /// Wait for the first message whose `type` is `event_type`.
    pub fn of_type(event_type: &str) -> Self {
        let event_type = event_type.to_string();
        Self::matching(move |message| message.matches_type(&event_type))
    }

    /// Override the configured deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Run `trigger` and resolve with the first message on `topic` that
/// satisfies the predicate, or fail with [`ProbeError::Timeout`].
///
/// The consumer is attached before `trigger` runs. The call returns as
/// soon as a match or the deadline settles it, even if `trigger` has not
/// finished; the unfinished trigger is dropped. If `trigger` fails before
/// anything else settles, the call fails with [`ProbeError::Trigger`] and
/// no later message or deadline can change that.
pub async fn wait_for_message<F, Fut>(
    connector: &dyn BrokerConnector,
    config: &HarnessConfig,
    topic: &str,
    options: WaitOptions,
    trigger: F,
) -> Result<BusMessage>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let timeout = options.timeout.unwrap_or(config.wait_timeout);
    let timeout_ms = millis(timeout);
    let identity = config.identity("wait");
    ensure_topic_exists(connector, &identity, topic).await?;

    let (settlement, outcome) = Settlement::<Result<BusMessage>>::new();
    let timer = DeadlineTimer::new();
    let session = SessionSlot::default();

    let handler: RecordHandler = {
        let settlement = settlement.clone();
        let timer = timer.clone();
        let session = session.clone();
        let predicate = options.predicate.clone();
        let topic = topic.to_string();

        Arc::new(move |record: &Record| {
            // Late deliveries after settlement are dropped.
            if settlement.is_settled() {
                return;
            }
            let message = match record.decode() {
                Ok(message) => message,
                Err(e) => {
                    debug!(topic = %topic, offset = record.offset, error = %e, "Skipping undecodable payload");
                    return;
                }
            };
            if !predicate(&message) {
                return;
            }

            timer.cancel();
            if settlement.settle(Ok(message)) {
                info!(topic = %topic, offset = record.offset, "Matching message received");
            }
            session.release_detached();
        })
    };

    let consumer = start_consumer(
        connector,
        &identity,
        topic,
        &format!("{}-group", identity.client_id()),
        handler,
        config.retry,
    )
    .await?;
    session.fill(consumer);
    // A match during bootstrap found the slot empty; release on its behalf.
    if settlement.is_settled() {
        session.release_detached();
    }

    {
        let settlement = settlement.clone();
        let session = session.clone();
        let topic = topic.to_string();

        timer.arm(timeout, move || {
            let expired = ProbeError::Timeout {
                topic: topic.clone(),
                timeout_ms,
            };
            if settlement.settle(Err(expired)) {
                warn!(topic = %topic, timeout_ms = timeout_ms, "No matching message before deadline");
            }
            session.release_detached();
        });
    }

    let expired = || ProbeError::Timeout {
        topic: topic.to_string(),
        timeout_ms,
    };
    let mut outcome = outcome;
    let triggered = trigger();
    tokio::pin!(triggered);

    // The outcome bounds the call: a match or expiry returns even while
    // the trigger is still running, and drops it.
    tokio::select! {
        biased;

        settled = &mut outcome => return settled.unwrap_or_else(|| Err(expired())),

        result = &mut triggered => {
            if let Err(error) = result {
                timer.cancel();
                if settlement.settle(Err(ProbeError::trigger(error))) {
                    warn!(topic = topic, "Trigger failed while waiting for message");
                }
                if let Some(consumer) = session.take() {
                    if let Err(e) = consumer.shutdown().await {
                        debug!(topic = topic, error = %e, "Teardown after trigger failure failed, ignoring");
                    }
                }
            }
        }
    }

    outcome.await.unwrap_or_else(|| Err(expired()))
}
