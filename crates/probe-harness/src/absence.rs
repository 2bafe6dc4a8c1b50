//! # AssertAbsence
//!
//! Runs a trigger, keeps listening for a fixed window, and fails if any
//! message satisfying the predicate showed up.
//!
//! `Listening → WindowElapsed → {Clean | Violated}`. Nothing races here:
//! the handler only records, so the session can be torn down with an
//! awaited call and the record is read after the loop has stopped.

use crate::bootstrap::{start_consumer, RecordHandler};
use crate::config::HarnessConfig;
use crate::error::{ProbeError, Result};
use crate::provision::ensure_topic_exists;
use crate::wait::{millis, Predicate};
use parking_lot::Mutex;
use probe_bus::{BrokerConnector, BusMessage, Record};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Options for [`assert_no_message`].
#[derive(Clone)]
pub struct AbsenceOptions {
    pub(crate) predicate: Predicate,
    pub(crate) window: Option<Duration>,
}

impl AbsenceOptions {
    /// Forbid any message satisfying `predicate`.
    pub fn matching<P>(predicate: P) -> Self
    where
        P: Fn(&BusMessage) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            window: None,
        }
    }

    /// Forbid any message whose `type` is `event_type`.
    pub fn of_type(event_type: &str) -> Self {
        let event_type = event_type.to_string();
        Self::matching(move |message| message.matches_type(&event_type))
    }

    /// Override the configured window.
    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = Some(window);
        self
    }
}

/// Run `trigger`, wait the window, and fail with
/// [`ProbeError::AssertionViolation`] if a forbidden message was seen on
/// `topic` at any point after the consumer attached.
///
/// The window starts when `trigger` completes. The session is torn down
/// on every path, including trigger failure.
pub async fn assert_no_message<F, Fut>(
    connector: &dyn BrokerConnector,
    config: &HarnessConfig,
    topic: &str,
    options: AbsenceOptions,
    trigger: F,
) -> Result<()>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let window = options.window.unwrap_or(config.absence_window);
    let identity = config.identity("absence");
    ensure_topic_exists(connector, &identity, topic).await?;

    let observed: Arc<Mutex<Option<BusMessage>>> = Arc::new(Mutex::new(None));

    let handler: RecordHandler = {
        let observed = observed.clone();
        let predicate = options.predicate.clone();
        let topic = topic.to_string();

        Arc::new(move |record: &Record| {
            let Ok(message) = record.decode() else {
                return;
            };
            if !predicate(&message) {
                return;
            }
            let mut first = observed.lock();
            if first.is_none() {
                warn!(topic = %topic, offset = record.offset, "Forbidden message observed");
                *first = Some(message);
            }
        })
    };

    let session = start_consumer(
        connector,
        &identity,
        topic,
        &format!("{}-group", identity.client_id()),
        handler,
        config.retry,
    )
    .await?;

    let triggered = trigger().await;
    if triggered.is_ok() {
        debug!(topic = topic, window_ms = millis(window), "Observing absence window");
        tokio::time::sleep(window).await;
    }

    if let Err(e) = session.shutdown().await {
        debug!(topic = topic, error = %e, "Teardown after absence window failed, ignoring");
    }

    triggered.map_err(ProbeError::trigger)?;

    let violation = observed.lock().take();
    match violation {
        Some(message) => Err(ProbeError::AssertionViolation {
            topic: topic.to_string(),
            message,
        }),
        None => {
            info!(topic = topic, window_ms = millis(window), "No forbidden message observed");
            Ok(())
        }
    }
}
