//! Delivery of donor notifications.
//!
//! Notifications are stored by [`crate::service`] first; the dispatcher then
//! hands them to a [`NotificationSink`] on a background task so slow
//! delivery never holds the database lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::model::Notification;

/// Default number of notifications buffered ahead of the sink.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Errors a sink can report.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The receiving side has gone away.
    #[error("sink closed")]
    Closed,

    /// Delivery was attempted and failed.
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// Somewhere notifications are delivered to.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Deliver one notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification could not be delivered.
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait::async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        info!(
            notification_id = notification.id,
            donor_id = notification.donor_id,
            request_id = ?notification.request_id,
            title = %notification.title,
            "Notify donor"
        );
        Ok(())
    }
}

/// Forwards notifications to a channel receiver.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    /// Create a sink and the receiver it feeds.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl NotificationSink for ChannelSink {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        self.tx
            .send(notification.clone())
            .map_err(|_| DeliveryError::Closed)
    }
}

/// Delivery counters.
#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// A cloneable handle that queues notifications for the worker task.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Notification>,
    counters: Arc<Counters>,
}

impl Dispatcher {
    /// Start a worker task delivering to `sink`.
    ///
    /// The worker stops once every handle has been dropped and the queue
    /// has drained. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn spawn(sink: Arc<dyn NotificationSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Notification>(capacity.max(1));
        let counters = Arc::new(Counters::default());

        let worker_counters = Arc::clone(&counters);
        let worker = tokio::spawn(async move {
            debug!(sink = sink.name(), "Notification worker started");
            while let Some(notification) = rx.recv().await {
                match sink.deliver(&notification).await {
                    Ok(()) => {
                        worker_counters.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            notification_id = notification.id,
                            sink = sink.name(),
                            error = %e,
                            "Notification delivery failed"
                        );
                    }
                }
            }
            debug!(sink = sink.name(), "Notification worker stopped");
        });

        (Self { tx, counters }, worker)
    }

    /// Queue notifications without waiting. Returns how many were queued;
    /// the rest are dropped when the queue is full or the worker is gone.
    pub fn dispatch(&self, notifications: impl IntoIterator<Item = Notification>) -> usize {
        let mut queued = 0;
        for notification in notifications {
            let id = notification.id;
            match self.tx.try_send(notification) {
                Ok(()) => queued += 1,
                Err(e) => {
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(notification_id = id, error = %e, "Notification dropped");
                }
            }
        }
        queued
    }

    /// Notifications handed to the sink successfully.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.counters.delivered.load(Ordering::Relaxed)
    }

    /// Notifications the sink rejected.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    /// Notifications that never reached the queue.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn notification(id: i64) -> Notification {
        Notification {
            id,
            donor_id: 7,
            request_id: Some(3),
            title: "O- blood needed".to_string(),
            message: "Please consider donating".to_string(),
            response: None,
            responded_at: None,
            read_at: None,
            created_at: Utc::now(),
        }
    }

    #[derive(Debug)]
    struct FailingSink;

    #[async_trait::async_trait]
    impl NotificationSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn deliver(&self, _notification: &Notification) -> Result<(), DeliveryError> {
            Err(DeliveryError::Failed("provider down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_channel_sink_receives_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        let (dispatcher, worker) = Dispatcher::spawn(Arc::new(sink), 8);

        assert_eq!(dispatcher.dispatch([notification(1), notification(2)]), 2);
        assert_eq!(rx.recv().await.unwrap().id, 1);
        assert_eq!(rx.recv().await.unwrap().id, 2);

        drop(dispatcher);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_counters() {
        let (dispatcher, worker) = Dispatcher::spawn(Arc::new(FailingSink), 8);
        let probe = dispatcher.clone();
        dispatcher.dispatch([notification(1)]);
        drop(dispatcher);

        // Worker keeps running while the probe handle is alive
        while probe.failed() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(probe.delivered(), 0);
        drop(probe);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_log_sink_delivers() {
        let (dispatcher, worker) = Dispatcher::spawn(Arc::new(LogSink), 8);
        dispatcher.dispatch([notification(1)]);
        let probe = dispatcher.clone();
        drop(dispatcher);
        while probe.delivered() == 0 {
            tokio::task::yield_now().await;
        }
        drop(probe);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_channel_counts_as_failure() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        assert!(matches!(
            sink.deliver(&notification(1)).await,
            Err(DeliveryError::Closed)
        ));
    }

    #[test]
    fn test_delivery_error_display() {
        assert!(DeliveryError::Failed("x".to_string())
            .to_string()
            .contains("failed"));
        assert_eq!(DeliveryError::Closed.to_string(), "sink closed");
    }
}
