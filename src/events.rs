//! Domain event publishing.
//!
//! `publish` never blocks and never fails the caller: events go onto a bounded
//! queue drained by one background dispatcher that hands them to a [`Broker`].
//! Delivery is best effort. A full queue, a closed publisher or a broker error
//! drops the event and logs it; nothing is retried and events still queued
//! when the process dies are lost.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Topic consumed by the analytics engine.
pub const LISTING_CREATED_TOPIC: &str = "new_listings";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainEvent {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("broker unreachable: {0}")]
    Unreachable(String),
    #[error("broker rejected event with status {status}: {detail}")]
    Rejected { status: u16, detail: String },
    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A listing was created by the listing service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingCreated {
    pub listing_id: String,
    /// Username of the seller.
    pub user: String,
    pub category: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub created_at: u64,
}

// ---------------------------------------------------------------------------
// Brokers
// ---------------------------------------------------------------------------

/// Producer side of the downstream stream processor. Called from the blocking
/// pool, one event at a time.
pub trait Broker: Send + Sync + 'static {
    fn deliver(&self, event: &DomainEvent) -> Result<(), PublishError>;
}

/// Posts events to a Kafka REST proxy (`POST /topics/{topic}`, binary
/// embedded format, payload base64-encoded).
pub struct HttpBroker {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpBroker {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    fn topic_url(&self, topic: &str) -> String {
        format!("{}/topics/{}", self.base_url, topic)
    }
}

impl Broker for HttpBroker {
    fn deliver(&self, event: &DomainEvent) -> Result<(), PublishError> {
        let body = serde_json::json!({
            "records": [{ "value": STANDARD.encode(&event.payload) }],
        });
        match self
            .agent
            .post(&self.topic_url(&event.topic))
            .set("Content-Type", "application/vnd.kafka.binary.v2+json")
            .send_json(body)
        {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(status, response)) => Err(PublishError::Rejected {
                status,
                detail: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(transport)) => {
                Err(PublishError::Unreachable(transport.to_string()))
            }
        }
    }
}

/// Used when no broker is configured: events are logged and discarded.
pub struct LogBroker;

impl Broker for LogBroker {
    fn deliver(&self, event: &DomainEvent) -> Result<(), PublishError> {
        info!(
            topic = %event.topic,
            bytes = event.payload.len(),
            "no broker configured, event discarded"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

enum Dispatch {
    Event(DomainEvent),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Default)]
struct Counters {
    queued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of publisher counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PublisherStats {
    pub queued: u64,
    pub delivered: u64,
    pub failed: u64,
    /// Rejected at enqueue time: queue full or publisher shut down.
    pub dropped: u64,
}

#[derive(Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<Dispatch>,
    counters: Arc<Counters>,
}

impl EventPublisher {
    /// Start the background dispatcher. Must be called inside a Tokio runtime.
    pub fn spawn(broker: Arc<dyn Broker>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        tokio::spawn(dispatch_loop(rx, broker, Arc::clone(&counters)));
        Self { tx, counters }
    }

    /// Queue an event for delivery. Returns immediately; failures are logged
    /// and counted, never returned.
    pub fn publish(&self, topic: &str, payload: Vec<u8>) {
        let event = DomainEvent {
            topic: topic.to_string(),
            payload,
        };
        match self.tx.try_send(Dispatch::Event(event)) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(topic, "event queue full, event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(topic, "event publisher stopped, event dropped");
            }
        }
    }

    /// Serialize `value` as JSON and [`publish`](Self::publish) it.
    pub fn publish_json<T: Serialize>(&self, topic: &str, value: &T) {
        match serde_json::to_vec(value) {
            Ok(payload) => self.publish(topic, payload),
            Err(e) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(topic, error = %PublishError::from(e), "event dropped");
            }
        }
    }

    /// Stop accepting events and wait until everything already queued has
    /// been handed to the broker. Later `publish` calls are dropped.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Dispatch::Shutdown(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    pub fn stats(&self) -> PublisherStats {
        PublisherStats {
            queued: self.counters.queued.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

async fn dispatch_loop(
    mut rx: mpsc::Receiver<Dispatch>,
    broker: Arc<dyn Broker>,
    counters: Arc<Counters>,
) {
    let mut waiting = Vec::new();
    while let Some(dispatch) = rx.recv().await {
        let event = match dispatch {
            Dispatch::Event(event) => event,
            Dispatch::Shutdown(done) => {
                // Already-buffered events are still delivered before acking.
                rx.close();
                waiting.push(done);
                continue;
            }
        };

        let topic = event.topic.clone();
        let broker = Arc::clone(&broker);
        let result = tokio::task::spawn_blocking(move || broker.deliver(&event)).await;
        match result {
            Ok(Ok(())) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(topic = %topic, "event delivered");
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(topic = %topic, error = %e, "event publication failed");
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(topic = %topic, error = %e, "event delivery task failed");
            }
        }
    }
    for done in waiting {
        let _ = done.send(());
    }
    debug!("event dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Instant;

    use super::*;

    #[derive(Default)]
    struct RecordingBroker {
        seen: Mutex<Vec<DomainEvent>>,
    }

    impl Broker for RecordingBroker {
        fn deliver(&self, event: &DomainEvent) -> Result<(), PublishError> {
            self.seen.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    /// Simulates a broker outage that also hangs for a while.
    struct DownBroker {
        delay: Duration,
    }

    impl Broker for DownBroker {
        fn deliver(&self, _event: &DomainEvent) -> Result<(), PublishError> {
            std::thread::sleep(self.delay);
            Err(PublishError::Unreachable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn events_are_delivered_in_publish_order() {
        let broker = Arc::new(RecordingBroker::default());
        let publisher = EventPublisher::spawn(broker.clone(), 16);

        publisher.publish("new_listings", b"one".to_vec());
        publisher.publish("new_listings", b"two".to_vec());
        publisher.publish("other", b"three".to_vec());
        publisher.shutdown().await;

        let seen = broker.seen.lock().unwrap();
        let payloads: Vec<&[u8]> = seen.iter().map(|e| e.payload.as_slice()).collect();
        assert_eq!(payloads, vec![&b"one"[..], &b"two"[..], &b"three"[..]]);
        assert_eq!(seen[2].topic, "other");
        assert_eq!(publisher.stats().delivered, 3);
    }

    #[tokio::test]
    async fn publish_does_not_wait_for_a_broken_broker() {
        let publisher = EventPublisher::spawn(
            Arc::new(DownBroker {
                delay: Duration::from_millis(200),
            }),
            16,
        );

        let started = Instant::now();
        for i in 0..5 {
            publisher.publish("new_listings", format!("event {i}").into_bytes());
        }
        assert!(started.elapsed() < Duration::from_millis(100));

        publisher.shutdown().await;
        let stats = publisher.stats();
        assert_eq!(stats.queued, 5);
        assert_eq!(stats.failed, 5);
        assert_eq!(stats.delivered, 0);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let publisher = EventPublisher::spawn(
            Arc::new(DownBroker {
                delay: Duration::from_millis(300),
            }),
            1,
        );

        let started = Instant::now();
        for _ in 0..10 {
            publisher.publish("new_listings", Vec::new());
        }
        assert!(started.elapsed() < Duration::from_millis(100));
        let stats = publisher.stats();
        assert!(stats.dropped >= 8, "expected drops, got {stats:?}");
        assert_eq!(stats.queued + stats.dropped, 10);
    }

    #[tokio::test]
    async fn publish_after_shutdown_is_dropped() {
        let broker = Arc::new(RecordingBroker::default());
        let publisher = EventPublisher::spawn(broker.clone(), 4);
        publisher.shutdown().await;

        publisher.publish("new_listings", b"late".to_vec());
        assert_eq!(publisher.stats().dropped, 1);
        assert!(broker.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_created_serializes_fields_the_consumer_reads() {
        let broker = Arc::new(RecordingBroker::default());
        let publisher = EventPublisher::spawn(broker.clone(), 4);
        let event = ListingCreated {
            listing_id: "L1".to_string(),
            user: "alice".to_string(),
            category: "books".to_string(),
            title: "Calculus, 3rd ed.".to_string(),
            price: None,
            created_at: 1,
        };

        publisher.publish_json(LISTING_CREATED_TOPIC, &event);
        publisher.shutdown().await;

        let seen = broker.seen.lock().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&seen[0].payload).unwrap();
        assert_eq!(value["user"], "alice");
        assert_eq!(value["category"], "books");
        assert!(value.get("price").is_none());
    }

    #[test]
    fn http_broker_reports_unreachable_proxy() {
        // Port 9 (discard) on localhost is not expected to run an HTTP proxy.
        let broker = HttpBroker::new("http://127.0.0.1:9/", Duration::from_millis(500));
        assert_eq!(broker.topic_url("new_listings"), "http://127.0.0.1:9/topics/new_listings");
        let err = broker
            .deliver(&DomainEvent {
                topic: "new_listings".to_string(),
                payload: b"{}".to_vec(),
            })
            .unwrap_err();
        assert!(matches!(err, PublishError::Unreachable(_)));
    }
}
