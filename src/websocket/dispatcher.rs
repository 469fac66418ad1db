use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::connection::{ConnectionId, Frame};
use super::events::Event;
use super::registry::ConnectionRegistry;
use crate::error::WebSocketError;

/// Outcome of one send attempt within a broadcast pass.
#[derive(Debug)]
pub enum Delivery {
    Delivered(ConnectionId),
    Failed(ConnectionId, WebSocketError),
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct BroadcastReport {
    pub attempted: usize,
    pub delivered: usize,
    pub pruned: Vec<ConnectionId>,
}

/// Pushes events to every live connection and prunes the ones that fail.
#[derive(Debug)]
pub struct BroadcastDispatcher {
    registry: Arc<ConnectionRegistry>,
    send_timeout: Duration,
}

impl BroadcastDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>, send_timeout: Duration) -> Self {
        Self { registry, send_timeout }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Encode `event` once and fan it out.
    ///
    /// Errors only when encoding fails, before anything is sent. Per-recipient
    /// failures are absorbed and reported.
    pub async fn broadcast(&self, event: &Event) -> Result<BroadcastReport, WebSocketError> {
        let frame = event.encode()?;
        Ok(self.dispatch(event.kind(), frame).await)
    }

    /// Send an already encoded frame to everyone registered at call time.
    /// Connections registered after the snapshot do not get this frame.
    pub async fn dispatch(&self, kind: &str, frame: Frame) -> BroadcastReport {
        let snapshot = self.registry.snapshot().await;
        debug!("Broadcasting {} to {} clients", kind, snapshot.len());

        let timeout = self.send_timeout;
        let attempts = snapshot.iter().map(|connection| {
            let frame = frame.clone();
            async move {
                match connection.send(frame, timeout).await {
                    Ok(()) => Delivery::Delivered(connection.id()),
                    Err(e) => Delivery::Failed(connection.id(), e),
                }
            }
        });
        let outcomes = join_all(attempts).await;

        let mut report = BroadcastReport {
            attempted: outcomes.len(),
            ..BroadcastReport::default()
        };
        for (connection, outcome) in snapshot.iter().zip(outcomes) {
            match outcome {
                Delivery::Delivered(_) => report.delivered += 1,
                Delivery::Failed(id, e) => {
                    warn!(
                        "Failed to send {} to connection {} (connected since {}): {}",
                        kind,
                        id,
                        connection.connected_at().to_rfc3339(),
                        e
                    );
                    self.registry.unregister(id).await;
                    report.pruned.push(id);
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Question, QuestionStatus};
    use crate::websocket::Connection;
    use chrono::Utc;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    const TIMEOUT: Duration = Duration::from_millis(100);

    async fn connect(registry: &ConnectionRegistry, capacity: usize) -> (ConnectionId, mpsc::Receiver<Frame>) {
        let (connection, rx) = Connection::open("127.0.0.1:0", capacity);
        (registry.register(connection).await, rx)
    }

    fn question() -> Question {
        Question {
            id: 1,
            content: "Hi".to_string(),
            status: QuestionStatus::Pending,
            created_at: Utc::now(),
            votes: 0,
            replies: vec![],
        }
    }

    #[tokio::test]
    async fn test_failed_connection_is_pruned_in_same_pass() {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = BroadcastDispatcher::new(registry.clone(), TIMEOUT);

        let (a, mut rx_a) = connect(&registry, 4).await;
        let (b, rx_b) = connect(&registry, 4).await;
        let (c, mut rx_c) = connect(&registry, 4).await;
        drop(rx_b);

        let report = dispatcher.broadcast(&Event::NewQuestion(question())).await.unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.pruned, vec![b]);
        assert_eq!(registry.get_all_connection_ids().await, vec![a, c]);

        for rx in [&mut rx_a, &mut rx_c] {
            let frame = rx.try_recv().unwrap();
            let value: Value = serde_json::from_str(&frame).unwrap();
            assert_eq!(value["type"], "NEW_QUESTION");
            assert_eq!(value["data"]["content"], "Hi");
            assert_eq!(value["data"]["replies"], json!([]));
        }
    }

    #[tokio::test]
    async fn test_delivers_to_all_but_failing_subset() {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = BroadcastDispatcher::new(registry.clone(), TIMEOUT);

        let mut live = Vec::new();
        let mut failing = Vec::new();
        for i in 0..10 {
            let (id, rx) = connect(&registry, 4).await;
            if i % 3 == 0 {
                drop(rx);
                failing.push(id);
            } else {
                live.push(rx);
            }
        }

        let report = dispatcher.dispatch("TEST", Frame::from("{}")).await;
        assert_eq!(report.delivered, 10 - failing.len());
        assert_eq!(report.pruned, failing);
        for id in &failing {
            assert!(!registry.contains(*id).await);
        }
        for rx in live.iter_mut() {
            assert_eq!(&*rx.try_recv().unwrap(), "{}");
        }
    }

    #[tokio::test]
    async fn test_recipients_share_one_encoded_frame() {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = BroadcastDispatcher::new(registry.clone(), TIMEOUT);
        let (_, mut rx_a) = connect(&registry, 4).await;
        let (_, mut rx_b) = connect(&registry, 4).await;

        dispatcher.broadcast(&Event::NewQuestion(question())).await.unwrap();

        let a = rx_a.try_recv().unwrap();
        let b = rx_b.try_recv().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_bytes().as_ptr(), b.as_bytes().as_ptr());
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_registry() {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = BroadcastDispatcher::new(registry, TIMEOUT);
        let report = dispatcher.broadcast(&Event::NewQuestion(question())).await.unwrap();
        assert_eq!(report.attempted, 0);
        assert!(report.pruned.is_empty());
    }

    #[tokio::test]
    async fn test_late_joiner_misses_in_flight_event_only() {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Arc::new(BroadcastDispatcher::new(registry.clone(), Duration::from_millis(300)));

        // A stalled client with a full queue holds the pass open until its timeout.
        let (stalled, _rx_stalled) = connect(&registry, 1).await;
        dispatcher.dispatch("FILL", Frame::from("fill")).await;

        let in_flight = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.dispatch("FIRST", Frame::from("first")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let (late, mut rx_late) = connect(&registry, 4).await;

        let report = in_flight.await.unwrap();
        assert_eq!(report.pruned, vec![stalled]);
        assert!(rx_late.try_recv().is_err());
        assert!(registry.contains(late).await);

        dispatcher.dispatch("SECOND", Frame::from("second")).await;
        assert_eq!(&*rx_late.try_recv().unwrap(), "second");
    }

    #[tokio::test]
    async fn test_slow_client_does_not_stall_others() {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = BroadcastDispatcher::new(registry.clone(), Duration::from_millis(200));

        let (_slow, _rx_slow) = connect(&registry, 1).await;
        let (_fast, mut rx_fast) = connect(&registry, 8).await;
        dispatcher.dispatch("FILL", Frame::from("fill")).await;
        assert_eq!(&*rx_fast.try_recv().unwrap(), "fill");

        let started = std::time::Instant::now();
        let report = dispatcher.dispatch("NEXT", Frame::from("next")).await;

        // Sends run concurrently, so the pass costs one timeout, not one per client.
        assert!(started.elapsed() < Duration::from_millis(400));
        assert_eq!(report.delivered, 1);
        assert_eq!(&*rx_fast.try_recv().unwrap(), "next");
    }
}
