//! Event bus for pub/sub messaging
//!
//! Uses tokio broadcast channels for efficient pub/sub messaging.
//! Subscribers that fall behind will lose messages (lagged).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Container lifecycle phase, mirrored from `containers::model::Phase` for
/// event-payload purposes so subscribers don't need to depend on the
/// container crate's internal types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerPhase {
    Created,
    Running,
    Paused,
    Restarting,
    Exited,
    Dead,
    Removing,
}

impl std::fmt::Display for ContainerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContainerPhase::Created => "created",
            ContainerPhase::Running => "running",
            ContainerPhase::Paused => "paused",
            ContainerPhase::Restarting => "restarting",
            ContainerPhase::Exited => "exited",
            ContainerPhase::Dead => "dead",
            ContainerPhase::Removing => "removing",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Starting,
    Healthy,
    Unhealthy,
}

/// Per-network resource counters for a single container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkStats {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Resource statistics for a container, shaped to feed `GET .../stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub memory_bytes: u64,
    pub memory_limit_bytes: u64,
    pub cpu_absolute: f64,
    pub network: NetworkStats,
    pub pids: u64,
}

/// Events published through the daemon-wide bus. Each variant carries the
/// container/image/network id it concerns so subscribers can filter.
#[derive(Debug, Clone)]
pub enum Event {
    ContainerPhaseChanged {
        container_id: String,
        phase: ContainerPhase,
        exit_code: Option<i64>,
    },

    ContainerStats {
        container_id: String,
        stats: Stats,
    },

    ContainerHealth {
        container_id: String,
        status: HealthStatus,
        failing_streak: u32,
    },

    ContainerOutput {
        container_id: String,
        stream: &'static str,
        data: Vec<u8>,
    },

    ImagePullProgress {
        reference: String,
        status: String,
        id: Option<String>,
    },

    NetworkChanged {
        network_id: String,
    },

    VolumeChanged {
        volume_name: String,
    },
}

/// Daemon-wide event bus. Cloning shares the same broadcast channel.
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    _receiver: broadcast::Receiver<Event>,
}

impl EventBus {
    /// Default capacity generous enough to absorb console-output bursts
    /// without lagging slow subscribers.
    pub fn new() -> Self {
        Self::with_capacity(4096)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender, _receiver }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publish an event. Returns the number of receivers that saw it; a send
    /// with no subscribers is not an error.
    pub fn publish(&self, event: Event) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn publish_phase(&self, container_id: impl Into<String>, phase: ContainerPhase, exit_code: Option<i64>) -> usize {
        let container_id = container_id.into();
        let receivers = self.publish(Event::ContainerPhaseChanged {
            container_id: container_id.clone(),
            phase,
            exit_code,
        });
        debug!(container_id, %phase, receivers, "published phase change");
        receivers
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            _receiver: self.sender.subscribe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pubsub_roundtrip() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish_phase("abc123", ContainerPhase::Running, None);

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            Event::ContainerPhaseChanged { phase: ContainerPhase::Running, .. }
        ));
    }

    #[tokio::test]
    async fn multiple_subscribers_both_receive() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish_phase("abc123", ContainerPhase::Exited, Some(0));

        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[test]
    fn subscriber_count_tracks_subscriptions() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        let _rx1 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
    }
}
