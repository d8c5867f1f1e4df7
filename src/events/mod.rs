//! Event bus for pub/sub messaging
//!
//! Broadcasts container lifecycle, health, and image-pull progress events so
//! multiple subscribers (stats streams, the `/events` feed, attach pumps) can
//! observe manager-driven state changes without polling the state store.

mod bus;

pub use bus::{ContainerPhase, Event, EventBus, HealthStatus, NetworkStats, Stats};
