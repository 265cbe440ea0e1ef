//! Message bus boundary.
//!
//! The pipeline talks to its broker through [`MessageBus`], so components can
//! run against the real MQTT transport in production and an in-process router
//! in tests. The broker itself is an external collaborator; the trait captures
//! only what the pipeline relies on: named topics, per-subscription delivery
//! tiers, and a serialized receive loop.

pub mod memory;
pub mod mqtt;

use crate::error::Result;
use async_trait::async_trait;

/// Delivery guarantee requested for a publish or subscription.
///
/// Maps onto the broker's QoS tiers: raw detections ride at-least-once,
/// enriched results are best-effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// QoS 0: fire and forget.
    BestEffort,
    /// QoS 1: at-least-once; duplicates are possible and not deduplicated.
    AtLeastOnce,
}

/// A message received from the bus.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// A connected bus endpoint owned by exactly one pipeline component.
///
/// Receiving is pull-based: one call, one message. Everything a component
/// does between two `next_message` calls is strictly serialized.
#[async_trait]
pub trait MessageBus: Send {
    /// Publish a payload to a topic. Failures are returned to the caller,
    /// never retried here.
    async fn publish(&mut self, topic: &str, payload: Vec<u8>, delivery: Delivery) -> Result<()>;

    /// Subscribe to a topic at the given delivery tier.
    async fn subscribe(&mut self, topic: &str, delivery: Delivery) -> Result<()>;

    /// Wait for the next message on any subscribed topic.
    ///
    /// Returns `Ok(None)` once the connection is closed for good.
    async fn next_message(&mut self) -> Result<Option<BusMessage>>;

    /// Close the connection.
    async fn disconnect(&mut self) -> Result<()>;
}
