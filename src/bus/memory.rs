//! In-process bus for tests.
//!
//! A [`MemoryBroker`] routes messages between any number of [`MemoryBus`]
//! endpoints with broker-style fan-out: every subscriber of a topic receives
//! every message published to it. Delivery tiers are accepted and ignored;
//! in-process channels never drop.

use crate::bus::{BusMessage, Delivery, MessageBus};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

type TopicTable = Arc<Mutex<HashMap<String, Vec<mpsc::UnboundedSender<BusMessage>>>>>;

/// Shared router. Clone-cheap; hand one to every component under test.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    topics: TopicTable,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new connected endpoint with its own inbox.
    pub fn client(&self) -> MemoryBus {
        let (tx, rx) = mpsc::unbounded_channel();
        MemoryBus {
            topics: Arc::clone(&self.topics),
            tx,
            rx,
            open: true,
        }
    }
}

/// One endpoint on a [`MemoryBroker`].
pub struct MemoryBus {
    topics: TopicTable,
    tx: mpsc::UnboundedSender<BusMessage>,
    rx: mpsc::UnboundedReceiver<BusMessage>,
    open: bool,
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&mut self, topic: &str, payload: Vec<u8>, _delivery: Delivery) -> Result<()> {
        let mut table = self.topics.lock().expect("bus table poisoned");
        if let Some(subscribers) = table.get_mut(topic) {
            subscribers.retain(|sub| {
                sub.send(BusMessage {
                    topic: topic.to_string(),
                    payload: payload.clone(),
                })
                .is_ok()
            });
        }
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, _delivery: Delivery) -> Result<()> {
        let mut table = self.topics.lock().expect("bus table poisoned");
        table
            .entry(topic.to_string())
            .or_default()
            .push(self.tx.clone());
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<BusMessage>> {
        if !self.open {
            return Ok(None);
        }
        Ok(self.rx.recv().await)
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.open = false;
        let mut table = self.topics.lock().expect("bus table poisoned");
        for subscribers in table.values_mut() {
            subscribers.retain(|sub| !sub.same_channel(&self.tx));
        }
        Ok(())
    }
}
