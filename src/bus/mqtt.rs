//! MQTT transport backed by rumqttc.
//!
//! Connection policy mirrors the pipeline contract: the initial connect fails
//! fast (no reconnect loop at startup), while transport errors after that are
//! logged and absorbed by the event loop's own retry. Subscriptions are
//! replayed on every CONNACK so they survive broker-side reconnects.

use crate::bus::{BusMessage, Delivery, MessageBus};
use crate::error::{Error, Result};
use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Wait between polls after a transport error, so a dead broker does not
/// busy-spin the loop.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Connection parameters for [`MqttBus::connect`].
#[derive(Debug, Clone)]
pub struct MqttBusOptions {
    pub host: String,
    pub port: u16,
    /// Human-readable prefix; a random suffix keeps concurrent instances from
    /// stealing each other's session.
    pub client_id_prefix: String,
    /// Persistent session: the broker queues QoS 1 messages across reconnects.
    pub clean_session: bool,
}

impl MqttBusOptions {
    pub fn new(host: impl Into<String>, port: u16, client_id_prefix: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            client_id_prefix: client_id_prefix.into(),
            clean_session: true,
        }
    }

    pub fn clean_session(mut self, clean: bool) -> Self {
        self.clean_session = clean;
        self
    }
}

/// An MQTT connection owned by one pipeline component.
pub struct MqttBus {
    client: AsyncClient,
    eventloop: EventLoop,
    /// Replayed on reconnect.
    subscriptions: Vec<(String, QoS)>,
}

impl MqttBus {
    /// Connect and wait for the broker's CONNACK.
    ///
    /// # Errors
    /// Returns an error if the broker is unreachable or refuses the session.
    /// Startup connectivity failure is fatal by contract.
    pub async fn connect(options: MqttBusOptions) -> Result<Self> {
        let client_id = format!(
            "{}-{}",
            options.client_id_prefix,
            &Uuid::new_v4().to_string()[..8]
        );
        info!(host = %options.host, port = options.port, %client_id, "connecting to broker");

        let mut mqtt_options = MqttOptions::new(client_id, &options.host, options.port);
        mqtt_options.set_keep_alive(Duration::from_secs(60));
        mqtt_options.set_clean_session(options.clean_session);

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, 16);

        // Drive the event loop until the broker acknowledges the session.
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        info!("connected to broker");
                        break;
                    }
                    return Err(Error::Config(format!(
                        "broker refused connection: {:?}",
                        ack.code
                    )));
                }
                Ok(_) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Self {
            client,
            eventloop,
            subscriptions: Vec::new(),
        })
    }

    async fn replay_subscriptions(&mut self) {
        for (topic, qos) in self.subscriptions.clone() {
            if let Err(e) = self.client.subscribe(&topic, qos).await {
                warn!(%topic, "resubscribe failed: {e}");
            }
        }
    }
}

fn qos_for(delivery: Delivery) -> QoS {
    match delivery {
        Delivery::BestEffort => QoS::AtMostOnce,
        Delivery::AtLeastOnce => QoS::AtLeastOnce,
    }
}

#[async_trait]
impl MessageBus for MqttBus {
    async fn publish(&mut self, topic: &str, payload: Vec<u8>, delivery: Delivery) -> Result<()> {
        self.client
            .publish(topic, qos_for(delivery), false, payload)
            .await?;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, delivery: Delivery) -> Result<()> {
        let qos = qos_for(delivery);
        self.client.subscribe(topic, qos).await?;
        self.subscriptions.push((topic.to_string(), qos));
        info!(%topic, ?qos, "subscribed");
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<BusMessage>> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Ok(Some(BusMessage {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                    }));
                }
                Ok(Event::Incoming(Packet::ConnAck(ack)))
                    if ack.code == ConnectReturnCode::Success =>
                {
                    // Reconnected mid-stream; restore subscriptions.
                    info!("reconnected to broker");
                    self.replay_subscriptions().await;
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    info!("broker closed the connection");
                    return Ok(None);
                }
                Ok(event) => {
                    debug!(?event, "bus event");
                }
                Err(e) => {
                    warn!("transport error: {e}, retrying");
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                }
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.client.disconnect().await?;
        // Drive the loop until the connection closes so queued packets are
        // flushed. Bounded: shutdown must not hang on a dead broker.
        let drain = async {
            while self.eventloop.poll().await.is_ok() {}
        };
        let _ = tokio::time::timeout(Duration::from_secs(2), drain).await;
        Ok(())
    }
}
