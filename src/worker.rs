//! Enrichment worker: raw detections in, analyzed events out.
//!
//! One reasoning call per event, serialized with the receive loop: while an
//! analysis is in flight no further messages are handled, and throughput is
//! bounded by backend latency. Running several workers against the same input
//! topic duplicates enrichment; the pipeline offers no claim protocol.

use crate::bus::{Delivery, MessageBus};
use crate::error::Result;
use crate::event::{AnalysisStatus, DetectionEvent, EnrichedEvent};
use crate::imaging;
use crate::reasoner::Reasoner;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// The enrichment component. Owns its bus connection and backend client;
/// the message counter is instance state, never a process-wide global.
pub struct EnrichmentWorker<B: MessageBus, R: Reasoner> {
    bus: B,
    reasoner: R,
    input_topic: String,
    output_topic: String,
    received: u64,
    shutdown: Arc<Notify>,
}

impl<B: MessageBus, R: Reasoner> EnrichmentWorker<B, R> {
    pub fn new(
        bus: B,
        reasoner: R,
        input_topic: impl Into<String>,
        output_topic: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            reasoner,
            input_topic: input_topic.into(),
            output_topic: output_topic.into(),
            received: 0,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle for signalling shutdown from another task.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Enrich one detection.
    ///
    /// Returns `Ok(None)` when the referenced image does not exist: the
    /// event is dropped with a single notice and nothing is published, not
    /// even an error event. A backend failure is not a drop; it yields an
    /// enriched event whose `reasoning` carries the sanitized error text and
    /// whose status says `error`.
    pub async fn enrich(&self, event: DetectionEvent) -> Result<Option<EnrichedEvent>> {
        let path = Path::new(&event.image_path);
        if !path.is_file() {
            warn!(image = %event.image_path, "missing or invalid image, dropping event");
            return Ok(None);
        }

        let payload = imaging::prepare(path)?;
        let (text, status) = match self.reasoner.analyze(&payload).await {
            Ok(text) => (text, AnalysisStatus::Ok),
            Err(e) => {
                error!("image analysis failed: {e}");
                (format!("Image analysis failed: {e}"), AnalysisStatus::Error)
            }
        };

        Ok(Some(EnrichedEvent::merge(
            event,
            &text,
            self.reasoner.model_tag(),
            self.reasoner.agent_id(),
            status,
        )))
    }

    /// Parse one raw payload, enrich it, and publish the result.
    ///
    /// Exactly one enriched event is published per parseable input whose
    /// image exists. Publish failures are logged, never retried.
    pub async fn handle_payload(&mut self, payload: &[u8]) -> Result<()> {
        let event: DetectionEvent = serde_json::from_slice(payload)?;
        info!(seq = self.received, file = event.file_name(), "processing detection");

        let Some(enriched) = self.enrich(event).await? else {
            return Ok(());
        };

        let body = serde_json::to_vec(&enriched)?;
        match self
            .bus
            .publish(&self.output_topic, body, Delivery::BestEffort)
            .await
        {
            Ok(()) => info!(
                file = enriched.detection.file_name(),
                status = ?enriched.status,
                "enriched event published"
            ),
            Err(e) => error!("publish failed: {e}"),
        }
        Ok(())
    }

    /// Receive loop. One bad message never stops the stream; an in-flight
    /// analysis always completes before shutdown is observed.
    pub async fn run(&mut self) -> Result<()> {
        self.bus
            .subscribe(&self.input_topic, Delivery::AtLeastOnce)
            .await?;
        info!(input = %self.input_topic, output = %self.output_topic, "worker ready");

        loop {
            let message = tokio::select! {
                _ = self.shutdown.notified() => break,
                msg = self.bus.next_message() => msg?,
            };

            let Some(message) = message else { break };
            self.received += 1;

            if let Err(e) = self.handle_payload(&message.payload).await {
                error!(topic = %message.topic, "error processing message: {e}");
            }
        }

        info!(total = self.received, "worker stopping");
        self.bus.disconnect().await?;
        Ok(())
    }
}
