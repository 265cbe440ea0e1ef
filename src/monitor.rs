//! Monitor: renders both channels to the terminal.
//!
//! Subscribes to the raw and enriched topics, classifies each message by its
//! originating topic, and prints a boxed summary. Malformed payloads are
//! reported per message; the subscription loop never dies on one.

use crate::bus::{BusMessage, Delivery, MessageBus};
use crate::error::Result;
use crate::event::{AnalysisStatus, DetectionEvent, EnrichedEvent};
use chrono::Local;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Inner width of the rendered boxes.
const BOX_WIDTH: usize = 72;

pub struct Monitor<B: MessageBus> {
    bus: B,
    raw_topic: String,
    enriched_topic: String,
    received: u64,
    shutdown: Arc<Notify>,
}

impl<B: MessageBus> Monitor<B> {
    pub fn new(bus: B, raw_topic: impl Into<String>, enriched_topic: impl Into<String>) -> Self {
        Self {
            bus,
            raw_topic: raw_topic.into(),
            enriched_topic: enriched_topic.into(),
            received: 0,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle for signalling shutdown from another task.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    fn render(&self, message: &BusMessage) {
        if message.topic == self.enriched_topic {
            match serde_json::from_slice::<EnrichedEvent>(&message.payload) {
                Ok(event) => print_enriched(&event),
                Err(e) => print_malformed(&message.topic, &e.to_string(), &message.payload),
            }
        } else {
            match serde_json::from_slice::<DetectionEvent>(&message.payload) {
                Ok(event) => print_detection(&event),
                Err(e) => print_malformed(&message.topic, &e.to_string(), &message.payload),
            }
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        print_banner();
        self.bus
            .subscribe(&self.raw_topic, Delivery::AtLeastOnce)
            .await?;
        self.bus
            .subscribe(&self.enriched_topic, Delivery::BestEffort)
            .await?;
        info!(raw = %self.raw_topic, enriched = %self.enriched_topic, "monitoring both channels");

        loop {
            let message = tokio::select! {
                _ = self.shutdown.notified() => break,
                msg = self.bus.next_message() => msg?,
            };
            let Some(message) = message else { break };

            self.received += 1;
            self.render(&message);
        }

        info!(total = self.received, "monitor stopping");
        self.bus.disconnect().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Word-wrap `text` into lines at most `width` characters wide. Words longer
/// than the width get a line of their own rather than being split.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.len() + 1 + word.len() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Bucket a confidence score for display.
pub fn confidence_label(confidence: f64) -> &'static str {
    if confidence >= 0.8 {
        "high"
    } else if confidence >= 0.6 {
        "medium"
    } else {
        "low"
    }
}

fn now_stamp() -> String {
    Local::now().format("%H:%M:%S%.3f").to_string()
}

fn print_banner() {
    println!("{}", "═".repeat(BOX_WIDTH + 2));
    println!("{:^w$}", "FACTORY LINE MONITOR", w = BOX_WIDTH + 2);
    println!("{:^w$}", "raw detections + vision analysis", w = BOX_WIDTH + 2);
    println!("{}", "═".repeat(BOX_WIDTH + 2));
}

fn print_detection(event: &DetectionEvent) {
    println!("┌{}", "─".repeat(BOX_WIDTH));
    println!("│ CV DETECTION  {}", now_stamp());
    println!("│   file:       {}", event.file_name());
    println!("│   type:       {}", event.defect_type);
    println!(
        "│   confidence: {:.2} ({})",
        event.confidence,
        confidence_label(event.confidence)
    );
    println!("│   line:       {}", event.line_id);
    println!("└{}", "─".repeat(BOX_WIDTH));
}

fn print_enriched(event: &EnrichedEvent) {
    let status = match event.status {
        AnalysisStatus::Ok => "ok",
        AnalysisStatus::Error => "ERROR",
    };
    println!("┌{}", "─".repeat(BOX_WIDTH));
    println!("│ AI ANALYSIS  {}", now_stamp());
    println!("│   file:        {}", event.detection.file_name());
    println!("│   model:       {}", event.model_used);
    println!("│   agent:       {}", event.agent_id);
    println!("│   status:      {status}");
    println!("│   analyzed at: {}", event.analyzed_at.to_rfc3339());
    println!("├{}", "─".repeat(BOX_WIDTH));
    for line in wrap_text(&event.reasoning, BOX_WIDTH - 4) {
        println!("│   {line}");
    }
    println!("└{}", "─".repeat(BOX_WIDTH));
}

fn print_malformed(topic: &str, error: &str, payload: &[u8]) {
    let raw = String::from_utf8_lossy(payload);
    let preview: String = raw.chars().take(100).collect();
    warn!(%topic, "malformed payload: {error}");
    println!("┌{}", "─".repeat(BOX_WIDTH));
    println!("│ MALFORMED MESSAGE  {}", now_stamp());
    println!("│   topic: {topic}");
    println!("│   error: {error}");
    println!("│   raw:   {preview}");
    println!("└{}", "─".repeat(BOX_WIDTH));
}
