//! Detection-event producer.
//!
//! Walks a sorted image list cyclically, emitting one synthetic detection per
//! tick with a freshly sampled confidence. The classification label is a
//! placeholder a real detector would fill in; consumers are told not to
//! trust it.

use crate::bus::{Delivery, MessageBus};
use crate::config::ProducerConfig;
use crate::error::{Error, Result};
use crate::event::DetectionEvent;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info};

/// Confidence is sampled uniformly from this sub-range and rounded to two
/// decimals. The schema admits any float; the producer just never exercises
/// the full range.
const CONFIDENCE_RANGE: (f64, f64) = (0.55, 0.95);

/// Placeholder classification on every produced event.
const DEFECT_PLACEHOLDER: &str = "unknown";

/// The producer component. All counters and the RNG are instance state;
/// multiple producers can coexist in one process.
pub struct Producer<B: MessageBus> {
    bus: B,
    topic: String,
    config: ProducerConfig,
    images: Vec<PathBuf>,
    cursor: usize,
    published: u64,
    rng: StdRng,
    shutdown: Arc<Notify>,
}

/// Collect `*.jpg` and `*.png` under `dir`, sorted by path.
pub fn scan_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    let entries = std::fs::read_dir(dir)
        .map_err(|e| Error::Config(format!("cannot read image dir {}: {e}", dir.display())))?;

    for entry in entries {
        let path = entry?.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        if matches!(ext.as_deref(), Some("jpg" | "jpeg" | "png")) {
            images.push(path);
        }
    }

    images.sort();
    Ok(images)
}

impl<B: MessageBus> Producer<B> {
    /// Build a producer over the images currently in the configured directory.
    ///
    /// # Errors
    /// Fails if the directory is unreadable or holds no candidate images.
    pub fn new(bus: B, topic: impl Into<String>, config: ProducerConfig) -> Result<Self> {
        let images = scan_images(&config.image_dir)?;
        if images.is_empty() {
            return Err(Error::Config(format!(
                "no images found in {}, generate some first",
                config.image_dir.display()
            )));
        }
        info!(count = images.len(), dir = %config.image_dir.display(), "image candidates loaded");

        Ok(Self {
            bus,
            topic: topic.into(),
            config,
            images,
            cursor: 0,
            published: 0,
            rng: StdRng::from_entropy(),
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// Handle for signalling shutdown from another task.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Build the next event: advance the cursor (wrapping past the end) and
    /// sample a fresh confidence.
    pub fn next_event(&mut self) -> DetectionEvent {
        let image = &self.images[self.cursor % self.images.len()];
        self.cursor = (self.cursor + 1) % self.images.len();

        let raw: f64 = self.rng.gen_range(CONFIDENCE_RANGE.0..=CONFIDENCE_RANGE.1);
        let confidence = (raw * 100.0).round() / 100.0;

        DetectionEvent::new(
            image.to_string_lossy(),
            DEFECT_PLACEHOLDER,
            confidence,
            &self.config.line_id,
        )
    }

    /// Publish one event now. Failures are reported to the caller but leave
    /// the producer ready for the next tick.
    pub async fn publish_next(&mut self) -> Result<DetectionEvent> {
        let event = self.next_event();
        let payload = serde_json::to_vec(&event)?;
        self.bus
            .publish(&self.topic, payload, Delivery::AtLeastOnce)
            .await?;
        self.published += 1;
        Ok(event)
    }

    /// Tick loop: publish, wait, repeat until shutdown.
    ///
    /// The bus is still serviced between ticks (keep-alive, flushing queued
    /// packets), which is what the `next_message` arm is for. The producer
    /// subscribes to nothing, so that arm never yields a message in practice.
    pub async fn run(&mut self) -> Result<()> {
        print_banner(&self.topic, self.images.len(), &self.config);

        'ticks: loop {
            match self.publish_next().await {
                Ok(event) => {
                    print_published(&event, self.published, &self.topic);
                    info!(seq = self.published, file = event.file_name(), "event published");
                }
                // Non-fatal: try the next image on the next tick regardless.
                Err(e) => error!("publish failed: {e}"),
            }

            let deadline = tokio::time::sleep(self.config.interval);
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = self.shutdown.notified() => break 'ticks,
                    _ = &mut deadline => continue 'ticks,
                    message = self.bus.next_message() => {
                        if message?.is_none() {
                            break 'ticks;
                        }
                    }
                }
            }
        }

        info!(total = self.published, "producer stopping");
        self.bus.disconnect().await?;
        Ok(())
    }
}

fn print_banner(topic: &str, image_count: usize, config: &ProducerConfig) {
    println!("{}", "=".repeat(72));
    println!("{:^72}", "DEFECT PUBLISHER");
    println!(
        "{:^72}",
        format!("{} - automated defect detection", config.line_id)
    );
    println!("{}", "=".repeat(72));
    println!(
        "  {image_count} image(s), one event every {}s -> {topic}",
        config.interval.as_secs()
    );
}

fn print_published(event: &DetectionEvent, seq: u64, topic: &str) {
    println!("┌{}", "─".repeat(71));
    println!("│ PUBLISHED #{seq}");
    println!("│   image:      {}", event.file_name());
    println!("│   defect:     {}", event.defect_type);
    println!("│   confidence: {:.2}", event.confidence);
    println!("│   timestamp:  {}", event.timestamp.to_rfc3339());
    println!("│   topic:      {topic}");
    println!("└{}", "─".repeat(71));
}
