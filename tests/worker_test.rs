//! Enrichment worker tests: the pipeline's core contract, exercised against
//! the in-process bus with a mock reasoning backend.

use async_trait::async_trait;
use image::DynamicImage;
use linesight::bus::memory::MemoryBroker;
use linesight::bus::{Delivery, MessageBus};
use linesight::error::{Error, Result};
use linesight::event::{AnalysisStatus, DetectionEvent, EnrichedEvent};
use linesight::imaging::ImagePayload;
use linesight::reasoner::Reasoner;
use linesight::worker::EnrichmentWorker;
use std::path::Path;
use std::time::Duration;
use tokio::time::timeout;

const RAW_TOPIC: &str = "factory/line1/defects";
const ENRICHED_TOPIC: &str = "factory/line1/defects/enriched";

/// Window after which we declare "no enriched event appeared".
const PROCESSING_WINDOW: Duration = Duration::from_millis(200);

// ---------------------------------------------------------------------------
// Mock backend
// ---------------------------------------------------------------------------

struct MockReasoner {
    reply: String,
    fail: bool,
}

impl MockReasoner {
    fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            reply: String::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl Reasoner for MockReasoner {
    async fn analyze(&self, _image: &ImagePayload) -> Result<String> {
        if self.fail {
            Err(Error::Reasoner("service unavailable".to_string()))
        } else {
            Ok(self.reply.clone())
        }
    }

    fn model_tag(&self) -> &str {
        "mock_backend"
    }

    fn agent_id(&self) -> &str {
        "agent-test-1"
    }
}

fn write_test_image(dir: &Path, name: &str) -> String {
    let path = dir.join(name);
    DynamicImage::new_rgb8(32, 32).save(&path).unwrap();
    path.to_string_lossy().into_owned()
}

fn detection(image_path: &str) -> DetectionEvent {
    DetectionEvent::new(image_path, "unknown", 0.7, "line1")
}

fn test_worker(
    broker: &MemoryBroker,
    reasoner: MockReasoner,
) -> EnrichmentWorker<linesight::bus::memory::MemoryBus, MockReasoner> {
    EnrichmentWorker::new(broker.client(), reasoner, RAW_TOPIC, ENRICHED_TOPIC)
}

// ---------------------------------------------------------------------------
// enrich: one in, one out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn enrich_merges_analysis_into_a_superset_event() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = write_test_image(dir.path(), "frame.png");
    let worker = test_worker(
        &MemoryBroker::new(),
        MockReasoner::replying("no visual defects detected, pass"),
    );

    let event = detection(&image_path);
    let enriched = worker.enrich(event.clone()).await.unwrap().unwrap();

    assert_eq!(enriched.detection, event);
    assert_eq!(enriched.reasoning, "no visual defects detected, pass");
    assert_eq!(enriched.model_used, "mock_backend");
    assert_eq!(enriched.agent_id, "agent-test-1");
    assert_eq!(enriched.status, AnalysisStatus::Ok);
    assert!(enriched.analyzed_at >= enriched.detection.timestamp);
}

#[tokio::test]
async fn enrich_sanitizes_backend_text() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = write_test_image(dir.path(), "frame.png");
    let worker = test_worker(
        &MemoryBroker::new(),
        MockReasoner::replying("line one\nline two\t\"quoted\"\\slash"),
    );

    let enriched = worker.enrich(detection(&image_path)).await.unwrap().unwrap();
    assert_eq!(enriched.reasoning, "line one line two 'quoted'/slash");
    assert!(!enriched.reasoning.contains('\n'));
}

#[tokio::test]
async fn enrich_drops_events_with_missing_images() {
    let worker = test_worker(&MemoryBroker::new(), MockReasoner::replying("unused"));
    let result = worker.enrich(detection("/nonexistent/frame.jpg")).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn backend_failure_degrades_to_an_error_status_event() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = write_test_image(dir.path(), "frame.png");
    let worker = test_worker(&MemoryBroker::new(), MockReasoner::failing());

    let enriched = worker.enrich(detection(&image_path)).await.unwrap().unwrap();
    assert_eq!(enriched.status, AnalysisStatus::Error);
    assert!(enriched.reasoning.contains("Image analysis failed"));
    assert!(enriched.reasoning.contains("service unavailable"));
    assert!(!enriched.reasoning.contains('\n'));
}

// ---------------------------------------------------------------------------
// End to end over the bus
// ---------------------------------------------------------------------------

#[tokio::test]
async fn raw_event_with_existing_image_yields_exactly_one_enriched_message() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = write_test_image(dir.path(), "a.jpg");

    let broker = MemoryBroker::new();
    let mut consumer = broker.client();
    consumer.subscribe(ENRICHED_TOPIC, Delivery::BestEffort).await.unwrap();

    let mut worker = test_worker(&broker, MockReasoner::replying("all rows evenly packed, pass"));
    let shutdown = worker.shutdown_handle();
    let handle = tokio::spawn(async move { worker.run().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let raw = format!(
        r#"{{"image_path":"{image_path}","defect_type":"unknown","confidence":0.7,"timestamp":"2024-01-01T00:00:00Z","line_id":"line1"}}"#
    );
    broker
        .client()
        .publish(RAW_TOPIC, raw.into_bytes(), Delivery::AtLeastOnce)
        .await
        .unwrap();

    let message = timeout(Duration::from_secs(2), consumer.next_message())
        .await
        .expect("enriched event should appear")
        .unwrap()
        .unwrap();

    let enriched: EnrichedEvent = serde_json::from_slice(&message.payload).unwrap();
    assert_eq!(enriched.agent_id, "agent-test-1");
    assert!(!enriched.reasoning.is_empty());
    assert!(!enriched.reasoning.contains('\n'));
    assert_eq!(enriched.detection.image_path, image_path);

    // Exactly one: nothing else within the processing window.
    assert!(timeout(PROCESSING_WINDOW, consumer.next_message()).await.is_err());

    shutdown.notify_one();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn raw_event_with_nonexistent_image_yields_no_enriched_message() {
    let broker = MemoryBroker::new();
    let mut consumer = broker.client();
    consumer.subscribe(ENRICHED_TOPIC, Delivery::BestEffort).await.unwrap();

    let mut worker = test_worker(&broker, MockReasoner::replying("unused"));
    let shutdown = worker.shutdown_handle();
    let handle = tokio::spawn(async move { worker.run().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let raw = r#"{"image_path":"/missing/a.jpg","defect_type":"unknown","confidence":0.7,"timestamp":"2024-01-01T00:00:00Z","line_id":"line1"}"#;
    broker
        .client()
        .publish(RAW_TOPIC, raw.as_bytes().to_vec(), Delivery::AtLeastOnce)
        .await
        .unwrap();

    assert!(timeout(PROCESSING_WINDOW, consumer.next_message()).await.is_err());

    shutdown.notify_one();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn malformed_payload_does_not_stop_the_stream() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = write_test_image(dir.path(), "b.jpg");

    let broker = MemoryBroker::new();
    let mut consumer = broker.client();
    consumer.subscribe(ENRICHED_TOPIC, Delivery::BestEffort).await.unwrap();

    let mut worker = test_worker(&broker, MockReasoner::replying("pass"));
    let shutdown = worker.shutdown_handle();
    let handle = tokio::spawn(async move { worker.run().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut publisher = broker.client();
    publisher
        .publish(RAW_TOPIC, b"{not json".to_vec(), Delivery::AtLeastOnce)
        .await
        .unwrap();

    let event = detection(&image_path);
    publisher
        .publish(RAW_TOPIC, serde_json::to_vec(&event).unwrap(), Delivery::AtLeastOnce)
        .await
        .unwrap();

    // The good event after the bad one still gets enriched.
    let message = timeout(Duration::from_secs(2), consumer.next_message())
        .await
        .expect("stream should survive the malformed payload")
        .unwrap()
        .unwrap();
    let enriched: EnrichedEvent = serde_json::from_slice(&message.payload).unwrap();
    assert_eq!(enriched.detection.image_path, image_path);

    shutdown.notify_one();
    handle.await.unwrap().unwrap();
}
