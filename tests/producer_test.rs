//! Producer tests: candidate scan order, cyclic selection, sampling bounds.

use linesight::bus::memory::MemoryBroker;
use linesight::bus::{Delivery, MessageBus};
use linesight::config::ProducerConfig;
use linesight::event::DetectionEvent;
use linesight::producer::{Producer, scan_images};
use std::fs;
use std::path::Path;
use std::time::Duration;

fn touch(dir: &Path, name: &str) {
    fs::write(dir.join(name), b"").unwrap();
}

fn test_config(dir: &Path) -> ProducerConfig {
    ProducerConfig {
        image_dir: dir.to_path_buf(),
        interval: Duration::from_secs(60),
        line_id: "line1".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Candidate scan
// ---------------------------------------------------------------------------

#[test]
fn scan_collects_jpg_and_png_sorted_by_path() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "c.jpg");
    touch(dir.path(), "a.png");
    touch(dir.path(), "b.jpeg");
    touch(dir.path(), "notes.txt");

    let images = scan_images(dir.path()).unwrap();
    let names: Vec<_> = images
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap())
        .collect();
    assert_eq!(names, ["a.png", "b.jpeg", "c.jpg"]);
}

#[test]
fn empty_image_dir_is_a_startup_error() {
    let dir = tempfile::tempdir().unwrap();
    let bus = MemoryBroker::new().client();
    let result = Producer::new(bus, "topic", test_config(dir.path()));
    assert!(result.is_err());
}

// ---------------------------------------------------------------------------
// Event construction
// ---------------------------------------------------------------------------

#[test]
fn next_event_cycles_through_candidates_and_wraps() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "a.jpg");
    touch(dir.path(), "b.jpg");
    touch(dir.path(), "c.jpg");

    let bus = MemoryBroker::new().client();
    let mut producer = Producer::new(bus, "topic", test_config(dir.path())).unwrap();

    let picks: Vec<String> = (0..7)
        .map(|_| {
            let event = producer.next_event();
            event.file_name().to_string()
        })
        .collect();
    assert_eq!(picks, ["a.jpg", "b.jpg", "c.jpg", "a.jpg", "b.jpg", "c.jpg", "a.jpg"]);
}

#[test]
fn sampled_confidence_stays_in_the_documented_sub_range() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "a.jpg");

    let bus = MemoryBroker::new().client();
    let mut producer = Producer::new(bus, "topic", test_config(dir.path())).unwrap();

    for _ in 0..200 {
        let event = producer.next_event();
        assert!(
            (0.55..=0.95).contains(&event.confidence),
            "confidence {} out of range",
            event.confidence
        );
        // Rounded to two decimals.
        assert_eq!((event.confidence * 100.0).round() / 100.0, event.confidence);
    }
}

#[test]
fn produced_events_carry_placeholder_classification() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "a.jpg");

    let bus = MemoryBroker::new().client();
    let mut producer = Producer::new(bus, "topic", test_config(dir.path())).unwrap();

    let event = producer.next_event();
    assert_eq!(event.defect_type, "unknown");
    assert_eq!(event.line_id, "line1");
    assert!(event.image_path.ends_with("a.jpg"));
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_next_emits_a_parseable_event_on_the_raw_topic() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "a.jpg");

    let broker = MemoryBroker::new();
    let mut sub = broker.client();
    sub.subscribe("factory/line1/defects", Delivery::AtLeastOnce).await.unwrap();

    let mut producer =
        Producer::new(broker.client(), "factory/line1/defects", test_config(dir.path())).unwrap();
    producer.publish_next().await.unwrap();

    let message = sub.next_message().await.unwrap().unwrap();
    let event: DetectionEvent = serde_json::from_slice(&message.payload).unwrap();
    assert_eq!(event.defect_type, "unknown");
    assert!(event.image_path.ends_with("a.jpg"));
}
