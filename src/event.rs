//! Event schemas flowing through the pipeline.
//!
//! A detection event is created once by the producer and never mutated;
//! enrichment builds a new, superset event rather than editing in place.
//! Both sides of the contract live here so producer, worker, and monitor
//! agree on one serialized shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Detection Event
// ---------------------------------------------------------------------------

/// A raw defect-detection event as published on the input channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// Filesystem path of the frame this detection refers to. Must resolve to
    /// a readable file for enrichment to proceed.
    pub image_path: String,

    /// Classification label. The producer emits a placeholder; consumers must
    /// not assume it carries signal.
    #[serde(default = "default_defect_type")]
    pub defect_type: String,

    /// Detector confidence, [0,1] by contract. Out-of-range values are
    /// accepted on intake rather than rejected.
    pub confidence: f64,

    /// Event creation time (UTC).
    pub timestamp: DateTime<Utc>,

    /// Originating production line.
    #[serde(default)]
    pub line_id: String,
}

fn default_defect_type() -> String {
    "unknown".to_string()
}

impl DetectionEvent {
    pub fn new(
        image_path: impl Into<String>,
        defect_type: impl Into<String>,
        confidence: f64,
        line_id: impl Into<String>,
    ) -> Self {
        Self {
            image_path: image_path.into(),
            defect_type: defect_type.into(),
            confidence,
            timestamp: Utc::now(),
            line_id: line_id.into(),
        }
    }

    /// Final path component, for display.
    pub fn file_name(&self) -> &str {
        self.image_path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.image_path)
    }
}

// ---------------------------------------------------------------------------
// Enriched Event
// ---------------------------------------------------------------------------

/// Outcome of the reasoning call carried inside an enriched event.
///
/// A backend failure still produces an enriched event carrying the error
/// text in `reasoning`; the discriminant is what tells the two apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Ok,
    Error,
}

/// A detection event merged with the vision-agent analysis, as published on
/// the enriched channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedEvent {
    #[serde(flatten)]
    pub detection: DetectionEvent,

    /// Single-line analysis text. Sanitized: survives re-serialization intact.
    pub reasoning: String,

    /// Tag of the backend that produced `reasoning`.
    pub model_used: String,

    /// Identifier of the agent configuration used by the backend.
    pub agent_id: String,

    /// When enrichment completed. Always >= `detection.timestamp`.
    pub analyzed_at: DateTime<Utc>,

    /// Whether `reasoning` is an analysis or an embedded failure message.
    pub status: AnalysisStatus,
}

impl EnrichedEvent {
    /// Merge a detection with its analysis text.
    ///
    /// `reasoning` is sanitized here, and `analyzed_at` is clamped so it never
    /// precedes the detection timestamp even under clock skew.
    pub fn merge(
        detection: DetectionEvent,
        reasoning: &str,
        model_used: impl Into<String>,
        agent_id: impl Into<String>,
        status: AnalysisStatus,
    ) -> Self {
        let analyzed_at = Utc::now().max(detection.timestamp);
        Self {
            detection,
            reasoning: sanitize_reasoning(reasoning),
            model_used: model_used.into(),
            agent_id: agent_id.into(),
            analyzed_at,
            status,
        }
    }
}

// ---------------------------------------------------------------------------
// Sanitization
// ---------------------------------------------------------------------------

/// Normalize free-form analysis text into a single transport-safe line.
///
/// Newlines and tabs become spaces, double quotes become single quotes,
/// backslashes become forward slashes, remaining control characters are
/// dropped, and whitespace runs collapse to one space. The merged event is
/// re-serialized downstream, so none of these may survive.
pub fn sanitize_reasoning(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => ' ',
            '"' => '\'',
            '\\' => '/',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();

    // Collapses runs and trims both ends in one pass.
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}
