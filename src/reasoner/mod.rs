//! Reasoning backend boundary.
//!
//! The external vision service reduces to one capability: hand it an image
//! and the inspection prompt, get free text back. Behind [`Reasoner`] the
//! production agent-service client and test mocks are interchangeable.

pub mod foundry;

use crate::error::Result;
use crate::imaging::ImagePayload;
use async_trait::async_trait;

/// Instruction sent with every frame. Asks for a structured but free-text
/// assessment ending in a pass/fail recommendation.
pub const INSPECTION_PROMPT: &str = "\
You are a visual quality inspection agent for a production packaging line. \
Examine the attached photo of one package and describe in clear text any \
visual problems you observe. Focus on: \
1. Physical damage: dents, tears, holes, or structural deformation. \
2. Label issues: missing, misaligned, wrinkled, or damaged labels. \
3. Seal and tape problems: gaps, misplacement, or adhesion failures. \
4. Corner integrity: crushing, separation, or wear. \
5. Overall condition: general packaging quality and appearance. \
For each defect found, state its severity (minor, moderate, severe) and its \
location on the package. Finish with an overall pass/fail recommendation. \
If the package is flawless, say so explicitly. Be specific and objective.";

/// A vision-analysis backend.
///
/// `analyze` is called at most once per event and is blocking from the
/// worker's point of view: no retry, no timeout.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Analyze a prepared image, returning the backend's free-text findings.
    async fn analyze(&self, image: &ImagePayload) -> Result<String>;

    /// Tag recorded as `model_used` on enriched events.
    fn model_tag(&self) -> &str;

    /// Backend-specific identifier of the agent configuration in use.
    fn agent_id(&self) -> &str;
}
