//! Agent-service client for the cloud vision backend.
//!
//! Each analysis is one thread lifecycle against the project endpoint:
//! create a thread, post the prompt plus image as one user message, start a
//! run for the configured agent, poll it to a terminal state, read the
//! agent's reply, then delete the thread. Thread deletion is best-effort;
//! failures are logged and never propagated.

use crate::config::ReasonerConfig;
use crate::error::{Error, Result};
use crate::imaging::ImagePayload;
use crate::reasoner::{INSPECTION_PROMPT, Reasoner};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

const API_VERSION: &str = "2025-05-01";
const RUN_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub const MODEL_TAG: &str = "azure_foundry_agent";

/// Client for the agent service. One instance per worker; per-analysis state
/// lives in short-lived threads on the service side.
pub struct FoundryReasoner {
    http: reqwest::Client,
    endpoint: String,
    agent_id: String,
    api_key: SecretString,
}

#[derive(Debug, Deserialize)]
struct ThreadRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunState {
    id: String,
    status: String,
    last_error: Option<RunError>,
}

#[derive(Debug, Deserialize)]
struct RunError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<ThreadMessage>,
}

#[derive(Debug, Deserialize)]
struct ThreadMessage {
    role: String,
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<TextValue>,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    value: String,
}

impl FoundryReasoner {
    pub fn new(config: ReasonerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Reasoner(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            agent_id: config.agent_id,
            api_key: config.api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}?api-version={API_VERSION}", self.endpoint)
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;
        check_status(resp, path).await
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await?;
        check_status(resp, path).await
    }

    async fn create_thread(&self) -> Result<ThreadRef> {
        let thread: ThreadRef = self.post("threads", json!({})).await?.json().await?;
        debug!(thread_id = %thread.id, "thread created");
        Ok(thread)
    }

    async fn post_message(&self, thread_id: &str, image: &ImagePayload) -> Result<()> {
        let body = json!({
            "role": "user",
            "content": [
                { "type": "text", "text": INSPECTION_PROMPT },
                { "type": "image_url", "image_url": { "url": image.data_url, "detail": "high" } },
            ],
        });
        self.post(&format!("threads/{thread_id}/messages"), body)
            .await?;
        Ok(())
    }

    /// Start a run and poll it to a terminal state. No timeout: a hung run
    /// hangs the worker, which is the pipeline's documented behavior.
    async fn run_to_completion(&self, thread_id: &str) -> Result<()> {
        let run: RunState = self
            .post(
                &format!("threads/{thread_id}/runs"),
                json!({ "assistant_id": self.agent_id }),
            )
            .await?
            .json()
            .await?;

        let mut state = run;
        loop {
            if state.status == "completed" {
                return Ok(());
            }
            if matches!(state.status.as_str(), "failed" | "cancelled" | "expired") {
                let status = state.status;
                let detail = state
                    .last_error
                    .map(|e| e.message)
                    .unwrap_or_else(|| status.clone());
                return Err(Error::Reasoner(format!("agent run {status}: {detail}")));
            }

            tokio::time::sleep(RUN_POLL_INTERVAL).await;
            state = self
                .get(&format!("threads/{thread_id}/runs/{}", state.id))
                .await?
                .json()
                .await?;
        }
    }

    async fn read_reply(&self, thread_id: &str) -> Result<String> {
        let list: MessageList = self
            .get(&format!("threads/{thread_id}/messages"))
            .await?
            .json()
            .await?;

        let reply = list
            .data
            .iter()
            .filter(|m| m.role == "assistant")
            .flat_map(|m| &m.content)
            .find(|block| block.kind == "text")
            .and_then(|block| block.text.as_ref())
            .map(|text| text.value.clone());

        reply.ok_or_else(|| Error::Reasoner("no analysis response received from agent".into()))
    }

    /// Release the per-analysis thread. Failures are logged, not propagated.
    async fn delete_thread(&self, thread_id: &str) {
        let result = self
            .http
            .delete(self.url(&format!("threads/{thread_id}")))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!(%thread_id, "thread deleted");
            }
            Ok(resp) => warn!(%thread_id, status = %resp.status(), "thread cleanup refused"),
            Err(e) => warn!(%thread_id, "thread cleanup failed: {e}"),
        }
    }
}

async fn check_status(resp: reqwest::Response, path: &str) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Reasoner(format!("{path}: HTTP {status}: {body}")))
}

#[async_trait]
impl Reasoner for FoundryReasoner {
    async fn analyze(&self, image: &ImagePayload) -> Result<String> {
        let thread = self.create_thread().await?;

        // Hold the thread id so cleanup runs whether or not the run succeeds.
        let analysis = async {
            self.post_message(&thread.id, image).await?;
            self.run_to_completion(&thread.id).await?;
            self.read_reply(&thread.id).await
        }
        .await;

        self.delete_thread(&thread.id).await;

        let text = analysis?;
        info!(chars = text.len(), "analysis received");
        Ok(text)
    }

    fn model_tag(&self) -> &str {
        MODEL_TAG
    }

    fn agent_id(&self) -> &str {
        &self.agent_id
    }
}
