//! Typed configuration from environment variables.
//!
//! Every knob has a documented default; the reasoning-service API key is the
//! one required variable, and only the `enrich` subcommand asks for it.
//! Sensitive values are wrapped in secrecy::SecretString to prevent log
//! leaks.
//!
//! In local dev, call `dotenvy::dotenv().ok()` before loading.

use crate::error::{Error, Result};
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

/// Shared pipeline configuration: broker address and channel names.
#[derive(Debug, Clone)]
pub struct Config {
    /// Broker hostname (`MQTT_BROKER`, default "localhost").
    pub broker_host: String,
    /// Broker port (`MQTT_PORT`, default 1883).
    pub broker_port: u16,
    /// Raw detection topic (`MQTT_INPUT_TOPIC`, default "factory/line1/defects").
    pub raw_topic: String,
    /// Enriched topic (`MQTT_OUTPUT_TOPIC`, default "factory/line1/defects/enriched").
    pub enriched_topic: String,
    /// Log filter when `RUST_LOG` is unset (`LOG_LEVEL`, default "info").
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            broker_host: var_or("MQTT_BROKER", "localhost"),
            broker_port: parsed_var("MQTT_PORT", 1883)?,
            raw_topic: var_or("MQTT_INPUT_TOPIC", "factory/line1/defects"),
            enriched_topic: var_or("MQTT_OUTPUT_TOPIC", "factory/line1/defects/enriched"),
            log_level: var_or("LOG_LEVEL", "info"),
        })
    }
}

/// Producer-only configuration.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Directory scanned for candidate images (`IMG_DIR`, default "./data/images").
    pub image_dir: PathBuf,
    /// Seconds between published events (`PUBLISH_INTERVAL_SECS`, default 60).
    pub interval: Duration,
    /// Originating production line (`LINE_ID`, default "line1").
    pub line_id: String,
}

impl ProducerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            image_dir: PathBuf::from(var_or("IMG_DIR", "./data/images")),
            interval: Duration::from_secs(parsed_var("PUBLISH_INTERVAL_SECS", 60)?),
            line_id: var_or("LINE_ID", "line1"),
        })
    }
}

/// Reasoning-service configuration, loaded only by the enrichment worker.
#[derive(Debug)]
pub struct ReasonerConfig {
    /// Agent-service project endpoint (`AZURE_PROJECT_ENDPOINT`).
    pub endpoint: String,
    /// Agent identifier within the project (`AGENT_ID`).
    pub agent_id: String,
    /// API key for the agent service (`AZURE_API_KEY`, required).
    pub api_key: SecretString,
}

impl ReasonerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            endpoint: var_or(
                "AZURE_PROJECT_ENDPOINT",
                "https://example.services.ai.azure.com/api/projects/firstProject",
            ),
            agent_id: var_or("AGENT_ID", "asst_placeholder"),
            api_key: SecretString::from(required_var("AZURE_API_KEY")?),
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("cannot parse {name}={raw}"))),
        Err(_) => Ok(default),
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}
