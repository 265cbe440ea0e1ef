//! linesight CLI — runs one pipeline component per process.

use clap::{Parser, Subcommand};
use linesight::bus::mqtt::{MqttBus, MqttBusOptions};
use linesight::config::{Config, ProducerConfig, ReasonerConfig};
use linesight::monitor::Monitor;
use linesight::producer::Producer;
use linesight::reasoner::foundry::FoundryReasoner;
use linesight::telemetry::init_telemetry;
use linesight::worker::EnrichmentWorker;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Parser)]
#[command(name = "linesight", about = "Defect-detection relay pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Publish synthetic detection events on an interval
    Publish,
    /// Enrich raw detections with vision-agent analysis
    Enrich,
    /// Render raw and enriched traffic to the terminal
    Monitor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_telemetry(&config.log_level)?;

    match cli.command {
        Command::Publish => cmd_publish(config).await,
        Command::Enrich => cmd_enrich(config).await,
        Command::Monitor => cmd_monitor(config).await,
    }
}

/// Notify the handle on ctrl-c; each component observes it between messages,
/// so in-flight work completes before exit.
fn shutdown_on_ctrl_c(handle: Arc<Notify>) {
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        handle.notify_one();
    });
}

async fn cmd_publish(config: Config) -> anyhow::Result<()> {
    let bus = MqttBus::connect(MqttBusOptions::new(
        &config.broker_host,
        config.broker_port,
        "cv-publisher",
    ))
    .await?;

    let mut producer = Producer::new(bus, &config.raw_topic, ProducerConfig::from_env()?)?;
    shutdown_on_ctrl_c(producer.shutdown_handle());
    producer.run().await?;
    Ok(())
}

async fn cmd_enrich(config: Config) -> anyhow::Result<()> {
    let reasoner = FoundryReasoner::new(ReasonerConfig::from_env()?)?;

    // Persistent session: the broker holds QoS 1 detections across restarts.
    let bus = MqttBus::connect(
        MqttBusOptions::new(&config.broker_host, config.broker_port, "vision-reasoner")
            .clean_session(false),
    )
    .await?;

    let mut worker = EnrichmentWorker::new(bus, reasoner, &config.raw_topic, &config.enriched_topic);
    shutdown_on_ctrl_c(worker.shutdown_handle());
    worker.run().await?;
    Ok(())
}

async fn cmd_monitor(config: Config) -> anyhow::Result<()> {
    let bus = MqttBus::connect(MqttBusOptions::new(
        &config.broker_host,
        config.broker_port,
        "factory-monitor",
    ))
    .await?;

    let mut monitor = Monitor::new(bus, &config.raw_topic, &config.enriched_topic);
    shutdown_on_ctrl_c(monitor.shutdown_handle());
    monitor.run().await?;
    Ok(())
}
