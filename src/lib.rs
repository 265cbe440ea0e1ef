//! # linesight
//!
//! Defect-detection relay pipeline: a producer publishes synthetic detection
//! events over MQTT, an enrichment worker runs each referenced image through
//! a cloud vision agent and republishes the merged result, and a monitor
//! renders both streams to the terminal.

pub mod bus;
pub mod config;
pub mod error;
pub mod event;
pub mod imaging;
pub mod monitor;
pub mod producer;
pub mod reasoner;
pub mod telemetry;
pub mod worker;
