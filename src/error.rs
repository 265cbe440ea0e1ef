//! Error types for linesight.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("broker request error: {0}")]
    Broker(#[from] rumqttc::ClientError),

    #[error("broker connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("reasoning backend error: {0}")]
    Reasoner(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
