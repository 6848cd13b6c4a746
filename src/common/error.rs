use thiserror::Error;

use crate::channel::ChannelError;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Gallery error: {0}")]
    Gallery(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GateError>;

/// Fault taxonomy of the decision loop.
///
/// `Capture`, `Match` and `Channel` are contained within a single iteration.
/// `Init` only occurs before the loop starts and is fatal.
#[derive(Error, Debug)]
pub enum Fault {
    #[error("capture fault: {0}")]
    Capture(GateError),

    #[error("match fault: {0}")]
    Match(GateError),

    #[error("channel fault: {0}")]
    Channel(ChannelError),

    #[error("init fault: {0}")]
    Init(GateError),
}

impl Fault {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Fault::Init(_))
    }
}
