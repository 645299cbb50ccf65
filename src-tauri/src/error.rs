use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid image source: {0}")]
    InvalidImageSource(String),

    #[error("Image unavailable: {0}")]
    ImageUnavailable(String),

    #[error("Model not loaded")]
    ModelNotReady,

    #[error("No image selected")]
    NoImageSelected,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Message(String),
}

impl AppError {
    /// Stable identifier the front end can branch on.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Io(_) => "io",
            AppError::Image(_) => "image",
            AppError::Http(_) => "http",
            AppError::Model(_) => "model",
            AppError::Inference(_) => "inference",
            AppError::InvalidImageSource(_) => "invalid_image_source",
            AppError::ImageUnavailable(_) => "image_unavailable",
            AppError::ModelNotReady => "model_not_ready",
            AppError::NoImageSelected => "no_image_selected",
            AppError::InvalidState(_) => "invalid_state",
            AppError::Config(_) => "config",
            AppError::Message(_) => "message",
        }
    }
}

// Commands hand errors to the webview, so they serialize as `{ kind, message }`.
impl Serialize for AppError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AppError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

impl From<ort::Error> for AppError {
    fn from(err: ort::Error) -> Self {
        AppError::Model(err.to_string())
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Message(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Message(msg.to_string())
    }
}
