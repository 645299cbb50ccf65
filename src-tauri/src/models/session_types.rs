use crate::models::classify_types::{Prediction, RankedPrediction};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Where the bytes of an image live. Two references are the same image
/// when their locators are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageRef {
    Local { path: PathBuf },
    Remote { url: String },
}

impl ImageRef {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        ImageRef::Local { path: path.into() }
    }

    pub fn remote(url: impl Into<String>) -> Self {
        ImageRef::Remote { url: url.into() }
    }

    /// Text typed or pasted into the URL box. Blank input clears the selection.
    pub fn from_url_input(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(ImageRef::remote(trimmed))
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRef::Local { path } => write!(f, "{}", path.display()),
            ImageRef::Remote { url } => write!(f, "{}", url),
        }
    }
}

/// Previously selected images, most recent first, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct History(Vec<ImageRef>);

impl History {
    /// Prepends `image` unless it is already present. Returns whether it was added.
    pub fn record(&mut self, image: &ImageRef) -> bool {
        if self.0.contains(image) {
            return false;
        }
        self.0.insert(0, image.clone());
        true
    }

    pub fn entries(&self) -> &[ImageRef] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ModelPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    ClassificationFailed,
    ImageUnavailable,
}

/// An error reported against the current image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionFault {
    pub kind: FaultKind,
    pub message: String,
    pub image: ImageRef,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassifyOutcome {
    Completed(Vec<Prediction>),
    /// The image changed while the model was running; nothing was stored.
    Discarded,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Bumped on every change; the view drops snapshots older than the one it shows.
    pub revision: u64,
    pub phase: ModelPhase,
    pub model_name: String,
    pub loading: bool,
    pub current_image: Option<ImageRef>,
    pub results: Vec<RankedPrediction>,
    pub classifying: bool,
    pub history: History,
    pub fault: Option<SessionFault>,
}
