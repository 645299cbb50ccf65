pub mod inference;
pub mod model_manager;

use crate::error::AppError;
use crate::models::classify_types::Prediction;
use async_trait::async_trait;
use std::sync::Arc;

/// A loaded model that can rank labels for one image.
#[async_trait]
pub trait ImageClassifier: Send + Sync {
    /// Returns predictions ordered by descending confidence.
    async fn classify(&self, image: &[u8]) -> Result<Vec<Prediction>, AppError>;
}

/// Produces the classifier the session works with.
#[async_trait]
pub trait ClassifierProvider: Send + Sync {
    fn display_name(&self) -> String;

    async fn load(&self) -> Result<Arc<dyn ImageClassifier>, AppError>;
}
