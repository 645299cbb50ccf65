//! The session controller: owns what the user is looking at and mediates the
//! two asynchronous operations, loading the model and classifying an image.
//!
//! State lives behind one async mutex. The lock is never held across the
//! provider, loader or classifier awaits; a selection generation counter is
//! what ties a classification result back to the image it was started for.

use crate::error::AppError;
use crate::models::classify_types::{rank_for_display, Prediction};
use crate::models::session_types::{
    ClassifyOutcome, FaultKind, History, ImageRef, ModelPhase, SessionFault, SessionSnapshot,
};
use crate::services::classifier::{ClassifierProvider, ImageClassifier};
use crate::services::image_source::{self, ImageLoader};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Told about every state change so the view can redraw.
pub trait SessionObserver: Send + Sync {
    fn session_changed(&self, snapshot: &SessionSnapshot);
}

#[derive(Default)]
struct SessionState {
    phase: ModelPhase,
    model: Option<Arc<dyn ImageClassifier>>,
    current_image: Option<ImageRef>,
    selection: u64,
    pending: Option<u64>,
    revision: u64,
    results: Vec<Prediction>,
    history: History,
    fault: Option<SessionFault>,
}

#[derive(Clone)]
pub struct SessionController {
    provider: Arc<dyn ClassifierProvider>,
    loader: Arc<dyn ImageLoader>,
    observer: Arc<dyn SessionObserver>,
    state: Arc<Mutex<SessionState>>,
}

impl SessionController {
    pub fn new(
        provider: Arc<dyn ClassifierProvider>,
        loader: Arc<dyn ImageLoader>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            provider,
            loader,
            observer,
            state: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        self.snapshot_of(&state)
    }

    /// Loads the model. Runs once at startup; later calls are rejected.
    pub async fn acquire_model(&self) -> Result<(), AppError> {
        self.load_model(|phase| matches!(phase, ModelPhase::Idle), "model acquisition already started")
            .await
    }

    /// Runs the load again after a failure. Only legal in the failed state.
    pub async fn retry_model_load(&self) -> Result<(), AppError> {
        self.load_model(
            |phase| matches!(phase, ModelPhase::Failed { .. }),
            "model load can only be retried after a failure",
        )
        .await
    }

    async fn load_model<F>(&self, allowed: F, rejection: &str) -> Result<(), AppError>
    where
        F: Fn(&ModelPhase) -> bool,
    {
        {
            let mut state = self.state.lock().await;
            if !allowed(&state.phase) {
                return Err(AppError::InvalidState(rejection.to_string()));
            }
            state.phase = ModelPhase::Loading;
            self.notify(&mut state);
        }

        tracing::info!(model = %self.provider.display_name(), "loading model");
        let loaded = self.provider.load().await;

        let mut state = self.state.lock().await;
        let result = match loaded {
            Ok(model) => {
                state.model = Some(model);
                state.phase = ModelPhase::Ready;
                tracing::info!(model = %self.provider.display_name(), "model ready");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load model");
                state.model = None;
                state.phase = ModelPhase::Failed {
                    message: e.to_string(),
                };
                Err(e)
            }
        };
        self.notify(&mut state);
        result
    }

    /// Makes `image` current (or clears it) and drops any previous results.
    pub async fn select_image(&self, image: Option<ImageRef>) -> SessionSnapshot {
        let mut state = self.state.lock().await;

        state.selection += 1;
        state.pending = None;
        state.results.clear();
        state.fault = None;
        state.current_image = image;

        if let Some(current) = state.current_image.clone() {
            if state.history.record(&current) {
                tracing::debug!(image = %current, history = state.history.len(), "added to history");
            }
        }
        tracing::debug!(image = ?state.current_image, selection = state.selection, "image selected");

        self.notify(&mut state);
        self.snapshot_of(&state)
    }

    /// Classifies the current image with the loaded model.
    pub async fn classify(&self) -> Result<ClassifyOutcome, AppError> {
        let (model, image, selection) = {
            let mut state = self.state.lock().await;
            let model = state.model.clone().ok_or(AppError::ModelNotReady)?;
            let image = state.current_image.clone().ok_or(AppError::NoImageSelected)?;
            let selection = state.selection;
            state.pending = Some(selection);
            state.fault = None;
            self.notify(&mut state);
            (model, image, selection)
        };

        let outcome = match self.loader.fetch(&image).await {
            Ok(bytes) => model.classify(&bytes).await.map_err(|e| (FaultKind::ClassificationFailed, e)),
            Err(e) => Err((FaultKind::ImageUnavailable, e)),
        };

        let mut state = self.state.lock().await;
        if state.selection != selection {
            tracing::debug!(image = %image, "discarding result for superseded image");
            return Ok(ClassifyOutcome::Discarded);
        }
        state.pending = None;

        let result = match outcome {
            Ok(predictions) => {
                tracing::info!(
                    image = %image,
                    best = predictions.first().map(|p| p.class_name.as_str()).unwrap_or("-"),
                    "classified"
                );
                state.results = predictions.clone();
                Ok(ClassifyOutcome::Completed(predictions))
            }
            Err((kind, e)) => {
                tracing::warn!(image = %image, error = %e, "classification failed");
                state.fault = Some(SessionFault {
                    kind,
                    message: e.to_string(),
                    image: image.clone(),
                });
                Err(e)
            }
        };
        self.notify(&mut state);
        result
    }

    /// Encodes `image` as a `data:` URL for display. A failure is recorded as
    /// an `ImageUnavailable` fault when `image` is still the selection the
    /// preview started under.
    pub async fn preview(&self, image: &ImageRef) -> Result<String, AppError> {
        let selection = self.state.lock().await.selection;

        let encoded = match self.loader.fetch(image).await {
            Ok(bytes) => image_source::to_data_url(&bytes),
            Err(e) => Err(e),
        };

        if let Err(e) = &encoded {
            let mut state = self.state.lock().await;
            if state.selection == selection && state.current_image.as_ref() == Some(image) {
                tracing::warn!(image = %image, error = %e, "preview failed");
                state.fault = Some(SessionFault {
                    kind: FaultKind::ImageUnavailable,
                    message: e.to_string(),
                    image: image.clone(),
                });
                self.notify(&mut state);
            }
        }
        encoded
    }

    fn notify(&self, state: &mut SessionState) {
        state.revision += 1;
        self.observer.session_changed(&self.snapshot_of(state));
    }

    fn snapshot_of(&self, state: &SessionState) -> SessionSnapshot {
        SessionSnapshot {
            revision: state.revision,
            loading: matches!(state.phase, ModelPhase::Idle | ModelPhase::Loading),
            phase: state.phase.clone(),
            model_name: self.provider.display_name(),
            current_image: state.current_image.clone(),
            results: rank_for_display(&state.results),
            classifying: state.pending == Some(state.selection),
            history: state.history.clone(),
            fault: state.fault.clone(),
        }
    }
}
