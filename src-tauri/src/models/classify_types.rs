use crate::models::session_types::ModelPhase;
use serde::Serialize;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ModelStatus {
    pub model: String,
    pub downloaded: bool,
    pub loading: bool,
    pub ready: bool,
    pub error: Option<String>,
}

impl ModelStatus {
    pub fn new(model: impl Into<String>, phase: &ModelPhase, downloaded: bool) -> Self {
        let error = match phase {
            ModelPhase::Failed { message } => Some(message.clone()),
            _ => None,
        };
        Self {
            model: model.into(),
            downloaded,
            loading: *phase == ModelPhase::Loading,
            ready: *phase == ModelPhase::Ready,
            error,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Prediction {
    pub class_name: String,
    pub confidence: f32,
}

impl Prediction {
    pub fn new(class_name: impl Into<String>, confidence: f32) -> Self {
        Self {
            class_name: class_name.into(),
            confidence,
        }
    }
}

/// A prediction as the results list shows it.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct RankedPrediction {
    pub class_name: String,
    pub confidence: f32,
    pub percent: String,
    pub best_guess: bool,
}

impl RankedPrediction {
    pub fn summary_line(&self) -> String {
        let mut line = format!("{} - Confidence level: {}", self.class_name, self.percent);
        if self.best_guess {
            line.push_str(" Best Guess");
        }
        line
    }
}

/// Keeps the classifier's order; only index 0 is the best guess.
pub fn rank_for_display(predictions: &[Prediction]) -> Vec<RankedPrediction> {
    predictions
        .iter()
        .enumerate()
        .map(|(index, p)| RankedPrediction {
            class_name: p.class_name.clone(),
            confidence: p.confidence,
            percent: format_confidence(p.confidence),
            best_guess: index == 0,
        })
        .collect()
}

/// Scales a [0, 1] score to a percentage with two decimals, e.g. `87.00%`.
pub fn format_confidence(confidence: f32) -> String {
    let clamped = if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };
    format!("{:.2}%", clamped as f64 * 100.0)
}
