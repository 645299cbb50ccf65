use crate::error::AppError;
use crate::models::classify_types::Prediction;
use crate::services::classifier::ImageClassifier;
use async_trait::async_trait;
use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;
use std::sync::{Arc, Mutex};

const CROP_PCT: f32 = 0.875;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preprocessing {
    pub crop_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

/// Decodes `bytes`, resizes the short edge to `crop_size / 0.875`, center
/// crops and normalizes into a 1x3xHxW tensor.
pub fn preprocess_image(bytes: &[u8], prep: &Preprocessing) -> Result<Array4<f32>, AppError> {
    let img = image::load_from_memory(bytes)?;
    let crop = prep.crop_size;

    let short_edge = (crop as f32 / CROP_PCT).ceil() as u32;
    let (w, h) = (img.width().max(1), img.height().max(1));
    let (new_w, new_h) = if w < h {
        (short_edge, ((h as f32 / w as f32) * short_edge as f32).round() as u32)
    } else {
        (((w as f32 / h as f32) * short_edge as f32).round() as u32, short_edge)
    };
    let resized = img.resize_exact(new_w, new_h, image::imageops::FilterType::Triangle);

    let x = new_w.saturating_sub(crop) / 2;
    let y = new_h.saturating_sub(crop) / 2;
    let rgb = resized.crop_imm(x, y, crop, crop).to_rgb8();

    let side = crop as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (px, py, pixel) in rgb.enumerate_pixels() {
        for channel in 0..3 {
            let value = pixel[channel] as f32 / 255.0;
            tensor[[0, channel, py as usize, px as usize]] =
                (value - prep.mean[channel]) / prep.std[channel];
        }
    }

    Ok(tensor)
}

/// Softmax over raw logits, then the `top_k` most likely labels.
pub fn rank_logits(logits: &[f32], labels: &[String], top_k: usize) -> Vec<Prediction> {
    if logits.is_empty() {
        return Vec::new();
    }

    let max_logit = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max_logit).exp()).collect();
    let sum: f32 = exps.iter().sum();

    let mut indexed: Vec<(usize, f32)> = exps.into_iter().map(|e| e / sum).enumerate().collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    indexed.truncate(top_k);

    indexed
        .into_iter()
        .map(|(idx, confidence)| {
            let class_name = labels
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", idx));
            Prediction::new(class_name, confidence)
        })
        .collect()
}

pub fn run_inference(
    session: &mut Session,
    input: Array4<f32>,
    labels: &[String],
    top_k: usize,
) -> Result<Vec<Prediction>, AppError> {
    let input_name = session.inputs()[0].name().to_string();

    let input_tensor = Value::from_array(input)
        .map_err(|e| AppError::Inference(format!("Failed to create tensor value: {}", e)))?;

    let outputs = session
        .run(ort::inputs![input_name.as_str() => input_tensor])
        .map_err(|e| AppError::Inference(e.to_string()))?;

    let output_value = outputs
        .values()
        .next()
        .ok_or_else(|| AppError::Inference("Model produced no outputs".to_string()))?;

    let (_, logits) = output_value
        .try_extract_tensor::<f32>()
        .map_err(|e| AppError::Inference(format!("Failed to extract output tensor: {}", e)))?;

    Ok(rank_logits(logits, labels, top_k))
}

/// ONNX Runtime backed classifier. The session is shared and runs one image
/// at a time on a blocking thread.
pub struct OnnxClassifier {
    session: Arc<Mutex<Session>>,
    labels: Arc<Vec<String>>,
    preprocessing: Preprocessing,
    top_k: usize,
}

impl OnnxClassifier {
    pub fn new(session: Session, labels: Vec<String>, preprocessing: Preprocessing, top_k: usize) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            labels: Arc::new(labels),
            preprocessing,
            top_k,
        }
    }
}

#[async_trait]
impl ImageClassifier for OnnxClassifier {
    async fn classify(&self, image: &[u8]) -> Result<Vec<Prediction>, AppError> {
        let bytes = image.to_vec();
        let session = self.session.clone();
        let labels = self.labels.clone();
        let prep = self.preprocessing;
        let top_k = self.top_k;

        tokio::task::spawn_blocking(move || {
            let tensor = preprocess_image(&bytes, &prep)?;
            let mut guard = session
                .lock()
                .map_err(|_| AppError::Inference("Model session lock poisoned".to_string()))?;
            run_inference(&mut guard, tensor, &labels, top_k)
        })
        .await
        .map_err(|e| AppError::Inference(format!("Inference task failed: {}", e)))?
    }
}
