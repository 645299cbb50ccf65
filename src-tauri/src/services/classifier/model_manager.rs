use crate::config::Settings;
use crate::error::AppError;
use crate::services::classifier::inference::{OnnxClassifier, Preprocessing};
use crate::services::classifier::{ClassifierProvider, ImageClassifier};
use async_trait::async_trait;
use futures::StreamExt;
use ort::session::Session;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ModelType {
    MobileNetV2,
    ConvNextV2Base,
    ConvNextV2Large,
}

impl ModelType {
    fn repo(&self) -> &'static str {
        match self {
            ModelType::MobileNetV2 => "Xenova/mobilenet_v2_1.0_224",
            ModelType::ConvNextV2Base => "Xenova/convnextv2-base-22k-384",
            ModelType::ConvNextV2Large => "Xenova/convnextv2-large-22k-384",
        }
    }

    fn file_stem(&self) -> &'static str {
        match self {
            ModelType::MobileNetV2 => "mobilenet_v2_1.0_224",
            ModelType::ConvNextV2Base => "convnextv2-base-22k-384",
            ModelType::ConvNextV2Large => "convnextv2-large-22k-384",
        }
    }

    pub fn model_url(&self) -> String {
        format!("https://huggingface.co/{}/resolve/main/onnx/model.onnx", self.repo())
    }

    pub fn config_url(&self) -> String {
        format!("https://huggingface.co/{}/resolve/main/config.json", self.repo())
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelType::MobileNetV2 => "MobileNet",
            ModelType::ConvNextV2Base => "ConvNeXt V2 Base",
            ModelType::ConvNextV2Large => "ConvNeXt V2 Large",
        }
    }

    pub fn preprocessing(&self) -> Preprocessing {
        match self {
            ModelType::MobileNetV2 => Preprocessing {
                crop_size: 224,
                mean: [0.5; 3],
                std: [0.5; 3],
            },
            ModelType::ConvNextV2Base | ModelType::ConvNextV2Large => Preprocessing {
                crop_size: 384,
                mean: IMAGENET_MEAN,
                std: IMAGENET_STD,
            },
        }
    }
}

impl FromStr for ModelType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "mobilenet" | "mobilenetv2" => Ok(ModelType::MobileNetV2),
            "convnextv2base" => Ok(ModelType::ConvNextV2Base),
            "convnextv2large" => Ok(ModelType::ConvNextV2Large),
            _ => Err(AppError::Config(format!("Unknown model type: {}", s))),
        }
    }
}

pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Downloads the model files into the app data dir and builds ONNX Runtime sessions.
#[derive(Clone)]
pub struct ModelManager {
    pub model_dir: PathBuf,
    model_type: ModelType,
    use_gpu: bool,
    intra_threads: usize,
    top_k: usize,
    progress: ProgressFn,
}

impl ModelManager {
    pub fn new(app_data_dir: &Path, settings: &Settings) -> Self {
        Self {
            model_dir: app_data_dir.join("models"),
            model_type: settings.model,
            use_gpu: settings.use_gpu,
            intra_threads: settings.intra_threads,
            top_k: settings.top_k,
            progress: Arc::new(|_| {}),
        }
    }

    /// Receives download progress as a 0-100 percentage.
    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.progress = Arc::new(progress);
        self
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(format!("{}.onnx", self.model_type.file_stem()))
    }

    pub fn config_path(&self) -> PathBuf {
        self.model_dir.join(format!("{}-config.json", self.model_type.file_stem()))
    }

    pub fn is_downloaded(&self) -> bool {
        self.model_path().exists() && self.config_path().exists()
    }

    pub async fn download_model(&self) -> Result<(), AppError> {
        if self.is_downloaded() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.model_dir).await.map_err(|e| {
            AppError::Model(format!(
                "Failed to create model directory {}: {}",
                self.model_dir.display(),
                e
            ))
        })?;

        let client = reqwest::Client::new();
        let config_path = self.config_path();
        if !config_path.exists() {
            download_file(&client, &self.model_type.config_url(), &config_path, None).await?;
        }

        let model_path = self.model_path();
        if !model_path.exists() {
            download_file(&client, &self.model_type.model_url(), &model_path, Some(&self.progress))
                .await?;
        }

        Ok(())
    }

    pub async fn load_classifier(&self) -> Result<OnnxClassifier, AppError> {
        let config_path = self.config_path();
        let config_content = tokio::fs::read_to_string(&config_path).await.map_err(|e| {
            AppError::Model(format!(
                "Failed to read config file {}: {}",
                config_path.display(),
                e
            ))
        })?;
        let labels = parse_labels(&config_content)?;

        let model_path = self.model_path();
        let use_gpu = self.use_gpu;
        let intra_threads = self.intra_threads;

        let session = tokio::task::spawn_blocking(move || build_session(&model_path, use_gpu, intra_threads))
            .await
            .map_err(|e| AppError::Model(format!("Failed to spawn model loading task: {}", e)))??;

        tracing::info!(
            model = self.model_type.display_name(),
            labels = labels.len(),
            use_gpu,
            "model session ready"
        );

        Ok(OnnxClassifier::new(
            session,
            labels,
            self.model_type.preprocessing(),
            self.top_k,
        ))
    }
}

#[async_trait]
impl ClassifierProvider for ModelManager {
    fn display_name(&self) -> String {
        self.model_type.display_name().to_string()
    }

    async fn load(&self) -> Result<Arc<dyn ImageClassifier>, AppError> {
        if !self.is_downloaded() {
            tracing::info!(model = self.model_type.display_name(), "downloading model files");
            self.download_model().await?;
        }
        let classifier = self.load_classifier().await?;
        Ok(Arc::new(classifier))
    }
}

/// Reads `id2label` from a Hugging Face `config.json`, ordered by class index.
pub fn parse_labels(config_content: &str) -> Result<Vec<String>, AppError> {
    let config: serde_json::Value = serde_json::from_str(config_content)
        .map_err(|e| AppError::Model(format!("Failed to parse config JSON: {}", e)))?;

    let id2label = config["id2label"]
        .as_object()
        .ok_or_else(|| AppError::Model("Config missing id2label field".to_string()))?;

    let mut labels: Vec<(usize, String)> = id2label
        .iter()
        .filter_map(|(k, v)| {
            let idx = k.parse::<usize>().ok()?;
            Some((idx, v.as_str().unwrap_or("unknown").to_string()))
        })
        .collect();
    labels.sort_by_key(|(idx, _)| *idx);

    if labels.is_empty() {
        return Err(AppError::Model("Config id2label is empty".to_string()));
    }

    Ok(labels.into_iter().map(|(_, label)| label).collect())
}

fn build_session(model_path: &Path, use_gpu: bool, intra_threads: usize) -> Result<Session, AppError> {
    let _ = ort::init().with_name("image-id").commit();

    let mut builder = Session::builder()
        .map_err(|e| AppError::Model(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
        .map_err(|e| AppError::Model(format!("Failed to set optimization level: {}", e)))?
        .with_intra_threads(intra_threads)
        .map_err(|e| AppError::Model(format!("Failed to set intra threads: {}", e)))?;

    if use_gpu {
        builder = builder
            .with_execution_providers([
                ort::execution_providers::DirectMLExecutionProvider::default().build(),
                ort::execution_providers::CoreMLExecutionProvider::default().build(),
                ort::execution_providers::CUDAExecutionProvider::default().build(),
                ort::execution_providers::CPUExecutionProvider::default().build(),
            ])
            .map_err(|e| AppError::Model(format!("Failed to register GPU execution providers: {}", e)))?;
    } else {
        builder = builder
            .with_execution_providers([ort::execution_providers::CPUExecutionProvider::default().build()])
            .map_err(|e| AppError::Model(format!("Failed to register CPU execution provider: {}", e)))?;
    }

    builder
        .commit_from_file(model_path)
        .map_err(|e| AppError::Model(format!("Failed to load ONNX model: {}", e)))
}

async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    progress: Option<&ProgressFn>,
) -> Result<(), AppError> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(AppError::Model(format!(
            "Failed to download {}: HTTP {}",
            url,
            response.status()
        )));
    }

    let total_size = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;
    let mut last_reported = 0;

    // Partial downloads never sit under the final name, so is_downloaded stays honest.
    let part_path = part_path(dest);
    let mut file = tokio::fs::File::create(&part_path).await.map_err(|e| {
        AppError::Model(format!("Failed to create file {}: {}", part_path.display(), e))
    })?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(e.into());
            }
        };
        downloaded += chunk.len() as u64;
        file.write_all(&chunk).await?;

        if let Some(report) = progress {
            if total_size > 0 {
                let pct = (downloaded * 100) / total_size;
                if pct > last_reported {
                    (**report)(pct);
                    last_reported = pct;
                }
            }
        }
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&part_path, dest).await?;
    if let Some(report) = progress {
        (**report)(100);
    }

    tracing::debug!(url, bytes = downloaded, dest = %dest.display(), "download complete");
    Ok(())
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_http;
    use std::sync::Mutex;

    fn recording_progress() -> (ProgressFn, Arc<Mutex<Vec<u64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress: ProgressFn = Arc::new(move |pct| sink.lock().unwrap().push(pct));
        (progress, seen)
    }

    #[test]
    fn labels_follow_numeric_index_order() {
        let config = r#"{ "id2label": { "10": "ten", "2": "two", "0": "background", "1": "tench" } }"#;
        let labels = parse_labels(config).unwrap();
        assert_eq!(labels, ["background", "tench", "two", "ten"]);
    }

    #[test]
    fn config_without_labels_is_rejected() {
        assert!(parse_labels(r#"{ "architectures": ["MobileNetV2"] }"#).is_err());
        assert!(parse_labels(r#"{ "id2label": {} }"#).is_err());
        assert!(parse_labels("not json").is_err());
    }

    #[test]
    fn model_type_parses_loose_spellings() {
        assert_eq!("mobilenet".parse::<ModelType>().unwrap(), ModelType::MobileNetV2);
        assert_eq!("MobileNet_V2".parse::<ModelType>().unwrap(), ModelType::MobileNetV2);
        assert_eq!("convnextv2-base".parse::<ModelType>().unwrap(), ModelType::ConvNextV2Base);
        assert!("vgg16".parse::<ModelType>().is_err());
    }

    #[test]
    fn model_files_live_under_models_dir() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(dir.path(), &Settings::default());
        assert!(manager.model_path().starts_with(dir.path().join("models")));
        assert!(manager.model_path().to_string_lossy().ends_with("mobilenet_v2_1.0_224.onnx"));
        assert!(!manager.is_downloaded());

        std::fs::create_dir_all(&manager.model_dir).unwrap();
        std::fs::write(manager.model_path(), b"onnx").unwrap();
        assert!(!manager.is_downloaded());
        std::fs::write(manager.config_path(), b"{}").unwrap();
        assert!(manager.is_downloaded());
    }

    #[test]
    fn mobilenet_uses_its_own_normalization() {
        let prep = ModelType::MobileNetV2.preprocessing();
        assert_eq!(prep.crop_size, 224);
        assert_eq!(prep.mean, [0.5; 3]);
        assert_eq!(ModelType::ConvNextV2Base.preprocessing().crop_size, 384);
    }

    #[test]
    fn part_file_sits_beside_destination() {
        let part = part_path(Path::new("/data/models/m.onnx"));
        assert_eq!(part, PathBuf::from("/data/models/m.onnx.part"));
    }

    #[tokio::test]
    async fn load_fails_cleanly_on_corrupt_config() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(dir.path(), &Settings::default());
        std::fs::create_dir_all(&manager.model_dir).unwrap();
        std::fs::write(manager.model_path(), b"not a model").unwrap();
        std::fs::write(manager.config_path(), b"{ broken").unwrap();

        let err = manager.load().await.err().unwrap();
        assert_eq!(err.kind(), "model");
    }

    #[tokio::test]
    async fn download_lands_under_final_name_with_full_progress() {
        let body: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let base = test_http::serve(test_http::response("200 OK", &body)).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("model.onnx");
        let (progress, seen) = recording_progress();

        download_file(&test_http::client(), &format!("{}/model.onnx", base), &dest, Some(&progress))
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), body);
        assert!(!part_path(&dest).exists());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn interrupted_download_leaves_nothing_behind() {
        // promises more bytes than it sends, then hangs up
        let base = test_http::serve(test_http::with_length("200 OK", b"0123456789", 1000)).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("model.onnx");
        let (progress, seen) = recording_progress();

        let result =
            download_file(&test_http::client(), &format!("{}/model.onnx", base), &dest, Some(&progress)).await;

        assert!(result.is_err());
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
        assert!(!seen.lock().unwrap().contains(&100));
    }

    #[tokio::test]
    async fn http_error_aborts_download_before_writing() {
        let base = test_http::serve(test_http::response("503 Service Unavailable", b"")).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("config.json");

        let err = download_file(&test_http::client(), &format!("{}/config.json", base), &dest, None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "model");
        assert!(err.to_string().contains("503"));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }
}
