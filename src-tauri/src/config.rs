use crate::error::AppError;
use crate::services::classifier::model_manager::ModelType;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model: ModelType,
    pub use_gpu: bool,
    pub top_k: usize,
    pub intra_threads: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: ModelType::MobileNetV2,
            use_gpu: true,
            // Matches what most image-id front ends show: the three best guesses.
            top_k: 3,
            intra_threads: 4,
        }
    }
}

/// Reads `settings.toml` from the app data dir (if present) and applies
/// `IMAGE_ID_*` environment overrides on top.
pub fn load_settings(app_data_dir: &Path) -> Result<Settings, AppError> {
    let path = app_data_dir.join(SETTINGS_FILE);
    let settings = match std::fs::read_to_string(&path) {
        Ok(raw) => parse_settings(&raw)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
        Err(e) => return Err(e.into()),
    };

    apply_overrides(settings, |key| std::env::var(key).ok())
}

pub fn parse_settings(raw: &str) -> Result<Settings, toml::de::Error> {
    toml::from_str(raw)
}

fn apply_overrides<F>(mut settings: Settings, lookup: F) -> Result<Settings, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("IMAGE_ID_MODEL") {
        settings.model = v.parse()?;
    }
    if let Some(v) = lookup("IMAGE_ID_USE_GPU") {
        settings.use_gpu = parse_bool(&v)
            .ok_or_else(|| AppError::Config(format!("IMAGE_ID_USE_GPU: expected a boolean, got {v:?}")))?;
    }
    if let Some(v) = lookup("IMAGE_ID_TOP_K") {
        settings.top_k = v
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("IMAGE_ID_TOP_K: expected a number, got {v:?}")))?;
    }
    if let Some(v) = lookup("IMAGE_ID_INTRA_THREADS") {
        settings.intra_threads = v.trim().parse().map_err(|_| {
            AppError::Config(format!("IMAGE_ID_INTRA_THREADS: expected a number, got {v:?}"))
        })?;
    }

    if settings.top_k == 0 {
        return Err(AppError::Config("top_k must be at least 1".into()));
    }
    if settings.intra_threads == 0 {
        return Err(AppError::Config("intra_threads must be at least 1".into()));
    }

    Ok(settings)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings(dir.path()).unwrap();
        assert_eq!(settings.model, ModelType::MobileNetV2);
        assert_eq!(settings.top_k, 3);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let settings = parse_settings("model = \"ConvNextV2Base\"\nuse_gpu = false\n").unwrap();
        assert_eq!(settings.model, ModelType::ConvNextV2Base);
        assert!(!settings.use_gpu);
        assert_eq!(settings.top_k, 3);
        assert_eq!(settings.intra_threads, 4);
    }

    #[test]
    fn reads_settings_file_from_app_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "top_k = 5\n").unwrap();
        let settings = load_settings(dir.path()).unwrap();
        assert_eq!(settings.top_k, 5);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "top_k = \"many\"").unwrap();
        let err = load_settings(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "config");

        let message = err.to_string();
        assert_eq!(message.matches("Invalid configuration").count(), 1);
        assert!(message.contains(SETTINGS_FILE));
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let settings = apply_overrides(
            Settings::default(),
            env(&[
                ("IMAGE_ID_MODEL", "convnextv2-large"),
                ("IMAGE_ID_USE_GPU", "off"),
                ("IMAGE_ID_TOP_K", "10"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.model, ModelType::ConvNextV2Large);
        assert!(!settings.use_gpu);
        assert_eq!(settings.top_k, 10);
    }

    #[test]
    fn rejects_bad_override_values() {
        assert!(apply_overrides(Settings::default(), env(&[("IMAGE_ID_USE_GPU", "maybe")])).is_err());
        assert!(apply_overrides(Settings::default(), env(&[("IMAGE_ID_TOP_K", "0")])).is_err());
        assert!(apply_overrides(Settings::default(), env(&[("IMAGE_ID_MODEL", "resnet")])).is_err());
    }
}
