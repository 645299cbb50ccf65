use crate::error::AppError;
use crate::models::session_types::ImageRef;
use async_trait::async_trait;
use base64::Engine;
use std::path::Path;
use url::Url;

/// Resolves an image reference into the raw encoded bytes.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn fetch(&self, image: &ImageRef) -> Result<Vec<u8>, AppError>;
}

/// Reads local files and `file:`, `http(s):` and `data:` URLs.
#[derive(Clone, Default)]
pub struct ImageFetcher {
    client: reqwest::Client,
}

impl ImageFetcher {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_remote(&self, raw: &str) -> Result<Vec<u8>, AppError> {
        let url = Url::parse(raw)
            .map_err(|e| AppError::InvalidImageSource(format!("{}: {}", raw, e)))?;

        match url.scheme() {
            "http" | "https" => {
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|e| AppError::ImageUnavailable(format!("{}: {}", url, e)))?;
                if !response.status().is_success() {
                    return Err(AppError::ImageUnavailable(format!(
                        "{}: HTTP {}",
                        url,
                        response.status()
                    )));
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| AppError::ImageUnavailable(format!("{}: {}", url, e)))?;
                Ok(bytes.to_vec())
            }
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| AppError::InvalidImageSource(format!("{}: not a local path", url)))?;
                read_local(&path).await
            }
            "data" => decode_data_url(raw),
            other => Err(AppError::InvalidImageSource(format!(
                "{}: unsupported scheme '{}'",
                raw, other
            ))),
        }
    }
}

#[async_trait]
impl ImageLoader for ImageFetcher {
    async fn fetch(&self, image: &ImageRef) -> Result<Vec<u8>, AppError> {
        match image {
            ImageRef::Local { path } => read_local(path).await,
            ImageRef::Remote { url } => self.fetch_remote(url).await,
        }
    }
}

async fn read_local(path: &Path) -> Result<Vec<u8>, AppError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| AppError::ImageUnavailable(format!("{}: {}", path.display(), e)))
}

fn decode_data_url(raw: &str) -> Result<Vec<u8>, AppError> {
    let body = raw
        .strip_prefix("data:")
        .ok_or_else(|| AppError::InvalidImageSource("not a data URL".to_string()))?;
    let (meta, payload) = body
        .split_once(',')
        .ok_or_else(|| AppError::InvalidImageSource("data URL has no payload".to_string()))?;

    if !meta.ends_with(";base64") {
        return Err(AppError::InvalidImageSource(
            "only base64 data URLs are supported".to_string(),
        ));
    }

    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| AppError::InvalidImageSource(format!("bad base64 in data URL: {}", e)))
}

/// Encodes image bytes as a `data:` URL the webview can show directly.
pub fn to_data_url(bytes: &[u8]) -> Result<String, AppError> {
    let format = image::guess_format(bytes)?;
    let mime = format.to_mime_type();
    let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{}", mime, b64))
}
