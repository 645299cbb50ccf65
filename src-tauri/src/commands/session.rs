use crate::error::AppError;
use crate::models::session_types::{ImageRef, SessionSnapshot};
use crate::services::session::SessionController;
use tauri::{AppHandle, State};
use tauri_plugin_dialog::DialogExt;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "tif", "ico"];

#[tauri::command]
pub async fn get_session(session: State<'_, SessionController>) -> Result<SessionSnapshot, AppError> {
    Ok(session.snapshot().await)
}

/// Opens the native file picker. Cancelling the picker clears the selection.
#[tauri::command]
pub async fn pick_image_file(
    app: AppHandle,
    session: State<'_, SessionController>,
) -> Result<SessionSnapshot, AppError> {
    let picked = tauri::async_runtime::spawn_blocking(move || {
        app.dialog()
            .file()
            .add_filter("Images", IMAGE_EXTENSIONS)
            .blocking_pick_file()
    })
    .await
    .map_err(|e| AppError::Message(format!("File picker failed: {}", e)))?;

    let image = match picked {
        Some(file) => {
            let path = file
                .into_path()
                .map_err(|e| AppError::InvalidImageSource(e.to_string()))?;
            Some(ImageRef::local(path))
        }
        None => None,
    };

    Ok(session.select_image(image).await)
}

#[tauri::command]
pub async fn select_image_url(
    session: State<'_, SessionController>,
    url: String,
) -> Result<SessionSnapshot, AppError> {
    Ok(session.select_image(ImageRef::from_url_input(&url)).await)
}

/// Used by the history gallery to re-select an earlier image.
#[tauri::command]
pub async fn select_image(
    session: State<'_, SessionController>,
    image: Option<ImageRef>,
) -> Result<SessionSnapshot, AppError> {
    Ok(session.select_image(image).await)
}

#[tauri::command]
pub async fn identify_image(session: State<'_, SessionController>) -> Result<SessionSnapshot, AppError> {
    session.classify().await?;
    Ok(session.snapshot().await)
}

#[tauri::command]
pub async fn preview_image(
    session: State<'_, SessionController>,
    image: ImageRef,
) -> Result<String, AppError> {
    session.preview(&image).await
}
