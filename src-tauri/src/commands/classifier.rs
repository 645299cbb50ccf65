use crate::error::AppError;
use crate::models::classify_types::ModelStatus;
use crate::services::classifier::model_manager::ModelManager;
use crate::services::session::SessionController;
use tauri::State;

#[tauri::command]
pub async fn get_model_status(
    model_manager: State<'_, ModelManager>,
    session: State<'_, SessionController>,
) -> Result<ModelStatus, AppError> {
    let snapshot = session.snapshot().await;
    Ok(ModelStatus::new(
        snapshot.model_name,
        &snapshot.phase,
        model_manager.is_downloaded(),
    ))
}

#[tauri::command]
pub async fn retry_model_load(session: State<'_, SessionController>) -> Result<(), AppError> {
    session.retry_model_load().await
}
