mod commands;
mod config;
mod error;
mod logging;
mod models;
mod services;

use services::classifier::model_manager::ModelManager;
use services::image_source::ImageFetcher;
use services::notifier::TauriNotifier;
use services::session::SessionController;
use std::sync::Arc;
use tauri::{Emitter, Manager};

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    logging::init_tracing(tracing::Level::INFO);

    tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_window_state::Builder::default().build())
        .setup(|app| {
            let app_data_dir = app.path().app_data_dir()?;
            std::fs::create_dir_all(&app_data_dir)?;

            let settings = config::load_settings(&app_data_dir).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring unusable settings, using defaults");
                config::Settings::default()
            });
            tracing::info!(?settings, data_dir = %app_data_dir.display(), "starting");

            let progress_handle = app.handle().clone();
            let model_manager = ModelManager::new(&app_data_dir, &settings).with_progress(move |pct| {
                let _ = progress_handle.emit("download-progress", pct);
            });
            app.manage(model_manager.clone());

            let session = SessionController::new(
                Arc::new(model_manager),
                Arc::new(ImageFetcher::new()),
                Arc::new(TauriNotifier::new(app.handle().clone())),
            );
            app.manage(session.clone());

            // Download (first start) and load the model in the background.
            tauri::async_runtime::spawn(async move {
                // Failures land in the session as ModelPhase::Failed.
                let _ = session.acquire_model().await;
            });

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::session::get_session,
            commands::session::pick_image_file,
            commands::session::select_image_url,
            commands::session::select_image,
            commands::session::identify_image,
            commands::session::preview_image,
            commands::classifier::get_model_status,
            commands::classifier::retry_model_load,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
