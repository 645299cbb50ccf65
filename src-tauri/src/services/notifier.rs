use crate::models::session_types::SessionSnapshot;
use crate::services::session::SessionObserver;
use tauri::{AppHandle, Emitter};

pub const SESSION_CHANGED_EVENT: &str = "session-changed";

/// Pushes every session snapshot to the webview.
pub struct TauriNotifier {
    app: AppHandle,
}

impl TauriNotifier {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl SessionObserver for TauriNotifier {
    fn session_changed(&self, snapshot: &SessionSnapshot) {
        if let Err(e) = self.app.emit(SESSION_CHANGED_EVENT, snapshot) {
            tracing::warn!(error = %e, "failed to emit session update");
        }
    }
}
