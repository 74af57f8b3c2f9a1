use tauri::State;

use crate::{
    capture::CaptureMode,
    models::{MediaAsset, MediaPayload},
    session::{SessionController, SessionSnapshot},
    settings::UserSettings,
    AppState,
};

fn controller_from_state(state: &State<'_, AppState>) -> SessionController {
    state.session.clone()
}

#[tauri::command]
pub async fn initialize_session(
    state: State<'_, AppState>,
    mode: CaptureMode,
) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(&state);
    controller.initialize(mode).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn get_session_state(state: State<'_, AppState>) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(&state);
    Ok(controller.snapshot().await)
}

#[tauri::command]
pub async fn capture_photo(state: State<'_, AppState>) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(&state);
    controller.capture_photo().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn start_recording(state: State<'_, AppState>) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(&state);
    controller.start_recording().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn stop_recording(state: State<'_, AppState>) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(&state);
    controller.stop_recording().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn submit_edit(
    state: State<'_, AppState>,
    instruction: String,
) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(&state);
    controller
        .submit_edit(&instruction)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn reset_session(state: State<'_, AppState>) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(&state);
    controller.reset().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn restore_capture(
    state: State<'_, AppState>,
    id: String,
) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(&state);
    controller
        .restore_from_history(&id)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn import_photo(
    state: State<'_, AppState>,
    payload: MediaPayload,
) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(&state);
    controller
        .import_photo(payload)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn set_zoom(state: State<'_, AppState>, level: f64) -> Result<(), String> {
    let controller = controller_from_state(&state);
    controller.set_zoom(level).await;
    Ok(())
}

#[tauri::command]
pub async fn dismiss_session_error(state: State<'_, AppState>) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(&state);
    Ok(controller.dismiss_error().await)
}

#[tauri::command]
pub async fn list_history(state: State<'_, AppState>) -> Result<Vec<MediaAsset>, String> {
    Ok(state.history.load())
}

#[tauri::command]
pub async fn delete_capture(state: State<'_, AppState>, id: String) -> Result<(), String> {
    state.history.remove(&id).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn export_capture(
    state: State<'_, AppState>,
    id: String,
    directory: String,
) -> Result<String, String> {
    let record = state
        .history
        .get(&id)
        .ok_or_else(|| format!("no history record with id {id}"))?;
    crate::export::write_capture(&record, std::path::Path::new(&directory))
        .map(|path| path.display().to_string())
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn compose_share_text(state: State<'_, AppState>, id: String) -> Result<String, String> {
    let record = state
        .history
        .get(&id)
        .ok_or_else(|| format!("no history record with id {id}"))?;
    Ok(crate::export::share_text(&record))
}

#[tauri::command]
pub async fn get_settings(state: State<'_, AppState>) -> Result<UserSettings, String> {
    Ok(state.settings.current())
}

#[tauri::command]
pub async fn update_settings(
    state: State<'_, AppState>,
    settings: UserSettings,
) -> Result<(), String> {
    state.settings.update(settings).map_err(|e| e.to_string())
}
