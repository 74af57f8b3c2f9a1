mod analysis;
mod capture;
mod export;
mod history;
mod models;
mod session;
mod settings;

use std::sync::Arc;

use analysis::{AnalysisClient, GeminiClient};
use capture::{MediaCapture, StreamConstraints, TestPatternBackend};
use history::HistoryStore;
use session::commands::{
    capture_photo, compose_share_text, delete_capture, dismiss_session_error, export_capture,
    get_session_state, get_settings, import_photo, initialize_session, list_history,
    reset_session, restore_capture, set_zoom, start_recording, stop_recording, submit_edit,
    update_settings,
};
use session::{SessionController, SessionEvents, TauriEvents};
use settings::SettingsStore;
use tauri::Manager;

pub(crate) struct AppState {
    pub(crate) session: SessionController,
    pub(crate) history: HistoryStore,
    pub(crate) settings: Arc<SettingsStore>,
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("SnapSight starting up...");

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let result = (|| -> anyhow::Result<()> {
                let app_data_dir = app
                    .path()
                    .app_data_dir()
                    .map_err(|err| anyhow::anyhow!(err))?;
                std::fs::create_dir_all(&app_data_dir)?;

                let settings = Arc::new(SettingsStore::new(app_data_dir.join("settings.json"))?);
                let history = HistoryStore::new(app_data_dir.join("history.json"))?;

                let capture_settings = settings.capture();
                let constraints = StreamConstraints {
                    width: capture_settings.width,
                    height: capture_settings.height,
                    audio: false,
                };
                // TODO: swap in the AVFoundation/Media Foundation backend once
                // the platform capture plugin lands; the synthetic camera
                // keeps every other path exercisable until then.
                let capture = MediaCapture::new(
                    Arc::new(TestPatternBackend::default()),
                    constraints,
                    capture_settings.jpeg_quality,
                );

                let analysis: Arc<dyn AnalysisClient> =
                    Arc::new(GeminiClient::new(Arc::clone(&settings)));
                let events: Arc<dyn SessionEvents> =
                    Arc::new(TauriEvents::new(app.handle().clone()));

                let session =
                    SessionController::new(capture, history.clone(), analysis, events);

                app.manage(AppState {
                    session,
                    history,
                    settings,
                });

                Ok(())
            })();

            result.map_err(|err| err.into())
        })
        .invoke_handler(tauri::generate_handler![
            initialize_session,
            get_session_state,
            capture_photo,
            start_recording,
            stop_recording,
            submit_edit,
            reset_session,
            restore_capture,
            import_photo,
            set_zoom,
            dismiss_session_error,
            list_history,
            delete_capture,
            export_capture,
            compose_share_text,
            get_settings,
            update_settings,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
