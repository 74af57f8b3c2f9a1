use std::sync::Arc;

use log::{info, warn};
use tauri::{AppHandle, Emitter};
use tokio::sync::Mutex;

use super::state::{SessionError, SessionPhase, SessionSnapshot, SessionState};
use crate::analysis::AnalysisClient;
use crate::capture::{CaptureMode, MediaCapture};
use crate::history::HistoryStore;
use crate::models::{MediaAsset, MediaKind, MediaPayload};

/// State-change subscription seam. The production implementation forwards
/// snapshots to the webview; tests record them.
pub trait SessionEvents: Send + Sync {
    fn state_changed(&self, snapshot: &SessionSnapshot);
}

pub struct TauriEvents {
    app_handle: AppHandle,
}

impl TauriEvents {
    pub fn new(app_handle: AppHandle) -> Self {
        Self { app_handle }
    }
}

impl SessionEvents for TauriEvents {
    fn state_changed(&self, snapshot: &SessionSnapshot) {
        let _ = self.app_handle.emit("session-state-changed", snapshot.clone());
    }
}

/// Sequences capture, remote analysis, viewing and iterative edits, and owns
/// the transient session state the UI renders. One logical state at a time:
/// async completions are applied serially against the current phase, and a
/// busy phase refuses further submissions instead of queueing them.
#[derive(Clone)]
pub struct SessionController {
    state: Arc<Mutex<SessionState>>,
    capture: Arc<Mutex<MediaCapture>>,
    history: HistoryStore,
    analysis: Arc<dyn AnalysisClient>,
    events: Arc<dyn SessionEvents>,
}

impl SessionController {
    pub fn new(
        capture: MediaCapture,
        history: HistoryStore,
        analysis: Arc<dyn AnalysisClient>,
        events: Arc<dyn SessionEvents>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::new())),
            capture: Arc::new(Mutex::new(capture)),
            history,
            analysis,
            events,
        }
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Acquires the camera and enters `Idle`. Also the recovery path out of
    /// `Error`: acquisition failure is terminal for this attempt but the next
    /// call retries from scratch.
    pub async fn initialize(&self, mode: CaptureMode) -> Result<SessionSnapshot, SessionError> {
        let mut state = self.state.lock().await;
        if state.phase.is_busy() {
            return Err(SessionError::OperationInProgress);
        }
        state.mode = mode;
        state.clear_asset();
        self.acquire_idle(&mut state).await
    }

    /// Captures a still, releases the device, and runs the analysis
    /// round-trip. Always settles in `Viewing`, with the analysis attached on
    /// success or a transient error on failure.
    pub async fn capture_photo(&self) -> Result<SessionSnapshot, SessionError> {
        {
            let mut state = self.state.lock().await;
            guard_phase(&state, SessionPhase::Idle)?;
            state.phase = SessionPhase::Analyzing;
        }

        let still = {
            let mut capture = self.capture.lock().await;
            match capture.capture_still() {
                Ok(payload) => {
                    capture.close();
                    payload
                }
                Err(err) => {
                    // Still failed before anything left the device; fall back
                    // to Idle with the stream untouched.
                    let mut state = self.state.lock().await;
                    state.phase = SessionPhase::Idle;
                    return Err(err.into());
                }
            }
        };

        let asset = MediaAsset::photo(still);
        {
            let mut state = self.state.lock().await;
            state.install_asset(asset.clone(), false);
            state.zoom = None;
            self.emit(&state);
        }

        self.settle_analysis(asset).await
    }

    pub async fn start_recording(&self) -> Result<SessionSnapshot, SessionError> {
        {
            let mut state = self.state.lock().await;
            guard_phase(&state, SessionPhase::Idle)?;
            if state.mode != CaptureMode::Video {
                return Err(SessionError::WrongMode);
            }
            state.phase = SessionPhase::Recording;
        }

        if let Err(err) = self.capture.lock().await.start_recording() {
            let mut state = self.state.lock().await;
            state.phase = SessionPhase::Idle;
            return Err(err.into());
        }

        let state = self.state.lock().await;
        self.emit(&state);
        Ok(state.snapshot())
    }

    /// Stops the recording, waits for the encoder flush, releases the device
    /// and runs the analysis round-trip on the finished clip.
    pub async fn stop_recording(&self) -> Result<SessionSnapshot, SessionError> {
        {
            let mut state = self.state.lock().await;
            guard_phase(&state, SessionPhase::Recording)?;
            state.phase = SessionPhase::Analyzing;
            self.emit(&state);
        }

        let flushed = {
            let mut capture = self.capture.lock().await;
            let result = capture.stop_recording().await;
            capture.close();
            result
        };

        let recorded = match flushed {
            Ok(recorded) => recorded,
            Err(err) => {
                // Clip lost at the encoder; report it and try to get back to
                // a live preview.
                let mut state = self.state.lock().await;
                state.clear_asset();
                state.transient_error = Some(format!("Recording failed: {err}"));
                let _ = self.acquire_idle(&mut state).await;
                return Err(err.into());
            }
        };

        let asset = MediaAsset::clip(recorded.clip, recorded.poster);
        {
            let mut state = self.state.lock().await;
            state.install_asset(asset.clone(), false);
            state.zoom = None;
            self.emit(&state);
        }

        self.settle_analysis(asset).await
    }

    /// Runs one edit round-trip against the current image. Edits chain: a
    /// successful edit becomes the source for the next one. Refusals and
    /// failures surface on the transient-error channel and leave the
    /// displayed image unchanged; the persisted record is never touched.
    pub async fn submit_edit(&self, instruction: &str) -> Result<SessionSnapshot, SessionError> {
        let (instruction, source) = {
            let mut state = self.state.lock().await;
            guard_phase(&state, SessionPhase::Viewing)?;

            let kind = state
                .current
                .as_ref()
                .map(|asset| asset.kind)
                .ok_or(SessionError::InvalidPhase(state.phase))?;
            if kind != MediaKind::Image {
                return Err(SessionError::NotEditable);
            }

            let trimmed = instruction.trim();
            if trimmed.is_empty() {
                return Err(SessionError::EmptyInstruction);
            }

            let source = state.edit_input().ok_or(SessionError::NotEditable)?;
            state.phase = SessionPhase::Editing;
            self.emit(&state);
            (trimmed.to_string(), source)
        };

        let result = self.analysis.edit_image(&source, &instruction).await;

        let mut state = self.state.lock().await;
        match result {
            Ok(outcome) => {
                if outcome.is_empty() {
                    state.transient_error = Some("The edit request produced no output.".into());
                } else if let Some(image) = outcome.image {
                    state.accept_edit(image);
                } else if let Some(text) = outcome.text {
                    // Soft refusal: the model understood but declined.
                    // Surfaced on the same channel as a hard failure.
                    state.transient_error = Some(text);
                }
            }
            Err(err) => {
                warn!("edit request failed: {err}");
                state.transient_error = Some(format!("Edit failed: {err}"));
            }
        }
        state.phase = SessionPhase::Viewing;
        self.emit(&state);
        Ok(state.snapshot())
    }

    /// Discards the current asset and edit chain and reacquires the device.
    pub async fn reset(&self) -> Result<SessionSnapshot, SessionError> {
        let mut state = self.state.lock().await;
        if state.phase.is_busy() {
            return Err(SessionError::OperationInProgress);
        }
        if !matches!(state.phase, SessionPhase::Viewing | SessionPhase::Error) {
            return Err(SessionError::InvalidPhase(state.phase));
        }
        state.clear_asset();
        self.acquire_idle(&mut state).await
    }

    /// Loads a persisted record as the current asset. Never re-invokes
    /// analysis and never re-commits to history. The state lock is held from
    /// the busy check through the install so a capture cannot slip into the
    /// gap and have its in-flight settle stomped.
    pub async fn restore_from_history(&self, id: &str) -> Result<SessionSnapshot, SessionError> {
        let mut state = self.state.lock().await;
        if state.phase.is_busy() {
            return Err(SessionError::OperationInProgress);
        }

        let record = self
            .history
            .get(id)
            .ok_or_else(|| SessionError::UnknownRecord(id.to_string()))?;

        // Leaving Idle for Viewing releases the device handle.
        self.capture.lock().await.close();

        state.install_asset(record, true);
        state.zoom = None;
        state.phase = SessionPhase::Viewing;
        self.emit(&state);
        Ok(state.snapshot())
    }

    /// File-upload fallback for when no camera can be acquired: feeds an
    /// existing image through the same analysis/commit path as a capture.
    pub async fn import_photo(&self, payload: MediaPayload) -> Result<SessionSnapshot, SessionError> {
        if !payload.is_image() {
            return Err(SessionError::UnsupportedImport(payload.mime_type));
        }

        {
            let mut state = self.state.lock().await;
            if state.phase.is_busy() {
                return Err(SessionError::OperationInProgress);
            }
            if !matches!(state.phase, SessionPhase::Idle | SessionPhase::Error) {
                return Err(SessionError::InvalidPhase(state.phase));
            }
            state.phase = SessionPhase::Analyzing;
        }

        self.capture.lock().await.close();

        let asset = MediaAsset::photo(payload);
        {
            let mut state = self.state.lock().await;
            state.install_asset(asset.clone(), false);
            state.zoom = None;
            self.emit(&state);
        }

        self.settle_analysis(asset).await
    }

    /// Best-effort zoom passthrough; a closed stream or a zoom-less device
    /// makes this a no-op.
    pub async fn set_zoom(&self, level: f64) {
        self.capture.lock().await.set_zoom(level);
    }

    pub async fn dismiss_error(&self) -> SessionSnapshot {
        let mut state = self.state.lock().await;
        state.transient_error = None;
        self.emit(&state);
        state.snapshot()
    }

    /// One settle per capture: runs the remote call without holding the state
    /// lock, then applies the outcome and always lands in `Viewing`. Fresh
    /// captures are committed to history exactly once, on analysis success;
    /// restored assets never re-commit.
    async fn settle_analysis(&self, asset: MediaAsset) -> Result<SessionSnapshot, SessionError> {
        let result = match asset.kind {
            MediaKind::Image => self.analysis.analyze_image(&asset.payload).await,
            MediaKind::Video => self.analysis.analyze_video(&asset.payload).await,
        };

        let mut state = self.state.lock().await;
        match result {
            Ok(analysis) => {
                state.attach_analysis(analysis);
                if !state.restored {
                    if let Some(record) = state.current.clone() {
                        // Best-effort persistence: a failed write degrades to
                        // a log line, never blocks the session.
                        if let Err(err) = self.history.append(record) {
                            warn!("history write failed: {err:#}");
                        }
                    }
                }
            }
            Err(err) => {
                warn!("analysis failed: {err}");
                state.transient_error = Some(format!("Analysis failed: {err}"));
            }
        }
        state.phase = SessionPhase::Viewing;
        self.emit(&state);
        Ok(state.snapshot())
    }

    /// Callers hold the state lock across the device open so the phase they
    /// guarded cannot change underneath the acquisition.
    async fn acquire_idle(&self, state: &mut SessionState) -> Result<SessionSnapshot, SessionError> {
        let mode = state.mode;
        let opened = self.capture.lock().await.open(mode).await;

        match opened {
            Ok(zoom) => {
                info!("session idle ({mode:?} mode)");
                state.phase = SessionPhase::Idle;
                state.zoom = zoom;
                self.emit(&state);
                Ok(state.snapshot())
            }
            Err(err) => {
                warn!("device acquisition failed: {err}");
                state.phase = SessionPhase::Error;
                state.zoom = None;
                state.transient_error = Some(err.to_string());
                self.emit(&state);
                Err(err.into())
            }
        }
    }

    fn emit(&self, state: &SessionState) {
        self.events.state_changed(&state.snapshot());
    }
}

fn guard_phase(state: &SessionState, expected: SessionPhase) -> Result<(), SessionError> {
    if state.phase == expected {
        Ok(())
    } else if state.phase.is_busy() {
        Err(SessionError::OperationInProgress)
    } else {
        Err(SessionError::InvalidPhase(state.phase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::analysis::{AnalysisError, EditOutcome};
    use crate::capture::{StreamConstraints, TestPatternBackend};
    use crate::models::AnalysisResult;

    #[derive(Default)]
    struct StubAnalysis {
        analyses: StdMutex<VecDeque<Result<AnalysisResult, AnalysisError>>>,
        edits: StdMutex<VecDeque<Result<EditOutcome, AnalysisError>>>,
        analyze_calls: AtomicUsize,
        edit_calls: AtomicUsize,
        edit_sources: StdMutex<Vec<MediaPayload>>,
        edit_gate: Option<Arc<Notify>>,
    }

    impl StubAnalysis {
        fn with_analyses(results: Vec<Result<AnalysisResult, AnalysisError>>) -> Self {
            Self {
                analyses: StdMutex::new(results.into()),
                ..Default::default()
            }
        }

        fn with_edits(results: Vec<Result<EditOutcome, AnalysisError>>) -> Self {
            Self {
                edits: StdMutex::new(results.into()),
                ..Default::default()
            }
        }

        fn queue_edits(mut self, results: Vec<Result<EditOutcome, AnalysisError>>) -> Self {
            self.edits = StdMutex::new(results.into());
            self
        }

        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.edit_gate = Some(gate);
            self
        }

        fn default_analysis() -> AnalysisResult {
            AnalysisResult {
                description: Some("a test pattern".into()),
                points: vec!["gradient bars".into()],
            }
        }

        fn remote_failure() -> AnalysisError {
            AnalysisError::RemoteStatus {
                status: 500,
                message: "backend exploded".into(),
            }
        }
    }

    #[async_trait]
    impl AnalysisClient for StubAnalysis {
        async fn analyze_image(
            &self,
            _payload: &MediaPayload,
        ) -> Result<AnalysisResult, AnalysisError> {
            self.analyze_calls.fetch_add(1, Ordering::SeqCst);
            self.analyses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Self::default_analysis()))
        }

        async fn analyze_video(
            &self,
            payload: &MediaPayload,
        ) -> Result<AnalysisResult, AnalysisError> {
            self.analyze_image(payload).await
        }

        async fn edit_image(
            &self,
            payload: &MediaPayload,
            _instruction: &str,
        ) -> Result<EditOutcome, AnalysisError> {
            self.edit_calls.fetch_add(1, Ordering::SeqCst);
            self.edit_sources.lock().unwrap().push(payload.clone());
            if let Some(gate) = &self.edit_gate {
                gate.notified().await;
            }
            self.edits
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(EditOutcome::default()))
        }
    }

    #[derive(Default)]
    struct RecordedEvents {
        phases: StdMutex<Vec<SessionPhase>>,
    }

    impl SessionEvents for RecordedEvents {
        fn state_changed(&self, snapshot: &SessionSnapshot) {
            self.phases.lock().unwrap().push(snapshot.phase);
        }
    }

    struct Harness {
        controller: SessionController,
        stub: Arc<StubAnalysis>,
        events: Arc<RecordedEvents>,
        history: HistoryStore,
        _dir: tempfile::TempDir,
    }

    fn harness_with(stub: StubAnalysis, backend: TestPatternBackend) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryStore::new(dir.path().join("history.json")).unwrap();
        let stub = Arc::new(stub);
        let events = Arc::new(RecordedEvents::default());
        let capture = MediaCapture::new(Arc::new(backend), StreamConstraints::default(), 80);
        let controller = SessionController::new(
            capture,
            history.clone(),
            Arc::clone(&stub) as Arc<dyn AnalysisClient>,
            Arc::clone(&events) as Arc<dyn SessionEvents>,
        );
        Harness {
            controller,
            stub,
            events,
            history,
            _dir: dir,
        }
    }

    fn harness(stub: StubAnalysis) -> Harness {
        harness_with(stub, TestPatternBackend::default())
    }

    fn edited_image(tag: u8) -> EditOutcome {
        EditOutcome {
            image: Some(MediaPayload::new(vec![tag; 4], "image/png")),
            text: None,
        }
    }

    #[tokio::test]
    async fn photo_capture_settles_in_viewing_with_analysis() {
        let h = harness(StubAnalysis::default());
        h.controller.initialize(CaptureMode::Photo).await.unwrap();

        let snapshot = h.controller.capture_photo().await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::Viewing);
        let asset = snapshot.current.unwrap();
        assert_eq!(asset.kind, MediaKind::Image);
        assert!(asset.analysis.is_some());
        assert!(snapshot.transient_error.is_none());

        assert_eq!(h.history.load().len(), 1);
        assert_eq!(h.stub.analyze_calls.load(Ordering::SeqCst), 1);

        // Exactly one settle into Viewing.
        let phases = h.events.phases.lock().unwrap().clone();
        assert_eq!(
            phases
                .iter()
                .filter(|phase| **phase == SessionPhase::Viewing)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn failed_analysis_still_lands_in_viewing() {
        let h = harness(StubAnalysis::with_analyses(vec![Err(
            StubAnalysis::remote_failure(),
        )]));
        h.controller.initialize(CaptureMode::Photo).await.unwrap();

        let snapshot = h.controller.capture_photo().await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::Viewing);
        assert!(snapshot.current.is_some());
        assert!(snapshot.current.unwrap().analysis.is_none());
        assert!(snapshot.transient_error.unwrap().contains("Analysis failed"));

        // Only successful round-trips are committed.
        assert!(h.history.load().is_empty());
    }

    #[tokio::test]
    async fn recording_produces_one_asset_and_one_analysis() {
        let h = harness(StubAnalysis::default());
        h.controller.initialize(CaptureMode::Video).await.unwrap();

        h.controller.start_recording().await.unwrap();
        assert!(matches!(
            h.controller.start_recording().await,
            Err(SessionError::OperationInProgress)
        ));

        let snapshot = h.controller.stop_recording().await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::Viewing);
        let asset = snapshot.current.unwrap();
        assert_eq!(asset.kind, MediaKind::Video);
        assert_eq!(asset.display_payload.mime_type, "image/jpeg");

        assert_eq!(h.stub.analyze_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.history.load().len(), 1);
    }

    #[tokio::test]
    async fn recording_requires_video_mode() {
        let h = harness(StubAnalysis::default());
        h.controller.initialize(CaptureMode::Photo).await.unwrap();
        assert!(matches!(
            h.controller.start_recording().await,
            Err(SessionError::WrongMode)
        ));
    }

    #[tokio::test]
    async fn restore_never_recommits_or_reanalyzes() {
        let h = harness(StubAnalysis::default());
        h.controller.initialize(CaptureMode::Photo).await.unwrap();
        let captured = h.controller.capture_photo().await.unwrap();
        let id = captured.current.unwrap().id;

        h.controller.reset().await.unwrap();
        let restored = h.controller.restore_from_history(&id).await.unwrap();

        assert_eq!(restored.phase, SessionPhase::Viewing);
        assert!(restored.restored);
        assert_eq!(restored.current.unwrap().id, id);
        assert_eq!(h.history.load().len(), 1);
        assert_eq!(h.stub.analyze_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn restore_of_unknown_id_fails() {
        let h = harness(StubAnalysis::default());
        h.controller.initialize(CaptureMode::Photo).await.unwrap();
        assert!(matches!(
            h.controller.restore_from_history("missing").await,
            Err(SessionError::UnknownRecord(_))
        ));
    }

    #[tokio::test]
    async fn edits_chain_and_reset_restore_shows_original() {
        let h = harness(StubAnalysis::with_edits(vec![
            Ok(edited_image(0xaa)),
            Ok(edited_image(0xbb)),
        ]));
        h.controller.initialize(CaptureMode::Photo).await.unwrap();
        let captured = h.controller.capture_photo().await.unwrap();
        let original = captured.current.clone().unwrap();

        let after_first = h.controller.submit_edit("make it blue").await.unwrap();
        let first_displayed = after_first.displayed.clone().unwrap();
        assert_eq!(first_displayed.bytes, vec![0xaa; 4]);

        let after_second = h.controller.submit_edit("add a hat").await.unwrap();
        assert_eq!(after_second.displayed.unwrap().bytes, vec![0xbb; 4]);

        // The second edit operated on the first edit's output, not the
        // original capture.
        let sources = h.stub.edit_sources.lock().unwrap().clone();
        assert_eq!(sources[0], original.payload);
        assert_eq!(sources[1], first_displayed);

        h.controller.reset().await.unwrap();
        let restored = h
            .controller
            .restore_from_history(&original.id)
            .await
            .unwrap();
        let record = restored.current.unwrap();
        assert_eq!(restored.displayed.unwrap(), original.display_payload);
        assert_eq!(record.analysis, original.analysis);
    }

    #[tokio::test]
    async fn refusal_and_empty_edit_leave_display_unchanged() {
        let h = harness(StubAnalysis::with_edits(vec![
            Ok(EditOutcome {
                image: None,
                text: Some("I can't do that to a landmark.".into()),
            }),
            Ok(EditOutcome::default()),
            Err(StubAnalysis::remote_failure()),
        ]));
        h.controller.initialize(CaptureMode::Photo).await.unwrap();
        let captured = h.controller.capture_photo().await.unwrap();
        let displayed = captured.displayed.unwrap();

        let refused = h.controller.submit_edit("erase the tower").await.unwrap();
        assert_eq!(refused.phase, SessionPhase::Viewing);
        assert_eq!(
            refused.transient_error.as_deref(),
            Some("I can't do that to a landmark.")
        );
        assert_eq!(refused.displayed.unwrap(), displayed);

        let empty = h.controller.submit_edit("do nothing").await.unwrap();
        assert!(empty.transient_error.unwrap().contains("no output"));

        let failed = h.controller.submit_edit("try again").await.unwrap();
        assert!(failed.transient_error.unwrap().contains("Edit failed"));
        assert_eq!(failed.displayed.unwrap(), displayed);
    }

    #[tokio::test]
    async fn edit_guards_reject_videos_and_empty_prompts() {
        let h = harness(StubAnalysis::default());
        h.controller.initialize(CaptureMode::Video).await.unwrap();
        h.controller.start_recording().await.unwrap();
        h.controller.stop_recording().await.unwrap();

        assert!(matches!(
            h.controller.submit_edit("colorize").await,
            Err(SessionError::NotEditable)
        ));

        h.controller.reset().await.unwrap();
        h.controller.capture_photo().await.unwrap();
        assert!(matches!(
            h.controller.submit_edit("   ").await,
            Err(SessionError::EmptyInstruction)
        ));
    }

    #[tokio::test]
    async fn concurrent_edit_submission_is_refused() {
        let gate = Arc::new(Notify::new());
        let h = harness(
            StubAnalysis::default()
                .queue_edits(vec![Ok(edited_image(0x11))])
                .gated(Arc::clone(&gate)),
        );
        h.controller.initialize(CaptureMode::Photo).await.unwrap();
        h.controller.capture_photo().await.unwrap();

        let controller = h.controller.clone();
        let first = tokio::spawn(async move { controller.submit_edit("make it blue").await });

        while h.controller.snapshot().await.phase != SessionPhase::Editing {
            tokio::task::yield_now().await;
        }

        assert!(matches!(
            h.controller.submit_edit("add a hat").await,
            Err(SessionError::OperationInProgress)
        ));
        assert_eq!(h.stub.edit_calls.load(Ordering::SeqCst), 1);

        gate.notify_one();
        let settled = first.await.unwrap().unwrap();
        assert_eq!(settled.phase, SessionPhase::Viewing);
    }

    #[tokio::test]
    async fn busy_phase_refuses_restore_reset_and_initialize() {
        let gate = Arc::new(Notify::new());
        let h = harness(
            StubAnalysis::default()
                .queue_edits(vec![Ok(edited_image(0x22))])
                .gated(Arc::clone(&gate)),
        );
        h.controller.initialize(CaptureMode::Photo).await.unwrap();
        let captured = h.controller.capture_photo().await.unwrap();
        let id = captured.current.unwrap().id;

        let controller = h.controller.clone();
        let edit = tokio::spawn(async move { controller.submit_edit("sharpen").await });
        while h.controller.snapshot().await.phase != SessionPhase::Editing {
            tokio::task::yield_now().await;
        }

        assert!(matches!(
            h.controller.restore_from_history(&id).await,
            Err(SessionError::OperationInProgress)
        ));
        assert!(matches!(
            h.controller.initialize(CaptureMode::Photo).await,
            Err(SessionError::OperationInProgress)
        ));
        assert!(matches!(
            h.controller.reset().await,
            Err(SessionError::OperationInProgress)
        ));

        gate.notify_one();
        let settled = edit.await.unwrap().unwrap();
        assert_eq!(settled.phase, SessionPhase::Viewing);
        assert_eq!(settled.displayed.unwrap().bytes, vec![0x22; 4]);
    }

    #[tokio::test]
    async fn uninitialized_session_reports_its_error() {
        let h = harness(StubAnalysis::default());
        let snapshot = h.controller.snapshot().await;
        assert_eq!(snapshot.phase, SessionPhase::Error);
        assert!(snapshot.transient_error.is_some());
    }

    #[tokio::test]
    async fn capture_requires_idle() {
        let h = harness(StubAnalysis::default());
        h.controller.initialize(CaptureMode::Photo).await.unwrap();
        h.controller.capture_photo().await.unwrap();

        // Viewing, not Idle: a second capture needs a reset first.
        assert!(matches!(
            h.controller.capture_photo().await,
            Err(SessionError::InvalidPhase(SessionPhase::Viewing))
        ));
    }

    #[tokio::test]
    async fn unavailable_device_enters_error_and_import_recovers() {
        let h = harness_with(StubAnalysis::default(), TestPatternBackend::unavailable());

        assert!(matches!(
            h.controller.initialize(CaptureMode::Photo).await,
            Err(SessionError::Capture(_))
        ));
        assert_eq!(h.controller.snapshot().await.phase, SessionPhase::Error);

        let imported = h
            .controller
            .import_photo(MediaPayload::new(vec![9, 9, 9], "image/png"))
            .await
            .unwrap();
        assert_eq!(imported.phase, SessionPhase::Viewing);
        assert!(imported.current.unwrap().analysis.is_some());
        assert_eq!(h.history.load().len(), 1);
    }

    #[tokio::test]
    async fn import_rejects_non_image_payloads() {
        let h = harness(StubAnalysis::default());
        h.controller.initialize(CaptureMode::Photo).await.unwrap();
        assert!(matches!(
            h.controller
                .import_photo(MediaPayload::new(vec![1], "video/webm"))
                .await,
            Err(SessionError::UnsupportedImport(_))
        ));
    }

    #[tokio::test]
    async fn dismiss_error_clears_only_the_message() {
        let h = harness(StubAnalysis::with_analyses(vec![Err(
            StubAnalysis::remote_failure(),
        )]));
        h.controller.initialize(CaptureMode::Photo).await.unwrap();
        let snapshot = h.controller.capture_photo().await.unwrap();
        assert!(snapshot.transient_error.is_some());

        let cleared = h.controller.dismiss_error().await;
        assert!(cleared.transient_error.is_none());
        assert_eq!(cleared.phase, SessionPhase::Viewing);
        assert!(cleared.current.is_some());
    }
}
