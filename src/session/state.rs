use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::capture::{CaptureError, CaptureMode, ZoomRange};
use crate::models::{AnalysisResult, MediaAsset, MediaPayload};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Idle,
    Recording,
    Analyzing,
    Viewing,
    Editing,
    Error,
}

impl SessionPhase {
    /// Phases with an outstanding asynchronous operation. While busy, every
    /// other submission is refused rather than queued.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SessionPhase::Recording | SessionPhase::Analyzing | SessionPhase::Editing
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Recording => "recording",
            SessionPhase::Analyzing => "analyzing",
            SessionPhase::Viewing => "viewing",
            SessionPhase::Editing => "editing",
            SessionPhase::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("an operation is already in progress")]
    OperationInProgress,

    #[error("not allowed while {0}")]
    InvalidPhase(SessionPhase),

    #[error("recording requires a video-mode session")]
    WrongMode,

    #[error("only image captures can be edited")]
    NotEditable,

    #[error("edit instruction is empty")]
    EmptyInstruction,

    #[error("no history record with id {0}")]
    UnknownRecord(String),

    #[error("unsupported import type {0}")]
    UnsupportedImport(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// What the presentation layer renders: the single source of truth for the
/// whole capture/analysis/edit flow.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub current: Option<MediaAsset>,
    /// Renderable payload for the current asset, including any accepted
    /// edits. Edits never reach `current.analysis` or the history store.
    pub displayed: Option<MediaPayload>,
    pub transient_error: Option<String>,
    pub zoom: Option<ZoomRange>,
    pub restored: bool,
}

pub(super) struct SessionState {
    pub phase: SessionPhase,
    pub mode: CaptureMode,
    pub current: Option<MediaAsset>,
    pub displayed: Option<MediaPayload>,
    /// Source for the next edit: the last accepted edited image, or the
    /// original payload when no edit has been accepted yet.
    pub edit_source: Option<MediaPayload>,
    pub transient_error: Option<String>,
    pub zoom: Option<ZoomRange>,
    pub restored: bool,
}

impl SessionState {
    /// Starts in `Error` so a snapshot taken before `initialize` renders the
    /// no-device state, message included.
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Error,
            mode: CaptureMode::Photo,
            current: None,
            displayed: None,
            edit_source: None,
            transient_error: Some("Camera not started yet".into()),
            zoom: None,
            restored: false,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            current: self.current.clone(),
            displayed: self.displayed.clone(),
            transient_error: self.transient_error.clone(),
            zoom: self.zoom,
            restored: self.restored,
        }
    }

    /// Installs a freshly captured or restored asset as the current one,
    /// discarding any previous edit chain.
    pub fn install_asset(&mut self, asset: MediaAsset, restored: bool) {
        self.displayed = Some(asset.display_payload.clone());
        self.current = Some(asset);
        self.edit_source = None;
        self.restored = restored;
        self.transient_error = None;
    }

    pub fn attach_analysis(&mut self, analysis: AnalysisResult) {
        if let Some(asset) = self.current.as_mut() {
            asset.analysis = Some(analysis);
        }
    }

    pub fn accept_edit(&mut self, edited: MediaPayload) {
        self.displayed = Some(edited.clone());
        self.edit_source = Some(edited);
    }

    /// The payload the next edit operates on: edits chain off the last
    /// accepted result.
    pub fn edit_input(&self) -> Option<MediaPayload> {
        self.edit_source
            .clone()
            .or_else(|| self.current.as_ref().map(|asset| asset.payload.clone()))
    }

    pub fn clear_asset(&mut self) {
        self.current = None;
        self.displayed = None;
        self.edit_source = None;
        self.restored = false;
        self.transient_error = None;
    }
}
