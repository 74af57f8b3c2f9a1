mod backend;
mod synthetic;

use std::io::Cursor;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use log::info;
use thiserror::Error;

use crate::models::MediaPayload;

pub use backend::{
    CaptureBackend, CaptureMode, ClipFlush, DeviceStream, RawFrame, StreamConstraints, ZoomRange,
};
pub use synthetic::TestPatternBackend;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("no active camera stream")]
    NoActiveStream,

    #[error("invalid recording state: {0}")]
    InvalidRecordingState(&'static str),

    #[error("frame encoding failed: {0}")]
    Encode(String),
}

/// A finished recording: the encoded clip plus a poster frame the UI can
/// render as the clip's display payload.
#[derive(Debug, Clone)]
pub struct RecordedClip {
    pub clip: MediaPayload,
    pub poster: MediaPayload,
}

/// Owns the exclusive camera/microphone handle and turns live frames into
/// encoded payloads. Three internal states: closed, open, recording. All
/// device specifics live behind [`CaptureBackend`]; this type only enforces
/// ordering and does the still/poster encoding.
pub struct MediaCapture {
    backend: Arc<dyn CaptureBackend>,
    stream: Option<Box<dyn DeviceStream>>,
    recording: bool,
    constraints: StreamConstraints,
    jpeg_quality: u8,
}

impl MediaCapture {
    pub fn new(backend: Arc<dyn CaptureBackend>, constraints: StreamConstraints, jpeg_quality: u8) -> Self {
        Self {
            backend,
            stream: None,
            recording: false,
            constraints,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Acquires the device stream. Photo mode requests video only; video mode
    /// also requests audio. Returns the zoom range when the device reports
    /// one. A failed acquisition leaves no handle behind.
    pub async fn open(&mut self, mode: CaptureMode) -> Result<Option<ZoomRange>, CaptureError> {
        // Overlapping acquisition is not permitted; drop any previous handle
        // before asking the backend for a new one.
        self.close();

        let constraints = self.constraints.for_mode(mode);
        let stream = self.backend.acquire(&constraints).await?;
        let zoom = stream.zoom_range();

        info!(
            "camera stream acquired ({}x{}, audio={})",
            constraints.width, constraints.height, constraints.audio
        );

        self.stream = Some(stream);
        Ok(zoom)
    }

    /// Releases all device tracks. Idempotent; a recording in flight is
    /// discarded along with the stream.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            info!("camera stream released");
        }
        self.recording = false;
    }

    /// Encodes the current live frame as a JPEG payload.
    pub fn capture_still(&mut self) -> Result<MediaPayload, CaptureError> {
        let stream = self.stream.as_mut().ok_or(CaptureError::NoActiveStream)?;
        let frame = stream.current_frame()?;
        encode_jpeg(&frame, self.jpeg_quality)
    }

    pub fn start_recording(&mut self) -> Result<(), CaptureError> {
        let stream = self.stream.as_mut().ok_or(CaptureError::NoActiveStream)?;
        if self.recording {
            return Err(CaptureError::InvalidRecordingState("already recording"));
        }

        stream.begin_clip()?;
        self.recording = true;
        Ok(())
    }

    /// Stops the recording and resolves once the backend encoder has flushed
    /// its last buffered data, returning the complete clip.
    pub async fn stop_recording(&mut self) -> Result<RecordedClip, CaptureError> {
        if !self.recording {
            return Err(CaptureError::InvalidRecordingState("not recording"));
        }
        let stream = self.stream.as_mut().ok_or(CaptureError::NoActiveStream)?;

        let flush = stream.finish_clip().await;
        self.recording = false;
        let flush = flush?;

        let poster = encode_jpeg(&flush.poster_frame, self.jpeg_quality)?;
        Ok(RecordedClip {
            clip: flush.clip,
            poster,
        })
    }

    /// Best-effort zoom: clamps to the device range, no-op when the stream is
    /// closed or the device has no zoom capability.
    pub fn set_zoom(&mut self, level: f64) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        let Some(range) = stream.zoom_range() else {
            return;
        };
        stream.apply_zoom(range.clamp(level));
    }
}

fn encode_jpeg(frame: &RawFrame, quality: u8) -> Result<MediaPayload, CaptureError> {
    let expected = frame.width as usize * frame.height as usize * 3;
    if frame.pixels.len() != expected {
        return Err(CaptureError::Encode(
            "frame buffer does not match dimensions".into(),
        ));
    }

    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(Cursor::new(&mut bytes), quality);
    encoder
        .encode(&frame.pixels, frame.width, frame.height, ExtendedColorType::Rgb8)
        .map_err(|err| CaptureError::Encode(err.to_string()))?;

    Ok(MediaPayload::new(bytes, "image/jpeg"))
}
