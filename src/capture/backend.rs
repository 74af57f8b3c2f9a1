use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::CaptureError;
use crate::models::MediaPayload;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CaptureMode {
    Photo,
    Video,
}

/// Stream request parameters: rear-facing camera, a resolution hint, and
/// whether an audio track is wanted.
#[derive(Debug, Clone, Copy)]
pub struct StreamConstraints {
    pub width: u32,
    pub height: u32,
    pub audio: bool,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            audio: false,
        }
    }
}

impl StreamConstraints {
    pub fn for_mode(&self, mode: CaptureMode) -> Self {
        Self {
            audio: mode == CaptureMode::Video,
            ..*self
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ZoomRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ZoomRange {
    pub fn clamp(&self, level: f64) -> f64 {
        level.clamp(self.min, self.max)
    }
}

/// One uncompressed RGB frame straight from the device.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// What the stream's encoder hands back when a recording stops: the encoded
/// clip and the frame used to derive its poster image.
#[derive(Debug)]
pub struct ClipFlush {
    pub clip: MediaPayload,
    pub poster_frame: RawFrame,
}

/// Platform seam for device acquisition. Implementations own permission
/// prompts and hardware enumeration; acquisition failure must not leave a
/// half-opened device behind.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    async fn acquire(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn DeviceStream>, CaptureError>;
}

/// An exclusive live stream. Dropping the value releases all device tracks.
#[async_trait]
pub trait DeviceStream: Send {
    fn current_frame(&mut self) -> Result<RawFrame, CaptureError>;

    /// `None` when the device exposes no optical/digital zoom.
    fn zoom_range(&self) -> Option<ZoomRange>;

    /// Applies an already-clamped zoom level. Default is a no-op.
    fn apply_zoom(&mut self, _level: f64) {}

    fn begin_clip(&mut self) -> Result<(), CaptureError>;

    /// Resolves once the encoder has flushed the last buffered data.
    async fn finish_clip(&mut self) -> Result<ClipFlush, CaptureError>;
}
