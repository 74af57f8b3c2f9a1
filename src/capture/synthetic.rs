//! Built-in synthetic camera: procedural test-pattern frames and M-JPEG
//! clips. Serves as the development backend on machines without a wired
//! platform capturer and as the double for capture/session tests.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::backend::{CaptureBackend, ClipFlush, DeviceStream, RawFrame, StreamConstraints, ZoomRange};
use super::CaptureError;
use crate::models::MediaPayload;

const CLIP_FRAME_INTERVAL_MS: u64 = 100;
const CLIP_JPEG_QUALITY: u8 = 80;

pub struct TestPatternBackend {
    available: bool,
    zoom: Option<ZoomRange>,
}

impl Default for TestPatternBackend {
    fn default() -> Self {
        Self {
            available: true,
            zoom: Some(ZoomRange {
                min: 1.0,
                max: 4.0,
                step: 0.1,
            }),
        }
    }
}

impl TestPatternBackend {
    /// Backend that refuses acquisition, as a permission-denied camera would.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            zoom: None,
        }
    }

    pub fn without_zoom() -> Self {
        Self {
            available: true,
            zoom: None,
        }
    }
}

#[async_trait]
impl CaptureBackend for TestPatternBackend {
    async fn acquire(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn DeviceStream>, CaptureError> {
        if !self.available {
            return Err(CaptureError::DeviceUnavailable(
                "no camera present or permission denied".into(),
            ));
        }

        Ok(Box::new(TestPatternStream {
            width: constraints.width.clamp(16, 640),
            height: constraints.height.clamp(16, 480),
            zoom: self.zoom,
            tick: 0,
            clip: None,
        }))
    }
}

struct ClipWorker {
    token: CancellationToken,
    handle: JoinHandle<()>,
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Drop for ClipWorker {
    // A stream released mid-recording must not leave its pump running.
    fn drop(&mut self) {
        self.token.cancel();
        self.handle.abort();
    }
}

struct TestPatternStream {
    width: u32,
    height: u32,
    zoom: Option<ZoomRange>,
    tick: u64,
    clip: Option<ClipWorker>,
}

#[async_trait]
impl DeviceStream for TestPatternStream {
    fn current_frame(&mut self) -> Result<RawFrame, CaptureError> {
        let frame = generate_frame(self.width, self.height, self.tick);
        self.tick = self.tick.wrapping_add(1);
        Ok(frame)
    }

    fn zoom_range(&self) -> Option<ZoomRange> {
        self.zoom
    }

    fn begin_clip(&mut self) -> Result<(), CaptureError> {
        if self.clip.is_some() {
            return Err(CaptureError::InvalidRecordingState("clip already buffering"));
        }

        let token = CancellationToken::new();
        let frames = Arc::new(Mutex::new(Vec::new()));
        let handle = tokio::spawn(clip_pump(
            self.width,
            self.height,
            token.clone(),
            Arc::clone(&frames),
        ));

        self.clip = Some(ClipWorker {
            token,
            handle,
            frames,
        });
        Ok(())
    }

    async fn finish_clip(&mut self) -> Result<ClipFlush, CaptureError> {
        let mut worker = self
            .clip
            .take()
            .ok_or(CaptureError::InvalidRecordingState("no clip buffering"))?;

        worker.token.cancel();
        (&mut worker.handle)
            .await
            .map_err(|_| CaptureError::Encode("clip worker failed to join".into()))?;

        let mut frames = worker.frames.lock().unwrap_or_else(|p| p.into_inner());
        if frames.is_empty() {
            // A stop immediately after start still yields a one-frame clip.
            frames.push(encode_pattern_jpeg(self.width, self.height, self.tick)?);
        }

        let clip_bytes: Vec<u8> = frames.concat();
        Ok(ClipFlush {
            clip: MediaPayload::new(clip_bytes, "video/x-motion-jpeg"),
            poster_frame: generate_frame(self.width, self.height, self.tick),
        })
    }
}

async fn clip_pump(
    width: u32,
    height: u32,
    token: CancellationToken,
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
) {
    let mut ticker = interval(Duration::from_millis(CLIP_FRAME_INTERVAL_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Ok(encoded) = encode_pattern_jpeg(width, height, tick) {
                    frames.lock().unwrap_or_else(|p| p.into_inner()).push(encoded);
                }
                tick = tick.wrapping_add(1);
            }
            _ = token.cancelled() => break,
        }
    }
}

fn generate_frame(width: u32, height: u32, tick: u64) -> RawFrame {
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    let phase = (tick % 255) as u8;
    for y in 0..height {
        for x in 0..width {
            pixels.push(((x * 255) / width.max(1)) as u8);
            pixels.push(((y * 255) / height.max(1)) as u8);
            pixels.push(phase);
        }
    }
    RawFrame {
        width,
        height,
        pixels,
    }
}

fn encode_pattern_jpeg(width: u32, height: u32, tick: u64) -> Result<Vec<u8>, CaptureError> {
    let frame = generate_frame(width, height, tick);

    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(Cursor::new(&mut bytes), CLIP_JPEG_QUALITY);
    encoder
        .encode(&frame.pixels, frame.width, frame.height, ExtendedColorType::Rgb8)
        .map_err(|err| CaptureError::Encode(err.to_string()))?;
    Ok(bytes)
}
