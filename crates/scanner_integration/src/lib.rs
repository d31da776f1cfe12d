//! Seam between the check-in client and whatever turns camera frames into
//! QR text. The decoder itself is external; this crate only fixes the shape of
//! the conversation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

mod line_feed;

pub use line_feed::LineFeedDecoder;

pub const DEFAULT_FPS: u32 = 10;
pub const DEFAULT_QRBOX: u32 = 250;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraPreference {
    /// Rear-facing camera on phones and tablets.
    #[default]
    Environment,
    User,
}

impl CameraPreference {
    pub fn facing_mode(self) -> &'static str {
        match self {
            CameraPreference::Environment => "environment",
            CameraPreference::User => "user",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeOptions {
    /// Target frames decoded per second.
    pub fps: u32,
    /// Side of the square detection region, in logical pixels.
    pub qrbox: u32,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            qrbox: DEFAULT_QRBOX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    Decoded(String),
    NotFound,
}

pub type FrameSink = mpsc::Sender<FrameEvent>;
pub type FrameStream = mpsc::Receiver<FrameEvent>;

pub fn frame_channel(capacity: usize) -> (FrameSink, FrameStream) {
    mpsc::channel(capacity)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera available")]
    NotAvailable,
    #[error("camera failure: {0}")]
    Device(String),
}

/// External decoder bound to a camera feed. `start` begins pushing one
/// [`FrameEvent`] per processed frame into `frames` until `stop` is called.
#[async_trait]
pub trait DecodeCapability: Send + Sync {
    async fn start(
        &self,
        camera: CameraPreference,
        options: DecodeOptions,
        frames: FrameSink,
    ) -> Result<(), CameraError>;
    async fn stop(&self) -> anyhow::Result<()>;
    /// Drops any preview surface left behind by the last run.
    async fn clear(&self) -> anyhow::Result<()>;
}

pub struct MissingDecodeCapability;

#[async_trait]
impl DecodeCapability for MissingDecodeCapability {
    async fn start(
        &self,
        _camera: CameraPreference,
        _options: DecodeOptions,
        _frames: FrameSink,
    ) -> Result<(), CameraError> {
        Err(CameraError::NotAvailable)
    }

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
