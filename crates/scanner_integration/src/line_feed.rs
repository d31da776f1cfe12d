use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{CameraError, CameraPreference, DecodeCapability, DecodeOptions, FrameEvent, FrameSink};

/// Decoder fed by already-decoded text lines, as produced by keyboard-wedge
/// handheld scanners or by pasting payloads into a terminal. Each line counts
/// as one frame; a blank line is a frame with no code in view.
#[derive(Default)]
pub struct LineFeedDecoder {
    state: Mutex<LineFeedState>,
}

#[derive(Default)]
struct LineFeedState {
    sink: Option<FrameSink>,
    input_closed: bool,
}

impl LineFeedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.sink.is_some()
    }

    /// Hands `line` to the running scan. When no scan is running the line is
    /// returned untouched so the caller can treat it as something else.
    pub async fn offer(&self, line: String) -> Option<String> {
        let sink = self.state.lock().await.sink.clone()?;
        let event = if line.trim().is_empty() {
            FrameEvent::NotFound
        } else {
            FrameEvent::Decoded(line.trim().to_string())
        };
        if sink.send(event).await.is_err() {
            // Reader went away without calling stop.
            self.state.lock().await.sink = None;
            return Some(line);
        }
        None
    }

    /// Marks the input source as exhausted; any running scan sees its frame
    /// stream end and later starts fail.
    pub async fn close_input(&self) {
        let mut state = self.state.lock().await;
        state.input_closed = true;
        state.sink = None;
    }
}

#[async_trait]
impl DecodeCapability for LineFeedDecoder {
    async fn start(
        &self,
        camera: CameraPreference,
        options: DecodeOptions,
        frames: FrameSink,
    ) -> Result<(), CameraError> {
        let mut state = self.state.lock().await;
        if state.input_closed {
            return Err(CameraError::NotAvailable);
        }
        debug!(
            facing_mode = camera.facing_mode(),
            fps = options.fps,
            qrbox = options.qrbox,
            "line feed decoder started"
        );
        state.sink = Some(frames);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.state.lock().await.sink = None;
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_channel;

    #[tokio::test]
    async fn lines_are_returned_when_no_scan_is_running() {
        let decoder = LineFeedDecoder::new();
        assert_eq!(decoder.offer("save".into()).await, Some("save".to_string()));
    }

    #[tokio::test]
    async fn lines_become_frames_while_started() {
        let decoder = LineFeedDecoder::new();
        let (sink, mut stream) = frame_channel(4);
        decoder
            .start(CameraPreference::Environment, DecodeOptions::default(), sink)
            .await
            .expect("start");

        assert!(decoder.offer("  {\"team_id\":1} ".into()).await.is_none());
        assert!(decoder.offer("".into()).await.is_none());
        assert_eq!(
            stream.recv().await,
            Some(FrameEvent::Decoded("{\"team_id\":1}".into()))
        );
        assert_eq!(stream.recv().await, Some(FrameEvent::NotFound));

        decoder.stop().await.expect("stop");
        assert!(!decoder.is_active().await);
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test]
    async fn closed_input_refuses_to_start() {
        let decoder = LineFeedDecoder::new();
        decoder.close_input().await;
        let (sink, _stream) = frame_channel(1);
        let err = decoder
            .start(CameraPreference::User, DecodeOptions::default(), sink)
            .await
            .expect_err("closed");
        assert_eq!(err, CameraError::NotAvailable);
    }
}
