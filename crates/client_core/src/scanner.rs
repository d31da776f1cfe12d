use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use scanner_integration::{frame_channel, DecodeCapability, FrameEvent, FrameStream};
use shared::{domain::TeamId, protocol::ScanPayload};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{config::ScannerSettings, error::ScannerError, Notice, SessionEvent};

const FRAME_BUFFER: usize = 32;

enum ScannerPhase {
    Idle,
    Scanning { frames: FrameStream },
}

/// Owns the decoder for one check-in station. Only one decode run exists at a
/// time: a run ends either through [`ScannerSession::stop`] or by itself when
/// a valid payload is read.
pub struct ScannerSession {
    decoder: Arc<dyn DecodeCapability>,
    settings: ScannerSettings,
    phase: ScannerPhase,
    events: broadcast::Sender<SessionEvent>,
    loading_visible: Arc<AtomicBool>,
    loading_timer: Option<JoinHandle<()>>,
}

impl ScannerSession {
    pub fn new(
        decoder: Arc<dyn DecodeCapability>,
        settings: ScannerSettings,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            decoder,
            settings,
            phase: ScannerPhase::Idle,
            events,
            loading_visible: Arc::new(AtomicBool::new(false)),
            loading_timer: None,
        }
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self.phase, ScannerPhase::Scanning { .. })
    }

    pub async fn start(&mut self) -> Result<(), ScannerError> {
        if self.is_scanning() {
            return Err(ScannerError::AlreadyScanning);
        }
        self.show_loading();

        let (sink, frames) = frame_channel(FRAME_BUFFER);
        let started = self
            .decoder
            .start(
                self.settings.camera,
                self.settings.decode_options(),
                sink,
            )
            .await;

        match started {
            Ok(()) => {
                info!(
                    facing_mode = self.settings.camera.facing_mode(),
                    "scanner started"
                );
                self.phase = ScannerPhase::Scanning { frames };
                if self.settings.loading_grace().is_zero() {
                    self.hide_loading();
                }
                Ok(())
            }
            Err(error) => {
                warn!(%error, "camera could not be acquired");
                // The decoder may have grabbed the device before failing.
                self.release_quietly().await;
                self.emit(SessionEvent::Notice(Notice::CameraUnavailable));
                // Otherwise the grace timer hides the indicator.
                if self.settings.loading_grace().is_zero() {
                    self.hide_loading();
                }
                Err(ScannerError::CameraAccess(error))
            }
        }
    }

    /// Waits for the next valid payload. Invalid frames are reported and
    /// skipped. Returns `None` when the session is not scanning or the frame
    /// stream ended.
    pub async fn next_team(&mut self) -> Option<TeamId> {
        loop {
            let frame = self.next_frame().await;
            let stream_ended = frame.is_none();
            if let Some(team_id) = self.accept_frame(frame).await {
                return Some(team_id);
            }
            if stream_ended || !self.is_scanning() {
                return None;
            }
        }
    }

    /// Receives one frame without acting on it. Dropping the returned future
    /// loses nothing, so it can race other input.
    pub async fn next_frame(&mut self) -> Option<FrameEvent> {
        match &mut self.phase {
            ScannerPhase::Idle => None,
            ScannerPhase::Scanning { frames } => frames.recv().await,
        }
    }

    /// Acts on a frame from [`ScannerSession::next_frame`]; `None` means the
    /// frame stream ended and the session stops.
    pub async fn accept_frame(&mut self, frame: Option<FrameEvent>) -> Option<TeamId> {
        match frame {
            Some(FrameEvent::NotFound) => None,
            Some(FrameEvent::Decoded(text)) => {
                self.hide_loading();
                self.accept_decoded(&text).await
            }
            None => {
                if self.is_scanning() {
                    info!("frame stream closed");
                    self.stop().await;
                }
                None
            }
        }
    }

    /// Handles one decoded frame. A valid payload stops the session before
    /// its team id is handed back, so later frames never reach the caller.
    pub async fn accept_decoded(&mut self, text: &str) -> Option<TeamId> {
        if !self.is_scanning() {
            debug!("ignoring frame decoded outside a scan");
            return None;
        }

        match ScanPayload::parse(text) {
            Ok(payload) => {
                info!(team_id = %payload.team_id, "scanned team payload");
                self.stop().await;
                Some(payload.team_id)
            }
            Err(error) => {
                warn!(%error, "rejected scanned payload");
                self.emit(SessionEvent::Notice(Notice::InvalidPayload(error)));
                None
            }
        }
    }

    pub async fn stop(&mut self) {
        if let ScannerPhase::Scanning { frames } =
            std::mem::replace(&mut self.phase, ScannerPhase::Idle)
        {
            drop(frames);
            self.release_quietly().await;
            info!("scanner stopped");
        }
    }

    /// Stop, clear, wait, start. The loading indicator is up for the whole
    /// sequence.
    pub async fn restart(&mut self) -> Result<(), ScannerError> {
        self.show_loading();
        self.stop().await;
        self.clear_quietly().await;
        let delay = self.settings.restart_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.start().await
    }

    pub async fn dispose(&mut self) {
        self.stop().await;
        self.clear_quietly().await;
        self.hide_loading();
    }

    fn show_loading(&mut self) {
        if !self.loading_visible.swap(true, Ordering::SeqCst) {
            self.emit(SessionEvent::LoadingIndicator { visible: true });
        }
        if let Some(timer) = self.loading_timer.take() {
            timer.abort();
        }

        let grace = self.settings.loading_grace();
        if grace.is_zero() {
            return;
        }
        let visible = Arc::clone(&self.loading_visible);
        let events = self.events.clone();
        self.loading_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if visible.swap(false, Ordering::SeqCst) {
                let _ = events.send(SessionEvent::LoadingIndicator { visible: false });
            }
        }));
    }

    fn hide_loading(&mut self) {
        if let Some(timer) = self.loading_timer.take() {
            timer.abort();
        }
        if self.loading_visible.swap(false, Ordering::SeqCst) {
            self.emit(SessionEvent::LoadingIndicator { visible: false });
        }
    }

    async fn release_quietly(&self) {
        if let Err(error) = self.decoder.stop().await {
            warn!(%error, "failed to stop decoder");
            self.emit(SessionEvent::Notice(Notice::ScannerCleanupFailed(
                error.to_string(),
            )));
        }
    }

    async fn clear_quietly(&self) {
        if let Err(error) = self.decoder.clear().await {
            warn!(%error, "failed to clear decoder preview");
            self.emit(SessionEvent::Notice(Notice::ScannerCleanupFailed(
                error.to_string(),
            )));
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine; events are advisory.
        let _ = self.events.send(event);
    }
}

impl Drop for ScannerSession {
    fn drop(&mut self) {
        if let Some(timer) = self.loading_timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/scanner_tests.rs"]
mod tests;
