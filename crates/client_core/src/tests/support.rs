//! Test doubles shared by the scanner and controller tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use scanner_integration::{
    CameraError, CameraPreference, DecodeCapability, DecodeOptions, FrameEvent, FrameSink,
};
use shared::{
    domain::TeamId,
    protocol::{MemberRecord, MemberUpdate, TeamRecord, TeamRoster},
};
use tokio::sync::{broadcast, Mutex};

use crate::{directory::TeamDirectory, error::DirectoryError, SessionEvent};

#[derive(Default)]
pub struct FakeDecoder {
    sink: Mutex<Option<FrameSink>>,
    pub start_error: Mutex<Option<CameraError>>,
    pub fail_stop: Mutex<bool>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub clears: AtomicUsize,
}

impl FakeDecoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn push(&self, event: FrameEvent) -> bool {
        let sink = self.sink.lock().await.clone();
        match sink {
            Some(sink) => sink.send(event).await.is_ok(),
            None => false,
        }
    }

    pub async fn push_text(&self, text: &str) -> bool {
        self.push(FrameEvent::Decoded(text.to_string())).await
    }

    pub async fn end_stream(&self) {
        self.sink.lock().await.take();
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecodeCapability for FakeDecoder {
    async fn start(
        &self,
        _camera: CameraPreference,
        _options: DecodeOptions,
        frames: FrameSink,
    ) -> Result<(), CameraError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.start_error.lock().await.clone() {
            return Err(error);
        }
        *self.sink.lock().await = Some(frames);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.sink.lock().await.take();
        if *self.fail_stop.lock().await {
            anyhow::bail!("camera track refused to stop");
        }
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory directory keyed by team id.
#[derive(Default)]
pub struct FakeDirectory {
    pub teams: Mutex<HashMap<String, TeamRoster>>,
    pub saved: Mutex<Vec<Vec<MemberUpdate>>>,
    pub reject_saves: Mutex<bool>,
    pub fetch_delay: Mutex<Option<Duration>>,
    pub fetches: AtomicUsize,
    pub pushes: AtomicUsize,
}

impl FakeDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_falcons() -> Arc<Self> {
        let directory = Self::default();
        directory
            .teams
            .try_lock()
            .expect("fresh lock")
            .insert("42".into(), falcons_roster());
        Arc::new(directory)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn pushes(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TeamDirectory for FakeDirectory {
    async fn fetch_team(&self, team_id: &TeamId) -> Result<TeamRoster, DirectoryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.teams
            .lock()
            .await
            .get(team_id.as_str())
            .cloned()
            .ok_or_else(|| DirectoryError::TeamNotFound(team_id.clone()))
    }

    async fn push_member_updates(&self, members: &[MemberUpdate]) -> Result<(), DirectoryError> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        if *self.reject_saves.lock().await {
            return Err(DirectoryError::UpdateFailed("server replied 'nope'".into()));
        }
        self.saved.lock().await.push(members.to_vec());
        Ok(())
    }
}

pub fn falcons_roster() -> TeamRoster {
    TeamRoster {
        team: TeamRecord {
            team_id: TeamId::new("42"),
            team_name: "Falcons".into(),
            last_updated: None,
        },
        members: vec![MemberRecord {
            member_id: shared::domain::MemberId(1),
            member_name: "Ana".into(),
            check_in: false,
            snacks: false,
            dinner: false,
            check_out: false,
        }],
    }
}

pub fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}
