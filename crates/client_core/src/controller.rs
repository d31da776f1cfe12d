//! Top-level check-in flow: scan a team badge, review its roster, save, and
//! go back to scanning.

use std::sync::Arc;

use scanner_integration::{DecodeCapability, FrameEvent};
use shared::{
    domain::{Flag, Member, MemberId, Team, TeamId},
    protocol::TeamRoster,
};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    config::ScannerSettings,
    directory::TeamDirectory,
    error::{DirectoryError, SessionError},
    roster::RosterView,
    scanner::ScannerSession,
    Notice, SessionEvent,
};

const EVENT_BUFFER: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    Reviewing,
}

/// Issued when a roster fetch starts. A ticket only completes if no newer scan
/// has begun in the meantime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
    team_id: TeamId,
}

impl FetchTicket {
    pub fn team_id(&self) -> &TeamId {
        &self.team_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Reviewing(Team),
    TeamNotFound(TeamId),
    FetchFailed,
    /// The fetch finished after a newer scan started; nothing was rendered.
    Stale,
    /// The scanner was not running or its frame source ended.
    ScannerStopped,
}

pub struct SessionController {
    scanner: ScannerSession,
    directory: Arc<dyn TeamDirectory>,
    roster: RosterView,
    state: SessionState,
    current_team: Option<TeamId>,
    generation: u64,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn create(
        decoder: Arc<dyn DecodeCapability>,
        directory: Arc<dyn TeamDirectory>,
        settings: ScannerSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            scanner: ScannerSession::new(decoder, settings, events.clone()),
            directory,
            roster: RosterView::new(),
            state: SessionState::Idle,
            current_team: None,
            generation: 0,
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn roster(&self) -> &RosterView {
        &self.roster
    }

    pub fn current_team(&self) -> Option<&TeamId> {
        self.current_team.as_ref()
    }

    pub async fn launch(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState(self.state));
        }
        self.scanner.start().await?;
        self.set_state(SessionState::Scanning);
        Ok(())
    }

    /// Runs the current scan to completion: waits for a valid payload, then
    /// fetches and renders that team.
    pub async fn await_scan(&mut self) -> ScanOutcome {
        loop {
            if self.state != SessionState::Scanning {
                return ScanOutcome::ScannerStopped;
            }
            let frame = self.next_frame().await;
            if let Some(outcome) = self.handle_frame(frame).await {
                return outcome;
            }
        }
    }

    /// Waits for one frame. Safe to drop mid-wait (for example inside
    /// `tokio::select!`); hand whatever it returns to
    /// [`SessionController::handle_frame`] outside the race.
    pub async fn next_frame(&mut self) -> Option<FrameEvent> {
        self.scanner.next_frame().await
    }

    /// Acts on one frame. Returns `None` while the scan goes on, otherwise
    /// how it ended. Not cancel-safe: await it to completion.
    pub async fn handle_frame(&mut self, frame: Option<FrameEvent>) -> Option<ScanOutcome> {
        if self.state != SessionState::Scanning {
            return Some(ScanOutcome::ScannerStopped);
        }
        match self.scanner.accept_frame(frame).await {
            Some(team_id) => {
                let ticket = self.begin_fetch(team_id);
                let result = self.directory.fetch_team(ticket.team_id()).await;
                Some(self.complete_fetch(ticket, result))
            }
            None if self.scanner.is_scanning() => None,
            None => {
                self.set_state(SessionState::Idle);
                Some(ScanOutcome::ScannerStopped)
            }
        }
    }

    pub fn begin_fetch(&mut self, team_id: TeamId) -> FetchTicket {
        self.generation += 1;
        info!(%team_id, generation = self.generation, "fetching scanned team");
        FetchTicket {
            generation: self.generation,
            team_id,
        }
    }

    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<TeamRoster, DirectoryError>,
    ) -> ScanOutcome {
        if ticket.generation != self.generation {
            info!(
                team_id = %ticket.team_id,
                issued = ticket.generation,
                current = self.generation,
                "discarding late team fetch"
            );
            return ScanOutcome::Stale;
        }

        match result {
            Ok(roster) => {
                let team = Team::from(roster.team);
                let members: Vec<Member> = roster.members.into_iter().map(Member::from).collect();
                let count = members.len();
                self.roster.render(team.clone(), members);
                self.current_team = Some(team.team_id.clone());
                self.emit(SessionEvent::RosterRendered {
                    team: team.clone(),
                    members: count,
                });
                self.set_state(SessionState::Reviewing);
                ScanOutcome::Reviewing(team)
            }
            Err(DirectoryError::TeamNotFound(team_id)) => {
                warn!(%team_id, "scanned team is not registered");
                self.drop_current_team();
                self.emit(SessionEvent::Notice(Notice::TeamNotFound(team_id.clone())));
                self.set_state(SessionState::Idle);
                ScanOutcome::TeamNotFound(team_id)
            }
            Err(error) => {
                warn!(team_id = %ticket.team_id, %error, "team fetch failed");
                self.drop_current_team();
                self.emit(SessionEvent::Notice(Notice::RequestFailed(error.to_string())));
                self.set_state(SessionState::Idle);
                ScanOutcome::FetchFailed
            }
        }
    }

    pub fn toggle(&mut self, member_id: MemberId, flag: Flag) -> Result<bool, SessionError> {
        self.ensure_reviewing()?;
        Ok(self.roster.toggle(member_id, flag)?)
    }

    pub fn toggle_row(&mut self, index: usize, flag: Flag) -> Result<bool, SessionError> {
        self.ensure_reviewing()?;
        Ok(self.roster.toggle_row(index, flag)?)
    }

    pub fn set_flag(
        &mut self,
        member_id: MemberId,
        flag: Flag,
        value: bool,
    ) -> Result<(), SessionError> {
        self.ensure_reviewing()?;
        Ok(self.roster.set_flag(member_id, flag, value)?)
    }

    /// Sends the roster as currently edited. Saving the same edits again
    /// writes the same values.
    pub async fn save(&mut self) -> Result<(), SessionError> {
        let edits = self.roster.collect_edits();
        match self
            .directory
            .save_members(self.current_team.as_ref(), &edits)
            .await
        {
            Ok(()) => {
                info!(members = edits.len(), "attendance saved");
                self.emit(SessionEvent::Notice(Notice::StatusUpdated));
                Ok(())
            }
            Err(DirectoryError::NoActiveTeam) => {
                self.emit(SessionEvent::Notice(Notice::NoTeamData));
                Err(DirectoryError::NoActiveTeam.into())
            }
            Err(error) => {
                warn!(%error, "attendance save failed");
                self.emit(SessionEvent::Notice(Notice::UpdateFailed));
                Err(error.into())
            }
        }
    }

    /// Drops the reviewed team and starts a fresh scan.
    pub async fn scan_next(&mut self) -> Result<(), SessionError> {
        self.generation += 1;
        self.drop_current_team();
        self.set_state(SessionState::Idle);

        self.scanner.restart().await?;
        self.set_state(SessionState::Scanning);
        Ok(())
    }

    pub async fn dispose(mut self) {
        self.scanner.dispose().await;
        self.roster.reset();
        self.current_team = None;
        self.set_state(SessionState::Idle);
        info!("check-in session disposed");
    }

    fn drop_current_team(&mut self) {
        let was_visible = self.roster.is_visible();
        self.roster.reset();
        self.current_team = None;
        if was_visible {
            self.emit(SessionEvent::RosterCleared);
        }
    }

    fn ensure_reviewing(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Reviewing => Ok(()),
            other => Err(SessionError::InvalidState(other)),
        }
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state != next {
            self.state = next;
            self.emit(SessionEvent::StateChanged(next));
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
