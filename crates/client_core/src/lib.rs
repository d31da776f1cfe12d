use shared::{
    domain::{Team, TeamId},
    error::PayloadError,
};

pub mod config;
pub mod controller;
pub mod directory;
pub mod error;
pub mod roster;
pub mod scanner;

pub use config::{ClientSettings, ScannerSettings};
pub use controller::{FetchTicket, ScanOutcome, SessionController, SessionState};
pub use directory::{HttpTeamDirectory, TeamDirectory};
pub use error::{DirectoryError, RosterError, ScannerError, SessionError};
pub use roster::{RosterRow, RosterView};
pub use scanner::ScannerSession;

/// Something the operator should be told about. Every failure in the
/// check-in flow ends up as exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    CameraUnavailable,
    InvalidPayload(PayloadError),
    TeamNotFound(TeamId),
    RequestFailed(String),
    NoTeamData,
    StatusUpdated,
    UpdateFailed,
    ScannerCleanupFailed(String),
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::CameraUnavailable => "Please allow camera access and try again.".to_string(),
            Notice::InvalidPayload(PayloadError::MissingTeamId) => "Invalid QR Code!".to_string(),
            Notice::InvalidPayload(PayloadError::Malformed(_)) => {
                "Could not read QR code properly.".to_string()
            }
            Notice::TeamNotFound(_) => "Team not found!".to_string(),
            Notice::RequestFailed(reason) => format!("Could not reach the server: {reason}"),
            Notice::NoTeamData => "No team data found!".to_string(),
            Notice::StatusUpdated => "Status updated successfully!".to_string(),
            Notice::UpdateFailed => "Update failed. Try again.".to_string(),
            Notice::ScannerCleanupFailed(_) => {
                "Scanner did not shut down cleanly; scanning again should still work.".to_string()
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Notice::StatusUpdated)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    LoadingIndicator { visible: bool },
    Notice(Notice),
    RosterRendered { team: Team, members: usize },
    RosterCleared,
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
