use scanner_integration::CameraError;
use shared::domain::{MemberId, TeamId};
use thiserror::Error;

use crate::controller::SessionState;

#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("camera unavailable: {0}")]
    CameraAccess(#[from] CameraError),
    #[error("scanner is already running")]
    AlreadyScanning,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("team {0} not found")]
    TeamNotFound(TeamId),
    #[error("no active team to save")]
    NoActiveTeam,
    #[error("server did not confirm the update: {0}")]
    UpdateFailed(String),
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected response status {0}")]
    UnexpectedStatus(reqwest::StatusCode),
    #[error("invalid server url '{0}'")]
    InvalidServerUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RosterError {
    #[error("member {0} is not on the displayed roster")]
    UnknownMember(MemberId),
    #[error("roster has no row {0}")]
    UnknownRow(usize),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Scanner(#[from] ScannerError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Roster(#[from] RosterError),
    #[error("not allowed while the session is {0:?}")]
    InvalidState(SessionState),
}
