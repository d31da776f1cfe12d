use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use shared::{
    domain::TeamId,
    protocol::{MemberUpdate, TeamLookupResponse, TeamRoster, UpdateMembersRequest, STATUS_UPDATED},
};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::DirectoryError;

/// Remote roster store. Implementors supply the two transport calls; the
/// save precondition is enforced here for every implementation.
#[async_trait]
pub trait TeamDirectory: Send + Sync {
    async fn fetch_team(&self, team_id: &TeamId) -> Result<TeamRoster, DirectoryError>;

    async fn push_member_updates(&self, members: &[MemberUpdate]) -> Result<(), DirectoryError>;

    async fn save_members(
        &self,
        team_id: Option<&TeamId>,
        members: &[MemberUpdate],
    ) -> Result<(), DirectoryError> {
        ensure_saveable(team_id, members)?;
        self.push_member_updates(members).await
    }
}

pub fn ensure_saveable(
    team_id: Option<&TeamId>,
    members: &[MemberUpdate],
) -> Result<(), DirectoryError> {
    match team_id {
        Some(team_id) if !team_id.is_blank() && !members.is_empty() => Ok(()),
        _ => Err(DirectoryError::NoActiveTeam),
    }
}

pub struct HttpTeamDirectory {
    http: Client,
    base_url: Url,
}

impl HttpTeamDirectory {
    pub fn new(server_url: &str) -> Result<Self, DirectoryError> {
        Self::with_client(Client::new(), server_url)
    }

    pub fn with_client(http: Client, server_url: &str) -> Result<Self, DirectoryError> {
        let base_url = Url::parse(server_url.trim())
            .map_err(|_| DirectoryError::InvalidServerUrl(server_url.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(DirectoryError::InvalidServerUrl(server_url.to_string()));
        }
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[async_trait]
impl TeamDirectory for HttpTeamDirectory {
    async fn fetch_team(&self, team_id: &TeamId) -> Result<TeamRoster, DirectoryError> {
        let url = self.endpoint(&["team", team_id.as_str()]);
        debug!(%url, "fetching team roster");
        let res = self.http.get(url).send().await?;
        let status = res.status();
        if status.is_server_error() {
            return Err(DirectoryError::UnexpectedStatus(status));
        }

        let body: TeamLookupResponse = match res.json().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => return Err(DirectoryError::UnexpectedStatus(status)),
            Err(err) => return Err(err.into()),
        };

        match body {
            TeamLookupResponse::Found(roster) => {
                info!(%team_id, members = roster.members.len(), "fetched team roster");
                Ok(roster)
            }
            TeamLookupResponse::Missing { error } => {
                info!(%team_id, reason = %error, "team lookup missed");
                Err(DirectoryError::TeamNotFound(team_id.clone()))
            }
        }
    }

    async fn push_member_updates(&self, members: &[MemberUpdate]) -> Result<(), DirectoryError> {
        let res = self
            .http
            .post(self.endpoint(&["update_members"]))
            .json(&UpdateMembersRequest {
                members: members.to_vec(),
            })
            .send()
            .await?;
        let status = res.status();
        let body: Value = res.json().await.unwrap_or(Value::Null);

        match body.get("status").and_then(Value::as_str) {
            Some(STATUS_UPDATED) => {
                info!(members = members.len(), "server confirmed attendance update");
                Ok(())
            }
            other => {
                warn!(%status, reply = ?other, "attendance update was not confirmed");
                Err(DirectoryError::UpdateFailed(match other {
                    Some(reply) => format!("server replied '{reply}'"),
                    None => format!("status {status}"),
                }))
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/directory_tests.rs"]
mod tests;
