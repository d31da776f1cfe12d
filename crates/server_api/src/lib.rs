use shared::{
    domain::TeamId,
    error::ApiError,
    protocol::{
        AttendanceStats, MemberUpdate, RegisterTeamRequest, RegisterTeamResponse, ScanPayload,
        TeamLookupResponse, TeamRoster, UpdateMembersResponse, TEAM_NOT_FOUND,
    },
};
use storage::{FlagUpdate, Storage, StoredTeam};
use tracing::{info, warn};

pub mod badge;

pub const MISSING_REGISTRATION_FIELDS: &str = "Missing team name or members";

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::internal(err.to_string())
}

fn roster_from(stored: StoredTeam) -> TeamRoster {
    TeamRoster {
        team: stored.team,
        members: stored.members,
    }
}

fn payload_for(stored: &StoredTeam) -> ScanPayload {
    ScanPayload {
        team_id: stored.team.team_id.clone(),
        team_name: Some(stored.team.team_name.clone()),
        members: stored
            .members
            .iter()
            .map(|member| member.member_name.clone())
            .collect(),
    }
}

pub async fn register_team(
    ctx: &ApiContext,
    request: RegisterTeamRequest,
) -> Result<RegisterTeamResponse, ApiError> {
    let team_name = request.team_name.trim().to_string();
    let members: Vec<String> = request
        .members
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    if team_name.is_empty() || members.is_empty() {
        return Err(ApiError::validation(MISSING_REGISTRATION_FIELDS));
    }

    let team_id = ctx
        .storage
        .create_team(&team_name, &members)
        .await
        .map_err(internal)?;
    let payload = ScanPayload {
        team_id: team_id.clone(),
        team_name: Some(team_name),
        members,
    }
    .to_text()
    .map_err(|err| ApiError::internal(err.to_string()))?;

    info!(%team_id, "registered team");
    Ok(RegisterTeamResponse { team_id, payload })
}

/// A missing team is an ordinary answer, reported in-band.
pub async fn lookup_team(ctx: &ApiContext, team_id: &TeamId) -> Result<TeamLookupResponse, ApiError> {
    let stored = ctx
        .storage
        .load_team_with_members(team_id)
        .await
        .map_err(internal)?;
    Ok(match stored {
        Some(stored) => TeamLookupResponse::Found(roster_from(stored)),
        None => TeamLookupResponse::Missing {
            error: TEAM_NOT_FOUND.to_string(),
        },
    })
}

pub async fn team_payload(ctx: &ApiContext, team_id: &TeamId) -> Result<String, ApiError> {
    let stored = ctx
        .storage
        .load_team_with_members(team_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found(TEAM_NOT_FOUND))?;
    payload_for(&stored)
        .to_text()
        .map_err(|err| ApiError::internal(err.to_string()))
}

pub async fn update_members(
    ctx: &ApiContext,
    updates: &[MemberUpdate],
) -> Result<UpdateMembersResponse, ApiError> {
    if updates.is_empty() {
        return Err(ApiError::validation("no member updates supplied"));
    }
    let owner = ctx
        .storage
        .update_member_flags(updates)
        .await
        .map_err(internal)?;
    match owner {
        FlagUpdate::Applied { teams } => {
            info!(
                teams = teams.len(),
                members = updates.len(),
                "updated member attendance"
            );
            Ok(UpdateMembersResponse::updated())
        }
        FlagUpdate::UnknownMember(member_id) => {
            warn!(%member_id, "attendance update referenced an unknown member");
            Err(ApiError::not_found("member not found"))
        }
    }
}

/// The team's badge: its scan payload as a QR code PNG.
pub async fn team_badge_png(ctx: &ApiContext, team_id: &TeamId) -> Result<Vec<u8>, ApiError> {
    let payload = team_payload(ctx, team_id).await?;
    badge::render_png(&payload).map_err(internal)
}

/// A zip of every team's badge, most recently updated team first.
pub async fn export_badges(ctx: &ApiContext) -> Result<Vec<u8>, ApiError> {
    let teams = ctx
        .storage
        .list_teams_with_members()
        .await
        .map_err(internal)?;
    let mut badges = Vec::with_capacity(teams.len());
    for stored in &teams {
        let payload = payload_for(stored)
            .to_text()
            .map_err(|err| ApiError::internal(err.to_string()))?;
        let png = badge::render_png(&payload).map_err(internal)?;
        badges.push((
            stored.team.team_id.to_string(),
            stored.team.team_name.clone(),
            png,
        ));
    }
    let archive = badge::zip_badges(&badges).map_err(internal)?;
    info!(teams = badges.len(), "exported team badges");
    Ok(archive)
}

pub async fn list_teams(ctx: &ApiContext) -> Result<Vec<TeamRoster>, ApiError> {
    let teams = ctx
        .storage
        .list_teams_with_members()
        .await
        .map_err(internal)?;
    Ok(teams.into_iter().map(roster_from).collect())
}

pub async fn delete_team(ctx: &ApiContext, team_id: &TeamId) -> Result<bool, ApiError> {
    let deleted = ctx.storage.delete_team(team_id).await.map_err(internal)?;
    if deleted {
        info!(%team_id, "deleted team");
    }
    Ok(deleted)
}

pub async fn delete_all(ctx: &ApiContext) -> Result<(), ApiError> {
    ctx.storage.delete_all().await.map_err(internal)?;
    warn!("deleted every team and member");
    Ok(())
}

pub async fn attendance_stats(ctx: &ApiContext) -> Result<AttendanceStats, ApiError> {
    ctx.storage.attendance_totals().await.map_err(internal)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
