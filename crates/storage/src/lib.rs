use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::{
    domain::{MemberId, TeamId},
    protocol::{AttendanceStats, MemberRecord, MemberUpdate, TeamRecord},
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagUpdate {
    Applied { teams: Vec<TeamId> },
    /// Nothing was written.
    UnknownMember(MemberId),
}

#[derive(Debug, Clone)]
pub struct StoredTeam {
    pub team: TeamRecord,
    pub members: Vec<MemberRecord>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        let storage = Self { pool };
        storage.ensure_schema().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS teams (
                team_id      TEXT PRIMARY KEY,
                team_name    TEXT NOT NULL,
                last_updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure teams table exists")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS members (
                member_id   INTEGER PRIMARY KEY AUTOINCREMENT,
                team_id     TEXT NOT NULL REFERENCES teams(team_id) ON DELETE CASCADE,
                member_name TEXT NOT NULL,
                check_in    INTEGER NOT NULL DEFAULT 0,
                snacks      INTEGER NOT NULL DEFAULT 0,
                dinner      INTEGER NOT NULL DEFAULT 0,
                check_out   INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure members table exists")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_members_team ON members(team_id)")
            .execute(&self.pool)
            .await
            .context("failed to ensure members team index exists")?;

        Ok(())
    }

    /// Inserts a team and its members (all flags cleared) under a fresh id.
    pub async fn create_team(&self, team_name: &str, member_names: &[String]) -> Result<TeamId> {
        let team_id = TeamId::generate();
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO teams (team_id, team_name, last_updated) VALUES (?, ?, ?)")
            .bind(team_id.as_str())
            .bind(team_name)
            .bind(timestamp_now())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to insert team '{team_name}'"))?;

        for member_name in member_names {
            sqlx::query("INSERT INTO members (team_id, member_name) VALUES (?, ?)")
                .bind(team_id.as_str())
                .bind(member_name)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to insert member '{member_name}'"))?;
        }

        tx.commit().await?;
        Ok(team_id)
    }

    pub async fn load_team(&self, team_id: &TeamId) -> Result<Option<TeamRecord>> {
        let row = sqlx::query("SELECT team_id, team_name, last_updated FROM teams WHERE team_id = ?")
            .bind(team_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| team_from_row(&r)))
    }

    pub async fn list_members_for_team(&self, team_id: &TeamId) -> Result<Vec<MemberRecord>> {
        let rows = sqlx::query(
            "SELECT member_id, member_name, check_in, snacks, dinner, check_out
             FROM members WHERE team_id = ? ORDER BY member_id",
        )
        .bind(team_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(member_from_row).collect())
    }

    pub async fn load_team_with_members(&self, team_id: &TeamId) -> Result<Option<StoredTeam>> {
        let Some(team) = self.load_team(team_id).await? else {
            return Ok(None);
        };
        let members = self.list_members_for_team(team_id).await?;
        Ok(Some(StoredTeam { team, members }))
    }

    /// Writes every update and bumps `last_updated` on each team that owns
    /// one of the members. All or nothing: if any member id is unknown the
    /// transaction is rolled back.
    pub async fn update_member_flags(&self, updates: &[MemberUpdate]) -> Result<FlagUpdate> {
        let mut tx = self.pool.begin().await?;
        let mut teams = BTreeSet::new();

        for update in updates {
            let team_id: Option<String> =
                sqlx::query_scalar("SELECT team_id FROM members WHERE member_id = ?")
                    .bind(update.member_id.0)
                    .fetch_optional(&mut *tx)
                    .await?;
            let Some(team_id) = team_id else {
                tx.rollback().await?;
                return Ok(FlagUpdate::UnknownMember(update.member_id));
            };
            teams.insert(team_id);

            sqlx::query(
                "UPDATE members SET check_in = ?, snacks = ?, dinner = ?, check_out = ?
                 WHERE member_id = ?",
            )
            .bind(i64::from(update.check_in))
            .bind(i64::from(update.snacks))
            .bind(i64::from(update.dinner))
            .bind(i64::from(update.check_out))
            .bind(update.member_id.0)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to update member {}", update.member_id))?;
        }

        let now = timestamp_now();
        for team_id in &teams {
            sqlx::query("UPDATE teams SET last_updated = ? WHERE team_id = ?")
                .bind(&now)
                .bind(team_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(FlagUpdate::Applied {
            teams: teams.into_iter().map(TeamId).collect(),
        })
    }

    /// All teams with their members, most recently updated first.
    pub async fn list_teams_with_members(&self) -> Result<Vec<StoredTeam>> {
        let rows = sqlx::query(
            "SELECT team_id, team_name, last_updated FROM teams
             ORDER BY last_updated DESC, team_name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut teams = Vec::with_capacity(rows.len());
        for row in rows {
            let team = team_from_row(&row);
            let members = self.list_members_for_team(&team.team_id).await?;
            teams.push(StoredTeam { team, members });
        }
        Ok(teams)
    }

    pub async fn delete_team(&self, team_id: &TeamId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM members WHERE team_id = ?")
            .bind(team_id.as_str())
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM teams WHERE team_id = ?")
            .bind(team_id.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(deleted > 0)
    }

    pub async fn delete_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM members").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM teams").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn attendance_totals(&self) -> Result<AttendanceStats> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(check_in), 0), COALESCE(SUM(snacks), 0),
                    COALESCE(SUM(dinner), 0), COALESCE(SUM(check_out), 0)
             FROM members",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(AttendanceStats {
            check_in: row.get::<i64, _>(0),
            snacks: row.get::<i64, _>(1),
            dinner: row.get::<i64, _>(2),
            check_out: row.get::<i64, _>(3),
        })
    }
}

fn timestamp_now() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

fn team_from_row(row: &SqliteRow) -> TeamRecord {
    TeamRecord {
        team_id: TeamId(row.get::<String, _>("team_id")),
        team_name: row.get::<String, _>("team_name"),
        last_updated: row.get::<Option<String>, _>("last_updated"),
    }
}

fn member_from_row(row: &SqliteRow) -> MemberRecord {
    MemberRecord {
        member_id: MemberId(row.get::<i64, _>("member_id")),
        member_name: row.get::<String, _>("member_name"),
        check_in: row.get::<i64, _>("check_in") != 0,
        snacks: row.get::<i64, _>("snacks") != 0,
        dinner: row.get::<i64, _>("dinner") != 0,
        check_out: row.get::<i64, _>("check_out") != 0,
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
