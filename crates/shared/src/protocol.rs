use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{AttendanceFlags, Member, MemberId, Team, TeamId},
    error::PayloadError,
};

pub const STATUS_UPDATED: &str = "updated";
pub const TEAM_NOT_FOUND: &str = "Team not found";

/// Attendance flags travel as 0/1 integers; older clients also send booleans.
pub mod flag01 {
    use serde::{de, Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(value: &bool, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(FlagVisitor)
    }

    struct FlagVisitor;

    impl<'de> de::Visitor<'de> for FlagVisitor {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("0, 1, or a boolean")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
            Ok(v != 0)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
            Ok(v != 0)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<bool, E> {
            match v.trim() {
                "0" | "false" | "" => Ok(false),
                "1" | "true" => Ok(true),
                other => Err(E::custom(format!("invalid attendance flag '{other}'"))),
            }
        }

        fn visit_unit<E: de::Error>(self) -> Result<bool, E> {
            Ok(false)
        }
    }
}

/// Decoded QR content. Registration emits all three fields; only `team_id`
/// is required when reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanPayload {
    pub team_id: TeamId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
}

impl ScanPayload {
    pub fn parse(text: &str) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_str(text.trim())
            .map_err(|err| PayloadError::Malformed(err.to_string()))?;
        let raw_team_id = value.get("team_id").ok_or(PayloadError::MissingTeamId)?;
        if raw_team_id.is_null() || raw_team_id.as_i64() == Some(0) {
            return Err(PayloadError::MissingTeamId);
        }
        let team_id =
            TeamId::deserialize(raw_team_id).map_err(|_| PayloadError::MissingTeamId)?;
        if team_id.is_blank() {
            return Err(PayloadError::MissingTeamId);
        }

        let team_name = value
            .get("team_name")
            .and_then(Value::as_str)
            .map(str::to_string);
        let members = value
            .get("members")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            team_id,
            team_name,
            members,
        })
    }

    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub team_id: TeamId,
    pub team_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl From<TeamRecord> for Team {
    fn from(value: TeamRecord) -> Self {
        Self {
            team_id: value.team_id,
            team_name: value.team_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub member_id: MemberId,
    pub member_name: String,
    #[serde(with = "flag01", default)]
    pub check_in: bool,
    #[serde(with = "flag01", default)]
    pub snacks: bool,
    #[serde(with = "flag01", default)]
    pub dinner: bool,
    #[serde(with = "flag01", default)]
    pub check_out: bool,
}

impl MemberRecord {
    pub fn flags(&self) -> AttendanceFlags {
        AttendanceFlags {
            check_in: self.check_in,
            snacks: self.snacks,
            dinner: self.dinner,
            check_out: self.check_out,
        }
    }
}

impl From<MemberRecord> for Member {
    fn from(value: MemberRecord) -> Self {
        let flags = value.flags();
        Self {
            member_id: value.member_id,
            member_name: value.member_name,
            flags,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRoster {
    pub team: TeamRecord,
    pub members: Vec<MemberRecord>,
}

/// Body of `GET /team/{team_id}`; a miss is reported in-band as `{error}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TeamLookupResponse {
    Found(TeamRoster),
    Missing { error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberUpdate {
    pub member_id: MemberId,
    #[serde(with = "flag01")]
    pub check_in: bool,
    #[serde(with = "flag01")]
    pub snacks: bool,
    #[serde(with = "flag01")]
    pub dinner: bool,
    #[serde(with = "flag01")]
    pub check_out: bool,
}

impl MemberUpdate {
    pub fn new(member_id: MemberId, flags: AttendanceFlags) -> Self {
        Self {
            member_id,
            check_in: flags.check_in,
            snacks: flags.snacks,
            dinner: flags.dinner,
            check_out: flags.check_out,
        }
    }

    pub fn flags(&self) -> AttendanceFlags {
        AttendanceFlags {
            check_in: self.check_in,
            snacks: self.snacks,
            dinner: self.dinner,
            check_out: self.check_out,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateMembersRequest {
    pub members: Vec<MemberUpdate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateMembersResponse {
    pub status: String,
}

impl UpdateMembersResponse {
    pub fn updated() -> Self {
        Self {
            status: STATUS_UPDATED.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterTeamRequest {
    #[serde(default)]
    pub team_name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterTeamResponse {
    pub team_id: TeamId,
    pub payload: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceStats {
    pub check_in: i64,
    pub snacks: i64,
    pub dinner: i64,
    pub check_out: i64,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
