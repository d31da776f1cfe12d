use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Opaque team token. QR payloads and older rosters carry it either as a JSON
/// string or as a bare number; both collapse into the same textual id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TeamId(pub String);

impl TeamId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TeamId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawTeamId {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match RawTeamId::deserialize(deserializer)? {
            RawTeamId::Text(value) => Self(value),
            RawTeamId::Signed(value) => Self(value.to_string()),
            RawTeamId::Unsigned(value) => Self(value.to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MemberId(pub i64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Browser front ends post row ids back as strings ("7"), so accept both.
impl<'de> Deserialize<'de> for MemberId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawMemberId {
            Number(i64),
            Text(String),
        }

        match RawMemberId::deserialize(deserializer)? {
            RawMemberId::Number(value) => Ok(Self(value)),
            RawMemberId::Text(value) => value
                .trim()
                .parse::<i64>()
                .map(Self)
                .map_err(|_| serde::de::Error::custom(format!("invalid member id '{value}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    CheckIn,
    Snacks,
    Dinner,
    CheckOut,
}

impl Flag {
    pub const ALL: [Flag; 4] = [Flag::CheckIn, Flag::Snacks, Flag::Dinner, Flag::CheckOut];

    pub fn label(self) -> &'static str {
        match self {
            Flag::CheckIn => "check_in",
            Flag::Snacks => "snacks",
            Flag::Dinner => "dinner",
            Flag::CheckOut => "check_out",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "check_in" | "checkin" | "in" => Some(Flag::CheckIn),
            "snacks" | "snack" => Some(Flag::Snacks),
            "dinner" => Some(Flag::Dinner),
            "check_out" | "checkout" | "out" => Some(Flag::CheckOut),
            _ => None,
        }
    }
}

/// The four per-member attendance checkboxes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AttendanceFlags {
    pub check_in: bool,
    pub snacks: bool,
    pub dinner: bool,
    pub check_out: bool,
}

impl AttendanceFlags {
    pub fn get(&self, flag: Flag) -> bool {
        match flag {
            Flag::CheckIn => self.check_in,
            Flag::Snacks => self.snacks,
            Flag::Dinner => self.dinner,
            Flag::CheckOut => self.check_out,
        }
    }

    pub fn set(&mut self, flag: Flag, value: bool) {
        match flag {
            Flag::CheckIn => self.check_in = value,
            Flag::Snacks => self.snacks = value,
            Flag::Dinner => self.dinner = value,
            Flag::CheckOut => self.check_out = value,
        }
    }

    pub fn toggle(&mut self, flag: Flag) -> bool {
        let next = !self.get(flag);
        self.set(flag, next);
        next
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub team_id: TeamId,
    pub team_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub member_id: MemberId,
    pub member_name: String,
    pub flags: AttendanceFlags,
}
