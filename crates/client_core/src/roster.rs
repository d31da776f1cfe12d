//! Editable attendance table for the team currently under review.

use std::fmt;

use shared::{
    domain::{AttendanceFlags, Flag, Member, MemberId, Team},
    protocol::MemberUpdate,
};

use crate::error::RosterError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterRow {
    pub member_id: MemberId,
    pub member_name: String,
    pub flags: AttendanceFlags,
}

#[derive(Debug, Default)]
pub struct RosterView {
    team: Option<Team>,
    rows: Vec<RosterRow>,
}

impl RosterView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces whatever was displayed with `team`'s members, in the order
    /// the server listed them.
    pub fn render(&mut self, team: Team, members: Vec<Member>) {
        self.rows = members
            .into_iter()
            .map(|member| RosterRow {
                member_id: member.member_id,
                member_name: member.member_name,
                flags: member.flags,
            })
            .collect();
        self.team = Some(team);
    }

    pub fn reset(&mut self) {
        self.team = None;
        self.rows.clear();
    }

    pub fn is_visible(&self) -> bool {
        self.team.is_some()
    }

    pub fn team(&self) -> Option<&Team> {
        self.team.as_ref()
    }

    pub fn rows(&self) -> &[RosterRow] {
        &self.rows
    }

    pub fn member_at(&self, index: usize) -> Option<MemberId> {
        self.rows.get(index).map(|row| row.member_id)
    }

    /// Current state of every row, in row order.
    pub fn collect_edits(&self) -> Vec<MemberUpdate> {
        self.rows
            .iter()
            .map(|row| MemberUpdate::new(row.member_id, row.flags))
            .collect()
    }

    pub fn toggle(&mut self, member_id: MemberId, flag: Flag) -> Result<bool, RosterError> {
        Ok(self.row_mut(member_id)?.flags.toggle(flag))
    }

    /// Same as [`RosterView::toggle`], addressed by zero-based display row.
    pub fn toggle_row(&mut self, index: usize, flag: Flag) -> Result<bool, RosterError> {
        let member_id = self.member_at(index).ok_or(RosterError::UnknownRow(index))?;
        self.toggle(member_id, flag)
    }

    pub fn set_flag(
        &mut self,
        member_id: MemberId,
        flag: Flag,
        value: bool,
    ) -> Result<(), RosterError> {
        self.row_mut(member_id)?.flags.set(flag, value);
        Ok(())
    }

    fn row_mut(&mut self, member_id: MemberId) -> Result<&mut RosterRow, RosterError> {
        self.rows
            .iter_mut()
            .find(|row| row.member_id == member_id)
            .ok_or(RosterError::UnknownMember(member_id))
    }
}

impl fmt::Display for RosterView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(team) = &self.team else {
            return Ok(());
        };
        writeln!(f, "Team: {}", team.team_name)?;
        writeln!(f, "Members:")?;

        let name_width = self
            .rows
            .iter()
            .map(|row| row.member_name.chars().count())
            .max()
            .unwrap_or(0)
            .max("Name".len());
        write!(f, "  #  {:<name_width$}", "Name")?;
        for flag in Flag::ALL {
            write!(f, "  {}", flag.label())?;
        }
        writeln!(f)?;

        for (index, row) in self.rows.iter().enumerate() {
            write!(f, "{:>3}  {:<name_width$}", index + 1, row.member_name)?;
            for flag in Flag::ALL {
                let mark = if row.flags.get(flag) { "[x]" } else { "[ ]" };
                write!(f, "  {:<width$}", mark, width = flag.label().len())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
