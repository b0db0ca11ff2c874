//! Core types shared by the monitors and the entity state machines
//!
//! Identities are explicit values passed into every monitor call: a monitor
//! never asks "who is calling me", it is told.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{KernelError, KernelResult};

/// Contestant strength. Not clamped by the type; the configured floor is
/// applied by the bench when strengths are adjusted.
pub type Strength = i32;

/// Team identifier (1 or 2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct TeamId(u8);

impl TeamId {
    pub const ONE: TeamId = TeamId(1);
    pub const TWO: TeamId = TeamId(2);

    /// Create a team id, rejecting anything other than 1 or 2
    pub fn new(number: u8) -> KernelResult<Self> {
        match number {
            1 | 2 => Ok(Self(number)),
            other => Err(KernelError::config(format!(
                "team must be 1 or 2, got {other}"
            ))),
        }
    }

    /// 0-based index into per-team arrays
    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }

    /// Both teams, in order
    pub fn all() -> [TeamId; 2] {
        [Self::ONE, Self::TWO]
    }
}

impl TryFrom<u8> for TeamId {
    type Error = KernelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TeamId> for u8 {
    fn from(team: TeamId) -> Self {
        team.0
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Contestant identifier within a team (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContestantId(pub u8);

impl ContestantId {
    /// 0-based index into per-contestant arrays
    pub fn index(self) -> usize {
        usize::from(self.0.saturating_sub(1))
    }
}

impl fmt::Display for ContestantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Referee states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefereeState {
    StartOfMatch,
    StartOfGame,
    TeamsReady,
    WaitForTrialConclusion,
    EndOfGame,
    EndOfMatch,
}

impl RefereeState {
    /// Short code used in the transcript columns
    pub fn code(self) -> &'static str {
        match self {
            Self::StartOfMatch => "SOM",
            Self::StartOfGame => "SOG",
            Self::TeamsReady => "TRD",
            Self::WaitForTrialConclusion => "WTC",
            Self::EndOfGame => "EOG",
            Self::EndOfMatch => "EOM",
        }
    }
}

/// Coach states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoachState {
    WaitForRefereeCommand,
    AssembleTeam,
    WatchTrial,
}

impl CoachState {
    pub fn code(self) -> &'static str {
        match self {
            Self::WaitForRefereeCommand => "WFRC",
            Self::AssembleTeam => "AETM",
            Self::WatchTrial => "WHTL",
        }
    }
}

/// Contestant states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContestantState {
    SeatAtTheBench,
    StandInPosition,
    DoYourBest,
}

impl ContestantState {
    pub fn code(self) -> &'static str {
        match self {
            Self::SeatAtTheBench => "STB",
            Self::StandInPosition => "SIP",
            Self::DoYourBest => "DYB",
        }
    }
}

macro_rules! display_via_debug {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:?}", self)
            }
        })*
    };
}

display_via_debug!(RefereeState, CoachState, ContestantState);

/// Outcome of a single trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialScore {
    Draw,
    Team1,
    Team2,
}

impl TrialScore {
    /// Winning team, if any
    pub fn winner(self) -> Option<TeamId> {
        match self {
            Self::Draw => None,
            Self::Team1 => Some(TeamId::ONE),
            Self::Team2 => Some(TeamId::TWO),
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Draw => "D",
            Self::Team1 => "VT1",
            Self::Team2 => "VT2",
        }
    }
}

/// Outcome of a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameScore {
    Draw,
    Team1ByPoints,
    Team1ByKnockout,
    Team2ByPoints,
    Team2ByKnockout,
}

impl GameScore {
    /// Winning team, if any
    pub fn winner(self) -> Option<TeamId> {
        match self {
            Self::Draw => None,
            Self::Team1ByPoints | Self::Team1ByKnockout => Some(TeamId::ONE),
            Self::Team2ByPoints | Self::Team2ByKnockout => Some(TeamId::TWO),
        }
    }

    pub fn is_knockout(self) -> bool {
        matches!(self, Self::Team1ByKnockout | Self::Team2ByKnockout)
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Draw => "D",
            Self::Team1ByPoints => "VT1PT",
            Self::Team1ByKnockout => "VT1KO",
            Self::Team2ByPoints => "VT2PT",
            Self::Team2ByKnockout => "VT2KO",
        }
    }
}

/// Final outcome of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MatchOutcome {
    Winner {
        team: TeamId,
        team1_games: u32,
        team2_games: u32,
    },
    Draw {
        team1_games: u32,
        team2_games: u32,
    },
}

impl MatchOutcome {
    pub fn winner(self) -> Option<TeamId> {
        match self {
            Self::Winner { team, .. } => Some(team),
            Self::Draw { .. } => None,
        }
    }
}

/// The identity and current state of a contestant, as handed to a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContestantView {
    pub team: TeamId,
    pub id: ContestantId,
    pub state: ContestantState,
    pub strength: Strength,
}

/// The identity and current state of a coach, as handed to a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoachView {
    pub team: TeamId,
    pub state: CoachState,
}

/// A seated contestant as seen by its coach
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BenchEntry {
    pub id: ContestantId,
    pub strength: Strength,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_id_bounds() {
        assert!(TeamId::new(0).is_err());
        assert!(TeamId::new(3).is_err());
        assert_eq!(TeamId::new(2).unwrap(), TeamId::TWO);
        assert_eq!(TeamId::TWO.index(), 1);
    }

    #[test]
    fn test_team_id_serde_rejects_out_of_range() {
        let team: TeamId = serde_json::from_str("1").unwrap();
        assert_eq!(team, TeamId::ONE);
        assert!(serde_json::from_str::<TeamId>("7").is_err());
    }

    #[test]
    fn test_game_score_winner() {
        assert_eq!(GameScore::Team1ByKnockout.winner(), Some(TeamId::ONE));
        assert_eq!(GameScore::Team2ByPoints.winner(), Some(TeamId::TWO));
        assert_eq!(GameScore::Draw.winner(), None);
        assert!(GameScore::Team2ByKnockout.is_knockout());
        assert!(!GameScore::Team1ByPoints.is_knockout());
    }

    #[test]
    fn test_state_codes() {
        assert_eq!(RefereeState::WaitForTrialConclusion.code(), "WTC");
        assert_eq!(CoachState::AssembleTeam.code(), "AETM");
        assert_eq!(ContestantState::DoYourBest.code(), "DYB");
    }
}
