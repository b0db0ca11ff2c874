//! Event types for a match
//!
//! Decision events come only from the referee thread, so their relative order
//! is fixed for a given seed. State-change events interleave with them in
//! whatever order the threads happened to run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{
    CoachState, ContestantId, ContestantState, GameScore, MatchOutcome, RefereeState, Strength,
    TeamId, TrialScore,
};

/// All match events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchEvent {
    /// The referee announced a new game
    GameAnnounced { game: usize },

    /// The referee called the coaches for a trial
    TrialCalled { game: usize, trial: usize },

    /// The referee asserted a trial result
    TrialDecided {
        game: usize,
        trial: usize,
        score: TrialScore,
        flag: i32,
    },

    /// The referee declared a game winner
    GameDecided {
        game: usize,
        score: GameScore,
        trials: usize,
    },

    /// The referee declared the match result
    MatchDecided { outcome: MatchOutcome },

    RefereeStateChanged { state: RefereeState },

    CoachStateChanged { team: TeamId, state: CoachState },

    ContestantStateChanged {
        team: TeamId,
        id: ContestantId,
        state: ContestantState,
        strength: Strength,
    },

    /// A coach adjusted a contestant's strength after a trial
    StrengthAdjusted {
        team: TeamId,
        id: ContestantId,
        strength: Strength,
    },
}

impl MatchEvent {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::GameAnnounced { .. } => "game_announced",
            Self::TrialCalled { .. } => "trial_called",
            Self::TrialDecided { .. } => "trial_decided",
            Self::GameDecided { .. } => "game_decided",
            Self::MatchDecided { .. } => "match_decided",
            Self::RefereeStateChanged { .. } => "referee_state_changed",
            Self::CoachStateChanged { .. } => "coach_state_changed",
            Self::ContestantStateChanged { .. } => "contestant_state_changed",
            Self::StrengthAdjusted { .. } => "strength_adjusted",
        }
    }

    /// Whether the event records a referee decision
    pub fn is_decision(&self) -> bool {
        matches!(
            self,
            Self::GameAnnounced { .. }
                | Self::TrialCalled { .. }
                | Self::TrialDecided { .. }
                | Self::GameDecided { .. }
                | Self::MatchDecided { .. }
        )
    }

    /// Team the event is about, if it concerns a single team
    pub fn team(&self) -> Option<TeamId> {
        match self {
            Self::CoachStateChanged { team, .. }
            | Self::ContestantStateChanged { team, .. }
            | Self::StrengthAdjusted { team, .. } => Some(*team),
            _ => None,
        }
    }
}

/// A published event with its position in the match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: MatchEvent,
}
