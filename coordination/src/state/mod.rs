//! Identities, role states and score types
//!
//! Everything a monitor needs to know about its caller travels in these
//! small `Copy` values: [`ContestantView`] and [`CoachView`] carry the
//! caller's identity and current state in, and the monitor hands the updated
//! state back in its return value.

pub mod types;

pub use types::{
    BenchEntry, CoachState, CoachView, ContestantId, ContestantState, ContestantView, GameScore,
    MatchOutcome, RefereeState, Strength, TeamId, TrialScore,
};
