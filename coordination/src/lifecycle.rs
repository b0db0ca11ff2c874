//! Role lifecycles: explicit states and legal transition guards.
//!
//! Every active entity owns a [`Lifecycle`] over its role's state enum so
//! that:
//! 1. Every state change is checked against the role's transition table.
//! 2. Every state change is logged and recorded.
//! 3. A finished entity can report the exact sequence of states it went
//!    through.
//!
//! Monitors return the caller's next state; the entity feeds that value to
//! `advance()`, which is where an out-of-order protocol step gets caught.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, KernelResult};
use crate::state::{CoachState, ContestantState, RefereeState};

/// A role state enum with a transition table.
pub trait RoleState: Copy + Eq + fmt::Debug + fmt::Display {
    /// Role name used in logs and errors
    const ROLE: &'static str;

    /// Whether the state accepts no further transitions
    fn is_terminal(self) -> bool {
        false
    }

    /// Whether `from → to` is an edge of the role's state graph
    fn is_legal_transition(from: Self, to: Self) -> bool;
}

/// Referee edges:
/// ```text
/// StartOfMatch → StartOfGame
/// StartOfGame → TeamsReady
/// TeamsReady → WaitForTrialConclusion
/// WaitForTrialConclusion → TeamsReady | EndOfGame
/// EndOfGame → StartOfGame | EndOfMatch
/// ```
impl RoleState for RefereeState {
    const ROLE: &'static str = "referee";

    fn is_terminal(self) -> bool {
        self == RefereeState::EndOfMatch
    }

    fn is_legal_transition(from: Self, to: Self) -> bool {
        use RefereeState::*;
        matches!(
            (from, to),
            (StartOfMatch, StartOfGame)
                | (StartOfGame, TeamsReady)
                | (TeamsReady, WaitForTrialConclusion)
                | (WaitForTrialConclusion, TeamsReady)
                | (WaitForTrialConclusion, EndOfGame)
                | (EndOfGame, StartOfGame)
                | (EndOfGame, EndOfMatch)
        )
    }
}

/// Coach edges form a cycle:
/// WaitForRefereeCommand → AssembleTeam → WatchTrial → WaitForRefereeCommand
impl RoleState for CoachState {
    const ROLE: &'static str = "coach";

    fn is_legal_transition(from: Self, to: Self) -> bool {
        use CoachState::*;
        matches!(
            (from, to),
            (WaitForRefereeCommand, AssembleTeam)
                | (AssembleTeam, WatchTrial)
                | (WatchTrial, WaitForRefereeCommand)
        )
    }
}

/// Contestant edges form a cycle:
/// SeatAtTheBench → StandInPosition → DoYourBest → SeatAtTheBench
impl RoleState for ContestantState {
    const ROLE: &'static str = "contestant";

    fn is_legal_transition(from: Self, to: Self) -> bool {
        use ContestantState::*;
        matches!(
            (from, to),
            (SeatAtTheBench, StandInPosition)
                | (StandInPosition, DoYourBest)
                | (DoYourBest, SeatAtTheBench)
        )
    }
}

/// A single recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord<S> {
    pub from: S,
    pub to: S,
    /// Milliseconds since the lifecycle was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A role's state plus its transition log.
pub struct Lifecycle<S: RoleState> {
    current: S,
    created_at: Instant,
    transitions: Vec<TransitionRecord<S>>,
}

impl<S: RoleState> Lifecycle<S> {
    pub fn new(initial: S) -> Self {
        Self {
            current: initial,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> S {
        self.current
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    /// Move to `to`. Staying in the current state is always accepted and
    /// not recorded.
    pub fn advance(&mut self, to: S, reason: Option<&str>) -> KernelResult<()> {
        if to == self.current {
            return Ok(());
        }

        if self.current.is_terminal() || !S::is_legal_transition(self.current, to) {
            return Err(KernelError::IllegalTransition {
                role: S::ROLE,
                from: self.current.to_string(),
                to: to.to_string(),
            });
        }

        tracing::debug!(
            role = S::ROLE,
            from = %self.current,
            to = %to,
            "State transition"
        );

        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    pub fn transitions(&self) -> &[TransitionRecord<S>] {
        &self.transitions
    }
}
