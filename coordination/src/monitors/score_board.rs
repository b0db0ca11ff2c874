//! Score board: trial/game history and the referee's "both teams ready"
//! rendezvous.

use std::sync::{Condvar, Mutex};

use tracing::debug;

use super::shutdown::ShutdownVotes;
use super::{lock_for_abort, lock_monitor};
use crate::config::MatchRules;
use crate::error::{KernelError, KernelResult};
use crate::state::{GameScore, RefereeState, TrialScore};

const MONITOR: &str = "score_board";

/// Coaches that must report before the referee may start a trial
const COACHES: usize = 2;

#[derive(Default)]
struct Inner {
    trials: Vec<TrialScore>,
    games: Vec<GameScore>,
    informed: usize,
    match_ended: bool,
    aborted: bool,
}

pub struct ScoreBoard {
    rules: MatchRules,
    inner: Mutex<Inner>,
    referee_informed: Condvar,
    votes: ShutdownVotes,
}

impl ScoreBoard {
    pub fn new(rules: MatchRules) -> Self {
        Self {
            rules,
            inner: Mutex::new(Inner::default()),
            referee_informed: Condvar::new(),
            votes: ShutdownVotes::new(rules.participants()),
        }
    }

    pub fn add_trial_point(&self, score: TrialScore) -> KernelResult<()> {
        let mut inner = lock_monitor(&self.inner, MONITOR)?;
        if inner.trials.len() >= self.rules.trials_per_game {
            return Err(KernelError::invariant(
                MONITOR,
                format!("more than {} trials in a game", self.rules.trials_per_game),
            ));
        }
        inner.trials.push(score);
        Ok(())
    }

    /// Record a game result and clear the trial history for the next game
    pub fn add_game_point(&self, score: GameScore) -> KernelResult<()> {
        let mut inner = lock_monitor(&self.inner, MONITOR)?;
        if inner.games.len() >= self.rules.games_per_match {
            return Err(KernelError::invariant(
                MONITOR,
                format!("more than {} games in a match", self.rules.games_per_match),
            ));
        }
        inner.games.push(score);
        inner.trials.clear();
        Ok(())
    }

    pub fn reset_trial_points(&self) -> KernelResult<()> {
        lock_monitor(&self.inner, MONITOR)?.trials.clear();
        Ok(())
    }

    pub fn trial_points(&self) -> KernelResult<Vec<TrialScore>> {
        Ok(lock_monitor(&self.inner, MONITOR)?.trials.clone())
    }

    pub fn game_points(&self) -> KernelResult<Vec<GameScore>> {
        Ok(lock_monitor(&self.inner, MONITOR)?.games.clone())
    }

    pub fn remaining_trials(&self) -> KernelResult<usize> {
        let inner = lock_monitor(&self.inner, MONITOR)?;
        Ok(self.rules.trials_per_game.saturating_sub(inner.trials.len()))
    }

    pub fn remaining_games(&self) -> KernelResult<usize> {
        let inner = lock_monitor(&self.inner, MONITOR)?;
        Ok(self.rules.games_per_match.saturating_sub(inner.games.len()))
    }

    /// 1-based number of the game being played
    pub fn game_round(&self) -> KernelResult<usize> {
        Ok(lock_monitor(&self.inner, MONITOR)?.games.len() + 1)
    }

    /// 1-based number of the trial being played in the current game
    pub fn trial_round(&self) -> KernelResult<usize> {
        Ok(lock_monitor(&self.inner, MONITOR)?.trials.len() + 1)
    }

    /// Referee side of the rendezvous: block until both coaches reported,
    /// then consume the reports.
    pub fn both_teams_ready(&self) -> KernelResult<RefereeState> {
        let inner = lock_monitor(&self.inner, MONITOR)?;
        let mut inner = self
            .referee_informed
            .wait_while(inner, |s| s.informed < COACHES && !s.aborted)
            .map_err(|_| KernelError::poisoned(MONITOR))?;

        if inner.aborted {
            return Err(KernelError::aborted(MONITOR));
        }

        inner.informed = 0;
        debug!("Both teams ready");
        Ok(RefereeState::TeamsReady)
    }

    /// Coach side of the rendezvous
    pub fn inform_referee(&self) -> KernelResult<()> {
        let mut inner = lock_monitor(&self.inner, MONITOR)?;
        inner.informed += 1;
        if inner.informed == COACHES {
            self.referee_informed.notify_one();
        }
        Ok(())
    }

    pub fn is_match_ended(&self) -> KernelResult<bool> {
        let inner = lock_monitor(&self.inner, MONITOR)?;
        Ok(inner.match_ended || inner.aborted)
    }

    pub fn set_match_ended(&self, ended: bool) -> KernelResult<()> {
        lock_monitor(&self.inner, MONITOR)?.match_ended = ended;
        Ok(())
    }

    /// Release the referee if it is blocked; every later wait fails
    pub fn abort(&self) {
        lock_for_abort(&self.inner).aborted = true;
        self.referee_informed.notify_all();
    }

    pub fn shutdown(&self) -> KernelResult<bool> {
        self.votes.vote()
    }

    pub fn is_shut_down(&self) -> KernelResult<bool> {
        self.votes.is_complete()
    }
}
