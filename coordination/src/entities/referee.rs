//! Referee: drives the pace of the match.
//!
//! The referee is the only entity that decides anything. It reads the flag
//! from the playground, records trial and game results on the score board and
//! publishes every decision, so the decision stream is produced by one thread
//! in program order.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::MatchRules;
use crate::error::KernelResult;
use crate::events::MatchEvent;
use crate::lifecycle::Lifecycle;
use crate::monitors::MatchSite;
use crate::rules;
use crate::state::{GameScore, MatchOutcome, RefereeState, TeamId};

/// What the referee saw over the whole match
#[derive(Debug, Clone, Serialize)]
pub struct RefereeReport {
    pub games: Vec<GameScore>,
    pub outcome: MatchOutcome,
    pub trials_played: usize,
    pub transitions: usize,
}

pub struct Referee {
    site: Arc<MatchSite>,
    rules: MatchRules,
    lifecycle: Lifecycle<RefereeState>,
    trials_played: usize,
    outcome: Option<MatchOutcome>,
}

impl Referee {
    pub fn new(site: Arc<MatchSite>, rules: MatchRules) -> Self {
        Self {
            site,
            rules,
            lifecycle: Lifecycle::new(RefereeState::StartOfMatch),
            trials_played: 0,
            outcome: None,
        }
    }

    pub fn state(&self) -> RefereeState {
        self.lifecycle.current()
    }

    pub fn run(mut self) -> KernelResult<RefereeReport> {
        loop {
            match self.lifecycle.current() {
                RefereeState::StartOfMatch => self.announce_new_game()?,
                RefereeState::StartOfGame => self.call_trial()?,
                RefereeState::TeamsReady => self.start_trial()?,
                RefereeState::WaitForTrialConclusion => {
                    if self.assert_trial_decision()? {
                        self.declare_game_winner()?;
                    } else {
                        self.call_trial()?;
                    }
                }
                RefereeState::EndOfGame => {
                    let games = self.site.score_board.game_points()?;
                    if rules::is_match_end(&games, &self.rules) {
                        self.declare_match_winner()?;
                    } else {
                        self.announce_new_game()?;
                    }
                }
                RefereeState::EndOfMatch => break,
            }
        }

        let games = self.site.score_board.game_points()?;
        let outcome = self
            .outcome
            .unwrap_or_else(|| rules::decide_match(&games));
        Ok(RefereeReport {
            games,
            outcome,
            trials_played: self.trials_played,
            transitions: self.lifecycle.transitions().len(),
        })
    }

    /// Move to `to` and print it. Used for the states no monitor reports.
    fn enter(&mut self, to: RefereeState, reason: &str) -> KernelResult<()> {
        self.lifecycle.advance(to, Some(reason))?;
        self.site.repository.update_referee(to);
        Ok(())
    }

    fn publish(&self, event: MatchEvent) {
        if let Err(e) = self.site.events.publish(event) {
            warn!("Failed to publish referee decision: {}", e);
        }
    }

    fn announce_new_game(&mut self) -> KernelResult<()> {
        let site = Arc::clone(&self.site);
        site.score_board.reset_trial_points()?;
        site.playground.set_flag_position(0)?;

        let game = site.score_board.game_round()?;
        site.repository.set_game_number(game);
        site.repository.set_trial_number(1);
        site.repository.print_game_header();

        info!(game, "New game");
        self.publish(MatchEvent::GameAnnounced { game });
        self.enter(RefereeState::StartOfGame, "announce_new_game")
    }

    fn call_trial(&mut self) -> KernelResult<()> {
        let site = Arc::clone(&self.site);
        let game = site.score_board.game_round()?;
        let trial = site.score_board.trial_round()?;
        site.repository.set_trial_number(trial);
        self.publish(MatchEvent::TrialCalled { game, trial });

        for team in TeamId::all() {
            site.bench(team).pick_your_team()?;
        }
        let state = site.score_board.both_teams_ready()?;
        debug!(game, trial, "Teams ready");
        self.enter(state, "call_trial")
    }

    fn start_trial(&mut self) -> KernelResult<()> {
        // The playground reports the new state itself
        let state = self.site.playground.start_pulling()?;
        self.lifecycle.advance(state, Some("start_trial"))
    }

    /// Record the trial and release everyone on the field. Returns whether
    /// the game is over.
    fn assert_trial_decision(&mut self) -> KernelResult<bool> {
        let site = Arc::clone(&self.site);
        let game = site.score_board.game_round()?;
        let trial = site.score_board.trial_round()?;
        let last = site.playground.get_last_flag_position()?;
        let flag = site.playground.get_flag_position()?;

        let score = rules::decide_trial(last, flag);
        site.score_board.add_trial_point(score)?;
        site.repository.set_flag_position(flag);
        site.playground.result_asserted()?;
        self.trials_played += 1;

        debug!(game, trial, flag, score = score.code(), "Trial decided");
        self.publish(MatchEvent::TrialDecided {
            game,
            trial,
            score,
            flag,
        });

        let remaining = site.score_board.remaining_trials()?;
        Ok(rules::is_game_end(flag, remaining, &self.rules))
    }

    fn declare_game_winner(&mut self) -> KernelResult<()> {
        let site = Arc::clone(&self.site);
        let game = site.score_board.game_round()?;
        let trials = site.score_board.trial_points()?;
        let flag = site.playground.get_flag_position()?;
        let score = rules::decide_game(flag, &trials, &self.rules);

        site.repository.set_trial_number(trials.len());
        site.repository.print_game_result(score);
        site.score_board.add_game_point(score)?;

        info!(game, result = score.code(), trials = trials.len(), "Game decided");
        self.publish(MatchEvent::GameDecided {
            game,
            score,
            trials: trials.len(),
        });
        self.enter(RefereeState::EndOfGame, "declare_game_winner")
    }

    fn declare_match_winner(&mut self) -> KernelResult<()> {
        let site = Arc::clone(&self.site);
        let games = site.score_board.game_points()?;
        let outcome = rules::decide_match(&games);

        match outcome {
            MatchOutcome::Winner {
                team,
                team1_games,
                team2_games,
            } => {
                info!(%team, team1_games, team2_games, "Match won");
                site.repository
                    .print_match_winner(team, team1_games, team2_games);
            }
            MatchOutcome::Draw {
                team1_games,
                team2_games,
            } => {
                info!(team1_games, team2_games, "Match drawn");
                site.repository.print_match_draw();
            }
        }
        self.publish(MatchEvent::MatchDecided { outcome });
        self.outcome = Some(outcome);

        // Flag first, then wake: released waiters check the flag
        site.score_board.set_match_ended(true)?;
        for team in TeamId::all() {
            site.bench(team).interrupt()?;
        }
        self.enter(RefereeState::EndOfMatch, "declare_match_winner")
    }
}
