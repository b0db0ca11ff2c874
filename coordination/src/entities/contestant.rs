//! Contestant: sits, lines up when picked, pulls, sits back down.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::debug;

use crate::error::KernelResult;
use crate::lifecycle::Lifecycle;
use crate::monitors::MatchSite;
use crate::state::{ContestantId, ContestantState, ContestantView, Strength, TeamId};

#[derive(Debug, Clone, Serialize)]
pub struct ContestantReport {
    pub team: TeamId,
    pub id: ContestantId,
    pub trials_played: usize,
    pub transitions: usize,
}

pub struct Contestant {
    team: TeamId,
    id: ContestantId,
    strength: Strength,
    site: Arc<MatchSite>,
    lifecycle: Lifecycle<ContestantState>,
    rng: ChaCha8Rng,
    pull_ms: Range<u64>,
    trials_played: usize,
}

impl Contestant {
    pub fn new(
        team: TeamId,
        id: ContestantId,
        strength: Strength,
        site: Arc<MatchSite>,
        pull_ms: Range<u64>,
        seed: u64,
    ) -> Self {
        Self {
            team,
            id,
            strength,
            site,
            lifecycle: Lifecycle::new(ContestantState::SeatAtTheBench),
            rng: ChaCha8Rng::seed_from_u64(seed),
            pull_ms,
            trials_played: 0,
        }
    }

    pub fn team(&self) -> TeamId {
        self.team
    }

    pub fn id(&self) -> ContestantId {
        self.id
    }

    fn view(&self) -> ContestantView {
        ContestantView {
            team: self.team,
            id: self.id,
            state: self.lifecycle.current(),
            strength: self.strength,
        }
    }

    pub fn run(mut self) -> KernelResult<ContestantReport> {
        let seating = self.site.bench(self.team).add_contestant(self.view())?;
        self.strength = seating.strength;

        while !self.site.score_board.is_match_ended()? {
            match self.lifecycle.current() {
                ContestantState::SeatAtTheBench => self.follow_coach_advice()?,
                ContestantState::StandInPosition => self.get_ready()?,
                ContestantState::DoYourBest => {
                    self.pull_the_rope()?;
                    self.seat_down()?;
                }
            }
        }

        debug!(team = %self.team, id = %self.id, trials = self.trials_played, "Contestant done");
        Ok(ContestantReport {
            team: self.team,
            id: self.id,
            trials_played: self.trials_played,
            transitions: self.lifecycle.transitions().len(),
        })
    }

    fn follow_coach_advice(&mut self) -> KernelResult<()> {
        self.site.bench(self.team).get_contestant(self.id)?;
        let state = self.site.playground.add_contestant(self.view())?;
        self.lifecycle.advance(state, Some("follow_coach_advice"))
    }

    fn get_ready(&mut self) -> KernelResult<()> {
        let state = ContestantState::DoYourBest;
        self.lifecycle.advance(state, Some("get_ready"))?;
        self.site
            .repository
            .update_contestant(self.team, self.id, state, self.strength);
        Ok(())
    }

    fn pull_the_rope(&mut self) -> KernelResult<()> {
        let effort = self.pull_duration();
        self.site.playground.pull_rope(self.view(), effort)?;
        self.trials_played += 1;
        Ok(())
    }

    fn seat_down(&mut self) -> KernelResult<()> {
        self.site.playground.get_contestant(self.team, self.id)?;
        // Blocks until picked again or the match ends
        let seating = self.site.bench(self.team).add_contestant(self.view())?;
        self.strength = seating.strength;
        self.lifecycle.advance(seating.state, Some("seat_down"))
    }

    fn pull_duration(&mut self) -> Duration {
        if self.pull_ms.is_empty() {
            Duration::from_millis(self.pull_ms.start)
        } else {
            Duration::from_millis(self.rng.gen_range(self.pull_ms.clone()))
        }
    }
}
