//! Coach: picks the team for every trial and adjusts strengths afterwards.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::strategy::SelectionStrategy;
use crate::config::MatchRules;
use crate::error::{KernelError, KernelResult};
use crate::lifecycle::Lifecycle;
use crate::monitors::{MatchSite, TrialTicket};
use crate::state::{CoachState, CoachView, ContestantId, TeamId};

#[derive(Debug, Clone, Serialize)]
pub struct CoachReport {
    pub team: TeamId,
    pub strategy: &'static str,
    pub trials_coached: usize,
    pub transitions: usize,
}

pub struct Coach {
    team: TeamId,
    site: Arc<MatchSite>,
    rules: MatchRules,
    lifecycle: Lifecycle<CoachState>,
    strategy: Box<dyn SelectionStrategy>,
    ticket: Option<TrialTicket>,
    trials_coached: usize,
}

impl Coach {
    pub fn new(
        team: TeamId,
        site: Arc<MatchSite>,
        rules: MatchRules,
        strategy: Box<dyn SelectionStrategy>,
    ) -> Self {
        Self {
            team,
            site,
            rules,
            lifecycle: Lifecycle::new(CoachState::WaitForRefereeCommand),
            strategy,
            ticket: None,
            trials_coached: 0,
        }
    }

    pub fn team(&self) -> TeamId {
        self.team
    }

    fn view(&self) -> CoachView {
        CoachView {
            team: self.team,
            state: self.lifecycle.current(),
        }
    }

    pub fn run(mut self) -> KernelResult<CoachReport> {
        self.site.bench(self.team).wait_for_next_trial(self.view())?;

        loop {
            match self.lifecycle.current() {
                // A watched trial is always reviewed, even the last one
                CoachState::WatchTrial => self.review_notes()?,
                _ if self.site.score_board.is_match_ended()? => break,
                CoachState::WaitForRefereeCommand => self.call_contestants()?,
                CoachState::AssembleTeam => self.inform_referee()?,
            }
        }

        debug!(team = %self.team, trials = self.trials_coached, "Coach done");
        Ok(CoachReport {
            team: self.team,
            strategy: self.strategy.name(),
            trials_coached: self.trials_coached,
            transitions: self.lifecycle.transitions().len(),
        })
    }

    fn call_contestants(&mut self) -> KernelResult<()> {
        let site = Arc::clone(&self.site);
        let bench = site.bench(self.team);

        let seated = bench.get_bench()?;
        let pick = self.strategy.pick(&seated, self.rules.pullers_per_team);
        debug!(team = %self.team, ?pick, "Calling contestants");
        bench.set_selected_contestants(&pick)?;

        let placement = site.playground.check_team_placement(self.view())?;
        self.ticket = Some(placement.ticket);
        self.lifecycle
            .advance(placement.state, Some("call_contestants"))
    }

    fn inform_referee(&mut self) -> KernelResult<()> {
        let ticket = self.ticket.take().ok_or_else(|| {
            KernelError::invariant("coach", "watching a trial the coach did not assemble")
        })?;

        self.site.score_board.inform_referee()?;
        let state = self.site.playground.watch_trial(self.view(), ticket)?;
        self.trials_coached += 1;
        self.lifecycle.advance(state, Some("inform_referee"))
    }

    /// Pullers lose a point, the rest of the team recovers one
    fn review_notes(&mut self) -> KernelResult<()> {
        let site = Arc::clone(&self.site);
        let bench = site.bench(self.team);

        let selected = bench.get_selected_contestants()?;
        for number in 1..=self.rules.team_size {
            let id = ContestantId(number as u8);
            let delta = if selected.contains(&id) { -1 } else { 1 };
            bench.update_contestant_strength(id, delta)?;
        }

        let state = bench.wait_for_next_trial(self.view())?;
        self.lifecycle.advance(state, Some("review_notes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchConfig;
    use crate::entities::strategy::StrongestSelection;
    use crate::events::EventBus;
    use crate::repository::InformationRepository;
    use crate::state::{ContestantState, ContestantView, Strength};
    use std::collections::BTreeSet;

    fn site() -> Arc<MatchSite> {
        let config = MatchConfig {
            seed: Some(0),
            ..MatchConfig::default()
        };
        let repository = Arc::new(InformationRepository::new(config.rules));
        Arc::new(MatchSite::new(&config, repository, EventBus::new().shared()))
    }

    #[test]
    fn test_last_watched_trial_is_reviewed_after_match_end() {
        let site = site();
        let bench = site.bench(TeamId::ONE);
        let before: [Strength; 5] = [1, 10, 10, 10, 10];

        let seated: Vec<_> = before
            .iter()
            .enumerate()
            .map(|(i, strength)| {
                let site = Arc::clone(&site);
                let me = ContestantView {
                    team: TeamId::ONE,
                    id: ContestantId(i as u8 + 1),
                    state: ContestantState::SeatAtTheBench,
                    strength: *strength,
                };
                std::thread::spawn(move || site.bench(TeamId::ONE).add_contestant(me).unwrap())
            })
            .collect();
        bench.get_bench().unwrap();

        let pick: BTreeSet<_> = [1, 2, 3].into_iter().map(ContestantId).collect();
        bench.set_selected_contestants(&pick).unwrap();

        // The referee closed the match while the coach was still watching
        site.score_board.set_match_ended(true).unwrap();
        bench.interrupt().unwrap();

        let mut coach = Coach::new(
            TeamId::ONE,
            Arc::clone(&site),
            MatchRules::default(),
            Box::new(StrongestSelection),
        );
        coach.lifecycle = Lifecycle::new(CoachState::WatchTrial);
        let report = coach.run().unwrap();
        assert_eq!(report.transitions, 1);

        let selected = bench.get_selected_contestants().unwrap();
        assert_eq!(selected, pick);
        let after = bench.strengths().unwrap();
        for (i, strength) in before.iter().enumerate() {
            let id = ContestantId(i as u8 + 1);
            let expected = if selected.contains(&id) {
                (strength - 1).max(1)
            } else {
                strength + 1
            };
            assert_eq!(after[&id], expected, "contestant {id}");
        }

        for handle in seated {
            handle.join().unwrap();
        }
    }
}
