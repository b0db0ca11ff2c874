//! Playground: where the selected contestants line up and pull.
//!
//! Trials are numbered by two counters owned by the monitor. `started` moves
//! when the referee starts a trial, `asserted` when it has decided one. A
//! contestant lining up waits for `started` to move past the value it saw on
//! arrival; pullers and watching coaches wait for `asserted` to catch up with
//! their trial. Neither wait can be satisfied by a signal from another trial.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tracing::debug;

use super::shutdown::ShutdownVotes;
use super::{lock_for_abort, lock_monitor};
use crate::config::MatchRules;
use crate::error::{KernelError, KernelResult};
use crate::repository::InformationRepository;
use crate::rules;
use crate::state::{
    BenchEntry, CoachState, CoachView, ContestantId, ContestantState, ContestantView,
    RefereeState, Strength, TeamId,
};

const MONITOR: &str = "playground";

/// Number of the trial a coach is about to watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TrialTicket(pub u64);

/// Result of `check_team_placement`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub state: CoachState,
    pub ticket: TrialTicket,
}

#[derive(Default)]
struct Inner {
    rosters: [Vec<BenchEntry>; 2],
    pulls: usize,
    flag: i32,
    last_flag: i32,
    started: u64,
    asserted: u64,
    aborted: bool,
}

pub struct Playground {
    rules: MatchRules,
    inner: Mutex<Inner>,
    start_trial: Condvar,
    teams_in_position: Condvar,
    finished_pulling: Condvar,
    result_asserted: Condvar,
    votes: ShutdownVotes,
    repository: Arc<InformationRepository>,
}

impl Playground {
    pub fn new(rules: MatchRules, repository: Arc<InformationRepository>) -> Self {
        Self {
            rules,
            inner: Mutex::new(Inner::default()),
            start_trial: Condvar::new(),
            teams_in_position: Condvar::new(),
            finished_pulling: Condvar::new(),
            result_asserted: Condvar::new(),
            votes: ShutdownVotes::new(rules.participants()),
            repository,
        }
    }

    /// Line a contestant up at its end of the rope and block until the
    /// referee starts the trial
    pub fn add_contestant(&self, contestant: ContestantView) -> KernelResult<ContestantState> {
        let team = contestant.team;
        let state = ContestantState::StandInPosition;
        let mut inner = lock_monitor(&self.inner, MONITOR)?;

        let roster = &mut inner.rosters[team.index()];
        if roster.len() >= self.rules.pullers_per_team {
            return Err(KernelError::invariant(
                MONITOR,
                format!(
                    "more than {} contestants of team {team} in position",
                    self.rules.pullers_per_team
                ),
            ));
        }
        if roster.iter().any(|e| e.id == contestant.id) {
            return Err(KernelError::invariant(
                MONITOR,
                format!("contestant {} of team {team} already in position", contestant.id),
            ));
        }

        roster.push(BenchEntry {
            id: contestant.id,
            strength: contestant.strength,
        });
        let in_position = roster.len();

        self.repository.set_team_placement(team, contestant.id);
        self.repository
            .update_contestant(team, contestant.id, state, contestant.strength);

        if in_position == self.rules.pullers_per_team {
            self.teams_in_position.notify_all();
        }

        let arrived_at = inner.started;
        let inner = self
            .start_trial
            .wait_while(inner, |s| s.started == arrived_at && !s.aborted)
            .map_err(|_| KernelError::poisoned(MONITOR))?;

        if inner.aborted {
            return Err(KernelError::aborted(MONITOR));
        }
        Ok(state)
    }

    /// Coach blocks until its team is fully in position. The returned ticket
    /// names the trial those contestants will pull in.
    pub fn check_team_placement(&self, coach: CoachView) -> KernelResult<Placement> {
        let state = CoachState::AssembleTeam;
        let inner = lock_monitor(&self.inner, MONITOR)?;
        if coach.state != state {
            self.repository.update_coach(coach.team, state);
        }

        let pullers = self.rules.pullers_per_team;
        let index = coach.team.index();
        let inner = self
            .teams_in_position
            .wait_while(inner, |s| s.rosters[index].len() < pullers && !s.aborted)
            .map_err(|_| KernelError::poisoned(MONITOR))?;

        if inner.aborted {
            return Err(KernelError::aborted(MONITOR));
        }

        Ok(Placement {
            state,
            ticket: TrialTicket(inner.started + 1),
        })
    }

    /// Coach blocks until the trial on its ticket has been decided
    pub fn watch_trial(&self, coach: CoachView, ticket: TrialTicket) -> KernelResult<CoachState> {
        let state = CoachState::WatchTrial;
        let inner = lock_monitor(&self.inner, MONITOR)?;
        if coach.state != state {
            self.repository.update_coach(coach.team, state);
        }

        let inner = self
            .result_asserted
            .wait_while(inner, |s| s.asserted < ticket.0 && !s.aborted)
            .map_err(|_| KernelError::poisoned(MONITOR))?;

        if inner.aborted {
            return Err(KernelError::aborted(MONITOR));
        }
        Ok(state)
    }

    /// Pull for `effort`, then block until the referee asserts the result.
    /// The last of the pullers moves the flag and wakes the referee.
    pub fn pull_rope(
        &self,
        contestant: ContestantView,
        effort: Duration,
    ) -> KernelResult<ContestantState> {
        if !effort.is_zero() {
            std::thread::sleep(effort);
        }

        let mut inner = lock_monitor(&self.inner, MONITOR)?;
        if inner.aborted {
            return Err(KernelError::aborted(MONITOR));
        }
        if !inner.rosters[contestant.team.index()]
            .iter()
            .any(|e| e.id == contestant.id)
        {
            return Err(KernelError::invariant(
                MONITOR,
                format!(
                    "contestant {} of team {} pulled without being in position",
                    contestant.id, contestant.team
                ),
            ));
        }

        let pulls_per_trial = self.rules.pulls_per_trial();
        if inner.pulls >= pulls_per_trial {
            return Err(KernelError::invariant(
                MONITOR,
                format!("more than {pulls_per_trial} pulls in one trial"),
            ));
        }

        inner.pulls += 1;
        if inner.pulls == pulls_per_trial {
            let [team1, team2] = inner.rosters.each_ref().map(|r| roster_strength(r));
            let step = rules::flag_step(team1, team2);
            inner.last_flag = inner.flag;
            inner.flag += step;
            debug!(team1, team2, flag = inner.flag, "All contestants pulled");
            self.finished_pulling.notify_one();
        }

        let trial = inner.started;
        let inner = self
            .result_asserted
            .wait_while(inner, |s| s.asserted < trial && !s.aborted)
            .map_err(|_| KernelError::poisoned(MONITOR))?;

        if inner.aborted {
            return Err(KernelError::aborted(MONITOR));
        }
        Ok(ContestantState::DoYourBest)
    }

    /// Referee starts the trial and blocks until every contestant pulled
    pub fn start_pulling(&self) -> KernelResult<RefereeState> {
        let state = RefereeState::WaitForTrialConclusion;
        let mut inner = lock_monitor(&self.inner, MONITOR)?;

        inner.started += 1;
        self.start_trial.notify_all();
        self.repository.update_referee(state);

        let pulls_per_trial = self.rules.pulls_per_trial();
        let inner = self
            .finished_pulling
            .wait_while(inner, |s| s.pulls < pulls_per_trial && !s.aborted)
            .map_err(|_| KernelError::poisoned(MONITOR))?;

        if inner.aborted {
            return Err(KernelError::aborted(MONITOR));
        }
        Ok(state)
    }

    /// Close the current trial and release pullers and coaches
    pub fn result_asserted(&self) -> KernelResult<()> {
        let mut inner = lock_monitor(&self.inner, MONITOR)?;
        inner.pulls = 0;
        inner.asserted = inner.started;
        self.result_asserted.notify_all();
        Ok(())
    }

    /// Take a contestant out of position after its trial. Returns whether it
    /// was on the field.
    pub fn get_contestant(&self, team: TeamId, id: ContestantId) -> KernelResult<bool> {
        let mut inner = lock_monitor(&self.inner, MONITOR)?;
        let roster = &mut inner.rosters[team.index()];
        let before = roster.len();
        roster.retain(|e| e.id != id);
        let removed = roster.len() < before;

        if inner.rosters.iter().all(Vec::is_empty) {
            self.repository.reset_team_placement();
        }
        Ok(removed)
    }

    pub fn get_flag_position(&self) -> KernelResult<i32> {
        Ok(lock_monitor(&self.inner, MONITOR)?.flag)
    }

    pub fn get_last_flag_position(&self) -> KernelResult<i32> {
        Ok(lock_monitor(&self.inner, MONITOR)?.last_flag)
    }

    /// Set both the current and the previous flag position
    pub fn set_flag_position(&self, position: i32) -> KernelResult<()> {
        let mut inner = lock_monitor(&self.inner, MONITOR)?;
        inner.flag = position;
        inner.last_flag = position;
        self.repository.set_flag_position(position);
        Ok(())
    }

    /// Snapshot of both on-field rosters
    pub fn teams(&self) -> KernelResult<[Vec<BenchEntry>; 2]> {
        Ok(lock_monitor(&self.inner, MONITOR)?.rosters.clone())
    }

    pub fn abort(&self) {
        lock_for_abort(&self.inner).aborted = true;
        self.start_trial.notify_all();
        self.teams_in_position.notify_all();
        self.finished_pulling.notify_all();
        self.result_asserted.notify_all();
    }

    pub fn shutdown(&self) -> KernelResult<bool> {
        self.votes.vote()
    }

    pub fn is_shut_down(&self) -> KernelResult<bool> {
        self.votes.is_complete()
    }
}

fn roster_strength(roster: &[BenchEntry]) -> Strength {
    roster.iter().map(|e| e.strength).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn playground() -> Arc<Playground> {
        let rules = MatchRules::default();
        Arc::new(Playground::new(
            rules,
            Arc::new(InformationRepository::new(rules)),
        ))
    }

    fn view(team: TeamId, id: u8, strength: Strength) -> ContestantView {
        ContestantView {
            team,
            id: ContestantId(id),
            state: ContestantState::SeatAtTheBench,
            strength,
        }
    }

    fn coach(team: TeamId) -> CoachView {
        CoachView {
            team,
            state: CoachState::WaitForRefereeCommand,
        }
    }

    #[test]
    fn test_coach_released_only_at_full_placement() {
        let ground = playground();
        let (tx, rx) = mpsc::channel();
        let watcher = {
            let ground = Arc::clone(&ground);
            std::thread::spawn(move || {
                tx.send(ground.check_team_placement(coach(TeamId::TWO)).unwrap())
                    .unwrap();
            })
        };

        let mut liners = Vec::new();
        for id in 1..=3u8 {
            assert!(rx.recv_timeout(Duration::from_millis(30)).is_err());
            let ground = Arc::clone(&ground);
            liners.push(std::thread::spawn(move || {
                ground.add_contestant(view(TeamId::TWO, id, 10))
            }));
        }

        let placement = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(placement.state, CoachState::AssembleTeam);
        assert_eq!(placement.ticket, TrialTicket(1));
        assert_eq!(ground.teams().unwrap()[TeamId::TWO.index()].len(), 3);
        watcher.join().unwrap();

        ground.abort();
        for liner in liners {
            assert!(liner.join().unwrap().unwrap_err().is_aborted());
        }
    }

    #[test]
    fn test_fourth_contestant_is_an_invariant_violation() {
        let ground = playground();
        for id in 1..=3u8 {
            let ground = Arc::clone(&ground);
            std::thread::spawn(move || ground.add_contestant(view(TeamId::ONE, id, 10)));
        }
        let placed = ground.check_team_placement(coach(TeamId::ONE)).unwrap();
        assert_eq!(placed.ticket, TrialTicket(1));

        assert!(matches!(
            ground.add_contestant(view(TeamId::ONE, 4, 10)),
            Err(KernelError::InvariantViolation { .. })
        ));
        ground.abort();
    }

    #[test]
    fn test_stronger_team_one_moves_flag_negative() {
        let ground = playground();
        ground.set_flag_position(0).unwrap();

        // Team sums 300 vs 250
        let lineup = [
            (TeamId::ONE, [100, 100, 100]),
            (TeamId::TWO, [80, 80, 90]),
        ];
        let (tx, rx) = mpsc::channel();
        for (team, strengths) in lineup {
            for (i, strength) in strengths.into_iter().enumerate() {
                let ground = Arc::clone(&ground);
                let tx = tx.clone();
                std::thread::spawn(move || {
                    let me = view(team, i as u8 + 1, strength);
                    ground.add_contestant(me).unwrap();
                    let state = ground.pull_rope(me, Duration::ZERO).unwrap();
                    tx.send(state).unwrap();
                });
            }
        }

        let t1 = ground.check_team_placement(coach(TeamId::ONE)).unwrap();
        ground.check_team_placement(coach(TeamId::TWO)).unwrap();

        assert_eq!(
            ground.start_pulling().unwrap(),
            RefereeState::WaitForTrialConclusion
        );
        assert_eq!(ground.get_flag_position().unwrap(), -1);
        assert_eq!(ground.get_last_flag_position().unwrap(), 0);
        assert_eq!(
            rules::decide_trial(
                ground.get_last_flag_position().unwrap(),
                ground.get_flag_position().unwrap()
            ),
            crate::state::TrialScore::Team1
        );

        // Nobody leaves the rope before the result is asserted
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        ground.result_asserted().unwrap();
        for _ in 0..6 {
            assert_eq!(
                rx.recv_timeout(Duration::from_secs(5)).unwrap(),
                ContestantState::DoYourBest
            );
        }

        // The trial is already decided, so watching it returns immediately
        assert_eq!(
            ground.watch_trial(coach(TeamId::ONE), t1.ticket).unwrap(),
            CoachState::WatchTrial
        );
    }

    #[test]
    fn test_flag_setter_sets_both_positions() {
        let ground = playground();
        ground.set_flag_position(3).unwrap();
        assert_eq!(ground.get_last_flag_position().unwrap(), 3);
        assert!(!ground.get_contestant(TeamId::ONE, ContestantId(1)).unwrap());
    }
}
