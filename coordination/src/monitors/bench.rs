//! Contestants' bench, one per team.
//!
//! Three rendezvous live here:
//! - contestants sit and wait to be picked for a trial
//! - the coach waits for the whole team to be seated before picking
//! - the referee releases the coach for the next trial (`pick_your_team` /
//!   `wait_for_next_trial`)
//!
//! Selections and referee releases are generation counted: a contestant only
//! answers a selection published after it sat down, and a coach only answers
//! a release issued after it started waiting.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Condvar, Mutex};

use tracing::debug;

use super::shutdown::ShutdownVotes;
use super::{lock_for_abort, lock_monitor};
use crate::config::MatchRules;
use crate::error::{KernelError, KernelResult};
use crate::repository::InformationRepository;
use crate::state::{
    BenchEntry, CoachState, CoachView, ContestantId, ContestantState, ContestantView, Strength,
    TeamId,
};

const MONITOR: &str = "bench";

/// What a contestant learns when it leaves `add_contestant`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seating {
    pub state: ContestantState,
    /// Strength on record for the contestant at wake-up
    pub strength: Strength,
    /// `false` when the wait ended because the match is over
    pub selected: bool,
}

#[derive(Default)]
struct Inner {
    seated: BTreeSet<ContestantId>,
    strengths: BTreeMap<ContestantId, Strength>,
    selected: BTreeSet<ContestantId>,
    selection_round: u64,
    coach_waiting: bool,
    releases: u64,
    match_ended: bool,
    aborted: bool,
}

impl Inner {
    fn is_released(&self) -> bool {
        self.match_ended || self.aborted
    }
}

pub struct Bench {
    team: TeamId,
    rules: MatchRules,
    strength_floor: Strength,
    inner: Mutex<Inner>,
    all_seated: Condvar,
    players_selected: Condvar,
    coach_ready: Condvar,
    next_trial: Condvar,
    votes: Arc<ShutdownVotes>,
    repository: Arc<InformationRepository>,
}

impl Bench {
    pub fn new(
        team: TeamId,
        rules: MatchRules,
        strength_floor: Strength,
        votes: Arc<ShutdownVotes>,
        repository: Arc<InformationRepository>,
    ) -> Self {
        Self {
            team,
            rules,
            strength_floor,
            inner: Mutex::new(Inner::default()),
            all_seated: Condvar::new(),
            players_selected: Condvar::new(),
            coach_ready: Condvar::new(),
            next_trial: Condvar::new(),
            votes,
            repository,
        }
    }

    pub fn team(&self) -> TeamId {
        self.team
    }

    fn check_contestant(&self, id: ContestantId) -> KernelResult<()> {
        if id.0 == 0 || id.index() >= self.rules.team_size {
            return Err(KernelError::invariant(
                MONITOR,
                format!("unknown contestant {id} on team {}", self.team),
            ));
        }
        Ok(())
    }

    /// Seat a contestant and block until it is picked for a trial or the match
    /// ends. The strength passed in is recorded the first time the contestant
    /// sits; afterwards the bench's record is authoritative.
    pub fn add_contestant(&self, contestant: ContestantView) -> KernelResult<Seating> {
        if contestant.team != self.team {
            return Err(KernelError::invariant(
                MONITOR,
                format!(
                    "contestant of team {} seated on bench {}",
                    contestant.team, self.team
                ),
            ));
        }
        self.check_contestant(contestant.id)?;

        let id = contestant.id;
        let mut inner = lock_monitor(&self.inner, MONITOR)?;
        if inner.seated.contains(&id) {
            return Err(KernelError::invariant(
                MONITOR,
                format!("contestant {id} of team {} seated twice", self.team),
            ));
        }

        let strength = *inner.strengths.entry(id).or_insert(contestant.strength);
        if contestant.state != ContestantState::SeatAtTheBench {
            self.repository.update_contestant(
                self.team,
                id,
                ContestantState::SeatAtTheBench,
                strength,
            );
        }

        inner.seated.insert(id);
        if inner.seated.len() == self.rules.team_size {
            self.all_seated.notify_all();
        }

        let seated_round = inner.selection_round;
        let inner = self
            .players_selected
            .wait_while(inner, |s| {
                !(s.selection_round > seated_round && s.selected.contains(&id)) && !s.is_released()
            })
            .map_err(|_| KernelError::poisoned(MONITOR))?;

        if inner.aborted {
            return Err(KernelError::aborted(MONITOR));
        }

        let selected = !inner.match_ended
            && inner.selection_round > seated_round
            && inner.selected.contains(&id);

        Ok(Seating {
            state: ContestantState::SeatAtTheBench,
            strength: inner.strengths.get(&id).copied().unwrap_or(strength),
            selected,
        })
    }

    /// Take a contestant off the bench. Returns whether it was seated.
    pub fn get_contestant(&self, id: ContestantId) -> KernelResult<bool> {
        Ok(lock_monitor(&self.inner, MONITOR)?.seated.remove(&id))
    }

    /// Block until the whole team is seated and return who sits there. After
    /// the match ends this returns whatever is seated at that moment.
    pub fn get_bench(&self) -> KernelResult<Vec<BenchEntry>> {
        let inner = lock_monitor(&self.inner, MONITOR)?;
        let team_size = self.rules.team_size;
        let inner = self
            .all_seated
            .wait_while(inner, |s| s.seated.len() < team_size && !s.is_released())
            .map_err(|_| KernelError::poisoned(MONITOR))?;

        if inner.aborted {
            return Err(KernelError::aborted(MONITOR));
        }

        Ok(inner
            .seated
            .iter()
            .map(|id| BenchEntry {
                id: *id,
                strength: inner.strengths.get(id).copied().unwrap_or_default(),
            })
            .collect())
    }

    /// Publish the coach's pick for the next trial and wake the bench
    pub fn set_selected_contestants(&self, ids: &BTreeSet<ContestantId>) -> KernelResult<()> {
        let mut inner = lock_monitor(&self.inner, MONITOR)?;

        if ids.len() != self.rules.pullers_per_team {
            return Err(KernelError::invariant(
                MONITOR,
                format!(
                    "team {} selected {} contestants, expected {}",
                    self.team,
                    ids.len(),
                    self.rules.pullers_per_team
                ),
            ));
        }
        if let Some(missing) = ids.iter().find(|id| !inner.seated.contains(id)) {
            return Err(KernelError::invariant(
                MONITOR,
                format!("selected contestant {missing} of team {} is not seated", self.team),
            ));
        }

        inner.selected = ids.clone();
        inner.selection_round += 1;
        debug!(team = %self.team, round = inner.selection_round, selected = ?ids, "Team selected");
        self.players_selected.notify_all();
        Ok(())
    }

    pub fn get_selected_contestants(&self) -> KernelResult<BTreeSet<ContestantId>> {
        Ok(lock_monitor(&self.inner, MONITOR)?.selected.clone())
    }

    /// Referee side of the handshake: wait until the coach is waiting for a
    /// command, then release it
    pub fn pick_your_team(&self) -> KernelResult<()> {
        let inner = lock_monitor(&self.inner, MONITOR)?;
        let mut inner = self
            .coach_ready
            .wait_while(inner, |s| !s.coach_waiting && !s.is_released())
            .map_err(|_| KernelError::poisoned(MONITOR))?;

        if inner.aborted {
            return Err(KernelError::aborted(MONITOR));
        }

        inner.coach_waiting = false;
        inner.releases += 1;
        self.next_trial.notify_all();
        Ok(())
    }

    /// Coach side of the handshake
    pub fn wait_for_next_trial(&self, coach: CoachView) -> KernelResult<CoachState> {
        let state = CoachState::WaitForRefereeCommand;
        let mut inner = lock_monitor(&self.inner, MONITOR)?;
        if coach.state != state {
            self.repository.update_coach(coach.team, state);
        }

        inner.coach_waiting = true;
        self.coach_ready.notify_one();

        let released_at = inner.releases;
        let inner = self
            .next_trial
            .wait_while(inner, |s| s.releases == released_at && !s.is_released())
            .map_err(|_| KernelError::poisoned(MONITOR))?;

        if inner.aborted {
            return Err(KernelError::aborted(MONITOR));
        }
        Ok(state)
    }

    /// Apply `delta` to a contestant's recorded strength, never going below
    /// the floor. Returns the new strength.
    pub fn update_contestant_strength(
        &self,
        id: ContestantId,
        delta: Strength,
    ) -> KernelResult<Strength> {
        let mut inner = lock_monitor(&self.inner, MONITOR)?;
        let team = self.team;
        let strength = inner.strengths.get_mut(&id).ok_or_else(|| {
            KernelError::invariant(MONITOR, format!("no strength on record for {id} of team {team}"))
        })?;

        *strength = (*strength + delta).max(self.strength_floor);
        let updated = *strength;
        self.repository.update_contestant_strength(team, id, updated);
        Ok(updated)
    }

    /// Recorded strengths of every contestant that ever sat here
    pub fn strengths(&self) -> KernelResult<BTreeMap<ContestantId, Strength>> {
        Ok(lock_monitor(&self.inner, MONITOR)?.strengths.clone())
    }

    /// Release every waiter once the match has ended
    pub fn interrupt(&self) -> KernelResult<()> {
        lock_monitor(&self.inner, MONITOR)?.match_ended = true;
        debug!(team = %self.team, "Bench interrupted");
        self.notify_everyone();
        Ok(())
    }

    pub fn abort(&self) {
        lock_for_abort(&self.inner).aborted = true;
        self.notify_everyone();
    }

    fn notify_everyone(&self) {
        self.all_seated.notify_all();
        self.players_selected.notify_all();
        self.coach_ready.notify_all();
        self.next_trial.notify_all();
    }

    /// Vote on the counter shared by both benches
    pub fn shutdown(&self) -> KernelResult<bool> {
        self.votes.vote()
    }

    pub fn is_shut_down(&self) -> KernelResult<bool> {
        self.votes.is_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn bench() -> Arc<Bench> {
        let rules = MatchRules::default();
        Arc::new(Bench::new(
            TeamId::ONE,
            rules,
            1,
            Arc::new(ShutdownVotes::new(rules.participants())),
            Arc::new(InformationRepository::new(rules)),
        ))
    }

    fn view(id: u8, strength: Strength) -> ContestantView {
        ContestantView {
            team: TeamId::ONE,
            id: ContestantId(id),
            state: ContestantState::SeatAtTheBench,
            strength,
        }
    }

    fn seat_all(bench: &Arc<Bench>) -> mpsc::Receiver<(u8, Seating)> {
        let (tx, rx) = mpsc::channel();
        for id in 1..=5u8 {
            let bench = Arc::clone(bench);
            let tx = tx.clone();
            std::thread::spawn(move || {
                let seating = bench.add_contestant(view(id, 10 + id as Strength)).unwrap();
                tx.send((id, seating)).unwrap();
            });
        }
        rx
    }

    #[test]
    fn test_only_selected_contestants_wake() {
        let bench = bench();
        let rx = seat_all(&bench);

        let entries = bench.get_bench().unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[2], BenchEntry { id: ContestantId(3), strength: 13 });
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        let pick: BTreeSet<_> = [1, 3, 5].into_iter().map(ContestantId).collect();
        bench.set_selected_contestants(&pick).unwrap();

        let mut woken: Vec<u8> = (0..3)
            .map(|_| {
                let (id, seating) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
                assert!(seating.selected);
                id
            })
            .collect();
        woken.sort_unstable();
        assert_eq!(woken, vec![1, 3, 5]);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        bench.interrupt().unwrap();
        for _ in 0..2 {
            let (_, seating) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert!(!seating.selected);
        }
    }

    #[test]
    fn test_selection_visible_across_threads() {
        let bench = bench();
        let rx = seat_all(&bench);
        bench.get_bench().unwrap();

        let pick: BTreeSet<_> = [2, 4, 5].into_iter().map(ContestantId).collect();
        let (published_tx, published_rx) = mpsc::channel();
        let coach = {
            let bench = Arc::clone(&bench);
            let pick = pick.clone();
            std::thread::spawn(move || {
                bench.set_selected_contestants(&pick).unwrap();
                published_tx.send(()).unwrap();
            })
        };
        let reader = {
            let bench = Arc::clone(&bench);
            std::thread::spawn(move || {
                published_rx.recv().unwrap();
                bench.get_selected_contestants().unwrap()
            })
        };

        coach.join().unwrap();
        assert_eq!(reader.join().unwrap(), pick);

        let woken: BTreeSet<_> = (0..3)
            .map(|_| ContestantId(rx.recv_timeout(Duration::from_secs(5)).unwrap().0))
            .collect();
        assert_eq!(woken, pick);

        bench.interrupt().unwrap();
        for _ in 0..2 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
    }

    #[test]
    fn test_old_selection_does_not_wake_reseated_contestant() {
        let bench = bench();
        let rx = seat_all(&bench);
        bench.get_bench().unwrap();

        let pick: BTreeSet<_> = [1, 2, 3].into_iter().map(ContestantId).collect();
        bench.set_selected_contestants(&pick).unwrap();
        for _ in 0..3 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert!(bench.get_contestant(ContestantId(1)).unwrap());

        let (tx, again) = mpsc::channel();
        let reseat = {
            let bench = Arc::clone(&bench);
            std::thread::spawn(move || {
                let mut returning = view(1, 0);
                returning.state = ContestantState::DoYourBest;
                tx.send(bench.add_contestant(returning).unwrap()).unwrap();
            })
        };

        // The selection containing 1 predates the re-seat
        assert!(again.recv_timeout(Duration::from_millis(50)).is_err());

        bench.interrupt().unwrap();
        let seating = again.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(!seating.selected);
        assert_eq!(seating.strength, 11);
        reseat.join().unwrap();
    }

    #[test]
    fn test_selection_must_be_seated_and_sized() {
        let bench = bench();
        let too_few: BTreeSet<_> = [ContestantId(1)].into_iter().collect();
        assert!(matches!(
            bench.set_selected_contestants(&too_few),
            Err(KernelError::InvariantViolation { .. })
        ));

        let unseated: BTreeSet<_> = [1, 2, 3].into_iter().map(ContestantId).collect();
        assert!(bench.set_selected_contestants(&unseated).is_err());
    }

    #[test]
    fn test_unknown_contestant_is_rejected() {
        let bench = bench();
        assert!(bench.add_contestant(view(6, 10)).is_err());
        assert!(bench.add_contestant(view(0, 10)).is_err());

        let mut wrong_team = view(1, 10);
        wrong_team.team = TeamId::TWO;
        assert!(bench.add_contestant(wrong_team).is_err());
    }

    #[test]
    fn test_strength_updates_respect_floor() {
        let bench = bench();
        let rx = seat_all(&bench);
        bench.get_bench().unwrap();

        assert_eq!(bench.update_contestant_strength(ContestantId(2), 1).unwrap(), 13);
        for _ in 0..20 {
            bench.update_contestant_strength(ContestantId(4), -1).unwrap();
        }
        assert_eq!(bench.strengths().unwrap()[&ContestantId(4)], 1);
        assert!(bench.update_contestant_strength(ContestantId(5), 0).is_ok());

        bench.interrupt().unwrap();
        for _ in 0..5 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
    }

    #[test]
    fn test_referee_releases_waiting_coach() {
        let bench = bench();
        let coach = CoachView {
            team: TeamId::ONE,
            state: CoachState::WatchTrial,
        };

        let (tx, rx) = mpsc::channel();
        let coach_thread = {
            let bench = Arc::clone(&bench);
            std::thread::spawn(move || {
                tx.send(bench.wait_for_next_trial(coach).unwrap()).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        bench.pick_your_team().unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            CoachState::WaitForRefereeCommand
        );
        coach_thread.join().unwrap();
    }

    #[test]
    fn test_abort_wakes_coach_reading_bench() {
        let bench = bench();
        let reader = {
            let bench = Arc::clone(&bench);
            std::thread::spawn(move || bench.get_bench())
        };

        std::thread::sleep(Duration::from_millis(20));
        bench.abort();
        assert!(reader.join().unwrap().unwrap_err().is_aborted());
    }
}
