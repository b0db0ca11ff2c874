//! Shared monitors
//!
//! Each monitor owns one `Mutex` and the `Condvar`s its waiters block on.
//! Every blocking call re-checks its predicate under the lock, and every
//! monitor has an `abort` that wakes all of its waiters with
//! [`KernelError::Aborted`] so a failing thread cannot leave others hanging.
//!
//! Lock order: a monitor may call the [`InformationRepository`] (and through
//! it the event bus) while holding its own lock; monitors never call each
//! other.

pub mod bench;
pub mod playground;
pub mod score_board;
pub mod shutdown;

pub use bench::{Bench, Seating};
pub use playground::{Placement, Playground, TrialTicket};
pub use score_board::ScoreBoard;
pub use shutdown::ShutdownVotes;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::error;

use crate::config::MatchConfig;
use crate::error::{KernelError, KernelResult};
use crate::events::SharedEventBus;
use crate::repository::InformationRepository;
use crate::state::TeamId;

/// Take a monitor lock, mapping poison to [`KernelError::Poisoned`]
pub(crate) fn lock_monitor<'a, T>(
    mutex: &'a Mutex<T>,
    monitor: &'static str,
) -> KernelResult<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| KernelError::poisoned(monitor))
}

/// Take a monitor lock even if poisoned. Only for setting abort flags.
pub(crate) fn lock_for_abort<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Every monitor of one match, shared by all entity threads
pub struct MatchSite {
    pub score_board: ScoreBoard,
    pub playground: Playground,
    benches: [Bench; 2],
    pub repository: Arc<InformationRepository>,
    pub events: SharedEventBus,
}

impl MatchSite {
    pub fn new(
        config: &MatchConfig,
        repository: Arc<InformationRepository>,
        events: SharedEventBus,
    ) -> Self {
        let rules = config.rules;
        let bench_votes = Arc::new(ShutdownVotes::new(rules.participants()));
        let bench = |team| {
            Bench::new(
                team,
                rules,
                config.strength_floor,
                Arc::clone(&bench_votes),
                Arc::clone(&repository),
            )
        };

        Self {
            score_board: ScoreBoard::new(rules),
            playground: Playground::new(rules, Arc::clone(&repository)),
            benches: [bench(TeamId::ONE), bench(TeamId::TWO)],
            repository,
            events,
        }
    }

    pub fn bench(&self, team: TeamId) -> &Bench {
        &self.benches[team.index()]
    }

    /// Wake every blocked thread in every monitor with an abort error
    pub fn abort(&self) {
        error!("Aborting match");
        self.score_board.abort();
        self.playground.abort();
        for bench in &self.benches {
            bench.abort();
        }
    }

    /// Cast one entity's shutdown votes. The referee passes `None` and votes
    /// on the team 1 bench.
    pub fn vote_shutdown(&self, team: Option<TeamId>) -> KernelResult<()> {
        self.playground.shutdown()?;
        self.score_board.shutdown()?;
        self.bench(team.unwrap_or(TeamId::ONE)).shutdown()?;
        Ok(())
    }

    /// Whether every monitor received a vote from every entity
    pub fn is_shut_down(&self) -> KernelResult<bool> {
        Ok(self.playground.is_shut_down()?
            && self.score_board.is_shut_down()?
            && self.bench(TeamId::ONE).is_shut_down()?)
    }
}
