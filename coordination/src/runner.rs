//! Match runner
//!
//! Builds the monitors for one match, draws the initial strengths, spawns one
//! named thread per entity and joins them all. A thread that fails (or
//! panics) aborts the site so every other thread is woken instead of left
//! blocked.

use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::MatchConfig;
use crate::entities::{
    strategy, Coach, CoachReport, Contestant, ContestantReport, Referee, RefereeReport,
};
use crate::error::{KernelError, KernelResult};
use crate::events::{EventBus, EventHistory, EventStats, MatchEvent, SharedEventBus};
use crate::monitors::MatchSite;
use crate::repository::InformationRepository;
use crate::state::{ContestantId, GameScore, MatchOutcome, Strength, TeamId};

/// A contestant's strength when the match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FinalStrength {
    pub team: TeamId,
    pub id: ContestantId,
    pub strength: Strength,
}

/// Everything a finished match produced
#[derive(Debug, Clone, Serialize)]
pub struct MatchReport {
    pub seed: u64,
    pub outcome: MatchOutcome,
    pub games: Vec<GameScore>,
    pub trials_played: usize,
    pub coaches: Vec<CoachReport>,
    pub contestants: Vec<ContestantReport>,
    pub final_strengths: Vec<FinalStrength>,
    /// Whether every monitor collected a shutdown vote from every entity
    pub shutdown_complete: bool,
    /// Event counts, when the bus kept a history
    pub event_stats: Option<EventStats>,
    #[serde(skip)]
    pub transcript: Vec<String>,
    #[serde(skip)]
    pub decisions: Vec<MatchEvent>,
}

impl MatchReport {
    pub fn winner(&self) -> Option<TeamId> {
        self.outcome.winner()
    }
}

/// Aborts the site if the owning thread unwinds
struct AbortOnPanic<'a>(&'a MatchSite);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(
                entity = thread::current().name().unwrap_or("unnamed"),
                "Entity panicked"
            );
            self.0.abort();
        }
    }
}

pub struct MatchRunner {
    config: MatchConfig,
}

impl MatchRunner {
    pub fn new(config: MatchConfig) -> KernelResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Run a match with a private event bus
    pub fn run(&self) -> KernelResult<MatchReport> {
        let history = EventHistory::new().shared();
        self.run_with_events(EventBus::with_history(history).shared())
    }

    /// Run a match publishing on `events`. Subscribe before calling to see
    /// the whole match; decisions land in the report only if the bus keeps a
    /// history.
    pub fn run_with_events(&self, events: SharedEventBus) -> KernelResult<MatchReport> {
        let config = &self.config;
        let rules = config.rules;
        let seed = config.seed.unwrap_or_else(rand::random);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        info!(seed, "Starting match");

        let mut repository =
            InformationRepository::new(rules).with_event_bus(Arc::clone(&events));
        if let Some(path) = &config.transcript_path {
            repository = repository.with_transcript_file(path)?;
        }
        let repository = Arc::new(repository);
        let site = Arc::new(MatchSite::new(config, Arc::clone(&repository), Arc::clone(&events)));

        let mut contestants = Vec::new();
        for team in TeamId::all() {
            for number in 1..=rules.team_size {
                let id = ContestantId(number as u8);
                let strength = rng.gen_range(config.initial_strength_range());
                repository.register_contestant(team, id, strength);
                contestants.push(Contestant::new(
                    team,
                    id,
                    strength,
                    Arc::clone(&site),
                    config.pull_range_ms(),
                    rng.gen(),
                ));
            }
        }
        let coaches: Vec<Coach> = TeamId::all()
            .into_iter()
            .map(|team| {
                let strategy = strategy::build(config.strategy_for(team), rng.gen());
                Coach::new(team, Arc::clone(&site), rules, strategy)
            })
            .collect();
        let referee = Referee::new(Arc::clone(&site), rules);

        repository.print_header();

        let mut handles = EntityHandles::default();
        let spawned = handles.spawn(&site, contestants, coaches, referee);
        if let Err(e) = &spawned {
            error!("Failed to start the match: {}", e);
            site.abort();
        }

        let mut failures = Vec::new();
        let contestant_reports = join_all(handles.contestants, &mut failures);
        let coach_reports = join_all(handles.coaches, &mut failures);
        let referee_report: Option<RefereeReport> =
            join_all(handles.referee.into_iter().collect(), &mut failures).pop();

        spawned?;

        repository.print_legend();
        repository.close();

        if let Some(e) = pick_failure(failures) {
            return Err(e);
        }
        let referee_report = referee_report
            .ok_or_else(|| KernelError::thread("referee", "no report produced"))?;

        let mut final_strengths = Vec::new();
        for team in TeamId::all() {
            for (id, strength) in site.bench(team).strengths()? {
                final_strengths.push(FinalStrength { team, id, strength });
            }
        }

        let (decisions, event_stats, history) = match events.history() {
            Some(history) => (
                history.decisions()?,
                Some(history.stats()?),
                Some(Arc::clone(history)),
            ),
            None => (Vec::new(), None, None),
        };
        if let (Some(path), Some(history)) = (&config.events_path, history) {
            let written = history.write_json_lines(BufWriter::new(File::create(path)?))?;
            debug!(path = %path.display(), events = written, "Event log written");
        }

        let shutdown_complete = site.is_shut_down()?;
        if !shutdown_complete {
            warn!("Not every entity voted for shutdown");
        }

        info!(
            seed,
            games = referee_report.games.len(),
            trials = referee_report.trials_played,
            "Match finished"
        );

        Ok(MatchReport {
            seed,
            outcome: referee_report.outcome,
            games: referee_report.games,
            trials_played: referee_report.trials_played,
            coaches: coach_reports,
            contestants: contestant_reports,
            final_strengths,
            shutdown_complete,
            event_stats,
            transcript: repository.lines(),
            decisions,
        })
    }
}

type EntityHandle<T> = (String, JoinHandle<KernelResult<T>>);

#[derive(Default)]
struct EntityHandles {
    contestants: Vec<EntityHandle<ContestantReport>>,
    coaches: Vec<EntityHandle<CoachReport>>,
    referee: Option<EntityHandle<RefereeReport>>,
}

impl EntityHandles {
    /// Contestants first, then coaches, then the referee who drives them
    fn spawn(
        &mut self,
        site: &Arc<MatchSite>,
        contestants: Vec<Contestant>,
        coaches: Vec<Coach>,
        referee: Referee,
    ) -> KernelResult<()> {
        for contestant in contestants {
            let team = contestant.team();
            let name = format!("contestant-{team}-{}", contestant.id());
            let handle = spawn_entity(name.clone(), site, Some(team), move || contestant.run())?;
            self.contestants.push((name, handle));
        }
        for coach in coaches {
            let team = coach.team();
            let name = format!("coach-{team}");
            let handle = spawn_entity(name.clone(), site, Some(team), move || coach.run())?;
            self.coaches.push((name, handle));
        }
        let name = "referee".to_string();
        let handle = spawn_entity(name.clone(), site, None, move || referee.run())?;
        self.referee = Some((name, handle));
        Ok(())
    }
}

/// Spawn one entity thread. Whatever the outcome, the thread casts its
/// shutdown votes before it exits; a failure other than an abort aborts the
/// whole site.
fn spawn_entity<T, F>(
    name: String,
    site: &Arc<MatchSite>,
    team: Option<TeamId>,
    body: F,
) -> KernelResult<JoinHandle<KernelResult<T>>>
where
    T: Send + 'static,
    F: FnOnce() -> KernelResult<T> + Send + 'static,
{
    let site = Arc::clone(site);
    let entity = name.clone();
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            let _guard = AbortOnPanic(&site);
            let result = body();

            if let Err(e) = &result {
                if e.is_aborted() {
                    debug!(entity = %entity, "Entity released by abort");
                } else {
                    error!(entity = %entity, "Entity failed: {}", e);
                    site.abort();
                }
            }
            if let Err(e) = site.vote_shutdown(team) {
                warn!(entity = %entity, "Shutdown vote failed: {}", e);
            }
            result
        })
        .map_err(|e| KernelError::thread(name, e.to_string()))
}

fn join_all<T>(
    handles: Vec<EntityHandle<T>>,
    failures: &mut Vec<KernelError>,
) -> Vec<T> {
    let mut reports = Vec::with_capacity(handles.len());
    for (name, handle) in handles {
        match handle.join() {
            Ok(Ok(report)) => reports.push(report),
            Ok(Err(e)) => failures.push(e),
            Err(_) => failures.push(KernelError::thread(name, "panicked")),
        }
    }
    reports
}

/// The root cause: the first failure that is not just another thread's abort
fn pick_failure(failures: Vec<KernelError>) -> Option<KernelError> {
    let mut first_abort = None;
    for failure in failures {
        if !failure.is_aborted() {
            return Some(failure);
        }
        first_abort.get_or_insert(failure);
    }
    first_abort
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_beats_aborts() {
        let failures = vec![
            KernelError::aborted("bench"),
            KernelError::invariant("playground", "fourth puller"),
            KernelError::aborted("score_board"),
        ];
        assert!(matches!(
            pick_failure(failures),
            Some(KernelError::InvariantViolation { .. })
        ));

        let only_aborts = vec![KernelError::aborted("bench")];
        assert!(pick_failure(only_aborts).unwrap().is_aborted());
        assert!(pick_failure(Vec::new()).is_none());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = MatchConfig::default();
        config.min_initial_strength = 20;
        config.max_initial_strength = 10;
        assert!(matches!(
            MatchRunner::new(config),
            Err(KernelError::Config { .. })
        ));
    }

    #[test]
    fn test_short_match_completes() {
        let mut config = MatchConfig::default();
        config.seed = Some(11);
        config.min_pull_ms = 0;
        config.max_pull_ms = 0;
        config.transcript_path = None;
        config.events_path = None;

        let report = MatchRunner::new(config).unwrap().run().unwrap();
        assert!(report.shutdown_complete);
        assert!(!report.games.is_empty() && report.games.len() <= 3);
        assert_eq!(report.contestants.len(), 10);
        assert_eq!(report.final_strengths.len(), 10);
        assert!(report.final_strengths.iter().all(|s| s.strength >= 1));
    }
}
