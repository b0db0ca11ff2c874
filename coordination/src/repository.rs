//! General information repository
//!
//! Passive observer of the match. Entities report their state changes here
//! and the repository renders one transcript line per update, keeps the lines
//! in memory, optionally mirrors them to a writer, and republishes each state
//! change on the event bus.
//!
//! The repository is a leaf in the lock order: monitors may call into it while
//! holding their own lock, it never calls back into a monitor. Write failures
//! are logged and swallowed so reporting can never stall coordination.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::config::MatchRules;
use crate::error::KernelResult;
use crate::events::{MatchEvent, SharedEventBus};
use crate::state::{
    CoachState, ContestantId, ContestantState, GameScore, RefereeState, Strength, TeamId,
};

struct Inner {
    referee: RefereeState,
    coaches: [CoachState; 2],
    contestants: [Vec<(ContestantState, Strength)>; 2],
    placements: [Vec<ContestantId>; 2],
    game: usize,
    trial: usize,
    flag: i32,
    lines: Vec<String>,
    writer: Option<Box<dyn Write + Send>>,
}

pub struct InformationRepository {
    rules: MatchRules,
    inner: Mutex<Inner>,
    events: Option<SharedEventBus>,
}

impl InformationRepository {
    pub fn new(rules: MatchRules) -> Self {
        let roster = vec![(ContestantState::SeatAtTheBench, 0); rules.team_size];
        Self {
            rules,
            inner: Mutex::new(Inner {
                referee: RefereeState::StartOfMatch,
                coaches: [CoachState::WaitForRefereeCommand; 2],
                contestants: [roster.clone(), roster],
                placements: [Vec::new(), Vec::new()],
                game: 1,
                trial: 1,
                flag: 0,
                lines: Vec::new(),
                writer: None,
            }),
            events: None,
        }
    }

    /// Mirror every transcript line to `writer`
    pub fn with_writer(mut self, writer: Box<dyn Write + Send>) -> Self {
        self.inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .writer = Some(writer);
        self
    }

    /// Mirror the transcript to a file, truncating it
    pub fn with_transcript_file(self, path: &Path) -> KernelResult<Self> {
        let file = File::create(path)?;
        debug!(path = %path.display(), "Transcript file opened");
        Ok(self.with_writer(Box::new(BufWriter::new(file))))
    }

    /// Republish state changes on `bus`
    pub fn with_event_bus(mut self, bus: SharedEventBus) -> Self {
        self.events = Some(bus);
        self
    }

    // Reporting must keep working after another thread panicked, so a
    // poisoned lock is recovered rather than propagated.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: MatchEvent) {
        if let Some(bus) = &self.events {
            if let Err(e) = bus.publish(event) {
                warn!("Failed to publish state change: {}", e);
            }
        }
    }

    /// Record a contestant's starting strength without printing a line
    pub fn register_contestant(&self, team: TeamId, id: ContestantId, strength: Strength) {
        let mut inner = self.lock();
        if let Some(slot) = inner.contestants[team.index()].get_mut(id.index()) {
            *slot = (ContestantState::SeatAtTheBench, strength);
        }
    }

    pub fn update_referee(&self, state: RefereeState) {
        {
            let mut inner = self.lock();
            inner.referee = state;
            self.emit_status_line(&mut inner);
        }
        self.publish(MatchEvent::RefereeStateChanged { state });
    }

    pub fn update_coach(&self, team: TeamId, state: CoachState) {
        {
            let mut inner = self.lock();
            inner.coaches[team.index()] = state;
            self.emit_status_line(&mut inner);
        }
        self.publish(MatchEvent::CoachStateChanged { team, state });
    }

    pub fn update_contestant(
        &self,
        team: TeamId,
        id: ContestantId,
        state: ContestantState,
        strength: Strength,
    ) {
        {
            let mut inner = self.lock();
            if let Some(slot) = inner.contestants[team.index()].get_mut(id.index()) {
                *slot = (state, strength);
            }
            self.emit_status_line(&mut inner);
        }
        self.publish(MatchEvent::ContestantStateChanged {
            team,
            id,
            state,
            strength,
        });
    }

    pub fn update_contestant_strength(&self, team: TeamId, id: ContestantId, strength: Strength) {
        {
            let mut inner = self.lock();
            if let Some(slot) = inner.contestants[team.index()].get_mut(id.index()) {
                slot.1 = strength;
            }
            self.emit_status_line(&mut inner);
        }
        self.publish(MatchEvent::StrengthAdjusted { team, id, strength });
    }

    pub fn set_flag_position(&self, flag: i32) {
        self.lock().flag = flag;
    }

    pub fn set_trial_number(&self, trial: usize) {
        self.lock().trial = trial;
    }

    pub fn set_game_number(&self, game: usize) {
        self.lock().game = game;
    }

    pub fn set_team_placement(&self, team: TeamId, id: ContestantId) {
        self.lock().placements[team.index()].push(id);
    }

    pub fn reset_team_placement(&self) {
        let mut inner = self.lock();
        for placement in inner.placements.iter_mut() {
            placement.clear();
        }
    }

    pub fn print_header(&self) {
        let mut inner = self.lock();
        Self::emit(&mut inner, "Game of the Rope - Description of the internal state".into());
        Self::emit(&mut inner, String::new());
        for line in self.column_header() {
            Self::emit(&mut inner, line);
        }
        let line = format!(
            "{}{}",
            Self::entity_columns(&inner),
            self.empty_trial_columns()
        );
        Self::emit(&mut inner, line);
    }

    pub fn print_legend(&self) {
        let size = self.rules.team_size;
        let pullers = self.rules.pullers_per_team;
        let legend = [
            "Legend:".to_string(),
            "Ref Sta - state of the referee".to_string(),
            "Coa # Stat - state of the coach of team # (# - 1 .. 2)".to_string(),
            format!(
                "Cont # Sta - state of the contestant # (# - 1 .. {size}) of team whose coach was listed to the immediate left"
            ),
            format!(
                "Cont # SG - strength of the contestant # (# - 1 .. {size}) of team whose coach was listed to the immediate left"
            ),
            format!(
                "TRIAL - ? - contestant identification at the position ? at the end of the rope for present trial (? - 1 .. {pullers})"
            ),
            "TRIAL - NB - trial number".to_string(),
            "TRIAL - PS - position of the centre of the rope at the beginning of the trial"
                .to_string(),
        ];

        let mut inner = self.lock();
        for line in legend {
            Self::emit(&mut inner, line);
        }
    }

    pub fn print_game_header(&self) {
        let mut inner = self.lock();
        let line = format!("Game {}", inner.game);
        Self::emit(&mut inner, line);
        for line in self.column_header() {
            Self::emit(&mut inner, line);
        }
    }

    /// Render the current state of every entity plus the trial columns
    pub fn print_line_update(&self) {
        let mut inner = self.lock();
        self.emit_status_line(&mut inner);
    }

    pub fn print_game_result(&self, score: GameScore) {
        let mut inner = self.lock();
        let game = inner.game;
        let line = match score.winner() {
            Some(team) if score.is_knockout() => format!(
                "Game {game} was won by team {team} by knock out in {} trials.",
                inner.trial
            ),
            Some(team) => format!("Game {game} was won by team {team} by points."),
            None => format!("Game {game} was a draw."),
        };
        Self::emit(&mut inner, line);
    }

    pub fn print_match_winner(&self, team: TeamId, team1_games: u32, team2_games: u32) {
        let mut inner = self.lock();
        Self::emit(
            &mut inner,
            format!("Match was won by team {team} ({team1_games}-{team2_games})."),
        );
    }

    pub fn print_match_draw(&self) {
        let mut inner = self.lock();
        Self::emit(&mut inner, "Match was a draw.".to_string());
    }

    /// Flush and release the writer. Lines stay available in memory.
    pub fn close(&self) {
        let mut inner = self.lock();
        if let Some(mut writer) = inner.writer.take() {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush transcript: {}", e);
            }
        }
    }

    /// Every transcript line written so far
    pub fn lines(&self) -> Vec<String> {
        self.lock().lines.clone()
    }

    fn emit(inner: &mut Inner, line: String) {
        let failed = match inner.writer.as_mut() {
            Some(writer) => writeln!(writer, "{line}").err(),
            None => None,
        };
        if let Some(e) = failed {
            // Keep the match running; stop writing to a broken sink
            warn!("Transcript write failed, disabling file output: {}", e);
            inner.writer = None;
        }
        inner.lines.push(line);
    }

    fn emit_status_line(&self, inner: &mut Inner) {
        let line = format!(
            "{}{}",
            Self::entity_columns(inner),
            self.trial_columns(inner)
        );
        Self::emit(inner, line);
    }

    fn entity_columns(inner: &Inner) -> String {
        let mut line = format!("{:>3}", inner.referee.code());
        for team in TeamId::all() {
            line.push_str(&format!("  {:>4}", inner.coaches[team.index()].code()));
            for (state, strength) in &inner.contestants[team.index()] {
                line.push_str(&format!(" {:>3} {:>2}", state.code(), strength));
            }
        }
        line
    }

    fn trial_columns(&self, inner: &Inner) -> String {
        let mut line = String::new();
        for (i, team) in TeamId::all().into_iter().enumerate() {
            if i > 0 {
                line.push_str(" .");
            }
            let placement = &inner.placements[team.index()];
            for slot in 0..self.rules.pullers_per_team {
                match placement.get(slot) {
                    Some(id) => line.push_str(&format!(" {id}")),
                    None => line.push_str(" -"),
                }
            }
        }
        line.push_str(&format!(" {:>2} {:>2}", inner.trial, inner.flag));
        line
    }

    fn empty_trial_columns(&self) -> String {
        let side = " -".repeat(self.rules.pullers_per_team);
        format!("{side} .{side} -- --")
    }

    fn column_header(&self) -> [String; 2] {
        let contestants: String = (1..=self.rules.team_size)
            .map(|i| format!(" Cont {i}"))
            .collect();
        let strengths = " Sta SG".repeat(self.rules.team_size);
        let positions: String = (1..=self.rules.pullers_per_team)
            .rev()
            .map(|i| format!(" {i}"))
            .chain(std::iter::once(" .".to_string()))
            .chain((1..=self.rules.pullers_per_team).map(|i| format!(" {i}")))
            .collect();

        [
            format!("Ref Coa 1{contestants} Coa 2{contestants} Trial"),
            format!("Sta  Stat{strengths}  Stat{strengths}{positions} NB PS"),
        ]
    }
}
