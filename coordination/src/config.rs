//! Match configuration
//!
//! `MatchRules` holds the shape of the game (team sizes, trial and game
//! counts, knockout margin); `MatchConfig` adds everything that varies from
//! run to run. Both deserialize from TOML with every field defaulted.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::entities::strategy::StrategyKind;
use crate::error::{KernelError, KernelResult};
use crate::state::{Strength, TeamId};

/// Structural rules of the game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchRules {
    /// Contestants per team
    pub team_size: usize,
    /// Contestants per team pulling in each trial
    pub pullers_per_team: usize,
    /// Maximum trials per game
    pub trials_per_game: usize,
    /// Maximum games per match
    pub games_per_match: usize,
    /// Flag displacement that ends a game by knockout
    pub knockout_margin: i32,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            team_size: 5,
            pullers_per_team: 3,
            trials_per_game: 6,
            games_per_match: 3,
            knockout_margin: 4,
        }
    }
}

impl MatchRules {
    /// Pulls that complete one trial (both teams)
    pub fn pulls_per_trial(&self) -> usize {
        2 * self.pullers_per_team
    }

    /// Game wins that settle a match: a strict majority of the games
    pub fn games_to_win(&self) -> usize {
        self.games_per_match / 2 + 1
    }

    /// Entity threads taking part in a match: one referee, and per team one
    /// coach plus its contestants
    pub fn participants(&self) -> usize {
        1 + 2 * (1 + self.team_size)
    }

    pub fn validate(&self) -> KernelResult<()> {
        if self.pullers_per_team == 0 || self.pullers_per_team > self.team_size {
            return Err(KernelError::config(format!(
                "pullers_per_team must be in 1..={}, got {}",
                self.team_size, self.pullers_per_team
            )));
        }
        if self.team_size > usize::from(u8::MAX) {
            return Err(KernelError::config("team_size must fit in a contestant id"));
        }
        if self.trials_per_game == 0 || self.games_per_match == 0 {
            return Err(KernelError::config(
                "trials_per_game and games_per_match must be positive",
            ));
        }
        if self.knockout_margin <= 0 {
            return Err(KernelError::config("knockout_margin must be positive"));
        }
        Ok(())
    }
}

/// Full configuration of a single match run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub rules: MatchRules,
    /// Seed for strengths, selections and pull durations. `None` draws one
    /// from the OS.
    pub seed: Option<u64>,
    /// Initial strengths are drawn from `[min_initial_strength, max_initial_strength)`
    pub min_initial_strength: Strength,
    pub max_initial_strength: Strength,
    /// Strength never drops below this value after a trial
    pub strength_floor: Strength,
    /// Each pull takes a random duration in `[min_pull_ms, max_pull_ms)`;
    /// equal bounds make pulls instantaneous
    pub min_pull_ms: u64,
    pub max_pull_ms: u64,
    pub team1_strategy: StrategyKind,
    pub team2_strategy: StrategyKind,
    /// Where the text transcript is written; `None` keeps it in memory only
    pub transcript_path: Option<PathBuf>,
    /// Where the JSON-lines event log is written
    pub events_path: Option<PathBuf>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            rules: MatchRules::default(),
            seed: std::env::var("ROPE_SEED").ok().and_then(|s| s.parse().ok()),
            min_initial_strength: 10,
            max_initial_strength: 20,
            strength_floor: 1,
            min_pull_ms: 1,
            max_pull_ms: 3,
            team1_strategy: StrategyKind::Random,
            team2_strategy: StrategyKind::Random,
            transcript_path: std::env::var("ROPE_TRANSCRIPT").ok().map(PathBuf::from),
            events_path: std::env::var("ROPE_EVENTS").ok().map(PathBuf::from),
        }
    }
}

impl MatchConfig {
    /// Load a configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> KernelResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(raw: &str) -> KernelResult<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> KernelResult<()> {
        self.rules.validate()?;
        if self.min_initial_strength >= self.max_initial_strength {
            return Err(KernelError::config(format!(
                "initial strength range [{}, {}) is empty",
                self.min_initial_strength, self.max_initial_strength
            )));
        }
        if self.min_pull_ms > self.max_pull_ms {
            return Err(KernelError::config(format!(
                "pull duration range [{}, {}) is inverted",
                self.min_pull_ms, self.max_pull_ms
            )));
        }
        Ok(())
    }

    pub fn initial_strength_range(&self) -> Range<Strength> {
        self.min_initial_strength..self.max_initial_strength
    }

    pub fn pull_range_ms(&self) -> Range<u64> {
        self.min_pull_ms..self.max_pull_ms
    }

    pub fn strategy_for(&self, team: TeamId) -> StrategyKind {
        if team == TeamId::ONE {
            self.team1_strategy
        } else {
            self.team2_strategy
        }
    }
}
