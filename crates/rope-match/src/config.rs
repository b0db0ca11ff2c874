use anyhow::{Context, Result};
use clap::Parser;
use rope_coordination::{MatchConfig, StrategyKind};
use std::path::PathBuf;

/// Command-line arguments
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// TOML match configuration; flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Seed for strengths, selections and pull durations (overrides ROPE_SEED)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Selection strategy for team 1 (random | strongest)
    #[arg(long)]
    pub team1_strategy: Option<StrategyKind>,

    /// Selection strategy for team 2 (random | strongest)
    #[arg(long)]
    pub team2_strategy: Option<StrategyKind>,

    /// Transcript output file (overrides ROPE_TRANSCRIPT)
    #[arg(long)]
    pub transcript: Option<PathBuf>,

    /// JSON-lines event log file (overrides ROPE_EVENTS)
    #[arg(long)]
    pub events: Option<PathBuf>,

    /// Upper bound of a single pull in milliseconds; 0 makes pulls instant
    #[arg(long)]
    pub max_pull_ms: Option<u64>,

    /// Do not print the transcript to stdout
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

impl Args {
    /// Defaults and environment first, then the config file, then flags
    pub fn match_config(&self) -> Result<MatchConfig> {
        let mut config = match &self.config {
            Some(path) => MatchConfig::from_toml_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => MatchConfig::default(),
        };

        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(kind) = self.team1_strategy {
            config.team1_strategy = kind;
        }
        if let Some(kind) = self.team2_strategy {
            config.team2_strategy = kind;
        }
        if let Some(path) = &self.transcript {
            config.transcript_path = Some(path.clone());
        }
        if let Some(path) = &self.events {
            config.events_path = Some(path.clone());
        }
        if let Some(max) = self.max_pull_ms {
            config.max_pull_ms = max;
            config.min_pull_ms = config.min_pull_ms.min(max);
        }

        config.validate().context("Invalid match configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flags_parse() {
        let args = Args::parse_from([
            "rope-match",
            "--seed",
            "9",
            "--team2-strategy",
            "strongest",
            "--max-pull-ms",
            "0",
            "--quiet",
        ]);
        assert_eq!(args.seed, Some(9));
        assert_eq!(args.team2_strategy, Some(StrategyKind::Strongest));
        assert!(args.quiet);

        let config = args.match_config().unwrap();
        assert_eq!(config.seed, Some(9));
        assert_eq!((config.min_pull_ms, config.max_pull_ms), (0, 0));
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "seed = 1\nteam1_strategy = \"strongest\"").unwrap();

        let args = Args {
            config: Some(file.path().to_path_buf()),
            seed: Some(2),
            ..Args::default()
        };
        let config = args.match_config().unwrap();
        assert_eq!(config.seed, Some(2));
        assert_eq!(config.team1_strategy, StrategyKind::Strongest);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let args = Args {
            config: Some(PathBuf::from("/nonexistent/rope.toml")),
            ..Args::default()
        };
        assert!(args.match_config().is_err());
    }
}
