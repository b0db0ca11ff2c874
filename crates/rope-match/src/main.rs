//! Game of the Rope match runner
//!
//! Runs one match on thirteen entity threads and prints its transcript.
//!
//! # Usage
//!
//! ```bash
//! # Seeded match with instant pulls
//! rope-match --seed 7 --max-pull-ms 0
//!
//! # Strongest-first coach against a random one, transcript and events to files
//! rope-match --team1-strategy strongest --transcript game.log --events events.jsonl
//!
//! # Configuration from a file, progress logged at debug level
//! RUST_LOG=rope_coordination=debug rope-match --config match.toml
//! ```

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::Args;
use rope_coordination::{
    EventBus, EventBusExt, EventFilter, EventHistory, MatchEvent, MatchRunner,
};
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.match_config()?;
    info!(
        seed = ?config.seed,
        team1 = %config.team1_strategy,
        team2 = %config.team2_strategy,
        "Rope match starting"
    );

    let history = EventHistory::new().shared();
    let bus = EventBus::with_history(history).shared();
    let mut decisions = bus.subscribe_filtered(EventFilter::new().decisions());

    // Ends when the runner drops the last handle to the bus
    let progress = tokio::spawn(async move {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            match decisions.recv().await {
                Ok(record) => log_decision(&record.event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Progress log fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let runner = MatchRunner::new(config).context("Invalid match configuration")?;
    let report = tokio::task::spawn_blocking(move || runner.run_with_events(bus))
        .await
        .context("Match runner thread failed")?
        .context("Match failed")?;

    if let Err(e) = progress.await {
        warn!("Progress logger failed: {e}");
    }

    if !args.quiet {
        for line in &report.transcript {
            println!("{line}");
        }
    }

    info!(
        seed = report.seed,
        games = report.games.len(),
        trials = report.trials_played,
        shutdown_complete = report.shutdown_complete,
        "Match complete"
    );
    if let Some(stats) = &report.event_stats {
        info!(
            events = stats.total_events,
            state_changes = stats.state_changes,
            strength_adjustments = stats.strength_adjustments,
            "Event summary"
        );
    }
    debug!(
        "Report: {}",
        serde_json::to_string(&report).context("Failed to encode match report")?
    );

    Ok(())
}

fn log_decision(event: &MatchEvent) {
    match event {
        MatchEvent::GameAnnounced { game } => info!(game, "Game announced"),
        MatchEvent::TrialDecided {
            game,
            trial,
            score,
            flag,
        } => debug!(game, trial, score = score.code(), flag, "Trial decided"),
        MatchEvent::GameDecided {
            game,
            score,
            trials,
        } => info!(game, result = score.code(), trials, "Game decided"),
        MatchEvent::MatchDecided { outcome } => match outcome.winner() {
            Some(team) => info!(%team, "Match won"),
            None => info!("Match drawn"),
        },
        other => debug!(event = other.event_type(), "Match event"),
    }
}
