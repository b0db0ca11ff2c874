//! Event history
//!
//! Keeps every published event in publication order so a finished match can
//! be inspected or exported as JSON lines.

use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use super::types::{EventRecord, MatchEvent};
use crate::state::TeamId;

/// Error type for history operations
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Event history lock poisoned")]
    Poisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Event encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type for history operations
pub type HistoryResult<T> = Result<T, HistoryError>;

/// Shared reference to EventHistory
pub type SharedEventHistory = Arc<EventHistory>;

/// Ordered record of a match's events
#[derive(Default)]
pub struct EventHistory {
    records: Mutex<Vec<EventRecord>>,
}

impl EventHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedEventHistory {
        Arc::new(self)
    }

    /// Append an event, assigning it the next sequence number
    pub fn record(&self, event: MatchEvent) -> HistoryResult<EventRecord> {
        let mut records = self.records.lock().map_err(|_| HistoryError::Poisoned)?;
        let record = EventRecord {
            seq: records.len() as u64,
            timestamp: Utc::now(),
            event,
        };
        records.push(record.clone());
        Ok(record)
    }

    pub fn records(&self) -> HistoryResult<Vec<EventRecord>> {
        Ok(self
            .records
            .lock()
            .map_err(|_| HistoryError::Poisoned)?
            .clone())
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Referee decisions only, in order. Stable across runs with one seed.
    pub fn decisions(&self) -> HistoryResult<Vec<MatchEvent>> {
        Ok(self
            .records()?
            .into_iter()
            .map(|r| r.event)
            .filter(MatchEvent::is_decision)
            .collect())
    }

    pub fn team_events(&self, team: TeamId) -> HistoryResult<Vec<MatchEvent>> {
        Ok(self
            .records()?
            .into_iter()
            .map(|r| r.event)
            .filter(|e| e.team() == Some(team))
            .collect())
    }

    /// Write every record as one JSON object per line
    pub fn write_json_lines<W: Write>(&self, mut writer: W) -> HistoryResult<usize> {
        let records = self.records()?;
        for record in &records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        debug!(count = records.len(), "Event history exported");
        Ok(records.len())
    }

    pub fn stats(&self) -> HistoryResult<EventStats> {
        let mut stats = EventStats::default();
        for record in self.records()? {
            stats.record_event(&record.event);
        }
        debug!(
            total = stats.total_events,
            trials = stats.trials_decided,
            games = stats.games_decided,
            "Event history stats"
        );
        Ok(stats)
    }
}

/// Counts over a match's events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventStats {
    pub total_events: usize,
    pub trials_decided: usize,
    pub games_decided: usize,
    pub state_changes: usize,
    pub strength_adjustments: usize,
}

impl EventStats {
    fn record_event(&mut self, event: &MatchEvent) {
        self.total_events += 1;
        match event {
            MatchEvent::TrialDecided { .. } => self.trials_decided += 1,
            MatchEvent::GameDecided { .. } => self.games_decided += 1,
            MatchEvent::RefereeStateChanged { .. }
            | MatchEvent::CoachStateChanged { .. }
            | MatchEvent::ContestantStateChanged { .. } => self.state_changes += 1,
            MatchEvent::StrengthAdjusted { .. } => self.strength_adjustments += 1,
            _ => {}
        }
    }
}
