//! Event bus for match observation
//!
//! Entity threads publish synchronously through a Tokio broadcast channel;
//! async subscribers (the CLI's progress logger) receive them. An attached
//! [`EventHistory`] keeps the full ordered record.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::history::SharedEventHistory;
use super::types::{EventRecord, MatchEvent};
use crate::state::TeamId;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 1024;

/// Error type for event bus operations
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Failed to record event: {0}")]
    RecordFailed(String),

    #[error("Channel closed")]
    ChannelClosed,
}

/// Result type for event bus operations
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Event bus with broadcast channel and optional history
pub struct EventBus {
    sender: broadcast::Sender<EventRecord>,

    /// Sequence source when no history is attached
    next_seq: AtomicU64,

    history: Option<SharedEventHistory>,
}

impl EventBus {
    /// Create a new event bus without history
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            next_seq: AtomicU64::new(0),
            history: None,
        }
    }

    /// Create an event bus that records every event into `history`
    pub fn with_history(history: SharedEventHistory) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            next_seq: AtomicU64::new(0),
            history: Some(history),
        }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    pub fn history(&self) -> Option<&SharedEventHistory> {
        self.history.as_ref()
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: MatchEvent) -> EventBusResult<EventRecord> {
        let event_type = event.event_type();

        let record = match &self.history {
            Some(history) => history.record(event).map_err(|e| {
                warn!(event_type, "Failed to record event: {}", e);
                EventBusError::RecordFailed(e.to_string())
            })?,
            None => EventRecord {
                seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
                timestamp: Utc::now(),
                event,
            },
        };

        // No receivers is fine; the history still has the record
        match self.sender.send(record.clone()) {
            Ok(count) => debug!(event_type, receivers = count, "Event published"),
            Err(_) => debug!(event_type, "Event published (no receivers)"),
        }
        Ok(record)
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only events about this team (team-less events are dropped)
    pub team: Option<TeamId>,
    /// Only these event types
    pub event_types: Option<Vec<String>>,
    /// Only referee decisions
    pub decisions_only: bool,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn team(mut self, team: TeamId) -> Self {
        self.team = Some(team);
        self
    }

    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    pub fn decisions(mut self) -> Self {
        self.decisions_only = true;
        self
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &MatchEvent) -> bool {
        if self.decisions_only && !event.is_decision() {
            return false;
        }

        if let Some(team) = self.team {
            if event.team() != Some(team) {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        true
    }
}

/// Filtered event receiver that only yields matching events
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<EventRecord>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<EventRecord>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<EventRecord, broadcast::error::RecvError> {
        loop {
            let record = self.receiver.recv().await?;
            if self.filter.matches(&record.event) {
                return Ok(record);
            }
        }
    }
}

/// Extension trait for subscribing with filters
pub trait EventBusExt {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver;
}

impl EventBusExt for EventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

impl EventBusExt for SharedEventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}
