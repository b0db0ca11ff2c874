//! Match event stream
//!
//! The referee publishes its decisions and the transcript repository publishes
//! every state change. Events fan out over a broadcast bus and are kept in an
//! ordered history that can be exported as JSON lines after the match.
//!
//! ```text
//!  referee decisions ──┐
//!                      ├──▶ EventBus ──▶ broadcast receivers (progress log)
//!  repository updates ─┘       │
//!                              └──▶ EventHistory ──▶ events.jsonl
//! ```

pub mod bus;
pub mod history;
pub mod types;

pub use bus::{
    EventBus, EventBusError, EventBusExt, EventBusResult, EventFilter, FilteredReceiver,
    SharedEventBus,
};
pub use history::{EventHistory, EventStats, HistoryError, HistoryResult, SharedEventHistory};
pub use types::{EventRecord, MatchEvent};
