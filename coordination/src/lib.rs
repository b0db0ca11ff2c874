//! Rope Coordination Library
//!
//! Coordination kernel for the Game of the Rope: one referee, two coaches and
//! ten contestants, each on its own thread, synchronized only through three
//! shared monitors.
//!
//! # Components
//!
//! ## Monitors
//! - `ScoreBoard`: trial and game history, the referee's "both teams ready"
//!   rendezvous, the match-ended flag
//! - `Bench` (one per team): seating, team selection and the referee/coach
//!   "next trial" handshake
//! - `Playground`: placement barrier, pull counter and flag position
//!
//! ## Entities
//! - `Referee`, `Coach`, `Contestant`: role state machines driving the
//!   monitors, with pluggable team selection for coaches
//!
//! ## Reporting
//! - `InformationRepository`: text transcript of every state change
//! - `events`: broadcast bus and ordered history of match events
//!
//! # Usage
//!
//! ```no_run
//! use rope_coordination::{MatchConfig, MatchRunner};
//!
//! let mut config = MatchConfig::default();
//! config.seed = Some(7);
//! let report = MatchRunner::new(config)?.run()?;
//! println!("{:?}", report.outcome);
//! # Ok::<(), rope_coordination::KernelError>(())
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod entities;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod monitors;
pub mod repository;
pub mod rules;
pub mod runner;
pub mod state;

pub use config::{MatchConfig, MatchRules};
pub use entities::{SelectionStrategy, StrategyKind};
pub use error::{KernelError, KernelResult};
pub use events::{
    EventBus, EventBusExt, EventFilter, EventHistory, EventRecord, MatchEvent, SharedEventBus,
};
pub use lifecycle::{Lifecycle, RoleState, TransitionRecord};
pub use monitors::{Bench, MatchSite, Playground, ScoreBoard};
pub use repository::InformationRepository;
pub use runner::{FinalStrength, MatchReport, MatchRunner};
pub use state::{
    BenchEntry, CoachState, CoachView, ContestantId, ContestantState, ContestantView, GameScore,
    MatchOutcome, RefereeState, Strength, TeamId, TrialScore,
};
