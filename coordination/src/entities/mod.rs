//! Active entities
//!
//! Each entity runs on its own thread and owns its role state. It only
//! touches shared state through the monitors of the [`MatchSite`](crate::monitors::MatchSite),
//! passing its identity and current state in and taking the updated state
//! back.

pub mod coach;
pub mod contestant;
pub mod referee;
pub mod strategy;

pub use coach::{Coach, CoachReport};
pub use contestant::{Contestant, ContestantReport};
pub use referee::{Referee, RefereeReport};
pub use strategy::{
    RandomSelection, SelectionStrategy, StrategyKind, StrongestSelection,
};
