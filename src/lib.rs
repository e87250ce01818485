pub mod ai;
pub mod config;
pub mod controller;
pub mod logging;
pub mod modes;
pub mod quiz;
pub mod timeline;
pub mod types;

pub use controller::{Assistant, TurnOutcome};
pub use modes::Mode;
