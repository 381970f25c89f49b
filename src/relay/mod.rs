//! Data Relay Module
//!
//! Handles bidirectional data relay between client and backend.

pub mod engine;
pub mod session;

pub use engine::{Direction, DirectionReport, RelayEngine, RelayReport};
pub use session::{ConnectionStats, RelaySession};
