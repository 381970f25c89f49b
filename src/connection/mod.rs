//! Connection Management Module
//!
//! Accepts client connections, runs each one as an independent session, and
//! opens the backend leg.

pub mod backend;
pub mod manager;
pub mod session;

pub use backend::{Connector, TcpConnector};
pub use manager::{ConnectionManager, ListenerStats};
pub use session::{SessionHandler, SessionState};
