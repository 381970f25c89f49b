//! TLS Preamble Handling
//!
//! Reads just enough of an inbound TLS connection to learn the requested
//! host name, while keeping every consumed byte for replay to the backend.

pub mod constants;
pub mod replay;
pub mod sniffer;
pub mod types;

pub use constants::*;
pub use replay::{ReplayReader, TeeReader};
pub use sniffer::{peek_client_hello, read_client_hello};
pub use types::SniffedHello;
