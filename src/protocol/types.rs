//! Sniffed Handshake Types

/// What the relay learns from a ClientHello before any payload flows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SniffedHello {
    pub server_name: String,
}
