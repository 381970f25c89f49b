//! TLS Wire Constants

// Record layer content types
pub const TLS_CONTENT_HANDSHAKE: u8 = 0x16;

// Record header: type(1) + legacy_version(2) + length(2)
pub const TLS_RECORD_HEADER_LEN: usize = 5;

// Before a version is negotiated a record may be ciphertext-sized: 2^14 + 2048
pub const TLS_MAX_CIPHERTEXT_LEN: usize = 16384 + 2048;

// Handshake message types
pub const TLS_HANDSHAKE_CLIENT_HELLO: u8 = 0x01;

// Handshake header: msg_type(1) + length(3)
pub const TLS_HANDSHAKE_HEADER_LEN: usize = 4;

// Largest handshake message accepted while sniffing
pub const TLS_MAX_HANDSHAKE_LEN: usize = 65536;

// ClientHello fixed fields
pub const TLS_RANDOM_LEN: usize = 32;
pub const TLS_MAX_SESSION_ID_LEN: usize = 32;

// Extensions
pub const TLS_EXT_SERVER_NAME: u16 = 0x0000;

// server_name NameType
pub const TLS_SNI_HOST_NAME: u8 = 0x00;
