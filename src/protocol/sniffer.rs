//! ClientHello Sniffer
//!
//! Decodes the TLS record layer and the ClientHello handshake message far
//! enough to find the `server_name` extension. No keys are negotiated and
//! nothing is ever written back to the client.
//!
//! ```text
//! record:       type(1)=0x16 | version(2) | length(2) | fragment
//! handshake:    type(1)=0x01 | length(3)  | body          (may span records)
//! client_hello: version(2) random(32) session_id<0..32>
//!               cipher_suites<2..2^16-2> compression_methods<1..2^8-1>
//!               extensions<0..2^16-1>
//! server_name:  list<1..2^16-1> of { name_type(1) host_name<1..2^16-1> }
//! ```

use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use super::constants::*;
use super::replay::{ReplayReader, TeeReader};
use super::types::SniffedHello;
use crate::error::SniffError;

/// Parse the ClientHello from `source` and hand back a reader that replays
/// every consumed byte ahead of the rest of the stream.
pub async fn peek_client_hello<R>(source: R) -> Result<(SniffedHello, ReplayReader<R>), SniffError>
where
    R: AsyncRead + Unpin,
{
    let mut tee = TeeReader::new(source);
    let hello = read_client_hello(&mut tee).await?;
    trace!(consumed = tee.captured().len(), "client hello captured");
    Ok((hello, tee.into_replay()))
}

/// Read TLS records from `reader` until the ClientHello is complete and
/// return its server name. Stops at the end of the record that completes the
/// message.
pub async fn read_client_hello<R>(reader: &mut R) -> Result<SniffedHello, SniffError>
where
    R: AsyncRead + Unpin,
{
    let mut handshake = Vec::new();

    loop {
        let mut header = [0u8; TLS_RECORD_HEADER_LEN];
        read_exact(reader, &mut header).await?;

        let content_type = header[0];
        if content_type != TLS_CONTENT_HANDSHAKE {
            if handshake.is_empty() {
                return Err(SniffError::NotHandshake(content_type));
            }
            return Err(SniffError::Malformed("client hello interrupted by non-handshake record"));
        }

        let record_len = u16::from_be_bytes([header[3], header[4]]) as usize;
        if record_len == 0 {
            return Err(SniffError::Malformed("empty handshake record"));
        }
        if record_len > TLS_MAX_CIPHERTEXT_LEN {
            return Err(SniffError::Malformed("oversized record"));
        }

        let start = handshake.len();
        handshake.resize(start + record_len, 0);
        read_exact(reader, &mut handshake[start..]).await?;

        if handshake[0] != TLS_HANDSHAKE_CLIENT_HELLO {
            return Err(SniffError::NotClientHello(handshake[0]));
        }
        if handshake.len() < TLS_HANDSHAKE_HEADER_LEN {
            continue;
        }

        let body_len = u24(&handshake[1..TLS_HANDSHAKE_HEADER_LEN]);
        if body_len > TLS_MAX_HANDSHAKE_LEN {
            return Err(SniffError::Malformed("oversized handshake message"));
        }

        let end = TLS_HANDSHAKE_HEADER_LEN + body_len;
        if handshake.len() >= end {
            let server_name = parse_client_hello(&handshake[TLS_HANDSHAKE_HEADER_LEN..end])?;
            return Ok(SniffedHello { server_name });
        }
    }
}

async fn read_exact<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), SniffError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(SniffError::UnexpectedEof),
        Err(e) => Err(SniffError::Io(e)),
    }
}

fn u24(bytes: &[u8]) -> usize {
    ((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | bytes[2] as usize
}

/// Extract the host name from a ClientHello body (handshake header removed).
pub fn parse_client_hello(body: &[u8]) -> Result<String, SniffError> {
    let mut hello = Cursor::new(body);

    hello.skip(2, "legacy version")?;
    hello.skip(TLS_RANDOM_LEN, "random")?;

    let session_id = hello.vec8("session id")?;
    if session_id.len() > TLS_MAX_SESSION_ID_LEN {
        return Err(SniffError::Malformed("session id too long"));
    }

    let cipher_suites = hello.vec16("cipher suites")?;
    if cipher_suites.is_empty() || cipher_suites.len() % 2 != 0 {
        return Err(SniffError::Malformed("bad cipher suites length"));
    }

    let compression = hello.vec8("compression methods")?;
    if compression.is_empty() {
        return Err(SniffError::Malformed("no compression methods"));
    }

    // Extensions are optional; a hello without them cannot name a server.
    if hello.is_empty() {
        return Err(SniffError::MissingServerName);
    }

    let mut extensions = Cursor::new(hello.vec16("extensions")?);
    if !hello.is_empty() {
        return Err(SniffError::Malformed("trailing data after extensions"));
    }

    let mut server_name = None;
    while !extensions.is_empty() {
        let ext_type = extensions.u16("extension type")?;
        let data = extensions.vec16("extension data")?;
        if ext_type == TLS_EXT_SERVER_NAME {
            if server_name.is_some() {
                return Err(SniffError::Malformed("duplicate server_name extension"));
            }
            server_name = Some(parse_server_name(data)?);
        }
    }

    server_name.ok_or(SniffError::MissingServerName)
}

fn parse_server_name(data: &[u8]) -> Result<String, SniffError> {
    let mut ext = Cursor::new(data);
    let mut names = Cursor::new(ext.vec16("server name list")?);
    if names.is_empty() || !ext.is_empty() {
        return Err(SniffError::Malformed("bad server name list"));
    }

    let mut host_name = None;
    while !names.is_empty() {
        let name_type = names.u8("name type")?;
        let name = names.vec16("host name")?;
        if name_type != TLS_SNI_HOST_NAME {
            continue;
        }
        if host_name.is_some() {
            return Err(SniffError::Malformed("multiple host names"));
        }
        host_name = Some(name);
    }

    let name = host_name.ok_or(SniffError::MissingServerName)?;
    // RFC 6066 section 3: no trailing dot, and an empty name is not a name.
    if name.is_empty() || name.ends_with(b".") {
        return Err(SniffError::InvalidServerName);
    }
    std::str::from_utf8(name)
        .map(str::to_owned)
        .map_err(|_| SniffError::InvalidServerName)
}

/// Bounds-checked reader over a byte slice.
struct Cursor<'a> {
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], SniffError> {
        if self.buf.len() < n {
            return Err(SniffError::Malformed(what));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn skip(&mut self, n: usize, what: &'static str) -> Result<(), SniffError> {
        self.take(n, what).map(|_| ())
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, SniffError> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &'static str) -> Result<u16, SniffError> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn vec8(&mut self, what: &'static str) -> Result<&'a [u8], SniffError> {
        let len = self.u8(what)? as usize;
        self.take(len, what)
    }

    fn vec16(&mut self, what: &'static str) -> Result<&'a [u8], SniffError> {
        let len = self.u16(what)? as usize;
        self.take(len, what)
    }
}
