//! Replay Buffer
//!
//! `TeeReader` records everything read through it. Once the ClientHello has
//! been parsed, `into_replay` turns it into a reader that yields the recorded
//! bytes first and then continues with the live source, so the backend sees
//! the client's stream unmodified.

use std::io::{self, Cursor};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, Chain, ReadBuf};

/// Captured bytes followed by the rest of the source.
pub type ReplayReader<R> = Chain<Cursor<Bytes>, R>;

/// Read-only adapter that copies every byte it yields into a buffer.
#[derive(Debug)]
pub struct TeeReader<R> {
    inner: R,
    captured: BytesMut,
}

impl<R> TeeReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            captured: BytesMut::with_capacity(1024),
        }
    }

    /// Bytes consumed from the source so far.
    pub fn captured(&self) -> &[u8] {
        &self.captured
    }

    /// Give back the source along with what was read from it.
    pub fn into_parts(self) -> (Bytes, R) {
        (self.captured.freeze(), self.inner)
    }
}

impl<R: AsyncRead> TeeReader<R> {
    /// Replay captured bytes ahead of the untouched remainder of the source.
    pub fn into_replay(self) -> ReplayReader<R> {
        let (captured, inner) = self.into_parts();
        Cursor::new(captured).chain(inner)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for TeeReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let already_filled = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        this.captured.extend_from_slice(&buf.filled()[already_filled..]);
        Poll::Ready(Ok(()))
    }
}
