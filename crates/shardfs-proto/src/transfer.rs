//! Payload phase: move exactly the declared number of bytes.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::RELAY_BUFFER_SIZE;
use crate::error::{ProtoError, ProtoResult};

/// Which way the payload flows relative to the node's store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
}

/// Why a pump stopped early.
#[derive(Debug)]
pub enum PumpFailure {
    /// Reading the source failed.
    Source(io::Error),
    /// Source reached end of stream before the declared length.
    Truncated { expected: u64, transferred: u64 },
    /// Writing or flushing the sink failed.
    Sink(io::Error),
}

impl From<PumpFailure> for ProtoError {
    /// Default mapping for socket-to-socket copies.
    fn from(failure: PumpFailure) -> Self {
        match failure {
            PumpFailure::Source(e) | PumpFailure::Sink(e) => ProtoError::Link(e),
            PumpFailure::Truncated {
                expected,
                transferred,
            } => ProtoError::Truncated {
                expected,
                transferred,
            },
        }
    }
}

/// Byte accounting for one payload phase.
#[derive(Debug, Clone)]
pub struct TransferSession {
    declared: u64,
    transferred: u64,
    direction: Direction,
}

impl TransferSession {
    pub fn new(declared: u64, direction: Direction) -> Self {
        Self {
            declared,
            transferred: 0,
            direction,
        }
    }

    pub fn declared(&self) -> u64 {
        self.declared
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn remaining(&self) -> u64 {
        self.declared - self.transferred
    }

    pub fn is_complete(&self) -> bool {
        self.transferred == self.declared
    }

    /// Count `n` more bytes; the total may never pass the declared length.
    pub fn record(&mut self, n: usize) -> ProtoResult<()> {
        let n = n as u64;
        if n > self.remaining() {
            return Err(ProtoError::Overrun {
                expected: self.declared,
            });
        }
        self.transferred += n;
        Ok(())
    }

    /// Copy the remaining bytes from `src` to `dst` through a bounded buffer.
    ///
    /// Never reads past the declared length, so whatever follows the payload
    /// on `src` stays there for the next control line.
    pub async fn pump<R, W>(&mut self, src: &mut R, dst: &mut W) -> Result<u64, PumpFailure>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let cap = self.remaining().min(RELAY_BUFFER_SIZE as u64) as usize;
        let mut buf = vec![0u8; cap.max(1)];

        while !self.is_complete() {
            let want = self.remaining().min(buf.len() as u64) as usize;
            let n = src
                .read(&mut buf[..want])
                .await
                .map_err(PumpFailure::Source)?;
            if n == 0 {
                return Err(PumpFailure::Truncated {
                    expected: self.declared,
                    transferred: self.transferred,
                });
            }
            // Counted before the write, so a failed sink can still drain the rest
            if let Err(e) = self.record(n) {
                return Err(PumpFailure::Source(io::Error::other(e)));
            }
            dst.write_all(&buf[..n]).await.map_err(PumpFailure::Sink)?;
        }

        dst.flush().await.map_err(PumpFailure::Sink)?;
        Ok(self.transferred)
    }

    /// Read and discard the remaining bytes so the link stays aligned.
    pub async fn drain<R>(&mut self, src: &mut R) -> Result<u64, PumpFailure>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.pump(src, &mut tokio::io::sink()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn record_refuses_overrun() {
        let mut session = TransferSession::new(10, Direction::Upload);
        session.record(6).unwrap();
        assert_eq!(session.remaining(), 4);
        assert!(matches!(
            session.record(5),
            Err(ProtoError::Overrun { expected: 10 })
        ));
        session.record(4).unwrap();
        assert!(session.is_complete());
        assert_eq!(session.declared(), 10);
        assert_eq!(session.direction().to_string(), "upload");
    }

    #[tokio::test]
    async fn pump_stops_at_declared_length() {
        let mut src: &[u8] = b"hello worldNEXT LINE\n";
        let mut dst = Vec::new();
        let mut session = TransferSession::new(11, Direction::Download);

        let moved = session.pump(&mut src, &mut dst).await.unwrap();
        assert_eq!(moved, 11);
        assert_eq!(dst, b"hello world");
        assert_eq!(src, b"NEXT LINE\n");
    }

    #[tokio::test]
    async fn pump_spans_many_buffers() {
        let payload: Vec<u8> = (0..RELAY_BUFFER_SIZE * 3 + 17).map(|i| i as u8).collect();
        let mut src: &[u8] = &payload;
        let mut dst = Vec::new();
        let mut session = TransferSession::new(payload.len() as u64, Direction::Upload);

        session.pump(&mut src, &mut dst).await.unwrap();
        assert_eq!(dst, payload);
    }

    #[tokio::test]
    async fn short_source_is_truncation() {
        let (mut writer, mut reader) = duplex(64);
        writer.write_all(b"abc").await.unwrap();
        drop(writer);

        let mut dst = Vec::new();
        let mut session = TransferSession::new(10, Direction::Upload);
        match session.pump(&mut reader, &mut dst).await {
            Err(PumpFailure::Truncated {
                expected: 10,
                transferred: 3,
            }) => {}
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(dst, b"abc");
    }

    #[tokio::test]
    async fn drain_discards() {
        let mut src: &[u8] = b"0123456789rest";
        let mut session = TransferSession::new(10, Direction::Upload);
        assert_eq!(session.drain(&mut src).await.unwrap(), 10);
        assert_eq!(src, b"rest");
    }
}
