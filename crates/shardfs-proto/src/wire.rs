//! Line framing over a byte stream.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};

use crate::constants::MAX_LINE_LEN;
use crate::error::{ProtoError, ProtoResult};
use crate::message::{Message, validate_size};

/// A buffered protocol link.
///
/// Control lines and payload bytes share one buffer, so payload must be read
/// through [`Wire::stream_mut`] rather than the raw stream.
#[derive(Debug)]
pub struct Wire<S> {
    inner: BufStream<S>,
}

impl<S> Wire<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            inner: BufStream::new(stream),
        }
    }

    /// Read one line, or `None` if the peer closed cleanly before sending anything.
    pub async fn read_line_opt(&mut self) -> ProtoResult<Option<String>> {
        let mut buf = Vec::new();
        let n = (&mut self.inner)
            .take(MAX_LINE_LEN)
            .read_until(b'\n', &mut buf)
            .await
            .map_err(ProtoError::Link)?;

        if n == 0 {
            return Ok(None);
        }
        if buf.last() != Some(&b'\n') {
            if n as u64 >= MAX_LINE_LEN {
                return Err(ProtoError::handshake(format!(
                    "control line longer than {MAX_LINE_LEN} bytes"
                )));
            }
            return Err(ProtoError::Disconnected);
        }

        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        String::from_utf8(buf)
            .map(Some)
            .map_err(|_| ProtoError::handshake("control line is not valid UTF-8"))
    }

    /// Read one line; a closed link is an error.
    pub async fn read_line(&mut self) -> ProtoResult<String> {
        self.read_line_opt().await?.ok_or(ProtoError::Disconnected)
    }

    /// Write `line` plus a newline and flush.
    pub async fn write_line(&mut self, line: &str) -> ProtoResult<()> {
        self.inner
            .write_all(line.as_bytes())
            .await
            .map_err(ProtoError::Link)?;
        self.inner.write_all(b"\n").await.map_err(ProtoError::Link)?;
        self.inner.flush().await.map_err(ProtoError::Link)
    }

    pub async fn send(&mut self, msg: &Message) -> ProtoResult<()> {
        self.write_line(&msg.to_string()).await
    }

    pub async fn recv(&mut self) -> ProtoResult<Message> {
        Ok(Message::parse(&self.read_line().await?))
    }

    /// Send `err` as an `ERROR:` line.
    pub async fn send_error(&mut self, err: &ProtoError) -> ProtoResult<()> {
        self.send(&Message::error(err)).await
    }

    /// Receive exactly `want`; an error line becomes [`ProtoError::Remote`].
    pub async fn expect(&mut self, want: Message) -> ProtoResult<()> {
        match self.recv().await? {
            got if got == want => Ok(()),
            Message::Error(msg) => Err(ProtoError::Remote(msg)),
            got => Err(ProtoError::handshake(format!("expected {want}, got {got:?}"))),
        }
    }

    /// Receive a declared length and check it against the ceiling.
    pub async fn recv_size(&mut self) -> ProtoResult<u64> {
        match self.recv().await? {
            Message::Size(n) => validate_size(n),
            Message::Error(msg) => Err(ProtoError::Remote(msg)),
            Message::Other(text) => Err(ProtoError::size_invalid(format!("not a number: {text:?}"))),
            got => Err(ProtoError::handshake(format!("expected a size, got {got:?}"))),
        }
    }

    /// Send filenames one per line, terminated by an empty line.
    pub async fn write_listing(&mut self, names: &[String]) -> ProtoResult<()> {
        for name in names {
            self.inner
                .write_all(name.as_bytes())
                .await
                .map_err(ProtoError::Link)?;
            self.inner.write_all(b"\n").await.map_err(ProtoError::Link)?;
        }
        self.write_line("").await
    }

    /// Read a listing written by [`Wire::write_listing`], or the error line sent instead.
    pub async fn read_listing(&mut self) -> ProtoResult<Vec<String>> {
        let mut names = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line.is_empty() {
                return Ok(names);
            }
            if names.is_empty() {
                if let Message::Error(msg) = Message::parse(&line) {
                    return Err(ProtoError::Remote(msg));
                }
            }
            names.push(line);
        }
    }

    /// The buffered stream, for payload transfer.
    pub fn stream_mut(&mut self) -> &mut BufStream<S> {
        &mut self.inner
    }

    /// Flush and shut down the write half.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.inner.shutdown().await {
            tracing::debug!("shutdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn lines_cross_the_link() {
        let (a, b) = duplex(1024);
        let mut left = Wire::new(a);
        let mut right = Wire::new(b);

        left.send(&Message::Ready).await.unwrap();
        left.write_line("downlf ~/S1/a.c").await.unwrap();
        assert_eq!(right.recv().await.unwrap(), Message::Ready);
        assert_eq!(right.read_line().await.unwrap(), "downlf ~/S1/a.c");
    }

    #[tokio::test]
    async fn clean_close_is_none() {
        let (a, b) = duplex(64);
        drop(a);
        let mut right = Wire::new(b);
        assert!(right.read_line_opt().await.unwrap().is_none());
        assert!(matches!(right.read_line().await, Err(ProtoError::Disconnected)));
    }

    #[tokio::test]
    async fn partial_line_then_close_is_disconnect() {
        let (mut a, b) = duplex(64);
        a.write_all(b"SIZE_A").await.unwrap();
        drop(a);
        let mut right = Wire::new(b);
        assert!(matches!(right.read_line_opt().await, Err(ProtoError::Disconnected)));
    }

    #[tokio::test]
    async fn overlong_line_is_rejected() {
        let (mut a, b) = duplex(16 * 1024);
        let long = vec![b'x'; MAX_LINE_LEN as usize + 10];
        a.write_all(&long).await.unwrap();
        let mut right = Wire::new(b);
        let err = right.read_line().await.unwrap_err();
        assert!(matches!(err, ProtoError::Handshake(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn expect_maps_error_lines() {
        let (a, b) = duplex(1024);
        let mut left = Wire::new(a);
        let mut right = Wire::new(b);

        left.write_line("ERROR: Target server not ready").await.unwrap();
        left.write_line("SUCCESS").await.unwrap();

        match right.expect(Message::Ready).await {
            Err(ProtoError::Remote(msg)) => assert_eq!(msg, "Target server not ready"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            right.expect(Message::SizeAck).await,
            Err(ProtoError::Handshake(_))
        ));
    }

    #[tokio::test]
    async fn sizes_are_validated_on_receipt() {
        let (a, b) = duplex(1024);
        let mut left = Wire::new(a);
        let mut right = Wire::new(b);

        for line in ["0", "104857601", "lots", "104857600"] {
            left.write_line(line).await.unwrap();
        }
        assert!(matches!(right.recv_size().await, Err(ProtoError::SizeInvalid(_))));
        assert!(matches!(right.recv_size().await, Err(ProtoError::SizeInvalid(_))));
        assert!(matches!(right.recv_size().await, Err(ProtoError::SizeInvalid(_))));
        assert_eq!(right.recv_size().await.unwrap(), 104_857_600);
    }

    #[tokio::test]
    async fn listings_are_blank_line_terminated() {
        let (a, b) = duplex(1024);
        let mut left = Wire::new(a);
        let mut right = Wire::new(b);

        let names = vec!["a.c".to_string(), "b.pdf".to_string()];
        left.write_listing(&names).await.unwrap();
        left.write_listing(&[]).await.unwrap();
        left.write_line("ERROR: Path must start with ~/S3 or ~S3").await.unwrap();

        assert_eq!(right.read_listing().await.unwrap(), names);
        assert!(right.read_listing().await.unwrap().is_empty());
        assert!(matches!(right.read_listing().await, Err(ProtoError::Remote(_))));
    }
}
