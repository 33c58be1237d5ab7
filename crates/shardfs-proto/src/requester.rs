//! Requester side of the upload and download exchanges.
//!
//! Call these after the command line has been written.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{ProtoError, ProtoResult};
use crate::message::Message;
use crate::transfer::{Direction, PumpFailure, TransferSession};
use crate::wire::Wire;

/// Drive an upload: wait for `READY`, declare `len`, stream `src`, wait for `SUCCESS`.
pub async fn send_payload<S, R>(wire: &mut Wire<S>, src: &mut R, len: u64) -> ProtoResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + Unpin + ?Sized,
{
    wire.expect(Message::Ready).await?;
    wire.send(&Message::Size(len)).await?;
    wire.expect(Message::SizeAck).await?;

    let mut session = TransferSession::new(len, Direction::Upload);
    session
        .pump(src, wire.stream_mut())
        .await
        .map_err(|failure| match failure {
            PumpFailure::Source(e) => ProtoError::io("Failed to read local file", e),
            other => other.into(),
        })?;

    wire.expect(Message::Success).await
}

/// Wait for the declared length of a download.
///
/// An unacceptable length is answered with an error line so the responder
/// does not start streaming.
pub async fn await_size<S>(wire: &mut Wire<S>) -> ProtoResult<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match wire.recv_size().await {
        Err(err @ ProtoError::SizeInvalid(_)) => {
            decline(wire, &err).await;
            Err(err)
        }
        other => other,
    }
}

/// Refuse a declared download instead of acknowledging it.
pub async fn decline<S>(wire: &mut Wire<S>, err: &ProtoError)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = wire.send_error(err).await {
        tracing::debug!("could not decline transfer: {}", e);
    }
}

/// Acknowledge a declared length, receive the payload into `dst`, and confirm.
///
/// The closing `SUCCESS` is best effort; a peer that already hung up does not
/// fail a transfer whose bytes all arrived.
pub async fn receive_into<S, W>(wire: &mut Wire<S>, len: u64, dst: &mut W) -> ProtoResult<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    wire.send(&Message::SizeAck).await?;

    let mut session = TransferSession::new(len, Direction::Download);
    let moved = session
        .pump(wire.stream_mut(), dst)
        .await
        .map_err(|failure| match failure {
            PumpFailure::Sink(e) => ProtoError::io("Failed to write local file", e),
            other => other.into(),
        })?;

    if let Err(e) = wire.send(&Message::Success).await {
        tracing::debug!("closing SUCCESS not delivered: {}", e);
    }
    Ok(moved)
}
