//! Client sessions on the public node.
//!
//! Commands run strictly one after another until `exit`, end of stream, or an
//! error that leaves the link misaligned. Request errors are reported as an
//! `ERROR:` line and the session carries on.

use shardfs_proto::{Command, Message, ProtoError, ProtoResult, Request, ShardId, Wire};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::aggregate;
use crate::context::NodeContext;

/// Serve one client until it leaves.
pub async fn run_session<S>(ctx: &NodeContext, wire: &mut Wire<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tracing::info!("session started");
    loop {
        let line = match wire.read_line_opt().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("session read failed: {}", e);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // A closing ack that arrived after the responder stopped waiting
        if Message::parse(line) == Message::Success {
            tracing::debug!("ignoring late SUCCESS");
            continue;
        }

        let result = match Command::parse(line) {
            Ok(Command::Exit) => break,
            Ok(command) => {
                tracing::debug!("command `{}`", command);
                dispatch(ctx, wire, command).await
            }
            Err(e) => Err(e),
        };

        let Err(e) = result else { continue };
        if e.reportable() {
            if let Err(send_err) = wire.send_error(&e).await {
                tracing::warn!("error not delivered: {}", send_err);
                break;
            }
        }
        if e.is_fatal() {
            tracing::warn!("closing session: {}", e);
            break;
        }
        tracing::info!("`{}` failed: {}", line, e);
    }
    tracing::info!("session ended");
}

async fn dispatch<S>(ctx: &NodeContext, wire: &mut Wire<S>, command: Command) -> ProtoResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match command {
        Command::Upload { local, server_dir } => upload(ctx, wire, &local, &server_dir).await,
        Command::Download { path } => download(ctx, wire, &path).await,
        Command::Remove { path } => {
            remove(ctx, &path).await?;
            wire.send(&Message::Success).await
        }
        Command::List { dir } => {
            let names = aggregate::list(ctx, &dir).await?;
            wire.write_listing(&names).await
        }
        Command::Archive { class } => aggregate::archive(ctx, wire, &class).await.map(drop),
        Command::Exit => Ok(()),
    }
}

/// Last component of a client-side path.
fn file_name_of(local: &str) -> ProtoResult<&str> {
    match local.rsplit('/').next() {
        Some(name) if !name.is_empty() && name != "." && name != ".." => Ok(name),
        _ => Err(ProtoError::malformed(format!("Invalid file name: {local}"))),
    }
}

/// `path` rewritten into `shard`'s namespace.
fn remote_path(ctx: &NodeContext, path: &str, shard: ShardId) -> ProtoResult<String> {
    ctx.router
        .translate_path(path, shard)
        .ok_or_else(|| ProtoError::path_rejected("Invalid path, must start with ~/S1 or ~S1"))
}

async fn upload<S>(
    ctx: &NodeContext,
    wire: &mut Wire<S>,
    local: &str,
    server_dir: &str,
) -> ProtoResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let filename = file_name_of(local)?;
    let dir = ctx.storage.namespace().resolve(server_dir)?;

    let key = ctx.router.resolve_shard(filename);
    if key.is_local() {
        ctx.storage.receive_upload(wire, &dir.join(filename)).await?;
        return Ok(());
    }

    let shard = key.target();
    let remote_dir = remote_path(ctx, server_dir, shard)?;
    let path = format!("{}/{}", remote_dir.trim_end_matches('/'), filename);
    ctx.proxy.forward_upload(wire, shard, path).await?;
    Ok(())
}

async fn download<S>(ctx: &NodeContext, wire: &mut Wire<S>, path: &str) -> ProtoResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let local = ctx.storage.namespace().resolve_file(path)?;

    let key = ctx.router.resolve_shard(path);
    if key.is_local() {
        ctx.storage.send_file(wire, &local).await?;
        return Ok(());
    }

    let shard = key.target();
    let remote = remote_path(ctx, path, shard)?;
    ctx.proxy
        .forward_download(wire, shard, Request::Download(remote))
        .await?;
    Ok(())
}

async fn remove(ctx: &NodeContext, path: &str) -> ProtoResult<()> {
    let local = ctx.storage.namespace().resolve_file(path)?;

    let key = ctx.router.resolve_shard(path);
    if key.is_local() {
        return ctx.storage.remove(&local).await;
    }

    let shard = key.target();
    let remote = remote_path(ctx, path, shard)?;
    ctx.proxy.forward_remove(shard, remote).await
}
