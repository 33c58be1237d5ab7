//! Request handling on S2–S4: one request per connection.

use shardfs_proto::{FileClass, Message, ProtoError, ProtoResult, Request, Wire};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::context::NodeContext;

/// Read one request, answer it, and return; the caller closes the link.
pub async fn serve_request<S>(ctx: &NodeContext, wire: &mut Wire<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let line = match wire.read_line_opt().await {
        Ok(Some(line)) => line,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!("unreadable request: {}", e);
            return;
        }
    };

    let result = match Request::parse(&line) {
        Ok(request) => {
            tracing::debug!("request `{}`", request);
            handle(ctx, wire, request).await
        }
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        tracing::info!("request `{}` failed: {}", line, e);
        if e.reportable() {
            if let Err(send_err) = wire.send_error(&e).await {
                tracing::debug!("error not delivered: {}", send_err);
            }
        }
    }
}

async fn handle<S>(ctx: &NodeContext, wire: &mut Wire<S>, request: Request) -> ProtoResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let namespace = ctx.storage.namespace();
    let class = ctx.storage.class();

    match request {
        Request::Upload(path) => {
            let target = namespace.resolve_file(&path)?;
            if FileClass::of_filename(&path) != Some(class) {
                return Err(ProtoError::path_rejected(format!(
                    "File must have .{} extension",
                    class.extension()
                )));
            }
            ctx.storage.receive_upload(wire, &target).await?;
        }
        Request::Download(path) => {
            let target = namespace.resolve_file(&path)?;
            ctx.storage.send_file(wire, &target).await?;
        }
        Request::Remove(path) => {
            let target = namespace.resolve_file(&path)?;
            ctx.storage.remove(&target).await?;
            wire.send(&Message::Success).await?;
        }
        Request::List(path) => {
            let dir = namespace.resolve(&path)?;
            let names = ctx.storage.list(&dir).await?;
            wire.write_listing(&names).await?;
        }
        Request::Tar(requested) => match requested.parse::<FileClass>() {
            Ok(FileClass::Zip) if class == FileClass::Zip => {
                return Err(ProtoError::unsupported_class(
                    "ZIP file archiving not supported",
                ));
            }
            Ok(requested) if requested == class => {
                ctx.storage.send_archive(wire, class).await?;
            }
            _ => {
                return Err(ProtoError::unsupported_class(format!(
                    "{} only handles {} files",
                    ctx.shard(),
                    class.extension()
                )));
            }
        },
    }
    Ok(())
}
