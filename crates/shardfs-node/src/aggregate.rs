//! Scatter-gather across the public node and the three shards.

use futures::future::join_all;
use shardfs_proto::{FileClass, FileListing, ProtoError, ProtoResult, Request, ShardId, Wire};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::context::NodeContext;

/// Merged listing of `dir` across every node.
///
/// The local namespace contributes `.c` files; each shard contributes its own
/// class. A shard that errors or is unreachable contributes nothing.
pub async fn list(ctx: &NodeContext, dir: &str) -> ProtoResult<Vec<String>> {
    let local_dir = ctx.storage.namespace().resolve(dir)?;
    let local = ctx.storage.list(&local_dir).await?;

    let mut listing = FileListing::new();
    listing.extend_class(FileClass::C, local);

    let requests = ShardId::REMOTES.iter().filter_map(|&shard| {
        let path = ctx.router.translate_path(dir, shard)?;
        Some(async move { (shard, ctx.proxy.list_remote(shard, path).await) })
    });

    for (shard, result) in join_all(requests).await {
        match result {
            Ok(names) => {
                let kept = listing.extend_class(shard.class(), names);
                tracing::debug!("{} contributed {} names", shard, kept);
            }
            Err(e) => tracing::warn!("{} left out of listing: {}", shard, e),
        }
    }

    Ok(listing.names())
}

/// Send an archive of every file of `class` to the client.
///
/// `.c` is bundled here; `.pdf` and `.txt` are built by their shard and relayed.
pub async fn archive<S>(ctx: &NodeContext, client: &mut Wire<S>, class: &str) -> ProtoResult<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match class.parse::<FileClass>() {
        Ok(FileClass::C) => ctx.storage.send_archive(client, FileClass::C).await,
        Ok(class @ (FileClass::Pdf | FileClass::Txt)) => {
            ctx.proxy
                .forward_download(client, class.owner(), Request::Tar(class.to_string()))
                .await
        }
        Ok(FileClass::Zip) => Err(ProtoError::unsupported_class(
            "ZIP file archiving not supported",
        )),
        Err(_) => Err(ProtoError::unsupported_class(
            "Only .c, .txt, and .pdf file types are supported",
        )),
    }
}
