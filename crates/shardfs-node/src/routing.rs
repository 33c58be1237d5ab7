//! Routing resolver: which shard owns a file, and how its path reads there.
//!
//! Virtual paths arrive in three spellings, all naming the public namespace:
//!
//! - `~/S1/docs/a.pdf`
//! - `~S1/docs/a.pdf`
//! - `/home/amy/S1/docs/a.pdf` (home already expanded by a shell)
//!
//! Translation swaps the marker and keeps the suffix byte for byte.

use std::path::Path;

use shardfs_proto::{ShardId, ShardKey};

/// One spelling of a namespace prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Form {
    /// `~/S1...`
    TildeSlash,
    /// `~S1...`
    Tilde,
    /// `<home>/S1...`
    Home,
}

/// Stateless resolver shared by every session on a node.
#[derive(Debug, Clone)]
pub struct Router {
    home: String,
}

impl Router {
    /// Create a resolver for the given home directory.
    pub fn new(home: &Path) -> Self {
        let home = home.to_string_lossy().trim_end_matches('/').to_string();
        Self { home }
    }

    /// Sharding decision for `filename`.
    pub fn resolve_shard(&self, filename: &str) -> ShardKey {
        ShardKey::for_filename(filename)
    }

    /// Rewrite a public virtual path into `target`'s namespace.
    ///
    /// `None` when the path carries no recognizable public marker. The
    /// expanded-home spelling comes back as `~/<target>/...`, since the
    /// target's home may differ from ours.
    pub fn translate_path(&self, virtual_path: &str, target: ShardId) -> Option<String> {
        let (form, suffix) = self.split(virtual_path, ShardId::S1)?;
        let marker = target.marker();
        Some(match form {
            Form::Tilde => format!("~{marker}{suffix}"),
            Form::TildeSlash | Form::Home => format!("~/{marker}{suffix}"),
        })
    }

    /// Suffix after `shard`'s marker: empty or starting with `/`.
    pub fn suffix<'a>(&self, path: &'a str, shard: ShardId) -> Option<&'a str> {
        self.split(path, shard).map(|(_, suffix)| suffix)
    }

    fn split<'a>(&self, path: &'a str, shard: ShardId) -> Option<(Form, &'a str)> {
        let marker = shard.marker();
        let (form, rest) = if let Some(rest) = path.strip_prefix("~/") {
            (Form::TildeSlash, rest.strip_prefix(marker)?)
        } else if let Some(rest) = path.strip_prefix('~') {
            (Form::Tilde, rest.strip_prefix(marker)?)
        } else {
            let rest = path
                .strip_prefix(self.home.as_str())
                .filter(|_| !self.home.is_empty())?
                .strip_prefix('/')?;
            (Form::Home, rest.strip_prefix(marker)?)
        };

        if rest.is_empty() || rest.starts_with('/') {
            Some((form, rest))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Router {
        Router::new(Path::new("/home/amy"))
    }

    #[test]
    fn translates_every_spelling() {
        let r = router();
        assert_eq!(
            r.translate_path("~/S1/docs/a.pdf", ShardId::S2).as_deref(),
            Some("~/S2/docs/a.pdf")
        );
        assert_eq!(
            r.translate_path("~S1/docs/a.pdf", ShardId::S2).as_deref(),
            Some("~S2/docs/a.pdf")
        );
        assert_eq!(
            r.translate_path("/home/amy/S1/notes/x.txt", ShardId::S3).as_deref(),
            Some("~/S3/notes/x.txt")
        );
        assert_eq!(r.translate_path("~/S1", ShardId::S4).as_deref(), Some("~/S4"));
        assert_eq!(r.translate_path("~S1/", ShardId::S4).as_deref(), Some("~S4/"));
    }

    #[test]
    fn no_marker_means_none() {
        let r = router();
        assert_eq!(r.translate_path("/tmp/a.pdf", ShardId::S2), None);
        assert_eq!(r.translate_path("~/S10/a.pdf", ShardId::S2), None);
        assert_eq!(r.translate_path("~/S2/a.pdf", ShardId::S3), None);
        assert_eq!(r.translate_path("/home/amyS1/a.pdf", ShardId::S2), None);
        assert_eq!(r.translate_path("", ShardId::S2), None);
    }

    #[test]
    fn suffix_survives_translation() {
        let r = router();
        for path in ["~/S1/a b/c.d/e.pdf", "~S1/x/../y.txt", "~/S1/ü/ñ.zip"] {
            let translated = r.translate_path(path, ShardId::S2).unwrap();
            assert_eq!(r.suffix(&translated, ShardId::S2), r.suffix(path, ShardId::S1));
            // and back again
            let back = Router::new(Path::new("/home/amy"))
                .suffix(&translated, ShardId::S2)
                .map(|s| format!("~/S1{s}"));
            assert_eq!(
                back.as_deref().and_then(|b| r.suffix(b, ShardId::S1)),
                r.suffix(path, ShardId::S1)
            );
        }
    }

    #[test]
    fn resolve_shard_is_extension_only() {
        let r = router();
        assert_eq!(r.resolve_shard("deep/dir/x.pdf"), ShardKey::Shard(ShardId::S2));
        assert_eq!(r.resolve_shard("pdf"), ShardKey::Unsupported);
        assert_eq!(r.resolve_shard("main.c"), ShardKey::Local);
    }
}
