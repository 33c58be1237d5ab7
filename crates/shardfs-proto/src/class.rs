//! Shards, extension classes, and the sharding decision.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::constants::DEFAULT_BASE_PORT;

/// Identity of one of the four nodes.
///
/// The variant name doubles as the namespace marker (`~/S2/...`).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
pub enum ShardId {
    S1,
    S2,
    S3,
    S4,
}

impl ShardId {
    /// All nodes, public node first.
    pub const ALL: [ShardId; 4] = [ShardId::S1, ShardId::S2, ShardId::S3, ShardId::S4];

    /// The shards the public node fans out to.
    pub const REMOTES: [ShardId; 3] = [ShardId::S2, ShardId::S3, ShardId::S4];

    /// Namespace marker, e.g. `"S2"`.
    pub fn marker(self) -> &'static str {
        match self {
            ShardId::S1 => "S1",
            ShardId::S2 => "S2",
            ShardId::S3 => "S3",
            ShardId::S4 => "S4",
        }
    }

    /// The class this node lists and archives.
    pub fn class(self) -> FileClass {
        match self {
            ShardId::S1 => FileClass::C,
            ShardId::S2 => FileClass::Pdf,
            ShardId::S3 => FileClass::Txt,
            ShardId::S4 => FileClass::Zip,
        }
    }

    /// Port this node listens on unless configured otherwise.
    pub fn default_port(self) -> u16 {
        DEFAULT_BASE_PORT + self as u16
    }

    /// Whether this is the client-facing node.
    pub fn is_public(self) -> bool {
        self == ShardId::S1
    }
}

/// Extension classes in listing precedence order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum FileClass {
    C,
    Pdf,
    Txt,
    Zip,
}

impl FileClass {
    /// Extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            FileClass::C => "c",
            FileClass::Pdf => "pdf",
            FileClass::Txt => "txt",
            FileClass::Zip => "zip",
        }
    }

    /// Node that stores files of this class.
    pub fn owner(self) -> ShardId {
        match self {
            FileClass::C => ShardId::S1,
            FileClass::Pdf => ShardId::S2,
            FileClass::Txt => ShardId::S3,
            FileClass::Zip => ShardId::S4,
        }
    }

    /// Class of an exact extension; matching is case-sensitive.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "c" => Some(FileClass::C),
            "pdf" => Some(FileClass::Pdf),
            "txt" => Some(FileClass::Txt),
            "zip" => Some(FileClass::Zip),
            _ => None,
        }
    }

    /// Class of a file name or path, judged by its final extension.
    pub fn of_filename(name: &str) -> Option<Self> {
        Self::from_extension(extension_of(name))
    }
}

/// Final extension segment of the last path component.
///
/// Empty when there is no `.`, or when the only `.` starts the name.
pub fn extension_of(name: &str) -> &str {
    let base = name.rsplit('/').next().unwrap_or(name);
    match base.rfind('.') {
        Some(0) | None => "",
        Some(i) => &base[i + 1..],
    }
}

/// Where a file is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardKey {
    /// `.c` files, kept on the public node.
    Local,
    /// Owned by a remote shard.
    Shard(ShardId),
    /// No known class; kept on the public node.
    Unsupported,
}

impl ShardKey {
    /// Sharding decision for `filename`, a pure function of its extension.
    pub fn for_filename(filename: &str) -> Self {
        match FileClass::of_filename(filename) {
            Some(FileClass::C) => ShardKey::Local,
            Some(class) => ShardKey::Shard(class.owner()),
            None => ShardKey::Unsupported,
        }
    }

    /// Node that ends up holding the file.
    pub fn target(self) -> ShardId {
        match self {
            ShardKey::Shard(shard) => shard,
            ShardKey::Local | ShardKey::Unsupported => ShardId::S1,
        }
    }

    /// Whether the public node handles the file itself.
    pub fn is_local(self) -> bool {
        self.target().is_public()
    }
}

/// Filenames grouped by class precedence, lexicographic within a class.
///
/// Order depends only on the contents, never on insertion order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileListing {
    entries: BTreeSet<(FileClass, String)>,
}

impl FileListing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `name` under `class`.
    pub fn insert(&mut self, class: FileClass, name: impl Into<String>) {
        self.entries.insert((class, name.into()));
    }

    /// Add every name whose extension is exactly `class`; returns how many were kept.
    pub fn extend_class<I, S>(&mut self, class: FileClass, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut kept = 0;
        for name in names {
            let name = name.into();
            if FileClass::of_filename(&name) == Some(class) {
                self.entries.insert((class, name));
                kept += 1;
            }
        }
        kept
    }

    /// Names in final order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(_, name)| name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_rules() {
        assert_eq!(extension_of("report.pdf"), "pdf");
        assert_eq!(extension_of("archive.tar.zip"), "zip");
        assert_eq!(extension_of("Makefile"), "");
        assert_eq!(extension_of(".bashrc"), "");
        assert_eq!(extension_of("trailing."), "");
        assert_eq!(extension_of("~/S1/dir.v2/notes"), "");
        assert_eq!(extension_of("~/S1/dir/main.c"), "c");
    }

    #[test]
    fn sharding_is_by_extension_only() {
        assert_eq!(ShardKey::for_filename("a.c"), ShardKey::Local);
        assert_eq!(ShardKey::for_filename("a.pdf"), ShardKey::Shard(ShardId::S2));
        assert_eq!(ShardKey::for_filename("a.txt"), ShardKey::Shard(ShardId::S3));
        assert_eq!(ShardKey::for_filename("a.zip"), ShardKey::Shard(ShardId::S4));
        assert_eq!(ShardKey::for_filename("a.PDF"), ShardKey::Unsupported);
        assert_eq!(ShardKey::for_filename("a.rs"), ShardKey::Unsupported);
        assert!(ShardKey::for_filename("README").is_local());
        assert!(!ShardKey::for_filename("x/y.txt").is_local());
    }

    #[test]
    fn class_table() {
        for shard in ShardId::ALL {
            assert_eq!(shard.class().owner(), shard);
        }
        assert_eq!(ShardId::S1.default_port(), 8080);
        assert_eq!(ShardId::S4.default_port(), 8083);
        assert_eq!("pdf".parse::<FileClass>().unwrap(), FileClass::Pdf);
        assert_eq!(FileClass::Txt.to_string(), "txt");
        assert_eq!("S3".parse::<ShardId>().unwrap(), ShardId::S3);
        assert!("S5".parse::<ShardId>().is_err());
    }

    #[test]
    fn listing_groups_by_precedence() {
        let mut listing = FileListing::new();
        listing.extend_class(FileClass::Zip, ["b.zip", "a.zip"]);
        listing.extend_class(FileClass::Txt, ["notes.txt"]);
        listing.extend_class(FileClass::Pdf, ["z.pdf", "a.pdf", "stray.txt"]);
        listing.extend_class(FileClass::C, ["main.c", "lib.c"]);

        assert_eq!(
            listing.names(),
            vec!["lib.c", "main.c", "a.pdf", "z.pdf", "notes.txt", "a.zip", "b.zip"]
        );
    }

    #[test]
    fn listing_ignores_arrival_order() {
        let mut forward = FileListing::new();
        forward.insert(FileClass::Pdf, "b.pdf");
        forward.insert(FileClass::C, "a.c");

        let mut backward = FileListing::new();
        backward.insert(FileClass::C, "a.c");
        backward.insert(FileClass::Pdf, "b.pdf");

        assert_eq!(forward, backward);
    }
}
