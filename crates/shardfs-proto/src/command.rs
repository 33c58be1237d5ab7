//! Command lines: client verbs and node-to-node requests.

use std::fmt;
use std::str::FromStr;

use strum::{AsRefStr, EnumString};

use crate::error::{ProtoError, ProtoResult};

/// Client-facing verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
enum Verb {
    #[strum(serialize = "uploadf")]
    Upload,
    #[strum(serialize = "downlf")]
    Download,
    #[strum(serialize = "removef")]
    Remove,
    #[strum(serialize = "dispfnames")]
    List,
    #[strum(serialize = "downltar")]
    Archive,
    #[strum(serialize = "exit")]
    Exit,
}

impl Verb {
    fn usage(self) -> &'static str {
        match self {
            Verb::Upload => "uploadf <local-file> <server-dir>",
            Verb::Download => "downlf <server-file-path>",
            Verb::Remove => "removef <server-file-path>",
            Verb::List => "dispfnames <server-dir-path>",
            Verb::Archive => "downltar <c|pdf|txt>",
            Verb::Exit => "exit",
        }
    }

    fn arity(self) -> usize {
        match self {
            Verb::Upload => 2,
            Verb::Exit => 0,
            _ => 1,
        }
    }
}

/// One command issued by a client to the public node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Upload { local: String, server_dir: String },
    Download { path: String },
    Remove { path: String },
    List { dir: String },
    Archive { class: String },
    Exit,
}

impl Command {
    /// Tokenize a client line into a verb and its arguments.
    pub fn parse(line: &str) -> ProtoResult<Self> {
        let mut tokens = line.split_whitespace();
        let Some(word) = tokens.next() else {
            return Err(ProtoError::malformed("Empty command"));
        };
        let verb = Verb::from_str(word)
            .map_err(|_| ProtoError::malformed(format!("Unknown command: {word}")))?;

        let args: Vec<String> = tokens.map(str::to_string).collect();
        if args.len() != verb.arity() {
            return Err(ProtoError::malformed(format!("Usage: {}", verb.usage())));
        }
        let mut args = args.into_iter();
        let mut next = || args.next().unwrap_or_default();

        Ok(match verb {
            Verb::Upload => Command::Upload {
                local: next(),
                server_dir: next(),
            },
            Verb::Download => Command::Download { path: next() },
            Verb::Remove => Command::Remove { path: next() },
            Verb::List => Command::List { dir: next() },
            Verb::Archive => Command::Archive { class: next() },
            Verb::Exit => Command::Exit,
        })
    }

    fn verb(&self) -> Verb {
        match self {
            Command::Upload { .. } => Verb::Upload,
            Command::Download { .. } => Verb::Download,
            Command::Remove { .. } => Verb::Remove,
            Command::List { .. } => Verb::List,
            Command::Archive { .. } => Verb::Archive,
            Command::Exit => Verb::Exit,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = self.verb().as_ref().to_string();
        match self {
            Command::Upload { local, server_dir } => write!(f, "{verb} {local} {server_dir}"),
            Command::Download { path } | Command::Remove { path } => write!(f, "{verb} {path}"),
            Command::List { dir } => write!(f, "{verb} {dir}"),
            Command::Archive { class } => write!(f, "{verb} {class}"),
            Command::Exit => f.write_str(&verb),
        }
    }
}

/// One request from the public node to a shard.
///
/// The argument is the rest of the line after the verb, so paths may contain
/// spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Upload(String),
    Download(String),
    Remove(String),
    List(String),
    Tar(String),
}

impl Request {
    pub fn parse(line: &str) -> ProtoResult<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (verb, arg) = line.split_once(' ').unwrap_or((line, ""));
        if arg.is_empty() {
            return match verb {
                "UPLOAD" | "DOWNLOAD" | "REMOVE" | "LIST" | "TAR" => Err(
                    ProtoError::malformed(format!("Invalid command format: {verb} needs an argument")),
                ),
                _ => Err(ProtoError::malformed(format!("Unknown command: {verb}"))),
            };
        }
        let arg = arg.to_string();
        match verb {
            "UPLOAD" => Ok(Request::Upload(arg)),
            "DOWNLOAD" => Ok(Request::Download(arg)),
            "REMOVE" => Ok(Request::Remove(arg)),
            "LIST" => Ok(Request::List(arg)),
            "TAR" => Ok(Request::Tar(arg)),
            _ => Err(ProtoError::malformed(format!("Unknown command: {verb}"))),
        }
    }

    /// The path or class argument.
    pub fn arg(&self) -> &str {
        match self {
            Request::Upload(a)
            | Request::Download(a)
            | Request::Remove(a)
            | Request::List(a)
            | Request::Tar(a) => a,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Request::Upload(_) => "UPLOAD",
            Request::Download(_) => "DOWNLOAD",
            Request::Remove(_) => "REMOVE",
            Request::List(_) => "LIST",
            Request::Tar(_) => "TAR",
        };
        write!(f, "{verb} {}", self.arg())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_verbs() {
        assert_eq!(
            Command::parse("uploadf ./a.pdf ~/S1/docs").unwrap(),
            Command::Upload {
                local: "./a.pdf".into(),
                server_dir: "~/S1/docs".into()
            }
        );
        assert_eq!(
            Command::parse("  downlf   ~S1/x.c ").unwrap(),
            Command::Download {
                path: "~S1/x.c".into()
            }
        );
        assert_eq!(
            Command::parse("dispfnames ~/S1").unwrap(),
            Command::List { dir: "~/S1".into() }
        );
        assert_eq!(
            Command::parse("downltar pdf").unwrap(),
            Command::Archive { class: "pdf".into() }
        );
        assert_eq!(Command::parse("exit").unwrap(), Command::Exit);
    }

    #[test]
    fn rejects_bad_client_lines() {
        let err = Command::parse("frobnicate x").unwrap_err();
        assert_eq!(err.to_string(), "Unknown command: frobnicate");

        let err = Command::parse("uploadf only-one").unwrap_err();
        assert!(err.to_string().starts_with("Usage: uploadf"));

        assert!(Command::parse("removef a b").is_err());
        assert!(Command::parse("   ").is_err());
        // verbs are case-sensitive
        assert!(Command::parse("EXIT").is_err());
    }

    #[test]
    fn command_display_parses_back() {
        let cmd = Command::Upload {
            local: "/tmp/a.txt".into(),
            server_dir: "~/S1/t".into(),
        };
        assert_eq!(cmd.to_string(), "uploadf /tmp/a.txt ~/S1/t");
        assert_eq!(Command::parse(&cmd.to_string()).unwrap(), cmd);
    }

    #[test]
    fn requests_keep_the_whole_argument() {
        assert_eq!(
            Request::parse("UPLOAD ~/S2/my docs/a.pdf").unwrap(),
            Request::Upload("~/S2/my docs/a.pdf".into())
        );
        assert_eq!(Request::parse("TAR pdf\r").unwrap(), Request::Tar("pdf".into()));
        assert_eq!(
            Request::List("~S3/notes".into()).to_string(),
            "LIST ~S3/notes"
        );
    }

    #[test]
    fn rejects_bad_requests() {
        assert!(Request::parse("LIST").is_err());
        assert!(Request::parse("FETCH ~/S2/a.pdf").is_err());
        assert!(Request::parse("").is_err());
    }
}
