//! shardfs command-line client
//!
//! ```bash
//! shardfs upload ./report.pdf ~/S1/reports
//! shardfs download ~/S1/reports/report.pdf --dest ./out
//! shardfs remove ~/S1/reports/report.pdf
//! shardfs list ~/S1/reports
//! shardfs tar pdf
//! ```
//!
//! Quote `~` paths (`'~/S1/x'`) when the local shell would expand them; the
//! server also accepts `~S1/x`.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shardfs_client::Client;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "shardfs")]
#[command(about = "Client for the shardfs distributed file store")]
struct Args {
    /// Address of the public node
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Upload a local file into a server directory
    Upload { local: PathBuf, server_dir: String },
    /// Download a server file
    Download {
        path: String,
        /// Local directory to write into
        #[arg(short, long, default_value = ".")]
        dest: PathBuf,
    },
    /// Delete a server file
    Remove { path: String },
    /// List a server directory across all nodes
    List { dir: String },
    /// Download a tar of every file of one class (c, pdf or txt)
    Tar {
        class: String,
        /// Output file (default: <class>_files.tar)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

async fn run(args: Args) -> Result<()> {
    let mut client = Client::connect(args.server.as_str())
        .await
        .with_context(|| format!("connecting to {}", args.server))?;

    match args.command {
        Cmd::Upload { local, server_dir } => {
            let len = client.upload(&local, &server_dir).await?;
            println!("uploaded {} ({} bytes)", local.display(), len);
        }
        Cmd::Download { path, dest } => {
            let written = client.download(&path, &dest).await?;
            println!("downloaded {}", written.display());
        }
        Cmd::Remove { path } => {
            client.remove(&path).await?;
            println!("removed {path}");
        }
        Cmd::List { dir } => {
            for name in client.list(&dir).await? {
                println!("{name}");
            }
        }
        Cmd::Tar { class, output } => {
            let output = output.unwrap_or_else(|| PathBuf::from(format!("{class}_files.tar")));
            let len = client.download_archive(&class, &output).await?;
            println!("downloaded {} ({} bytes)", output.display(), len);
        }
    }

    client.exit().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("shardfs: {e:#}");
            ExitCode::FAILURE
        }
    }
}
