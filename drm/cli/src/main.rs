use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use drm_fairplay::TransportOptions;
use tracing_subscriber::EnvFilter;

mod commands;
mod replay;

#[derive(Parser, Debug)]
#[command(name = "drm-cli")]
#[command(about = "FairPlay certificate and license acquisition tool")]
struct Args {
    /// Timeout for each HTTP request, in seconds
    #[arg(long, global = true, default_value = "30")]
    timeout: u64,

    /// User agent sent with HTTP requests
    #[arg(long, global = true)]
    user_agent: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch and decode the application certificate
    Certificate {
        /// Source config file (YAML, or JSON with a .json extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Write the decoded certificate here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Run a full license exchange with a pre-captured request payload (SPC)
    License {
        /// Source config file (YAML, or JSON with a .json extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Key locator, e.g. "skd://abc123"
        #[arg(short, long)]
        locator: String,

        /// File containing the raw request payload
        #[arg(long)]
        spc: PathBuf,

        /// Write the key response (CKC) here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Decode a license server response or certificate from a file
    Decode {
        /// File to decode
        input: PathBuf,

        /// Write the decoded bytes here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let options = TransportOptions {
        request_timeout: Duration::from_secs(args.timeout),
        user_agent: args.user_agent,
        ..TransportOptions::default()
    };

    match args.command {
        Command::Certificate { config, out } => commands::certificate(&config, out, options).await,
        Command::License {
            config,
            locator,
            spc,
            out,
        } => commands::license(&config, locator, &spc, out, options).await,
        Command::Decode { input, out } => commands::decode(&input, out).await,
    }
}
