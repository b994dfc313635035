use clap::Parser;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use tracing::debug;
use tracing_subscriber::EnvFilter;
use xtdb_client::session::{TimeParams, XtdbClient};
use xtdb_client::settings::Settings;
use xtdb_client::Result;

#[derive(Parser)]
#[command(name = "xtdb")]
#[command(about = "Reads a query from stdin, runs it against an XTDB node and prints the JSON result")]
#[command(version)]
struct Cli {
    /// Node URI, overrides the configuration
    #[arg(long)]
    uri: Option<String>,

    /// Configuration file (./xtdb.toml is read when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pretty-print the output
    #[arg(short, long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // logs go to stderr, stdout carries the result
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(uri) = cli.uri {
        settings.uri = uri;
    }
    debug!(uri = %settings.uri, "settings loaded");

    let mut query = String::new();
    io::stdin().read_to_string(&mut query)?;

    let client = XtdbClient::from_settings(&settings)?;
    let result = client.query(query.trim(), &TimeParams::default()).await?;
    let output = if cli.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", output);
    Ok(())
}
