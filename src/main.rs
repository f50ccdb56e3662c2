use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use qbo_credits::app::{self, ExportOptions, DEFAULT_OUTPUT};
use qbo_credits::config::Config;
use qbo_credits::qbo::DEFAULT_PAGE_SIZE;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "qbo-credits")]
#[command(about = "Export unprocessed Credit Card/ACH payments from QuickBooks Online")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch, reconcile, and write the payment export (default)
    Export(ExportArgs),
    /// Refresh the access token and save a rotated refresh token
    RefreshToken,
    /// Show which configuration keys are set
    Config,
}

#[derive(Args)]
struct ExportArgs {
    /// Output CSV path
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Refresh the access token before querying
    #[arg(long)]
    refresh: bool,

    /// Email the export to EMAIL_TO
    #[arg(long)]
    email: bool,

    /// Entities requested per query page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE as u64, value_parser = clap::value_parser!(u64).range(1..=1000))]
    page_size: u64,
}

impl Default for ExportArgs {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_OUTPUT),
            refresh: false,
            email: false,
            page_size: DEFAULT_PAGE_SIZE as u64,
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Loaded before the subscriber so RUST_LOG may come from .env.
    let dotenv = dotenvy::dotenv();
    init_tracing(cli.json_logs);
    if let Err(err) = dotenv {
        if !err.not_found() {
            tracing::warn!(error = %err, "Ignoring unreadable .env file");
        }
    }
    let config = Config::from_env();

    match cli.command.unwrap_or(Command::Export(ExportArgs::default())) {
        Command::Export(args) => {
            let options = ExportOptions {
                output: args.output,
                page_size: args.page_size as usize,
                refresh: args.refresh,
                email: args.email,
            };
            let clock = config.clock()?;
            let summary = app::run_export(&config, &options, &clock).await?;

            match &summary.output {
                Some(path) => println!(
                    "Successfully wrote {} records to {}",
                    summary.retained,
                    path.display()
                ),
                None => println!("No credit records found to write to CSV."),
            }
            if options.email && summary.output.is_some() && !summary.emailed {
                eprintln!("Warning: export was written but the email could not be sent");
            }
            if summary.token_rotated && !summary.token_persisted {
                eprintln!("Warning: refresh token was rotated but could not be saved");
            }
        }
        Command::RefreshToken => {
            let outcome = app::refresh_access_token(&config).await?;
            match (outcome.rotated, outcome.persisted) {
                (false, _) => println!("Access token refreshed; refresh token unchanged."),
                (true, true) => println!("Access token refreshed; rotated refresh token saved."),
                (true, false) => {
                    println!("Access token refreshed; rotated refresh token NOT saved.")
                }
            }
        }
        Command::Config => {
            for (key, set) in config.key_status() {
                println!("{key:<28} {}", if set { "set" } else { "-" });
            }
        }
    }

    Ok(())
}
