//! # Tabi CLI (`tabi`)
//!
//! Runs the trip server and works the itinerary from the terminal.
//!
//! ## Usage
//!
//! ```bash
//! tabi --config ./config/tabi.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tabi init` | Create the SQLite database and run schema migrations |
//! | `tabi serve` | Start the HTTP server |
//! | `tabi days` | List every day of the trip |
//! | `tabi show <date>` | Show one day with notes and attachments |
//! | `tabi add-day --date <d> --location <l>` | Add a custom day |
//! | `tabi note <date> <text>` | Replace a day's notes |
//! | `tabi attach <date> <file>` | Upload a file and attach it to a day |
//! | `tabi detach <date> <id>` | Remove an attachment |
//! | `tabi sync` | Reconcile with the remote and push |
//!
//! Log verbosity follows `RUST_LOG` (default `tabi=info`); logs go to stderr.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tabi::client::{self, NewDay};
use tabi::config;
use tabi::migrate;
use tabi::server;
use tabi_core::models::TransportKind;

/// Tabi: a local-first trip itinerary with notes, attachments, and sync.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tabi.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tabi",
    about = "Tabi: a local-first trip itinerary with notes, attachments, and sync",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tabi.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it again is safe.
    Init,

    /// Start the HTTP server on `[server].bind`.
    ///
    /// Requires `JWT_SECRET` in the environment.
    Serve,

    /// List every day of the trip, catalog and custom, in date order.
    Days,

    /// Show one day: route, stay, map links, notes, and attachments.
    Show {
        /// Day date (YYYY-MM-DD).
        date: String,
    },

    /// Add a custom day to the itinerary.
    AddDay {
        /// Day date (YYYY-MM-DD). Must not already be in the trip.
        #[arg(long)]
        date: String,

        #[arg(long)]
        location: String,

        /// flight, train, bus, or arrival.
        #[arg(long)]
        transport: Option<TransportKind>,

        #[arg(long, requires = "transport")]
        departure: Option<String>,

        #[arg(long, requires = "transport")]
        route: Option<String>,

        /// Accommodation name.
        #[arg(long)]
        hotel: Option<String>,

        #[arg(long, requires = "hotel")]
        nights: Option<u32>,
    },

    /// Replace the notes for a day.
    Note {
        date: String,
        text: String,
    },

    /// Upload a PDF or image and attach it to a day.
    Attach {
        date: String,
        file: PathBuf,
    },

    /// Remove an attachment from a day.
    Detach {
        date: String,
        /// Attachment id, as shown by `tabi show`.
        id: String,
    },

    /// Reconcile with the remote, then push the merged state.
    Sync,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tabi=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::init_database(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Days => {
            client::run_days(&cfg).await?;
        }
        Commands::Show { date } => {
            client::run_show(&cfg, &date).await?;
        }
        Commands::AddDay {
            date,
            location,
            transport,
            departure,
            route,
            hotel,
            nights,
        } => {
            let day = NewDay {
                date,
                location,
                transport,
                departure,
                route,
                hotel,
                nights,
            };
            client::run_add_day(&cfg, day).await?;
        }
        Commands::Note { date, text } => {
            client::run_note(&cfg, &date, &text).await?;
        }
        Commands::Attach { date, file } => {
            client::run_attach(&cfg, &date, &file).await?;
        }
        Commands::Detach { date, id } => {
            client::run_detach(&cfg, &date, &id).await?;
        }
        Commands::Sync => {
            client::run_sync(&cfg).await?;
        }
    }

    Ok(())
}
