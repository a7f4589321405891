mod commands;
mod config;
mod gemini;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_chat, cmd_dashboard, cmd_delete, cmd_export, cmd_import, cmd_intake, cmd_list, cmd_log,
    cmd_settings_set, cmd_settings_show, cmd_trend,
};
use crate::config::{ChatConfig, Config};
use crate::gemini::GeminiClient;
use catlog_core::aggregate::DEFAULT_TREND_POINTS;
use catlog_core::chat::ChatBridge;
use catlog_core::models::SettingsPatch;
use catlog_core::service::CareService;

#[derive(Parser)]
#[command(
    name = "catlog",
    version,
    about = "A local-first health log for a cat recovering from DKA",
    long_about = "Record glucose, ketone, feeding, saline and medication entries, \
                  check them against your vet's thresholds, and ask an AI care assistant."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a reading or intake
    Log {
        /// Category: glucose, ketone, feeding, saline, meds
        category: String,
        /// Value in the category's unit (mg/dL, mmol/L or ml)
        value: f64,
        /// Free-text note
        #[arg(short, long)]
        note: Option<String>,
        /// Measurement time ("YYYY-MM-DD HH:MM" local, or now)
        #[arg(long)]
        at: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List entries, newest first
    List {
        /// Only this category
        #[arg(short, long)]
        category: Option<String>,
        /// Show at most N entries
        #[arg(short, long)]
        limit: Option<usize>,
        /// Only readings outside the configured thresholds
        #[arg(long)]
        alerts: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an entry by ID
    Delete {
        /// Entry ID to delete
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Latest value, status and today's totals for every category
    Dashboard {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Daily feeding and saline totals for the last 7 logged days
    Intake {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recent readings of one category, oldest first
    Trend {
        /// Category: glucose, ketone, feeding, saline, meds
        category: String,
        /// Number of readings
        #[arg(short, long, default_value_t = DEFAULT_TREND_POINTS)]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or change thresholds and daily targets
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Write all entries and settings to a backup file
    Export {
        /// Output path (default: cat-health-backup-YYYY-MM-DD.json)
        #[arg(short, long, value_name = "PATH")]
        out: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Restore entries and settings from a backup file
    Import {
        /// Path to the backup JSON file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask the AI care assistant (requires GEMINI_API_KEY)
    Chat {
        /// Message to send; omit for an interactive session
        message: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Show current settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update one or more settings
    Set {
        /// Glucose below this is low (mg/dL)
        #[arg(long)]
        glucose_low: Option<f64>,
        /// Glucose above this is high (mg/dL)
        #[arg(long)]
        glucose_high: Option<f64>,
        /// Ketone at or above this is a warning (mmol/L)
        #[arg(long)]
        ketone_warning: Option<f64>,
        /// Ketone at or above this is dangerous (mmol/L)
        #[arg(long)]
        ketone_danger: Option<f64>,
        /// Daily feeding target in ml (0 to clear)
        #[arg(long)]
        feeding_target: Option<f64>,
        /// Daily saline target in ml (0 to clear)
        #[arg(long)]
        saline_target: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let level = if matches!(cli.command, Commands::Serve { .. }) {
        "info"
    } else {
        "warn"
    };
    init_logging(level);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn chat_bridge(config: Option<ChatConfig>) -> Result<Option<ChatBridge>> {
    config
        .map(|c| Ok(ChatBridge::new(Box::new(GeminiClient::new(&c)?))))
        .transpose()
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let mut svc = CareService::open(&config.db_path)?;

    match cli.command {
        Commands::Log {
            category,
            value,
            note,
            at,
            json,
        } => cmd_log(&mut svc, &category, value, note, at.as_deref(), json),
        Commands::List {
            category,
            limit,
            alerts,
            json,
        } => cmd_list(&svc, category.as_deref(), limit, alerts, json),
        Commands::Delete { id, yes, json } => cmd_delete(&mut svc, &id, yes, json),
        Commands::Dashboard { json } => cmd_dashboard(&svc, json),
        Commands::Intake { json } => cmd_intake(&svc, json),
        Commands::Trend {
            category,
            limit,
            json,
        } => cmd_trend(&svc, &category, limit, json),
        Commands::Settings { command } => match command {
            SettingsCommands::Show { json } => cmd_settings_show(&svc, json),
            SettingsCommands::Set {
                glucose_low,
                glucose_high,
                ketone_warning,
                ketone_danger,
                feeding_target,
                saline_target,
                json,
            } => {
                let patch = SettingsPatch {
                    glucose_low,
                    glucose_high,
                    ketone_warning,
                    ketone_danger,
                    daily_feeding_target: feeding_target,
                    daily_saline_target: saline_target,
                };
                cmd_settings_set(&mut svc, &patch, json)
            }
        },
        Commands::Export { out, json } => cmd_export(&svc, out, json),
        Commands::Import { file, json } => cmd_import(&mut svc, &file, json),
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let (api_key, new_api_key) = if no_auth {
                (None, false)
            } else {
                let (key, new) = config.load_or_create_api_key()?;
                (Some(key), new)
            };
            let chat = chat_bridge(ChatConfig::from_env())?;
            server::start_server(svc, chat, port, &bind, api_key, new_api_key).await
        }
        Commands::Chat { message, json } => cmd_chat(ChatConfig::from_env(), message, json).await,
    }
}
