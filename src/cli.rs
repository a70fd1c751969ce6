use crate::client::Client;
use crate::config::Config;
use crate::feed::FeedStore;
use crate::health::HealthPing;
use crate::index::{normalize_code, GeocodeIndex};
use crate::logging::{setup_logging, LogLevel};
use crate::monitor::{Monitor, SystemClock};
use crate::notify::ConsoleNotifier;
use crate::subscription::Subscription;
use crate::warning::WarningEntry;
use anyhow::{anyhow, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use comfy_table::Table;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

fn default(path: &Path) -> String {
    format!("[default: {}]", path.as_os_str().to_string_lossy())
}
/// Official warnings for your district
#[derive(Parser, Debug, Serialize, Deserialize)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, value_name = "DIR", help = default(&Config::default_dirs().state)) ]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    #[arg(short, long = "config", value_name = "FILE", help = default(&Config::default_path()))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<PathBuf>,

    /// [default: info]
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    log_level: Option<LogLevel>,

    /// Location code e.g. 091720000000 (overrides config)
    #[arg(short = 'i', long = "location", value_name = "CODE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    locations: Option<Vec<String>>,

    #[command(subcommand)]
    #[serde(skip)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Initialize the database and write a config file
    Init,
    /// Watch all configured locations and print new warnings
    Monitor,
    /// Save a location code in the config file
    AddLocation { code: String },
    /// Print the current warnings for a location code
    List { code: String },
}

pub fn cli() -> Result<()> {
    let args = Cli::parse();

    let mut config = Config::from_cli(&args)?;
    if let Some(level) = args.log_level {
        config.main.logging.console_level = level;
        config.main.logging.file_level = level;
    }
    let _guard = setup_logging(&config.main.logging);
    debug!("Command line arguments: {:#?}", &args);
    debug!("Config: {:#?}", &config);

    match &args.command {
        Some(Commands::Init) => init(&config)?,
        Some(Commands::Monitor) => monitor(&config)?,
        Some(Commands::AddLocation { code }) => config.add_location(code)?,
        Some(Commands::List { code }) => list(&config, code)?,
        None => {}
    }
    Ok(())
}

fn init(config: &Config) -> Result<()> {
    let database = config.get_database()?;
    database.init()?;
    if config.config_path.exists() {
        info!("Keeping existing {}", config.config_path.display());
    } else {
        info!("Writing {}", config.config_path.display());
        config.write_config_file()?;
    }
    Ok(())
}

fn monitor(config: &Config) -> Result<()> {
    if config.main.locations.is_empty() {
        return Err(anyhow!("No locations specified"));
    }
    let providers = config.main.providers();
    if providers.is_empty() {
        return Err(anyhow!("No known providers specified"));
    }
    let database = Arc::new(config.get_database()?);
    database.init()?;
    let client = Client::from_config(&config.main);
    let index = Arc::new(GeocodeIndex::new(FeedStore::new(client.clone(), providers)));

    for code in &config.main.locations {
        info!("Monitoring warnings for {}", normalize_code(code));
        let notifier = ConsoleNotifier::new(code.as_str());
        let subscription = Subscription::new(code.as_str(), notifier, database.clone())?;
        if let Err(err) = index.subscribe(code, Arc::new(subscription), true, true) {
            error!("{err:#}");
        }
    }
    index.log_subscriptions();

    let mut monitor = Monitor::new(index, SystemClock, config.main.interval);
    if let Some(url) = &config.main.healthcheck_url {
        monitor = monitor.with_health_ping(HealthPing::new(
            client,
            url,
            config.main.healthcheck_interval,
        ));
    }
    monitor.start()
}

fn list(config: &Config, code: &str) -> Result<()> {
    let client = Client::from_config(&config.main);
    let store = FeedStore::new(client, config.main.providers());
    let counts = store.update(|_| {});
    if counts.failed > 0 {
        error!("{} providers could not be reached", counts.failed);
    }

    let mut entries = store.items_for_district(code);
    entries.sort_by_key(|e| e.sent);
    if entries.is_empty() {
        info!("No warnings for {}", normalize_code(code));
        return Ok(());
    }
    println!("{}", warning_table(&entries));
    Ok(())
}

fn warning_table(entries: &[WarningEntry]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Provider", "Sent", "Event", "Headline", "Expires"]);
    for entry in entries {
        let expires = entry
            .expires()
            .map(|e| e.with_timezone(&Local).format("%d.%m.%Y %H:%M").to_string())
            .unwrap_or_default();
        table.add_row(vec![
            entry.provider.to_string(),
            entry.sent.with_timezone(&Local).format("%d.%m.%Y %H:%M").to_string(),
            entry.event().to_owned(),
            entry.headline().to_owned(),
            expires,
        ]);
    }
    table
}
