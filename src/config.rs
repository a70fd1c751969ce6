use crate::persistence::Database;
use crate::warning::{Provider, DEFAULT_FEED_BASE_URL};
use crate::{cli::Cli, logging::LoggingOptions};
use anyhow::{anyhow, Result};
use chrono::Duration;
use etcetera::{choose_app_strategy, AppStrategy, AppStrategyArgs};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_with::DurationSeconds;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use strum::IntoEnumIterator;
use tracing::{info, warn};

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(skip)]
    pub config_path: PathBuf,
    pub main: MainConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: Self::default_path(),
            main: MainConfig::default(),
        }
    }
}

#[serde_with::serde_as]
#[derive(Debug, Deserialize, Serialize)]
pub struct MainConfig {
    pub state_dir: PathBuf,
    /// Location codes watched by the monitor command
    pub locations: Vec<String>,
    pub providers: Vec<String>,
    pub feed_base_url: String,
    #[serde_as(as = "DurationSeconds<i64>")]
    pub interval: Duration,
    #[serde_as(as = "DurationSeconds<i64>")]
    pub request_timeout: Duration,
    pub retry_limit: u64,
    #[serde_as(as = "DurationSeconds<i64>")]
    pub retry_delay: Duration,
    pub healthcheck_url: Option<String>,
    #[serde_as(as = "DurationSeconds<i64>")]
    pub healthcheck_interval: Duration,
    pub logging: LoggingOptions,
}

impl Default for MainConfig {
    fn default() -> Self {
        Self {
            state_dir: Config::default_dirs().state.clone(),
            locations: Vec::new(),
            providers: Provider::iter().map(|p| p.to_string()).collect(),
            feed_base_url: DEFAULT_FEED_BASE_URL.to_string(),
            interval: Duration::minutes(10),
            request_timeout: Duration::seconds(10),
            retry_limit: 3,
            retry_delay: Duration::seconds(7),
            healthcheck_url: None,
            healthcheck_interval: Duration::minutes(5),
            logging: LoggingOptions::default(),
        }
    }
}

impl MainConfig {
    /// The configured providers. Unknown names are skipped.
    pub fn providers(&self) -> Vec<Provider> {
        parse_providers(&self.providers)
    }
}

pub fn parse_providers(names: &[String]) -> Vec<Provider> {
    let mut providers = Vec::new();
    for name in names {
        match Provider::from_str(name.trim()) {
            Ok(provider) if !providers.contains(&provider) => providers.push(provider),
            Ok(_) => {}
            Err(_) => warn!("Ignoring unknown provider {name}"),
        }
    }
    providers
}

impl Config {
    pub fn default_path() -> PathBuf {
        let mut path = PathBuf::from(&Self::default_dirs().config);
        path.push("config.yml");
        path
    }

    pub fn default_dirs() -> &'static DefaultDirs {
        DEFAULT_DIRS.get_or_init(|| {
            let strategy = choose_app_strategy(AppStrategyArgs {
                top_level_domain: "de".to_string(),
                author: "nina-watch".to_string(),
                app_name: "NINA Watch".to_string(),
            })
            .expect("could not determine the home directory");
            DefaultDirs {
                config: strategy.config_dir(),
                state: strategy.state_dir().unwrap_or(strategy.data_dir()),
            }
        })
    }

    pub fn from_cli(args: &Cli) -> Result<Self> {
        let config_path = if let Some(path) = &args.config_path {
            path.to_owned()
        } else {
            Self::default_path()
        };

        let main = Figment::from(Serialized::defaults(MainConfig::default()))
            .merge(Yaml::file(&config_path))
            .merge(Env::prefixed("NINA_"))
            .merge(Serialized::defaults(args))
            .extract()?;

        Ok(Config { config_path, main })
    }

    pub fn write_config_file(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(&self.main)?;
        fs::write(&self.config_path, yaml)?;
        Ok(())
    }

    pub fn get_database(&self) -> Result<Database> {
        fs::create_dir_all(&self.main.state_dir)?;
        let mut path = PathBuf::from(&self.main.state_dir);
        path.push("nina-watch.db");
        Database::from_path(path)
    }

    pub fn add_location(&mut self, code: &str) -> Result<()> {
        let code = code.trim();
        if self.main.locations.iter().any(|l| l == code) {
            return Err(anyhow!(
                "{} already in {}",
                code,
                self.config_path.display()
            ));
        }
        info!("Adding {} to {}", code, self.config_path.display());
        self.main.locations.push(code.to_owned());
        self.write_config_file()?;
        Ok(())
    }
}

static DEFAULT_DIRS: OnceCell<DefaultDirs> = OnceCell::new();

#[derive(Debug, Deserialize, Serialize)]
pub struct DefaultDirs {
    pub config: PathBuf,
    pub state: PathBuf,
}
