use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use url::Url;

use crate::mail::fetch::DEFAULT_MAX_RESULTS;

pub const DEFAULT_RELAY_ADDR: &str = "127.0.0.1:8765";
pub const DEFAULT_CACHE_MINUTES: i64 = 10;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub db_path: Option<String>,
    /// Keyring entry name the bearer token is stored under.
    pub keyring_user: Option<String>,
    /// Loopback address the popup posts its completion message to.
    pub relay_addr: Option<String>,
    /// Origin of the page allowed to post to the relay; defaults to the
    /// origin of `api_base_url`.
    pub relay_origin: Option<String>,
    pub popup_width: Option<u32>,
    pub popup_height: Option<u32>,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
    pub max_results: Option<u32>,
    pub account_cache_minutes: Option<i64>,
}

impl Config {
    pub fn keyring_user(&self) -> String {
        self.keyring_user
            .clone()
            .unwrap_or_else(|| "default".to_string())
    }

    pub fn relay_addr(&self) -> String {
        self.relay_addr
            .clone()
            .unwrap_or_else(|| DEFAULT_RELAY_ADDR.to_string())
    }

    pub fn relay_origin(&self) -> Result<Url> {
        let raw = self.relay_origin.as_deref().unwrap_or(&self.api_base_url);
        Url::parse(raw).with_context(|| format!("relay origin {raw:?} is not a URL"))
    }

    pub fn max_results(&self) -> u32 {
        self.max_results.unwrap_or(DEFAULT_MAX_RESULTS)
    }

    pub fn account_cache_secs(&self) -> i64 {
        self.account_cache_minutes.unwrap_or(DEFAULT_CACHE_MINUTES) * 60
    }
}

/// Overrides the config file location.
pub const CONFIG_ENV: &str = "RS_JOB_TRACKER_CONFIG";

/// `<config dir>/rs_job_tracker/<name>`, creating the directory.
fn app_file(name: &str) -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("no config dir available"))?
        .join("rs_job_tracker");
    fs::create_dir_all(&dir)?;
    Ok(dir.join(name))
}

pub fn config_path() -> Result<PathBuf> {
    match std::env::var_os(CONFIG_ENV) {
        Some(p) => Ok(PathBuf::from(p)),
        None => app_file("config.toml"),
    }
}

fn template() -> Config {
    Config {
        api_base_url: "http://127.0.0.1:8000".to_string(),
        db_path: None,
        keyring_user: Some("you@example.com".to_string()),
        relay_addr: Some(DEFAULT_RELAY_ADDR.to_string()),
        relay_origin: None,
        popup_width: Some(500),
        popup_height: Some(600),
        screen_width: Some(1280),
        screen_height: Some(800),
        max_results: Some(DEFAULT_MAX_RESULTS),
        account_cache_minutes: Some(DEFAULT_CACHE_MINUTES),
    }
}

/// Parse and sanity-check a config file body.
pub fn parse_config(text: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(text)?;
    let base = Url::parse(&cfg.api_base_url)
        .with_context(|| format!("api_base_url {:?} is not a URL", cfg.api_base_url))?;
    if !matches!(base.scheme(), "http" | "https") {
        bail!("api_base_url must be http(s), got {}", base.scheme());
    }
    if cfg.max_results == Some(0) {
        bail!("max_results must be at least 1");
    }
    Ok(cfg)
}

/// Load the config, writing a template and failing on first run.
pub fn load_config() -> Result<Config> {
    let path = config_path()?;
    if !path.exists() {
        fs::write(&path, toml::to_string_pretty(&template())?)?;
        bail!("Created template config at {}; edit it and run again", path.display());
    }
    let text = fs::read_to_string(&path)?;
    parse_config(&text).with_context(|| format!("reading {}", path.display()))
}

pub fn resolve_db_path(cfg: &Config) -> Result<PathBuf> {
    match &cfg.db_path {
        Some(p) => Ok(PathBuf::from(p)),
        None => app_file("state.db"),
    }
}
