//! Configuration management for fetchladder.
//!
//! `Settings` holds resolved runtime values. `Config` is the optional TOML
//! file whose fields overlay the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::escalation::{DelayPolicy, DelayRange};
use crate::models::Strategy;
use crate::scrapers::IMPERSONATE_USER_AGENTS;

/// Default attempt database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "attempts.db";

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "FETCHLADDER_DATA_DIR";

const SCREENSHOTS_SUBDIR: &str = "screenshots";
const REPORTS_SUBDIR: &str = "reports";
const USER_AGENTS_FILE: &str = "user_agents.txt";
const CONFIG_FILENAME: &str = "fetchladder.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Per-rung and per-probe timeouts, in seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    pub plain: u64,
    pub enhanced: u64,
    /// Cookie-priming request issued before the enhanced fetch.
    pub priming: u64,
    pub rendered: u64,
    pub stealth: u64,
    /// Existence check per domain-alternate candidate.
    pub domain_check: u64,
    pub probe_plain: u64,
    pub probe_rendered: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            plain: 30,
            enhanced: 30,
            priming: 10,
            rendered: 30,
            stealth: 45,
            domain_check: 10,
            probe_plain: 20,
            probe_rendered: 30,
        }
    }
}

impl Timeouts {
    /// Timeout for one attempt of `strategy`. For the domain prober this
    /// bounds each candidate check.
    pub fn for_strategy(&self, strategy: Strategy) -> Duration {
        let secs = match strategy {
            Strategy::PlainHttp => self.plain,
            Strategy::EnhancedHttp => self.enhanced,
            Strategy::RenderedBrowser => self.rendered,
            Strategy::StealthBrowser => self.stealth,
            Strategy::DomainVerification => self.domain_check,
        };
        Duration::from_secs(secs)
    }

    pub fn priming_timeout(&self) -> Duration {
        Duration::from_secs(self.priming)
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Attempt database filename inside `data_dir`.
    pub database_filename: String,
    pub screenshots_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub timeouts: Timeouts,
    pub delays: DelayPolicy,
    /// Pause between sites during escalation.
    pub site_delay: DelayRange,
    /// Pause between sites during probing.
    pub probe_delay: DelayRange,
    /// Pause between sites of one domain when fetching with a known method.
    pub scrape_delay: DelayRange,
    /// Domains escalated concurrently. Calls to one domain stay serial.
    pub workers: usize,
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    /// Extra Chrome command-line arguments.
    pub chrome_args: Vec<String>,
    pub user_agents: Vec<String>,
    pub proxies: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        // ~/.local/share/fetchladder, falling back to the home or current dir
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fetchladder");

        Self {
            screenshots_dir: data_dir.join(SCREENSHOTS_SUBDIR),
            reports_dir: data_dir.join(REPORTS_SUBDIR),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            timeouts: Timeouts::default(),
            delays: DelayPolicy::default(),
            site_delay: DelayRange::from_secs(5, 10),
            probe_delay: DelayRange::from_secs(2, 5),
            scrape_delay: DelayRange::from_secs(1, 5),
            workers: 1,
            headless: true,
            chrome_path: None,
            chrome_args: Vec::new(),
            user_agents: Vec::new(),
            proxies: Vec::new(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        let mut settings = Self::default();
        settings.set_data_dir(data_dir);
        settings
    }

    /// Move the data directory along with the screenshot and report dirs under it.
    pub fn set_data_dir(&mut self, data_dir: PathBuf) {
        self.screenshots_dir = data_dir.join(SCREENSHOTS_SUBDIR);
        self.reports_dir = data_dir.join(REPORTS_SUBDIR);
        self.data_dir = data_dir;
    }

    /// Full path to the attempt database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Create the data, screenshot and report directories.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.screenshots_dir)?;
        std::fs::create_dir_all(&self.reports_dir)?;
        Ok(())
    }

    /// User agents in effect: configured ones, else `user_agents.txt` in
    /// the data dir, else the built-in browser list.
    pub fn effective_user_agents(&self) -> Vec<String> {
        if !self.user_agents.is_empty() {
            return self.user_agents.clone();
        }
        let from_file = read_list_file(&self.data_dir.join(USER_AGENTS_FILE)).unwrap_or_default();
        if !from_file.is_empty() {
            return from_file;
        }
        IMPERSONATE_USER_AGENTS
            .iter()
            .map(|ua| ua.to_string())
            .collect()
    }
}

/// Delay overrides from the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_plain: Option<DelayRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_enhanced: Option<DelayRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_rendered: Option<DelayRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_stealth: Option<DelayRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub between_sites: Option<DelayRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub between_probes: Option<DelayRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub between_scrapes: Option<DelayRange>,
}

/// Timeout overrides from the config file, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plain: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priming: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stealth: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_check: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_plain: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_rendered: Option<u64>,
}

/// Configuration file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Source path of this config (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshots_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reports_dir: Option<String>,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub delays: DelayConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headless: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chrome_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_agents: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub proxies: Vec<String>,
    /// File with one proxy URL per line (`#` starts a comment).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxies_file: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let mut config = Self::from_toml(&contents).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, String> {
        toml::from_str(contents).map_err(|e| e.to_string())
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    /// `base_dir` is used to resolve relative paths (config file dir or CWD).
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.set_data_dir(self.resolve_path(data_dir, base_dir));
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref dir) = self.screenshots_dir {
            settings.screenshots_dir = self.resolve_path(dir, base_dir);
        }
        if let Some(ref dir) = self.reports_dir {
            settings.reports_dir = self.resolve_path(dir, base_dir);
        }

        let t = &self.timeouts;
        let timeouts = &mut settings.timeouts;
        timeouts.plain = t.plain.unwrap_or(timeouts.plain);
        timeouts.enhanced = t.enhanced.unwrap_or(timeouts.enhanced);
        timeouts.priming = t.priming.unwrap_or(timeouts.priming);
        timeouts.rendered = t.rendered.unwrap_or(timeouts.rendered);
        timeouts.stealth = t.stealth.unwrap_or(timeouts.stealth);
        timeouts.domain_check = t.domain_check.unwrap_or(timeouts.domain_check);
        timeouts.probe_plain = t.probe_plain.unwrap_or(timeouts.probe_plain);
        timeouts.probe_rendered = t.probe_rendered.unwrap_or(timeouts.probe_rendered);

        let d = &self.delays;
        let current = &settings.delays;
        settings.delays = DelayPolicy::new(
            d.after_plain
                .unwrap_or_else(|| current.after(Strategy::PlainHttp)),
            d.after_enhanced
                .unwrap_or_else(|| current.after(Strategy::EnhancedHttp)),
            d.after_rendered
                .unwrap_or_else(|| current.after(Strategy::RenderedBrowser)),
            d.after_stealth
                .unwrap_or_else(|| current.after(Strategy::StealthBrowser)),
        );
        if let Some(range) = d.between_sites {
            settings.site_delay = range;
        }
        if let Some(range) = d.between_probes {
            settings.probe_delay = range;
        }
        if let Some(range) = d.between_scrapes {
            settings.scrape_delay = range;
        }

        if let Some(workers) = self.workers {
            settings.workers = workers.max(1);
        }
        if let Some(headless) = self.headless {
            settings.headless = headless;
        }
        if let Some(ref chrome) = self.chrome_path {
            settings.chrome_path = Some(self.resolve_path(chrome, base_dir));
        }
        if !self.chrome_args.is_empty() {
            settings.chrome_args = self.chrome_args.clone();
        }
        if !self.user_agents.is_empty() {
            settings.user_agents = self.user_agents.clone();
        }
        if !self.proxies.is_empty() {
            settings.proxies = self.proxies.clone();
        }
    }

    /// Proxies listed in `proxies_file`, if one is configured.
    pub fn load_proxies_file(&self, base_dir: &Path) -> Result<Vec<String>, ConfigError> {
        let Some(ref file) = self.proxies_file else {
            return Ok(Vec::new());
        };
        let path = self.resolve_path(file, base_dir);
        read_list_file(&path).map_err(|source| ConfigError::Read { path, source })
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides discovery).
    pub config_path: Option<PathBuf>,
    /// Data directory (--data-dir flag).
    pub data_dir: Option<PathBuf>,
}

/// Discover a config file: `./fetchladder.toml`, then the user config dir.
fn discover_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.exists() {
        return Some(local);
    }
    let user = dirs::config_dir()?.join("fetchladder").join("config.toml");
    user.exists().then_some(user)
}

/// Resolve settings from defaults, the config file, the environment and flags.
/// Returns (Settings, Config) tuple.
pub async fn load_settings(options: LoadOptions) -> Result<(Settings, Config), ConfigError> {
    let config = match options.config_path.clone().or_else(discover_config_path) {
        Some(path) => {
            tracing::debug!("Loading config from {}", path.display());
            Config::load_from_path(&path).await?
        }
        None => Config::default(),
    };

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let base_dir = config.base_dir().unwrap_or_else(|| cwd.clone());

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings, &base_dir);

    if let Some(dir) = std::env::var(DATA_DIR_ENV).ok().filter(|s| !s.is_empty()) {
        tracing::debug!("Using {} from environment: {}", DATA_DIR_ENV, dir);
        settings.set_data_dir(config.resolve_path(&dir, &cwd));
    }

    // --data-dir takes precedence over everything else
    if let Some(ref dir) = options.data_dir {
        let dir = if dir.is_absolute() {
            dir.clone()
        } else {
            cwd.join(dir)
        };
        settings.set_data_dir(dir);
    }

    let mut proxies = settings.proxies.clone();
    for proxy in config.load_proxies_file(&base_dir)? {
        if !proxies.contains(&proxy) {
            proxies.push(proxy);
        }
    }
    settings.proxies = proxies;

    Ok((settings, config))
}

/// Read a newline-separated list, skipping blanks and `#` comments.
fn read_list_file(path: &Path) -> std::io::Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(parse_list(&contents))
}

fn parse_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect()
}
