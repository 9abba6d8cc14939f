//! Configuration parsing and validation.
//!
//! All settings live in a single TOML file (default `./config/ah.toml`).
//! Every field has a default, so a missing file is equivalent to an empty
//! one and yields [`Config::minimal`].
//!
//! ```toml
//! [export]
//! root = "."
//! output = "exports"
//! max_block_length = 40
//!
//! [export.markers]
//! block_patterns = [".Exec(", ".Run("]
//!
//! [schema]
//! namespace = "learning"
//! password_env = "NEO4J_PASSWORD"
//!
//! [agent]
//! port = 4096
//! isolated_port = 4097
//!
//! [logging]
//! dir = "~/.cache/scripts"
//! ```

use agent_harness_core::markers::MarkerSet;
use agent_harness_core::scan::DEFAULT_MAX_BLOCK_LENGTH;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable that overrides `agent.url`.
pub const AGENT_URL_ENV: &str = "OPENCODE_URL";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default = "default_api_root")]
    pub api_root: PathBuf,
    #[serde(default = "default_ignored_dirs")]
    pub ignored_dirs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_max_block_length")]
    pub max_block_length: usize,
    #[serde(default)]
    pub markers: MarkerSet,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            output: default_output(),
            api_root: default_api_root(),
            ignored_dirs: default_ignored_dirs(),
            exclude_globs: Vec::new(),
            max_block_length: default_max_block_length(),
            markers: MarkerSet::default(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_output() -> PathBuf {
    PathBuf::from("exports")
}
fn default_api_root() -> PathBuf {
    PathBuf::from("api")
}
fn default_ignored_dirs() -> Vec<String> {
    ["node_modules", "vendor", "neo4j", "dist"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_max_block_length() -> usize {
    DEFAULT_MAX_BLOCK_LENGTH
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchemaConfig {
    #[serde(default = "default_kubectl")]
    pub kubectl: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_container")]
    pub container: String,
    #[serde(default = "default_db_user")]
    pub user: String,
    /// Name of the environment variable holding the database password.
    #[serde(default = "default_password_env")]
    pub password_env: String,
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,
    #[serde(default = "default_schema_query")]
    pub query: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            kubectl: default_kubectl(),
            namespace: default_namespace(),
            container: default_container(),
            user: default_db_user(),
            password_env: default_password_env(),
            targets: default_targets(),
            query: default_schema_query(),
        }
    }
}

fn default_kubectl() -> String {
    "kubectl".to_string()
}
fn default_namespace() -> String {
    "learning".to_string()
}
fn default_container() -> String {
    "neo4j".to_string()
}
fn default_db_user() -> String {
    "neo4j".to_string()
}
fn default_password_env() -> String {
    "NEO4J_PASSWORD".to_string()
}
fn default_targets() -> Vec<String> {
    vec!["learning".to_string(), "resources".to_string()]
}
fn default_schema_query() -> String {
    "CALL apoc.meta.schema() YIELD value RETURN apoc.convert.toJson(value) AS schema".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    /// Agent server executable, spawned as `<binary> serve`.
    #[serde(default = "default_agent_binary")]
    pub binary: String,
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Port used by tools whose sessions live in the isolated data dir.
    #[serde(default = "default_isolated_port")]
    pub isolated_port: u16,
    /// Fixed server URL, overriding `hostname` and the port selection.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_isolated_data_dir")]
    pub isolated_data_dir: PathBuf,
    /// Working directory for the database oracle agent.
    #[serde(default = "default_metarepo_dir")]
    pub metarepo_dir: PathBuf,
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            binary: default_agent_binary(),
            hostname: default_hostname(),
            port: default_port(),
            isolated_port: default_isolated_port(),
            url: None,
            isolated_data_dir: default_isolated_data_dir(),
            metarepo_dir: default_metarepo_dir(),
            startup_timeout_secs: default_startup_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl AgentConfig {
    /// Base URL for a tool, honoring a configured `url` first.
    pub fn base_url(&self, isolated: bool) -> String {
        match &self.url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.hostname, self.port_for(isolated)),
        }
    }

    pub fn port_for(&self, isolated: bool) -> u16 {
        if isolated {
            self.isolated_port
        } else {
            self.port
        }
    }
}

fn default_agent_binary() -> String {
    "opencode".to_string()
}
// `localhost` rather than 127.0.0.1: tunnel setups route the two differently.
fn default_hostname() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    4096
}
fn default_isolated_port() -> u16 {
    4097
}
fn default_isolated_data_dir() -> PathBuf {
    home_dir().join(".cache").join("scripts").join("opencode-data")
}
fn default_metarepo_dir() -> PathBuf {
    home_dir().join("Coding").join("metarepo")
}
fn default_startup_timeout_secs() -> u64 {
    30
}
fn default_probe_timeout_secs() -> u64 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Root of the per-tool log directories.
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
        }
    }
}

fn default_log_dir() -> PathBuf {
    home_dir().join(".cache").join("scripts")
}

/// The user's home directory from `$HOME`, or `.` when unset.
pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

impl Config {
    /// All-defaults configuration, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    fn expand_paths(&mut self) {
        self.export.root = expand_home(&self.export.root);
        self.export.output = expand_home(&self.export.output);
        self.export.api_root = expand_home(&self.export.api_root);
        self.agent.isolated_data_dir = expand_home(&self.agent.isolated_data_dir);
        self.agent.metarepo_dir = expand_home(&self.agent.metarepo_dir);
        self.logging.dir = expand_home(&self.logging.dir);
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(AGENT_URL_ENV) {
            if !url.trim().is_empty() {
                self.agent.url = Some(url.trim().to_string());
            }
        }
    }
}

/// Load the configuration at `path`, falling back to defaults when the file
/// does not exist.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::minimal()
    };

    config.expand_paths();
    config.apply_env();
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.export.max_block_length == 0 {
        bail!("export.max_block_length must be > 0");
    }

    if config.schema.targets.is_empty() {
        bail!("schema.targets must list at least one target");
    }

    if config.agent.startup_timeout_secs == 0 {
        bail!("agent.startup_timeout_secs must be > 0");
    }

    if config.agent.probe_timeout_secs == 0 {
        bail!("agent.probe_timeout_secs must be > 0");
    }

    if let Some(url) = &config.agent.url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("agent.url must start with http:// or https://, got '{}'", url);
        }
    }

    Ok(())
}
