use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

const DEFAULT_CONFIG_PATH: &str = "/etc/sentineld/sentineld.toml";
const ENV_CONFIG_PATH: &str = "SENTINELD_CONFIG";

/// Daemon-wide configuration, loaded once at start-up. A missing or
/// unparseable file is not fatal here -- only a missing *rules* file is
/// (see [`crate::rules::RuleSet::load`]), since this file only tunes
/// ambient behaviour the daemon can run without.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub rules: RulesFileConfig,
}

impl Config {
    /// Load configuration from file. The path can be overridden with the
    /// `SENTINELD_CONFIG` environment variable. If the file is missing or
    /// fails to parse, defaults are returned.
    pub fn load() -> Self {
        let path =
            std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let path = PathBuf::from(path);
        match fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
            Err(_) => Config::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// Cap on events handed to the rule engine per second per channel;
    /// above the cap, events are sampled (one in ten kept) rather than
    /// evaluated against every rule. 0 disables the cap.
    #[serde(default = "default_events_rate_cap")]
    pub events_rate_cap: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            events_rate_cap: default_events_rate_cap(),
        }
    }
}

fn default_events_rate_cap() -> u64 {
    100_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_alerts_file")]
    pub alerts_file: String,
    #[serde(default = "default_journald")]
    pub journald: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            alerts_file: default_alerts_file(),
            journald: default_journald(),
        }
    }
}

fn default_alerts_file() -> String {
    "/var/log/sentineld/alerts.log".to_string()
}

fn default_journald() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct RulesFileConfig {
    #[serde(default = "default_rules_file")]
    pub path: String,
}

impl Default for RulesFileConfig {
    fn default() -> Self {
        Self {
            path: default_rules_file(),
        }
    }
}

fn default_rules_file() -> String {
    "configs/security_rules.yaml".to_string()
}
