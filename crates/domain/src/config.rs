//! Process configuration (§6 "Configuration").
//!
//! Follows the teacher's per-section, `#[serde(default)]`-everywhere
//! pattern so a partial `config.toml` (or none at all) still resolves
//! to sane defaults.

use std::fmt;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub turns: TurnsConfig,
}

impl Config {
    /// Validate the resolved config, returning zero or more issues.
    /// Mirrors the teacher's `ConfigError`/`ConfigSeverity` pattern —
    /// warnings are logged, errors abort startup.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.turns.max_tool_rounds == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "turns.max_tool_rounds".into(),
                message: "max_tool_rounds=0 means every tool_use is immediately \
                          hard-limited; this is a valid but unusual configuration"
                    .into(),
            });
        }
        if self.turns.default_model.trim().is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "turns.default_model".into(),
                message: "default_model must not be empty".into(),
            });
        }
        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: d_bind_addr() }
    }
}

fn d_bind_addr() -> String {
    "127.0.0.1:8080".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory for the JSONL-backed reference repositories.
    #[serde(default = "d_state_dir")]
    pub state_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { state_dir: d_state_dir() }
    }
}

fn d_state_dir() -> String {
    "./data".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turns / tool-round limits / environment / debug / retention
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The recognized options of spec.md §6 "Configuration".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnsConfig {
    #[serde(default = "d_default_provider")]
    pub default_provider: String,
    #[serde(default = "d_default_model")]
    pub default_model: String,
    /// Soft limit `S`. Hard limit is always `2 * max_tool_rounds`.
    #[serde(default = "d_max_tool_rounds")]
    pub max_tool_rounds: u32,
    /// Gates SSE event-ID emission and verbose logs.
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub environment: Environment,
    /// How long a finished stream stays registered for late reconnects.
    #[serde(default = "d_retention_secs")]
    pub stream_retention_secs: u64,
}

impl Default for TurnsConfig {
    fn default() -> Self {
        Self {
            default_provider: d_default_provider(),
            default_model: d_default_model(),
            max_tool_rounds: d_max_tool_rounds(),
            debug: false,
            environment: Environment::default(),
            stream_retention_secs: d_retention_secs(),
        }
    }
}

impl TurnsConfig {
    pub fn hard_tool_round_limit(&self) -> u32 {
        self.max_tool_rounds.saturating_mul(2)
    }
}

fn d_default_provider() -> String {
    "default".into()
}
fn d_default_model() -> String {
    "gateway/default".into()
}
fn d_max_tool_rounds() -> u32 {
    5
}
fn d_retention_secs() -> u64 {
    600
}

/// Environment tag. Tools in `request_params` are only accepted in
/// `Dev`/`Test` (spec.md §4.1, §9 "Tools in production").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Dev,
    Test,
    Production,
}

impl Environment {
    pub fn allows_request_tools(self) -> bool {
        matches!(self, Self::Dev | Self::Test)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation issues
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_errors() {
        let cfg = Config::default();
        let issues = cfg.validate();
        assert!(issues.iter().all(|i| i.severity != ConfigSeverity::Error));
    }

    #[test]
    fn empty_default_model_is_an_error() {
        let mut cfg = Config::default();
        cfg.turns.default_model = String::new();
        let issues = cfg.validate();
        assert!(issues.iter().any(|i| i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn hard_limit_is_double_soft_limit() {
        let mut cfg = TurnsConfig::default();
        cfg.max_tool_rounds = 5;
        assert_eq!(cfg.hard_tool_round_limit(), 10);
    }

    #[test]
    fn parses_partial_toml() {
        let cfg: Config = toml::from_str("[turns]\ndebug = true\n").unwrap();
        assert!(cfg.turns.debug);
        assert_eq!(cfg.turns.max_tool_rounds, 5);
    }
}
