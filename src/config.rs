// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Gateway configuration.
//!
//! Loaded once at startup from JSON (or YAML for `.yaml`/`.yml` files), then
//! adjusted by environment overrides. Everything downstream receives an
//! immutable, already-validated value.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::engine::rules::{default_rules, RuleSet, RuleSpec};
use crate::engine_core::constants::{alerting, config as keys, limits};
use crate::engine_core::errors::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(GatewayError::Config(format!("unknown log level '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            other => Err(GatewayError::Config(format!("unknown log format '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub level: LogLevel,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::Info,
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub audit_log: PathBuf,
    pub include_message_content: bool,
    /// Record matched text verbatim instead of a masked preview
    pub include_matches: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            audit_log: home_dir().join(keys::HOME_DIR_NAME).join(keys::AUDIT_FILE_NAME),
            include_message_content: true,
            include_matches: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanningConfig {
    pub enabled: bool,
    /// Scan client->server traffic
    pub scan_request: bool,
    /// Scan server->client traffic
    pub scan_response: bool,
    pub blocking_enabled: bool,
    pub max_buffer_bytes: usize,
    /// `None` selects the built-in rule catalogue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<RuleSpec>>,
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_request: true,
            scan_response: true,
            blocking_enabled: true,
            max_buffer_bytes: limits::MAX_MESSAGE_SIZE_BYTES,
            rules: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: None,
            timeout_secs: alerting::DEFAULT_WEBHOOK_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub logging: LoggingConfig,
    pub auditing: AuditConfig,
    pub scanning: ScanningConfig,
    pub alerting: AlertingConfig,
    pub metrics: MetricsConfig,
}

impl GatewayConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, GatewayError> {
        let path = expand_tilde(path);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            GatewayError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::parse(&content, &path)?;
        config.auditing.audit_log = expand_tilde(&config.auditing.audit_log);
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, GatewayError> {
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml {
            serde_yaml_ng::from_str(content)
                .map_err(|e| GatewayError::Config(format!("{}: {}", path.display(), e)))
        } else {
            serde_json::from_str(content)
                .map_err(|e| GatewayError::Config(format!("{}: {}", path.display(), e)))
        }
    }

    /// Resolve the effective configuration.
    ///
    /// An explicit path or `MCP_GATEWAY_CONFIG` must point at a readable
    /// file. Otherwise the default location is used when it exists, and the
    /// built-in defaults when it does not. Environment overrides for logging
    /// are applied last. Returns the file that was loaded, if any.
    pub fn resolve(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), GatewayError> {
        let from_env = env::var(keys::ENV_CONFIG_PATH)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let (mut config, source) = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => (Self::load(&path)?, Some(path)),
            None => {
                let default = default_config_path();
                if default.exists() {
                    (Self::load(&default)?, Some(default))
                } else {
                    (Self::default(), None)
                }
            }
        };

        config.apply_overrides(
            env::var(keys::ENV_LOG_LEVEL).ok().as_deref(),
            env::var(keys::ENV_LOG_FORMAT).ok().as_deref(),
        )?;
        Ok((config, source))
    }

    pub fn apply_overrides(
        &mut self,
        level: Option<&str>,
        format: Option<&str>,
    ) -> Result<(), GatewayError> {
        if let Some(level) = level {
            self.logging.level = level.parse()?;
        }
        if let Some(format) = format {
            self.logging.format = format.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.scanning.max_buffer_bytes == 0 {
            return Err(GatewayError::Config(
                "scanning.max_buffer_bytes must be greater than zero".to_string(),
            ));
        }
        if self.alerting.enabled && self.alerting.timeout_secs == 0 {
            return Err(GatewayError::Config(
                "alerting.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Configured rules, or the built-in catalogue when none are configured.
    pub fn rule_specs(&self) -> Vec<RuleSpec> {
        self.scanning.rules.clone().unwrap_or_else(default_rules)
    }

    pub fn build_rules(&self) -> RuleSet {
        RuleSet::build(&self.rule_specs())
    }

    /// Default configuration with the rule catalogue written out.
    pub fn with_default_rules() -> Self {
        let mut config = Self::default();
        config.scanning.rules = Some(default_rules());
        config
    }

    pub fn to_json_pretty(&self) -> Result<String, GatewayError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write this configuration as pretty JSON, creating parent directories.
    pub fn write_to(&self, path: &Path, force: bool) -> Result<(), GatewayError> {
        if path.exists() && !force {
            return Err(GatewayError::Config(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json_pretty()? + "\n")?;
        Ok(())
    }
}

fn home_dir() -> PathBuf {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_config_path() -> PathBuf {
    home_dir().join(keys::HOME_DIR_NAME).join(keys::CONFIG_FILE_NAME)
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}
