// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Global daemon configuration: TOML file under a single `[otus]` root
//! key, overridable by `OTUS_<DOTTED_PATH>` environment variables
//! (spec §6).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("config invalid: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub otus: OtusConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OtusConfig {
    #[serde(default = "default_control_socket_path")]
    pub control_socket_path: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub kafka: KafkaClusterConfig,
    #[serde(default)]
    pub command_channel: CommandChannelConfig,
    #[serde(default)]
    pub backpressure: BackpressureConfig,
    #[serde(default)]
    pub decoder: otus_core::DecoderSpec,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Role name → default `TaskConfig` for the `task_start`/`task_stop`
    /// shorthand (spec §4.9): resolves a default TaskConfig for the
    /// agent's role, which `task_start{role}` creates and `task_stop{role}`
    /// deletes by the same id (see DESIGN.md).
    #[serde(default)]
    pub roles: HashMap<String, otus_core::TaskConfig>,
}

impl Default for OtusConfig {
    fn default() -> Self {
        Self {
            control_socket_path: default_control_socket_path(),
            data_dir: default_data_dir(),
            log: LogConfig::default(),
            metrics: MetricsConfig::default(),
            kafka: KafkaClusterConfig::default(),
            command_channel: CommandChannelConfig::default(),
            backpressure: BackpressureConfig::default(),
            decoder: otus_core::DecoderSpec::default(),
            persistence: PersistenceConfig::default(),
            roles: HashMap::new(),
        }
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self { otus: OtusConfig::default() }
    }
}

fn default_control_socket_path() -> PathBuf {
    PathBuf::from("/var/run/otus/control.sock")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/otus")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_collect_interval_secs")]
    pub collect_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { listen_addr: default_metrics_listen_addr(), collect_interval_secs: default_collect_interval_secs() }
    }
}

fn default_metrics_listen_addr() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_collect_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct KafkaClusterConfig {
    #[serde(default)]
    pub brokers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandChannelConfig {
    #[serde(default)]
    pub kafka: CommandChannelKafkaConfig,
}

impl Default for CommandChannelConfig {
    fn default() -> Self {
        Self { kafka: CommandChannelKafkaConfig::default() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandChannelKafkaConfig {
    #[serde(default)]
    pub brokers: Vec<String>,
    #[serde(default = "default_command_topic")]
    pub topic: String,
    #[serde(default)]
    pub response_topic: Option<String>,
    #[serde(default = "default_command_ttl_secs")]
    pub command_ttl_secs: u64,
}

impl Default for CommandChannelKafkaConfig {
    fn default() -> Self {
        Self { brokers: Vec::new(), topic: default_command_topic(), response_topic: None, command_ttl_secs: default_command_ttl_secs() }
    }
}

fn default_command_topic() -> String {
    "otus-commands".to_string()
}

fn default_command_ttl_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackpressureConfig {
    #[serde(default = "default_channel_capacity")]
    pub pipeline_channel_capacity: usize,
    #[serde(default = "default_channel_capacity")]
    pub send_buffer_capacity: usize,
    #[serde(default = "default_high_watermark")]
    pub send_buffer_high_watermark: f64,
    #[serde(default = "default_low_watermark")]
    pub send_buffer_low_watermark: f64,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            pipeline_channel_capacity: default_channel_capacity(),
            send_buffer_capacity: default_channel_capacity(),
            send_buffer_high_watermark: default_high_watermark(),
            send_buffer_low_watermark: default_low_watermark(),
        }
    }
}

fn default_channel_capacity() -> usize {
    65_536
}

fn default_high_watermark() -> f64 {
    0.8
}

fn default_low_watermark() -> f64 {
    0.3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_max_task_history")]
    pub max_task_history: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { max_task_history: default_max_task_history() }
    }
}

fn default_max_task_history() -> usize {
    200
}

impl CommandChannelKafkaConfig {
    /// Brokers inherit from `[otus.kafka]` when this block's own list is
    /// empty (spec §6: "inherits brokers/auth from the global kafka block
    /// when unset here").
    pub fn effective_brokers<'a>(&'a self, global: &'a KafkaClusterConfig) -> &'a [String] {
        if self.brokers.is_empty() {
            &global.brokers
        } else {
            &self.brokers
        }
    }
}

impl GlobalConfig {
    /// Loads and validates the config file at `path`, then applies
    /// `OTUS_<DOTTED_PATH_UPPERCASED_WITH_UNDERSCORES>` environment
    /// overrides (spec §6), reading from the process environment.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let mut config: GlobalConfig = toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        config.apply_env_overrides(&std::env::vars().collect::<HashMap<_, _>>());
        config.validate()?;
        Ok(config)
    }

    /// Handles the subset of overrides spec §6 names explicitly
    /// (`OTUS_KAFKA_BROKERS`, `OTUS_LOG_LEVEL`); unrecognized `OTUS_*`
    /// keys are ignored rather than rejected, since the override surface
    /// only needs to cover fields operators actually templatize per
    /// deployment.
    fn apply_env_overrides(&mut self, env: &HashMap<String, String>) {
        if let Some(level) = env.get("OTUS_LOG_LEVEL") {
            self.otus.log.level = level.clone();
        }
        if let Some(format) = env.get("OTUS_LOG_FORMAT") {
            self.otus.log.format = format.clone();
        }
        if let Some(brokers) = env.get("OTUS_KAFKA_BROKERS") {
            self.otus.kafka.brokers = brokers.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Some(addr) = env.get("OTUS_METRICS_LISTEN_ADDR") {
            self.otus.metrics.listen_addr = addr.clone();
        }
        if let Some(socket) = env.get("OTUS_CONTROL_SOCKET_PATH") {
            self.otus.control_socket_path = PathBuf::from(socket);
        }
        if let Some(dir) = env.get("OTUS_DATA_DIR") {
            self.otus.data_dir = PathBuf::from(dir);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.otus.backpressure.send_buffer_low_watermark >= self.otus.backpressure.send_buffer_high_watermark {
            return Err(ConfigError::Invalid("backpressure.send_buffer_low_watermark must be < high_watermark".to_string()));
        }
        Ok(())
    }

    /// Which fields a `config_reload` command may change without a
    /// restart (spec §4.9): log level/format and the metrics collect
    /// interval. Everything else requires a restart to take effect.
    pub fn hot_reloadable_diff(&self, new: &GlobalConfig) -> Vec<String> {
        let mut requires_restart = Vec::new();
        if self.otus.control_socket_path != new.otus.control_socket_path {
            requires_restart.push("control_socket_path".to_string());
        }
        if self.otus.data_dir != new.otus.data_dir {
            requires_restart.push("data_dir".to_string());
        }
        if self.otus.kafka.brokers != new.otus.kafka.brokers {
            requires_restart.push("kafka.brokers".to_string());
        }
        if self.otus.command_channel.kafka.topic != new.otus.command_channel.kafka.topic {
            requires_restart.push("command_channel.kafka.topic".to_string());
        }
        requires_restart
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_documented_values() {
        let config = GlobalConfig::default();
        assert_eq!(config.otus.persistence.max_task_history, 200);
        assert_eq!(config.otus.command_channel.kafka.command_ttl_secs, 300);
        assert_eq!(config.otus.backpressure.pipeline_channel_capacity, 65_536);
    }

    #[test]
    fn command_channel_kafka_inherits_brokers_when_unset() {
        let global = KafkaClusterConfig { brokers: vec!["broker-a:9092".to_string()] };
        let channel = CommandChannelKafkaConfig::default();
        assert_eq!(channel.effective_brokers(&global), &["broker-a:9092".to_string()]);
    }

    #[test]
    fn command_channel_kafka_keeps_own_brokers_when_set() {
        let global = KafkaClusterConfig { brokers: vec!["broker-a:9092".to_string()] };
        let channel = CommandChannelKafkaConfig { brokers: vec!["broker-b:9092".to_string()], ..Default::default() };
        assert_eq!(channel.effective_brokers(&global), &["broker-b:9092".to_string()]);
    }

    #[test]
    fn env_override_replaces_log_level() {
        let mut config = GlobalConfig::default();
        let mut env = HashMap::new();
        env.insert("OTUS_LOG_LEVEL".to_string(), "debug".to_string());
        config.apply_env_overrides(&env);
        assert_eq!(config.otus.log.level, "debug");
    }

    #[test]
    fn env_override_splits_broker_list_on_comma() {
        let mut config = GlobalConfig::default();
        let mut env = HashMap::new();
        env.insert("OTUS_KAFKA_BROKERS".to_string(), "a:9092, b:9092".to_string());
        config.apply_env_overrides(&env);
        assert_eq!(config.otus.kafka.brokers, vec!["a:9092".to_string(), "b:9092".to_string()]);
    }

    #[test]
    fn invalid_watermarks_fail_validation() {
        let mut config = GlobalConfig::default();
        config.otus.backpressure.send_buffer_low_watermark = 0.9;
        config.otus.backpressure.send_buffer_high_watermark = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_full_example_toml() {
        let raw = r#"
[otus]
control_socket_path = "/tmp/otus.sock"
data_dir = "/tmp/otus-data"

[otus.log]
level = "debug"

[otus.kafka]
brokers = ["localhost:9092"]

[otus.command_channel.kafka]
topic = "otus-commands"
response_topic = "otus-responses"

[otus.persistence]
max_task_history = 50
"#;
        let config: GlobalConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.otus.log.level, "debug");
        assert_eq!(config.otus.persistence.max_task_history, 50);
        assert_eq!(config.otus.command_channel.kafka.response_topic.as_deref(), Some("otus-responses"));
    }
}
