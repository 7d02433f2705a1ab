// src/config.rs

//! Manages daemon configuration: loading, defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    pub elasticsearch: ElasticsearchConfig,
    pub queue: QueueConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub observer: ObserverConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElasticsearchConfig {
    /// Base URL of the cluster, e.g. `http://localhost:9200/`.
    pub url: Url,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// URL of the managed queue receiving lifecycle notifications.
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    /// Maximum concurrently handled messages; 0 means unbounded up to the
    /// per-call receive ceiling.
    #[serde(default)]
    pub max_concurrent: usize,
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde", default = "default_initial_visibility_timeout")]
    pub initial_visibility_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_max_visibility_timeout")]
    pub max_visibility_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_comm_buffer")]
    pub comm_buffer: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 0,
            poll_interval: default_poll_interval(),
            initial_visibility_timeout: default_initial_visibility_timeout(),
            max_visibility_timeout: default_max_visibility_timeout(),
            comm_buffer: default_comm_buffer(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    /// Time reserved before each hook boundary for condition evaluation and
    /// the heartbeat round trip.
    #[serde(with = "humantime_serde", default = "default_comm_buffer")]
    pub comm_buffer: Duration,
    /// Minimum remaining global-timeout budget required to re-enqueue a
    /// partially handled event.
    #[serde(with = "humantime_serde", default = "default_reenqueue_safety_margin")]
    pub reenqueue_safety_margin: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            comm_buffer: default_comm_buffer(),
            reenqueue_safety_margin: default_reenqueue_safety_margin(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObserverConfig {
    #[serde(default = "default_observer_enabled")]
    pub enabled: bool,
    #[serde(with = "humantime_serde", default = "default_observer_interval")]
    pub interval: Duration,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            enabled: default_observer_enabled(),
            interval: default_observer_interval(),
        }
    }
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Serve /metrics over HTTP when true.
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    /// Listen port for the exporter.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}
fn default_initial_visibility_timeout() -> Duration {
    Duration::from_secs(60)
}
fn default_max_visibility_timeout() -> Duration {
    Duration::from_secs(900)
}
fn default_comm_buffer() -> Duration {
    Duration::from_secs(5)
}
fn default_reenqueue_safety_margin() -> Duration {
    Duration::from_secs(10)
}
fn default_observer_enabled() -> bool {
    true
}
fn default_observer_interval() -> Duration {
    Duration::from_secs(60)
}
fn default_metrics_enabled() -> bool {
    true
}
fn default_metrics_port() -> u16 {
    9122
}

impl Config {
    /// Loads and validates the configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("could not read config file '{path}'"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("invalid TOML in '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects combinations the dispatcher and keep-alive loops cannot
    /// honor, before any of them starts.
    pub fn validate(&self) -> Result<()> {
        if self.queue.url.trim().is_empty() {
            return Err(anyhow!("queue.url cannot be empty"));
        }
        if self.dispatcher.poll_interval.is_zero() {
            return Err(anyhow!("dispatcher.poll_interval cannot be 0"));
        }
        if self.dispatcher.comm_buffer.is_zero() {
            return Err(anyhow!("dispatcher.comm_buffer cannot be 0"));
        }
        if self.dispatcher.comm_buffer >= self.dispatcher.initial_visibility_timeout {
            return Err(anyhow!(
                "dispatcher.comm_buffer must be below dispatcher.initial_visibility_timeout"
            ));
        }
        if self.dispatcher.initial_visibility_timeout > self.dispatcher.max_visibility_timeout {
            return Err(anyhow!(
                "dispatcher.initial_visibility_timeout cannot exceed dispatcher.max_visibility_timeout"
            ));
        }
        if self.lifecycle.comm_buffer.is_zero() {
            return Err(anyhow!("lifecycle.comm_buffer cannot be 0"));
        }
        if self.observer.enabled && self.observer.interval.is_zero() {
            return Err(anyhow!("observer.interval cannot be 0"));
        }
        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(anyhow!("metrics.port cannot be 0"));
        }
        Ok(())
    }
}
