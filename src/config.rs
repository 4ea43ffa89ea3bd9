// src/config.rs

//! Manages gateway configuration: loading, resolving stage names, and validation.

use crate::core::pipeline::DecisionPolicy;
use crate::core::pipeline::stages::StageKind;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::warn;

/// Limits applied to every client connection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LimitsConfig {
    /// The largest request head accepted, in bytes.
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
    /// How long a client may take to deliver a complete request.
    #[serde(with = "humantime_serde", default = "default_assembly_timeout")]
    pub assembly_timeout: Duration,
    /// How long a dispatched request may wait for the pipeline before a 504.
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,
    /// How often the gateway checks for stalled and timed out connections.
    #[serde(with = "humantime_serde", default = "default_sweep_interval")]
    pub sweep_interval: Duration,
}

fn default_max_request_size() -> usize {
    8192
}
fn default_assembly_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_sweep_interval() -> Duration {
    Duration::from_millis(250)
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_size: default_max_request_size(),
            assembly_timeout: default_assembly_timeout(),
            request_timeout: default_request_timeout(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// Configuration for the work queues between the gateway and the stages.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct QueueConfig {
    /// The most units a queue holds before rejecting. Unbounded when absent.
    #[serde(default)]
    pub depth: Option<usize>,
}

/// How stages decide whether to fail a unit.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FailurePolicyConfig {
    #[default]
    AlwaysSucceed,
    AlwaysFail,
    IdentityParity,
    Random {
        seed: u64,
        failure_ratio: f64,
    },
}

impl FailurePolicyConfig {
    pub fn to_policy(&self) -> DecisionPolicy {
        match self {
            FailurePolicyConfig::AlwaysSucceed => DecisionPolicy::AlwaysSucceed,
            FailurePolicyConfig::AlwaysFail => DecisionPolicy::AlwaysFail,
            FailurePolicyConfig::IdentityParity => DecisionPolicy::identity_parity(),
            FailurePolicyConfig::Random {
                seed,
                failure_ratio,
            } => DecisionPolicy::seeded_random(*seed, *failure_ratio),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
struct RawPipelineConfig {
    #[serde(default = "default_stages")]
    stages: Vec<String>,
    #[serde(default = "default_workers_per_stage")]
    workers_per_stage: usize,
    #[serde(default)]
    failure_policy: FailurePolicyConfig,
}

impl Default for RawPipelineConfig {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            workers_per_stage: default_workers_per_stage(),
            failure_policy: FailurePolicyConfig::default(),
        }
    }
}

fn default_stages() -> Vec<String> {
    vec!["parse".to_string(), "primality".to_string()]
}
fn default_workers_per_stage() -> usize {
    4
}

/// The resolved pipeline layout.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub stages: Vec<StageKind>,
    pub workers_per_stage: usize,
    pub failure_policy: FailurePolicyConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages: vec![StageKind::Parse, StageKind::Primality],
            workers_per_stage: default_workers_per_stage(),
            failure_policy: FailurePolicyConfig::default(),
        }
    }
}

/// Timeouts for a graceful stop.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ShutdownConfig {
    /// How long to wait for in-flight requests before stopping.
    #[serde(with = "humantime_serde", default = "default_drain_timeout")]
    pub drain_timeout: Duration,
    /// How long to wait for background tasks once stopping.
    #[serde(with = "humantime_serde", default = "default_shutdown_timeout")]
    pub shutdown_timeout: Duration,
}

fn default_drain_timeout() -> Duration {
    Duration::from_secs(28)
}
fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(1)
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: default_drain_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    8878
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_max_clients")]
    max_clients: usize,
    #[serde(default)]
    limits: LimitsConfig,
    #[serde(default)]
    queue: QueueConfig,
    #[serde(default)]
    pipeline: RawPipelineConfig,
    #[serde(default)]
    health_check_path: Option<String>,
    #[serde(default)]
    shutdown: ShutdownConfig,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8002
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_clients() -> usize {
    10000
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub max_clients: usize,
    pub limits: LimitsConfig,
    pub queue: QueueConfig,
    pub pipeline: PipelineConfig,
    pub health_check_path: Option<String>,
    pub shutdown: ShutdownConfig,
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            max_clients: default_max_clients(),
            limits: LimitsConfig::default(),
            queue: QueueConfig::default(),
            pipeline: PipelineConfig::default(),
            health_check_path: None,
            shutdown: ShutdownConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid configuration in '{path}'"))
    }

    /// Parses, resolves and validates a TOML configuration document.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let raw_config: RawConfig =
            toml::from_str(contents).context("Failed to parse configuration TOML")?;

        let stages = raw_config
            .pipeline
            .stages
            .iter()
            .map(|name| {
                name.parse::<StageKind>()
                    .map_err(|_| anyhow!("Unknown pipeline stage '{name}'"))
            })
            .collect::<Result<Vec<_>>>()?;

        let config = Config {
            host: raw_config.host,
            port: raw_config.port,
            log_level: raw_config.log_level,
            max_clients: raw_config.max_clients,
            limits: raw_config.limits,
            queue: raw_config.queue,
            pipeline: PipelineConfig {
                stages,
                workers_per_stage: raw_config.pipeline.workers_per_stage,
                failure_policy: raw_config.pipeline.failure_policy,
            },
            health_check_path: raw_config.health_check_path,
            shutdown: raw_config.shutdown,
            metrics: raw_config.metrics,
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the gateway cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients must be greater than 0"));
        }

        if self.limits.max_request_size < 16 {
            return Err(anyhow!("limits.max_request_size must be at least 16 bytes"));
        }
        for (name, value) in [
            ("limits.assembly_timeout", self.limits.assembly_timeout),
            ("limits.request_timeout", self.limits.request_timeout),
            ("limits.sweep_interval", self.limits.sweep_interval),
        ] {
            if value.is_zero() {
                return Err(anyhow!("{name} must be greater than 0"));
            }
        }

        if self.queue.depth == Some(0) {
            warn!("WARNING: queue.depth is 0. Every request will be rejected with a 500.");
        }

        if self.pipeline.stages.is_empty() {
            return Err(anyhow!("pipeline.stages must name at least one stage"));
        }
        if self.pipeline.workers_per_stage == 0 {
            return Err(anyhow!("pipeline.workers_per_stage must be greater than 0"));
        }
        if let FailurePolicyConfig::Random { failure_ratio, .. } = self.pipeline.failure_policy
            && !(0.0..=1.0).contains(&failure_ratio)
        {
            return Err(anyhow!(
                "pipeline.failure_policy.failure_ratio must be between 0 and 1"
            ));
        }

        if let Some(path) = &self.health_check_path
            && !path.starts_with('/')
        {
            return Err(anyhow!("health_check_path must start with '/'"));
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.port {
                return Err(anyhow!(
                    "metrics.port cannot be the same as the main server port"
                ));
            }
        }
        Ok(())
    }
}
