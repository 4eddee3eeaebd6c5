//! TOML configuration parsing for lbsim.
//!
//! Defines the configuration schema for a simulation run: pool size and run
//! length, the arrival stream, the admission filter, the scaling policy, and
//! where reports go.

use crate::admission::OctetRange;
use crate::generator::TickRange;
use lbsim_policy::ScalingParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub simulation: SimulationSection,
    #[serde(default)]
    pub arrivals: ArrivalsSection,
    #[serde(default)]
    pub admission: AdmissionSection,
    #[serde(default)]
    pub scaling: ScalingSection,
    #[serde(default)]
    pub report: ReportSection,
}

/// Run parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSection {
    /// Human-readable name for this simulation.
    #[serde(default = "default_sim_name")]
    pub name: String,
    /// Random seed. When absent the engine seeds from the wall clock once.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Workers in the pool at tick zero.
    pub initial_workers: u32,
    /// Number of ticks to simulate.
    pub run_ticks: u64,
    /// Requests queued per initial worker before the first tick.
    #[serde(default = "default_backlog_per_worker")]
    pub initial_backlog_per_worker: u32,
}

fn default_sim_name() -> String {
    "simulation".to_string()
}
fn default_backlog_per_worker() -> u32 {
    20
}

/// Synthetic arrival stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrivalsSection {
    /// Chance (in percent) that a new request arrives on a given tick.
    #[serde(default = "default_admission_percent")]
    pub admission_percent: u32,
    /// Service ticks for streaming jobs.
    #[serde(default = "default_streaming_ticks")]
    pub streaming_service_ticks: TickRange,
    /// Service ticks for batch jobs.
    #[serde(default = "default_batch_ticks")]
    pub batch_service_ticks: TickRange,
}

fn default_admission_percent() -> u32 {
    90
}
fn default_streaming_ticks() -> TickRange {
    TickRange::new(10, 13)
}
fn default_batch_ticks() -> TickRange {
    TickRange::new(20, 30)
}

impl Default for ArrivalsSection {
    fn default() -> Self {
        Self {
            admission_percent: default_admission_percent(),
            streaming_service_ticks: default_streaming_ticks(),
            batch_service_ticks: default_batch_ticks(),
        }
    }
}

/// Admission filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionSection {
    /// Leading origin octets that are refused entry.
    #[serde(default = "default_blocked_range")]
    pub blocked_range: OctetRange,
}

fn default_blocked_range() -> OctetRange {
    OctetRange::new(192, 192)
}

impl Default for AdmissionSection {
    fn default() -> Self {
        Self {
            blocked_range: default_blocked_range(),
        }
    }
}

/// What to do when the policy asks to shrink the pool but the newest worker
/// is still serving a request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDownMode {
    /// Skip the scale-down this tick; no cooldown is started.
    #[default]
    RequireIdle,
    /// Remove the worker anyway and discard its in-flight request.
    DropInFlight,
}

/// Autoscaling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingSection {
    /// Policy name (see `lbsim_policy::available_policies`).
    #[serde(default = "default_policy")]
    pub policy: String,
    /// Ticks to wait after a scaling action before the next one.
    #[serde(default = "default_cooldown")]
    pub cooldown_ticks: u32,
    #[serde(default = "default_scale_up_factor")]
    pub scale_up_factor: u32,
    #[serde(default = "default_scale_down_factor")]
    pub scale_down_factor: u32,
    #[serde(default)]
    pub scale_down: ScaleDownMode,
}

fn default_policy() -> String {
    "hysteresis".to_string()
}
fn default_cooldown() -> u32 {
    3
}
fn default_scale_up_factor() -> u32 {
    25
}
fn default_scale_down_factor() -> u32 {
    15
}

impl Default for ScalingSection {
    fn default() -> Self {
        Self {
            policy: default_policy(),
            cooldown_ticks: default_cooldown(),
            scale_up_factor: default_scale_up_factor(),
            scale_down_factor: default_scale_down_factor(),
            scale_down: ScaleDownMode::default(),
        }
    }
}

impl From<&ScalingSection> for ScalingParams {
    fn from(s: &ScalingSection) -> Self {
        ScalingParams {
            scale_up_factor: s.scale_up_factor,
            scale_down_factor: s.scale_down_factor,
            min_workers: 1,
        }
    }
}

/// Report destinations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    /// Print a console line every this many ticks (0 disables).
    #[serde(default = "default_console_interval")]
    pub console_interval: u64,
    /// CSV state log, one row per tick.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// JSONL state trace, one record per tick.
    #[serde(default)]
    pub trace_file: Option<PathBuf>,
}

fn default_console_interval() -> u64 {
    50
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            console_interval: default_console_interval(),
            log_file: None,
            trace_file: None,
        }
    }
}

impl SimConfig {
    /// Default configuration for a pool of `initial_workers` run for `run_ticks`.
    pub fn new(initial_workers: u32, run_ticks: u64) -> Self {
        Self {
            simulation: SimulationSection {
                name: default_sim_name(),
                seed: None,
                initial_workers,
                run_ticks,
                initial_backlog_per_worker: default_backlog_per_worker(),
            },
            arrivals: ArrivalsSection::default(),
            admission: AdmissionSection::default(),
            scaling: ScalingSection::default(),
            report: ReportSection::default(),
        }
    }

    /// Same configuration with a pinned seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.simulation.seed = Some(seed);
        self
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulation.initial_workers < 1 {
            return Err(ConfigError::Validation(
                "initial_workers must be at least 1".to_string(),
            ));
        }
        if self.simulation.run_ticks < 1 {
            return Err(ConfigError::Validation(
                "run_ticks must be at least 1".to_string(),
            ));
        }
        if self.arrivals.admission_percent > 100 {
            return Err(ConfigError::Validation(format!(
                "admission_percent must be within 0..=100, got {}",
                self.arrivals.admission_percent
            )));
        }
        for (name, range) in [
            ("streaming_service_ticks", self.arrivals.streaming_service_ticks),
            ("batch_service_ticks", self.arrivals.batch_service_ticks),
        ] {
            if !range.is_valid() {
                return Err(ConfigError::Validation(format!(
                    "{} must satisfy 1 <= low <= high, got {}..={}",
                    name, range.low, range.high
                )));
            }
        }
        let blocked = self.admission.blocked_range;
        if blocked.low > blocked.high {
            return Err(ConfigError::Validation(format!(
                "blocked_range low ({}) exceeds high ({})",
                blocked.low, blocked.high
            )));
        }
        if self.scaling.scale_down_factor > self.scaling.scale_up_factor {
            return Err(ConfigError::Validation(format!(
                "scale_down_factor ({}) must not exceed scale_up_factor ({})",
                self.scaling.scale_down_factor, self.scaling.scale_up_factor
            )));
        }
        if !lbsim_policy::available_policies().contains(&self.scaling.policy.as_str()) {
            return Err(ConfigError::Validation(format!(
                "unknown scaling policy {:?}; available: {:?}",
                self.scaling.policy,
                lbsim_policy::available_policies()
            )));
        }
        Ok(())
    }

    /// Scaling thresholds for the policy crate.
    pub fn scaling_params(&self) -> ScalingParams {
        (&self.scaling).into()
    }

    /// Number of requests queued before the first tick.
    pub fn initial_backlog(&self) -> u64 {
        self.simulation.initial_workers as u64 * self.simulation.initial_backlog_per_worker as u64
    }
}
