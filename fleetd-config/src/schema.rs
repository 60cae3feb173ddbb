use super::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level controller configuration, loaded once at startup and rebuilt
/// wholesale on `reconfigure`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub cluster_name: String,
    /// Local node identity override (spec.md §6 `NODENAME`).
    pub node_name: Option<String>,
    pub listen_addr: String,
    pub state_save_dir: PathBuf,
    pub credential_key_path: Option<PathBuf>,
    pub scheduler: SchedulerConfig,
    pub security: SecurityConfig,
    pub telemetry: TelemetryConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cluster_name: "default".to_string(),
            node_name: None,
            listen_addr: "0.0.0.0:6817".to_string(),
            state_save_dir: PathBuf::from("/var/spool/fleetd"),
            credential_key_path: None,
            scheduler: SchedulerConfig::default(),
            security: SecurityConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.cluster_name.is_empty() {
            return Err(ConfigError::Invalid(
                "cluster_name must not be empty".to_string(),
            ));
        }
        self.scheduler.validate()?;
        self.telemetry.validate()?;
        Ok(())
    }
}

/// Scheduling pipeline (C6) and completion reconciler (C8) tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Node is marked NoRespond after this many seconds without a heartbeat.
    pub agent_timeout_secs: u64,
    /// Node is marked Down after this many additional seconds of silence.
    pub node_down_grace_secs: u64,
    /// Seconds a Completing/Cancelled job is retained before deletion.
    pub min_job_age_secs: u64,
    /// Highest job id before wraparound with gap search (spec.md §4.1).
    pub max_job_id: u32,
    /// Defer-mode: completion events only save state; a timer drives the
    /// scheduling pass instead (spec.md §4.6).
    pub defer: bool,
    pub defer_interval_secs: u64,
    /// When unset, hardware reported at registration must match config.
    pub fast_schedule: bool,
    /// When set, a config-hash mismatch at registration is non-fatal.
    pub no_conf_hash: bool,
    /// Default per-job restart budget consumed by `JobExitRequeue`
    /// (admin-initiated requeue does not consume it, per spec.md §9).
    pub default_restart_budget: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            agent_timeout_secs: 300,
            node_down_grace_secs: 300,
            min_job_age_secs: 300,
            max_job_id: u32::MAX >> 1,
            defer: false,
            defer_interval_secs: 2,
            fast_schedule: true,
            no_conf_hash: false,
            default_restart_budget: 1,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_job_id < 1000 {
            return Err(ConfigError::Invalid(
                "max_job_id too small to be useful".to_string(),
            ));
        }
        Ok(())
    }
}

/// Authorization (C5) privacy bitmask, per spec.md §4.5.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyMask {
    pub private_data_jobs: bool,
    pub private_data_nodes: bool,
    pub private_data_partitions: bool,
}

impl Default for PrivacyMask {
    fn default() -> Self {
        Self {
            private_data_jobs: false,
            private_data_nodes: false,
            private_data_partitions: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub privacy_mask: PrivacyMask,
    pub admin_user: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            privacy_mask: PrivacyMask::default(),
            admin_user: "fleetd".to_string(),
        }
    }
}

/// RPC telemetry (C12) table capacities, per spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub type_table_capacity: usize,
    pub user_table_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            type_table_capacity: 100,
            user_table_capacity: 200,
        }
    }
}

impl TelemetryConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.type_table_capacity == 0 || self.user_table_capacity == 0 {
            return Err(ConfigError::Invalid(
                "telemetry table capacities must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
