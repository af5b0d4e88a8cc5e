//! Configuration surface for the TF Scheduler role (§6 command-line
//! surface, scheduler-specific subset), layered the way the teacher layers
//! a `clap` CLI over a `serde_yaml` config file.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "dd-scheduler", about = "TF Scheduler RPC service")]
pub struct Cli {
    /// Path to a YAML config file overlaying these defaults.
    #[arg(long, env = "DD_SCHEDULER_CONFIG")]
    pub config: Option<std::path::PathBuf>,

    /// Address the RPC server binds to.
    #[arg(long, env = "DD_SCHEDULER_BIND", default_value = "0.0.0.0:8080")]
    pub bind: String,

    /// Partition this scheduler instance serves.
    #[arg(long, env = "DD_PARTITION_ID")]
    pub partition_id: String,

    /// Sender ids expected to contribute to every TFID in this partition.
    #[arg(long, env = "DD_SENDER_IDS", value_delimiter = ',')]
    pub sender_ids: Vec<String>,

    /// Seconds without a heartbeat before a builder is marked stale.
    #[arg(long, env = "DD_BUILDER_TIMEOUT_SECS", default_value_t = 5)]
    pub builder_timeout_secs: u64,

    /// Seconds a COMPLETE/FAILED TFID record is retained before GC.
    #[arg(long, env = "DD_TF_GRACE_PERIOD_SECS", default_value_t = 60)]
    pub tf_grace_period_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub bind: String,
    pub partition_id: String,
    pub sender_ids: Vec<String>,
    pub builder_timeout_secs: u64,
    pub tf_grace_period_secs: u64,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(std::path::PathBuf, std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(std::path::PathBuf, serde_yaml::Error),
    #[error("partition-id is required (pass --partition-id or DD_PARTITION_ID)")]
    MissingPartitionId,
}

impl SchedulerConfig {
    /// Builds the effective config from CLI flags, optionally overlaid by a
    /// YAML file (file values win, matching the teacher's config layering).
    pub fn resolve(cli: Cli) -> Result<Self, ConfigError> {
        let mut config = SchedulerConfig {
            bind: cli.bind,
            partition_id: cli.partition_id,
            sender_ids: cli.sender_ids,
            builder_timeout_secs: cli.builder_timeout_secs,
            tf_grace_period_secs: cli.tf_grace_period_secs,
        };

        if let Some(path) = cli.config {
            let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read(path.clone(), e))?;
            let overlay: SchedulerConfigOverlay =
                serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse(path.clone(), e))?;
            overlay.apply(&mut config);
        }

        if config.partition_id.is_empty() {
            return Err(ConfigError::MissingPartitionId);
        }
        Ok(config)
    }

    pub fn builder_timeout(&self) -> Duration {
        Duration::from_secs(self.builder_timeout_secs)
    }

    pub fn tf_grace_period(&self) -> Duration {
        Duration::from_secs(self.tf_grace_period_secs)
    }
}

/// Every field optional: only present keys override the CLI-derived config.
#[derive(Debug, Default, Deserialize)]
struct SchedulerConfigOverlay {
    bind: Option<String>,
    partition_id: Option<String>,
    sender_ids: Option<Vec<String>>,
    builder_timeout_secs: Option<u64>,
    tf_grace_period_secs: Option<u64>,
}

impl SchedulerConfigOverlay {
    fn apply(self, config: &mut SchedulerConfig) {
        if let Some(v) = self.bind {
            config.bind = v;
        }
        if let Some(v) = self.partition_id {
            config.partition_id = v;
        }
        if let Some(v) = self.sender_ids {
            config.sender_ids = v;
        }
        if let Some(v) = self.builder_timeout_secs {
            config.builder_timeout_secs = v;
        }
        if let Some(v) = self.tf_grace_period_secs {
            config.tf_grace_period_secs = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_partition_id() {
        let cli = Cli {
            config: None,
            bind: "0.0.0.0:8080".into(),
            partition_id: String::new(),
            sender_ids: vec![],
            builder_timeout_secs: 5,
            tf_grace_period_secs: 60,
        };
        assert!(matches!(SchedulerConfig::resolve(cli), Err(ConfigError::MissingPartitionId)));
    }

    #[test]
    fn yaml_overlay_wins_over_cli_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduler.yaml");
        std::fs::write(&path, "builder_timeout_secs: 9\n").unwrap();
        let cli = Cli {
            config: Some(path),
            bind: "0.0.0.0:8080".into(),
            partition_id: "p0".into(),
            sender_ids: vec!["s1".into()],
            builder_timeout_secs: 5,
            tf_grace_period_secs: 60,
        };
        let config = SchedulerConfig::resolve(cli).unwrap();
        assert_eq!(config.builder_timeout_secs, 9);
        assert_eq!(config.partition_id, "p0");
    }
}
