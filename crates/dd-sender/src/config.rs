//! Configuration surface for the STF Sender role (§6 command-line surface,
//! sender-specific subset), layered CLI-over-YAML the way `dd-scheduler`
//! and `dd-builder` do.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "dd-sender", about = "STF Sender role")]
pub struct Cli {
    #[arg(long, env = "DD_SENDER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Identifies this sender in every scheduler RPC envelope and in the
    /// `stf-update` request body (§6 `RequestEnvelope`).
    #[arg(long, env = "DD_SENDER_ID")]
    pub sender_id: String,

    #[arg(long, env = "DD_PARTITION_ID")]
    pub partition_id: String,

    /// Base URL of the TF Scheduler's RPC service.
    #[arg(long, env = "DD_SCHEDULER_URL", default_value = "http://127.0.0.1:8080")]
    pub scheduler_url: String,

    /// Address this sender's own TCP channel listener binds to, so
    /// upstream builders can connect and forward built STFs.
    #[arg(long, env = "DD_SENDER_BIND", default_value = "0.0.0.0:9000")]
    pub bind: String,

    /// The registry key (`sender/{channel_name}`) this sender publishes its
    /// bound address under, for builders in Direct/Bridged output mode to
    /// discover.
    #[arg(long, env = "DD_CHANNEL_NAME", default_value = "default")]
    pub channel_name: String,

    #[arg(long, env = "DD_REGISTRY_PATH", default_value = "./registry.json")]
    pub registry_path: PathBuf,

    #[arg(long, env = "DD_SINK_ENABLE")]
    pub sink_enable: bool,

    #[arg(long, env = "DD_SINK_DIR", default_value = "./stf-data")]
    pub sink_dir: PathBuf,

    #[arg(long, env = "DD_SINK_FILE_NAME", default_value = "%n")]
    pub sink_file_name: String,

    #[arg(long, env = "DD_SINK_STFS_PER_FILE", default_value_t = 0)]
    pub sink_stfs_per_file: u32,

    #[arg(long, env = "DD_SINK_FILE_SIZE_MIB", default_value_t = 0)]
    pub sink_file_size_mib: u64,

    #[arg(long, env = "DD_SINK_SIDECAR")]
    pub sink_sidecar: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    pub sender_id: String,
    pub partition_id: String,
    pub scheduler_url: String,
    pub bind: String,
    pub channel_name: String,
    pub registry_path: PathBuf,
    pub sink_enable: bool,
    pub sink_dir: PathBuf,
    pub sink_file_name: String,
    pub sink_stfs_per_file: u32,
    pub sink_file_size_mib: u64,
    pub sink_sidecar: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, serde_yaml::Error),
    #[error("sender-id is required (pass --sender-id or DD_SENDER_ID)")]
    MissingSenderId,
    #[error("partition-id is required (pass --partition-id or DD_PARTITION_ID)")]
    MissingPartitionId,
}

impl SenderConfig {
    pub fn resolve(cli: Cli) -> Result<Self, ConfigError> {
        let mut config = SenderConfig {
            sender_id: cli.sender_id,
            partition_id: cli.partition_id,
            scheduler_url: cli.scheduler_url,
            bind: cli.bind,
            channel_name: cli.channel_name,
            registry_path: cli.registry_path,
            sink_enable: cli.sink_enable,
            sink_dir: cli.sink_dir,
            sink_file_name: cli.sink_file_name,
            sink_stfs_per_file: cli.sink_stfs_per_file,
            sink_file_size_mib: cli.sink_file_size_mib,
            sink_sidecar: cli.sink_sidecar,
        };

        if let Some(path) = cli.config {
            let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read(path.clone(), e))?;
            let overlay: SenderConfigOverlay =
                serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse(path.clone(), e))?;
            overlay.apply(&mut config);
        }

        if config.sender_id.is_empty() {
            return Err(ConfigError::MissingSenderId);
        }
        if config.partition_id.is_empty() {
            return Err(ConfigError::MissingPartitionId);
        }

        Ok(config)
    }

    pub fn sink_config(&self) -> dd_storage::FileSinkConfig {
        dd_storage::FileSinkConfig {
            enable: self.sink_enable,
            dir: self.sink_dir.clone(),
            file_name_pattern: self.sink_file_name.clone(),
            stfs_per_file: self.sink_stfs_per_file,
            max_file_size_bytes: self.sink_file_size_mib * 1024 * 1024,
            sidecar: self.sink_sidecar,
        }
    }

    pub fn envelope(&self) -> dd_types::rpc::RequestEnvelope {
        dd_types::rpc::RequestEnvelope {
            process_id: self.sender_id.clone(),
            partition_id: self.partition_id.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SenderConfigOverlay {
    sender_id: Option<String>,
    partition_id: Option<String>,
    scheduler_url: Option<String>,
    bind: Option<String>,
    channel_name: Option<String>,
    registry_path: Option<PathBuf>,
    sink_enable: Option<bool>,
    sink_dir: Option<PathBuf>,
    sink_file_name: Option<String>,
    sink_stfs_per_file: Option<u32>,
    sink_file_size_mib: Option<u64>,
    sink_sidecar: Option<bool>,
}

impl SenderConfigOverlay {
    fn apply(self, config: &mut SenderConfig) {
        macro_rules! overlay {
            ($field:ident) => {
                if let Some(v) = self.$field {
                    config.$field = v;
                }
            };
        }
        overlay!(sender_id);
        overlay!(partition_id);
        overlay!(scheduler_url);
        overlay!(bind);
        overlay!(channel_name);
        overlay!(registry_path);
        overlay!(sink_enable);
        overlay!(sink_dir);
        overlay!(sink_file_name);
        overlay!(sink_stfs_per_file);
        overlay!(sink_file_size_mib);
        overlay!(sink_sidecar);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            config: None,
            sender_id: "sender-0".into(),
            partition_id: "p0".into(),
            scheduler_url: "http://127.0.0.1:8080".into(),
            bind: "0.0.0.0:9000".into(),
            channel_name: "default".into(),
            registry_path: PathBuf::from("./registry.json"),
            sink_enable: false,
            sink_dir: PathBuf::from("./data"),
            sink_file_name: "%n".into(),
            sink_stfs_per_file: 0,
            sink_file_size_mib: 0,
            sink_sidecar: false,
        }
    }

    #[test]
    fn rejects_missing_sender_id() {
        let mut cli = base_cli();
        cli.sender_id = String::new();
        assert!(matches!(SenderConfig::resolve(cli), Err(ConfigError::MissingSenderId)));
    }

    #[test]
    fn rejects_missing_partition_id() {
        let mut cli = base_cli();
        cli.partition_id = String::new();
        assert!(matches!(SenderConfig::resolve(cli), Err(ConfigError::MissingPartitionId)));
    }

    #[test]
    fn yaml_overlay_wins_over_cli_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sender.yaml");
        std::fs::write(&path, "bind: \"0.0.0.0:9100\"\n").unwrap();
        let mut cli = base_cli();
        cli.config = Some(path);
        let config = SenderConfig::resolve(cli).unwrap();
        assert_eq!(config.bind, "0.0.0.0:9100");
        assert_eq!(config.sender_id, "sender-0");
    }

    #[test]
    fn envelope_carries_sender_and_partition_ids() {
        let config = SenderConfig::resolve(base_cli()).unwrap();
        let envelope = config.envelope();
        assert_eq!(envelope.process_id, "sender-0");
        assert_eq!(envelope.partition_id, "p0");
    }
}
