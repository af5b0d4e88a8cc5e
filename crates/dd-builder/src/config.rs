//! Configuration surface for the STF Builder role (§6 command-line surface,
//! builder-specific subset), layered CLI-over-YAML the way `dd-scheduler`
//! does.

use clap::Parser;
use dd_types::ids::DataOrigin;
use dd_types::rdh::SanityCheckMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Below this, the drop policy could starve the pipeline of any headroom to
/// react to a burst; §4.3 fixes 4 as the effective floor.
const MIN_MAX_BUFFERED: u64 = 4;

#[derive(Parser, Debug, Clone)]
#[command(name = "dd-builder", about = "STF Builder role")]
pub struct Cli {
    #[arg(long, env = "DD_BUILDER_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "DD_INPUT_CHANNEL_NAME", default_value = "readout")]
    pub input_channel_name: String,

    #[arg(long, env = "DD_OUTPUT_CHANNEL_NAME", default_value = "")]
    pub output_channel_name: String,

    #[arg(long, env = "DD_DPL_CHANNEL_NAME", default_value = "")]
    pub dpl_channel_name: String,

    /// No downstream output channel; STFs are built (and optionally sunk)
    /// but never sent.
    #[arg(long, env = "DD_STAND_ALONE")]
    pub stand_alone: bool,

    /// `0` disables the buffered-STF cap.
    #[arg(long, env = "DD_MAX_BUFFERED_STFS", default_value_t = 0)]
    pub max_buffered_stfs: u64,

    #[arg(long, env = "DD_GUI")]
    pub gui: bool,

    #[arg(long, env = "DD_DETECTOR", default_value = "TPC")]
    pub detector: String,

    #[arg(long, env = "DD_RDH_DATA_CHECK", default_value = "print")]
    pub rdh_data_check: String,

    #[arg(long, env = "DD_RDH_FILTER_EMPTY_TRIGGER_V4")]
    pub rdh_filter_empty_trigger_v4: bool,

    /// Off-by-default staleness fallback for TF finalization (SPEC_FULL
    /// supplement #1): `0` means explicit end-of-TF marker only.
    #[arg(long, env = "DD_FINALIZE_AFTER_MS", default_value_t = 0)]
    pub finalize_after_ms: u64,

    #[arg(long, env = "DD_SINK_ENABLE")]
    pub sink_enable: bool,

    #[arg(long, env = "DD_SINK_DIR", default_value = "./stf-data")]
    pub sink_dir: PathBuf,

    #[arg(long, env = "DD_SINK_FILE_NAME", default_value = "%n")]
    pub sink_file_name: String,

    #[arg(long, env = "DD_SINK_STFS_PER_FILE", default_value_t = 0)]
    pub sink_stfs_per_file: u32,

    /// Mebibytes; `0` disables the size-based rotation trigger.
    #[arg(long, env = "DD_SINK_FILE_SIZE_MIB", default_value_t = 0)]
    pub sink_file_size_mib: u64,

    #[arg(long, env = "DD_SINK_SIDECAR")]
    pub sink_sidecar: bool,

    /// JSON-backed endpoint directory (`dd_transport::FileRegistry`) used to
    /// discover the downstream sender's address in `Direct`/`Bridged` mode.
    #[arg(long, env = "DD_REGISTRY_PATH", default_value = "./registry.json")]
    pub registry_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderConfig {
    pub input_channel_name: String,
    pub output_channel_name: String,
    pub dpl_channel_name: String,
    pub stand_alone: bool,
    pub max_buffered_stfs: u64,
    pub detector: String,
    pub rdh_data_check: String,
    pub rdh_filter_empty_trigger_v4: bool,
    pub finalize_after_ms: u64,
    pub sink_enable: bool,
    pub sink_dir: PathBuf,
    pub sink_file_name: String,
    pub sink_stfs_per_file: u32,
    pub sink_file_size_mib: u64,
    pub sink_sidecar: bool,
    pub registry_path: PathBuf,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, serde_yaml::Error),
    #[error("invalid rdh-data-check mode: {0}")]
    InvalidSanityCheckMode(String),
    #[error("sink directory does not exist and could not be created: {0}")]
    MissingSinkDir(PathBuf),
}

/// The three output modes §4.3 selects once at init and never changes
/// afterward.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputMode {
    Standalone,
    Direct,
    Bridged,
}

impl BuilderConfig {
    pub fn resolve(cli: Cli) -> Result<Self, ConfigError> {
        let mut config = BuilderConfig {
            input_channel_name: cli.input_channel_name,
            output_channel_name: cli.output_channel_name,
            dpl_channel_name: cli.dpl_channel_name,
            stand_alone: cli.stand_alone,
            max_buffered_stfs: cli.max_buffered_stfs,
            detector: cli.detector,
            rdh_data_check: cli.rdh_data_check,
            rdh_filter_empty_trigger_v4: cli.rdh_filter_empty_trigger_v4,
            finalize_after_ms: cli.finalize_after_ms,
            sink_enable: cli.sink_enable,
            sink_dir: cli.sink_dir,
            sink_file_name: cli.sink_file_name,
            sink_stfs_per_file: cli.sink_stfs_per_file,
            sink_file_size_mib: cli.sink_file_size_mib,
            sink_sidecar: cli.sink_sidecar,
            registry_path: cli.registry_path,
        };

        if let Some(path) = cli.config {
            let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read(path.clone(), e))?;
            let overlay: BuilderConfigOverlay =
                serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse(path.clone(), e))?;
            overlay.apply(&mut config);
        }

        config
            .rdh_data_check
            .parse::<SanityCheckMode>()
            .map_err(ConfigError::InvalidSanityCheckMode)?;

        Ok(config)
    }

    pub fn sanity_check_mode(&self) -> SanityCheckMode {
        self.rdh_data_check.parse().expect("validated in resolve()")
    }

    /// §4.3: "effective minimum 4". `0` means uncapped.
    pub fn effective_max_buffered(&self) -> Option<u64> {
        if self.max_buffered_stfs == 0 {
            None
        } else {
            Some(self.max_buffered_stfs.max(MIN_MAX_BUFFERED))
        }
    }

    pub fn finalize_after(&self) -> Option<Duration> {
        if self.finalize_after_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.finalize_after_ms))
        }
    }

    /// The `DataOrigin` stamped on every STF this builder produces,
    /// derived from the configured detector name (§3: origin is carried
    /// once per STF, not per fragment).
    pub fn detector_origin(&self) -> DataOrigin {
        match self.detector.to_uppercase().as_str() {
            "TPC" => DataOrigin::Tpc,
            "ITS" => DataOrigin::Its,
            "TOF" => DataOrigin::Tof,
            "TRD" => DataOrigin::Trd,
            "EMC" => DataOrigin::Emc,
            _ => DataOrigin::Other(0),
        }
    }

    pub fn output_mode(&self) -> OutputMode {
        if self.stand_alone {
            OutputMode::Standalone
        } else if !self.dpl_channel_name.is_empty() {
            OutputMode::Bridged
        } else {
            OutputMode::Direct
        }
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
}

#[derive(Debug, Default, Deserialize)]
struct BuilderConfigOverlay {
    input_channel_name: Option<String>,
    output_channel_name: Option<String>,
    dpl_channel_name: Option<String>,
    stand_alone: Option<bool>,
    max_buffered_stfs: Option<u64>,
    detector: Option<String>,
    rdh_data_check: Option<String>,
    rdh_filter_empty_trigger_v4: Option<bool>,
    finalize_after_ms: Option<u64>,
    sink_enable: Option<bool>,
    sink_dir: Option<PathBuf>,
    sink_file_name: Option<String>,
    sink_stfs_per_file: Option<u32>,
    sink_file_size_mib: Option<u64>,
    sink_sidecar: Option<bool>,
    registry_path: Option<PathBuf>,
}

impl BuilderConfigOverlay {
    fn apply(self, config: &mut BuilderConfig) {
        macro_rules! overlay {
            ($field:ident) => {
                if let Some(v) = self.$field {
                    config.$field = v;
                }
            };
        }
        overlay!(input_channel_name);
        overlay!(output_channel_name);
        overlay!(dpl_channel_name);
        overlay!(stand_alone);
        overlay!(max_buffered_stfs);
        overlay!(detector);
        overlay!(rdh_data_check);
        overlay!(rdh_filter_empty_trigger_v4);
        overlay!(finalize_after_ms);
        overlay!(sink_enable);
        overlay!(sink_dir);
        overlay!(sink_file_name);
        overlay!(sink_stfs_per_file);
        overlay!(sink_file_size_mib);
        overlay!(sink_sidecar);
        overlay!(registry_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            config: None,
            input_channel_name: "readout".into(),
            output_channel_name: "out".into(),
            dpl_channel_name: String::new(),
            stand_alone: false,
            max_buffered_stfs: 0,
            gui: false,
            detector: "TPC".into(),
            rdh_data_check: "print".into(),
            rdh_filter_empty_trigger_v4: false,
            finalize_after_ms: 0,
            sink_enable: false,
            sink_dir: PathBuf::from("./data"),
            sink_file_name: "%n".into(),
            sink_stfs_per_file: 0,
            sink_file_size_mib: 0,
            sink_sidecar: false,
            registry_path: PathBuf::from("./registry.json"),
        }
    }

    #[test]
    fn max_buffered_floor_is_four() {
        let mut cli = base_cli();
        cli.max_buffered_stfs = 1;
        let config = BuilderConfig::resolve(cli).unwrap();
        assert_eq!(config.effective_max_buffered(), Some(4));
    }

    #[test]
    fn zero_max_buffered_means_uncapped() {
        let config = BuilderConfig::resolve(base_cli()).unwrap();
        assert_eq!(config.effective_max_buffered(), None);
    }

    #[test]
    fn rejects_invalid_sanity_check_mode() {
        let mut cli = base_cli();
        cli.rdh_data_check = "bogus".into();
        assert!(matches!(
            BuilderConfig::resolve(cli),
            Err(ConfigError::InvalidSanityCheckMode(_))
        ));
    }

    #[test]
    fn standalone_selects_standalone_output_mode() {
        let mut cli = base_cli();
        cli.stand_alone = true;
        let config = BuilderConfig::resolve(cli).unwrap();
        assert_eq!(config.output_mode(), OutputMode::Standalone);
    }

    #[test]
    fn dpl_channel_selects_bridged_output_mode() {
        let mut cli = base_cli();
        cli.dpl_channel_name = "dpl-chan".into();
        let config = BuilderConfig::resolve(cli).unwrap();
        assert_eq!(config.output_mode(), OutputMode::Bridged);
    }
}
