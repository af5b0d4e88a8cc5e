//! The rolling file sink (§4.5): a single-writer consumer that serializes
//! STFs to disk and rotates by record count or byte size.

use crate::filename::{render, DEFAULT_PATTERN};
use crate::record::encode_record;
use crate::session::SessionDir;
use crate::sidecar::{SidecarEntry, SidecarWriter};
use dd_types::SubTimeFrame;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file sink io failure: {0}")]
    Io(#[from] io::Error),
    #[error("session directory error: {0}")]
    Session(String),
}

#[derive(Clone, Debug)]
pub struct FileSinkConfig {
    pub enable: bool,
    pub dir: PathBuf,
    pub file_name_pattern: String,
    /// Rotate after this many records; `0` disables the count-based trigger.
    pub stfs_per_file: u32,
    /// Rotate after the file reaches this many bytes; `0` disables the
    /// size-based trigger.
    pub max_file_size_bytes: u64,
    pub sidecar: bool,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            enable: false,
            dir: PathBuf::from("."),
            file_name_pattern: DEFAULT_PATTERN.to_string(),
            stfs_per_file: 0,
            max_file_size_bytes: 0,
            sidecar: false,
        }
    }
}

struct OpenFile {
    file: File,
    path: PathBuf,
    records_written: u32,
    bytes_written: u64,
    sidecar: Option<SidecarWriter>,
}

/// Writes STFs to a rolling file under a locked session directory.
///
/// Per §4.5, write errors disable the sink for the remainder of the run
/// rather than propagate into the pipeline: [`Self::write`] still returns a
/// `Result` so the caller can log the first failure, but every call after
/// that returns immediately without touching the filesystem again.
pub struct FileSink {
    config: FileSinkConfig,
    _session: SessionDir,
    current: Option<OpenFile>,
    sequence: u64,
    disabled: bool,
}

impl FileSink {
    pub fn open(config: FileSinkConfig) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&config.dir)?;
        let session = SessionDir::create(&config.dir).map_err(StorageError::Session)?;
        let mut sink = Self {
            config,
            _session: session,
            current: None,
            sequence: 0,
            disabled: false,
        };
        sink.roll()?;
        Ok(sink)
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    fn roll(&mut self) -> Result<(), StorageError> {
        let name = render(&self.config.file_name_pattern, self.sequence);
        self.sequence += 1;
        let path = self._session.path().join(&name);
        let file = File::create(&path)?;
        let sidecar = if self.config.sidecar {
            Some(SidecarWriter::create(path.with_extension("sidecar"))?)
        } else {
            None
        };
        self.current = Some(OpenFile {
            file,
            path,
            records_written: 0,
            bytes_written: 0,
            sidecar,
        });
        Ok(())
    }

    fn needs_rotation(&self, open: &OpenFile) -> bool {
        let by_count = self.config.stfs_per_file > 0 && open.records_written >= self.config.stfs_per_file;
        let by_size = self.config.max_file_size_bytes > 0 && open.bytes_written >= self.config.max_file_size_bytes;
        by_count || by_size
    }

    /// Serializes and appends `stf`. On the first write error, logs it,
    /// marks the sink disabled, and returns the error; every subsequent
    /// call is then a no-op that returns `Ok(())` immediately.
    pub fn write(&mut self, stf: &SubTimeFrame) -> Result<(), StorageError> {
        if self.disabled {
            return Ok(());
        }
        match self.write_inner(stf) {
            Ok(()) => Ok(()),
            Err(e) => {
                log::error!("file sink write failed, disabling sink for the rest of the run: {e}");
                self.disabled = true;
                Err(e)
            }
        }
    }

    fn write_inner(&mut self, stf: &SubTimeFrame) -> Result<(), StorageError> {
        if self.current.as_ref().map(|o| self.needs_rotation(o)).unwrap_or(false) {
            self.roll()?;
        }
        let record = encode_record(stf);
        let open = self.current.as_mut().expect("roll() always leaves a current file");
        let offset = open.bytes_written;
        open.file.write_all(&record)?;
        open.bytes_written += record.len() as u64;
        open.records_written += 1;
        if let Some(sidecar) = open.sidecar.as_mut() {
            sidecar.append(SidecarEntry {
                record_offset: offset,
                record_len: record.len() as u64,
                tfid: stf.id().0,
                n_hbf: stf.n_hbf() as u32,
            })?;
        }
        Ok(())
    }

    pub fn current_path(&self) -> Option<&std::path::Path> {
        self.current.as_ref().map(|o| o.path.as_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dd_types::ids::{DataIdentifier, SubSpec};
    use dd_types::{HbFrame, TimeFrameId};

    fn sample(tfid: u64) -> SubTimeFrame {
        let mut stf = SubTimeFrame::new(TimeFrameId(tfid), dd_types::ids::DataOrigin::Flp);
        stf.insert(
            DataIdentifier::stf_header(),
            SubSpec::new(0),
            HbFrame::new(vec![], vec![1, 2, 3]),
        );
        stf.finalize();
        stf
    }

    #[test]
    fn rotates_by_record_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::open(FileSinkConfig {
            enable: true,
            dir: dir.path().to_path_buf(),
            stfs_per_file: 2,
            ..Default::default()
        })
        .unwrap();

        sink.write(&sample(1)).unwrap();
        let first_path = sink.current_path().unwrap().to_path_buf();
        sink.write(&sample(2)).unwrap();
        sink.write(&sample(3)).unwrap();
        let second_path = sink.current_path().unwrap().to_path_buf();

        assert_ne!(first_path, second_path);
    }

    #[test]
    fn writes_a_sidecar_entry_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::open(FileSinkConfig {
            enable: true,
            dir: dir.path().to_path_buf(),
            sidecar: true,
            ..Default::default()
        })
        .unwrap();
        sink.write(&sample(1)).unwrap();
        let sidecar_path = sink.current_path().unwrap().with_extension("sidecar");
        let entries = crate::sidecar::load(sidecar_path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tfid, 1);
    }
}
