//! The file source (§4.5): the symmetric reader used in replay mode, which
//! reads records sequentially and hands STFs to the caller one at a time so
//! they can be injected into the pipeline's source stage.

use crate::record::{decode_record, RecordError};
use dd_types::SubTimeFrame;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("file source io failure: {0}")]
    Io(#[from] io::Error),
    #[error("malformed record: {0}")]
    Record(#[from] RecordError),
}

/// Reads `StfFileRecord`s out of one file, in order.
pub struct FileSource {
    buf: Vec<u8>,
    cursor: usize,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        Ok(Self {
            buf: fs::read(path)?,
            cursor: 0,
        })
    }

    /// Returns the next STF, or `None` once the file is fully consumed.
    pub fn next_stf(&mut self) -> Result<Option<SubTimeFrame>, SourceError> {
        if self.cursor >= self.buf.len() {
            return Ok(None);
        }
        let (stf, consumed) = decode_record(&self.buf[self.cursor..])?;
        self.cursor += consumed;
        Ok(Some(stf))
    }
}

/// Lists the rolled sink files under a session directory, in filename
/// order, skipping the unstable `.sidecar` companions (§4.5).
pub fn list_session_files(session_dir: impl AsRef<Path>) -> io::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(session_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) != Some("sidecar"))
        .filter(|p| p.file_name().and_then(|n| n.to_str()) != Some("sink.pidlock"))
        .collect();
    paths.sort();
    Ok(paths)
}

/// A source that transparently chains every rolled file in a session
/// directory, in order, as one logical stream.
pub struct SessionSource {
    files: Vec<PathBuf>,
    index: usize,
    current: Option<FileSource>,
}

impl SessionSource {
    pub fn open(session_dir: impl AsRef<Path>) -> Result<Self, SourceError> {
        Ok(Self {
            files: list_session_files(session_dir)?,
            index: 0,
            current: None,
        })
    }

    pub fn next_stf(&mut self) -> Result<Option<SubTimeFrame>, SourceError> {
        loop {
            if self.current.is_none() {
                if self.index >= self.files.len() {
                    return Ok(None);
                }
                self.current = Some(FileSource::open(&self.files[self.index])?);
                self.index += 1;
            }
            let source = self.current.as_mut().unwrap();
            match source.next_stf()? {
                Some(stf) => return Ok(Some(stf)),
                None => self.current = None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{FileSink, FileSinkConfig};
    use dd_types::ids::{DataIdentifier, DataOrigin, SubSpec};
    use dd_types::{HbFrame, TimeFrameId};

    fn sample(tfid: u64) -> SubTimeFrame {
        let mut stf = SubTimeFrame::new(TimeFrameId(tfid), DataOrigin::Flp);
        stf.insert(
            DataIdentifier::stf_header(),
            SubSpec::new(0),
            HbFrame::new(vec![], vec![9, 9]),
        );
        stf.finalize();
        stf
    }

    #[test]
    fn reads_back_everything_written_by_the_sink() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::open(FileSinkConfig {
            enable: true,
            dir: dir.path().to_path_buf(),
            stfs_per_file: 2,
            ..Default::default()
        })
        .unwrap();
        for tfid in 1..=5 {
            sink.write(&sample(tfid)).unwrap();
        }
        let session_dir = sink.current_path().unwrap().parent().unwrap().to_path_buf();
        drop(sink);

        let mut source = SessionSource::open(&session_dir).unwrap();
        let mut seen = Vec::new();
        while let Some(stf) = source.next_stf().unwrap() {
            seen.push(stf.id().0);
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }
}
