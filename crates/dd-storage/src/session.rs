//! Per-run session directory creation and locking (§4.5: "Write directory
//! is created once per session as `rootDir/<session-id>/`").
//!
//! The lock file itself is grounded on the teacher's `feldera-storage`
//! PID-lock mechanism: it exists to catch an operator accidentally starting
//! two sinks against the same session directory, not to coordinate across
//! a cluster.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use sysinfo::{Pid, System};

fn process_exists(pid: u32) -> bool {
    let s = System::new_all();
    s.process(Pid::from(pid as usize)).is_some()
}

const LOCKFILE_NAME: &str = "sink.pidlock";

/// A freshly created `rootDir/<session-id>/` directory, held locked for the
/// lifetime of this value. The lock file is removed on drop.
#[derive(Debug)]
pub struct SessionDir {
    path: PathBuf,
}

impl Drop for SessionDir {
    fn drop(&mut self) {
        let lock_file = self.path.join(LOCKFILE_NAME);
        if lock_file.exists() {
            if let Err(e) = fs::remove_file(&lock_file) {
                log::warn!("failed to remove session lockfile {}: {e}", lock_file.display());
            }
        }
    }
}

impl SessionDir {
    /// Creates `root/<uuid>/` and locks it with this process's PID.
    pub fn create(root: impl AsRef<Path>) -> Result<Self, String> {
        let session_id = uuid::Uuid::now_v7();
        let path = root.as_ref().join(session_id.to_string());
        fs::create_dir_all(&path).map_err(|e| e.to_string())?;
        Self::lock(path)
    }

    fn lock(path: PathBuf) -> Result<Self, String> {
        let pid = std::process::id();
        let lock_file = path.join(LOCKFILE_NAME);
        if lock_file.exists() {
            let mut file = File::open(&lock_file).map_err(|e| e.to_string())?;
            let mut contents = String::new();
            file.read_to_string(&mut contents).map_err(|e| e.to_string())?;
            let old_pid: u32 = contents.trim().parse().map_err(|e: std::num::ParseIntError| e.to_string())?;
            if old_pid != pid && process_exists(old_pid) {
                return Err(format!(
                    "session directory {} already locked by pid {old_pid}",
                    path.display()
                ));
            }
        }
        let mut file = File::create(&lock_file).map_err(|e| e.to_string())?;
        file.write_all(pid.to_string().as_bytes()).map_err(|e| e.to_string())?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_a_unique_subdirectory_per_session() {
        let root = tempfile::tempdir().unwrap();
        let a = SessionDir::create(root.path()).unwrap();
        let b = SessionDir::create(root.path()).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(root.path()));
    }

    #[test]
    fn lock_file_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let session = SessionDir::create(root.path()).unwrap();
        let lock_path = session.path().join(LOCKFILE_NAME);
        assert!(lock_path.exists());
        drop(session);
        assert!(!lock_path.exists());
    }
}
