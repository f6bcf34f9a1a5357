//! Single-instance guard: an advisory lock file plus a pid file.

use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
};

use {anyhow::Context, tracing::warn};

pub const LOCK_FILE: &str = "opsrelay.lock";
pub const PID_FILE: &str = "opsrelay.pid";

/// Open (creating if needed) the lock file. The caller takes the write lock
/// and keeps the guard alive for as long as the daemon runs.
pub fn open_lock(data_dir: &Path) -> anyhow::Result<fd_lock::RwLock<File>> {
    let path = data_dir.join(LOCK_FILE);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .with_context(|| format!("cannot open lock file {}", path.display()))?;
    Ok(fd_lock::RwLock::new(file))
}

/// Pid file removed again on drop.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn create(data_dir: &Path) -> anyhow::Result<Self> {
        let path = data_dir.join(PID_FILE);
        fs::write(&path, format!("{}\n", std::process::id()))
            .with_context(|| format!("cannot write pid file {}", path.display()))?;
        Ok(Self { path })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove pid file");
        }
    }
}

/// Pid recorded by a running (or crashed) instance, if any.
pub fn read_pid(data_dir: &Path) -> Option<u32> {
    fs::read_to_string(data_dir.join(PID_FILE))
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = open_lock(dir.path()).unwrap();
        let _guard = first.try_write().unwrap();

        let mut second = open_lock(dir.path()).unwrap();
        assert!(second.try_write().is_err());
    }

    #[test]
    fn pid_file_lives_as_long_as_its_handle() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _pid = PidFile::create(dir.path()).unwrap();
            assert_eq!(read_pid(dir.path()), Some(std::process::id()));
        }
        assert!(read_pid(dir.path()).is_none());
        assert!(!dir.path().join(PID_FILE).exists());
    }
}
