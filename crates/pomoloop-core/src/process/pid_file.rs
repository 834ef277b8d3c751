//! Well-known PID record for the timer worker.
//!
//! The record is one text line, `<pid> <interval_id>`, naming the worker
//! process and the interval it serves. Writes go through a temp file in the
//! same directory and a rename, so readers never observe a half-written
//! record.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ProcessError;

/// Contents of the PID record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerRecord {
    pub pid: u32,
    pub interval_id: i64,
}

impl WorkerRecord {
    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let pid = fields.next()?.parse::<u32>().ok().filter(|pid| *pid > 0)?;
        let interval_id = fields.next()?.parse::<i64>().ok()?;
        if fields.next().is_some() {
            return None;
        }
        Some(Self { pid, interval_id })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The recorded worker. Missing, unreadable or malformed records read as
    /// `None`.
    pub fn read(&self) -> Option<WorkerRecord> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        let record = WorkerRecord::parse(&content);
        if record.is_none() {
            debug!(path = %self.path.display(), "Ignoring malformed PID record");
        }
        record
    }

    pub fn write(&self, record: WorkerRecord) -> Result<(), ProcessError> {
        let record_failed = |source: std::io::Error| ProcessError::PidRecord {
            path: self.path.clone(),
            source,
        };
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(record_failed)?;
        writeln!(tmp, "{} {}", record.pid, record.interval_id).map_err(record_failed)?;
        tmp.persist(&self.path).map_err(|e| record_failed(e.error))?;
        Ok(())
    }

    /// Remove the record. A record that is already gone is not an error.
    pub fn remove(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove PID record"),
        }
    }

    /// Record the current process as the worker for `interval_id` and return
    /// a guard that clears the record on drop.
    pub fn claim(self, interval_id: i64) -> Result<PidGuard, ProcessError> {
        let pid = std::process::id();
        self.write(WorkerRecord { pid, interval_id })?;
        Ok(PidGuard { file: self, pid })
    }
}

/// Clears the PID record when dropped, unless another process has claimed it
/// in the meantime.
#[derive(Debug)]
pub struct PidGuard {
    file: PidFile,
    pid: u32,
}

impl PidGuard {
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for PidGuard {
    fn drop(&mut self) {
        if self.file.read().map(|r| r.pid) == Some(self.pid) {
            self.file.remove();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let file = PidFile::new(dir.path().join("worker.pid"));
        assert_eq!(file.read(), None);

        let record = WorkerRecord {
            pid: 4242,
            interval_id: 17,
        };
        file.write(record).unwrap();
        assert_eq!(
            std::fs::read_to_string(file.path()).unwrap(),
            "4242 17\n"
        );
        assert_eq!(file.read(), Some(record));

        file.remove();
        assert_eq!(file.read(), None);
        file.remove();
    }

    #[test]
    fn malformed_record_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.pid");
        for content in ["not-a-pid\n", "0 3", "4242", "4242 x", "4242 3 9"] {
            std::fs::write(&path, content).unwrap();
            assert_eq!(PidFile::new(&path).read(), None, "{content:?}");
        }
    }

    #[test]
    fn guard_clears_only_its_own_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.pid");

        let guard = PidFile::new(&path).claim(3).unwrap();
        assert_eq!(
            PidFile::new(&path).read(),
            Some(WorkerRecord {
                pid: std::process::id(),
                interval_id: 3
            })
        );
        drop(guard);
        assert!(!path.exists());

        // a newer worker took over the record for the next interval
        let guard = PidFile::new(&path).claim(3).unwrap();
        let newer = WorkerRecord {
            pid: guard.pid() + 1,
            interval_id: 4,
        };
        PidFile::new(&path).write(newer).unwrap();
        drop(guard);
        assert_eq!(PidFile::new(&path).read(), Some(newer));
    }
}
