//! Launching the detached timer worker.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::info;

use crate::error::ProcessError;

/// Starts `<program> --data-dir <dir> worker <interval_id>` as a detached
/// background process.
#[derive(Debug, Clone)]
pub struct WorkerLauncher {
    program: PathBuf,
    data_dir: PathBuf,
}

impl WorkerLauncher {
    pub fn new(program: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            data_dir: data_dir.into(),
        }
    }

    /// Launch copies of the running executable.
    pub fn current(data_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, data_dir))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// File name used to recognise our workers among live processes.
    pub fn program_name(&self) -> OsString {
        self.program
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| self.program.as_os_str().to_os_string())
    }

    /// Spawn a worker for `interval_id` and return its pid. The child is not
    /// waited on; it outlives the caller.
    pub fn spawn(&self, interval_id: i64) -> Result<u32, ProcessError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--data-dir")
            .arg(&self.data_dir)
            .arg("worker")
            .arg(interval_id.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        detach(&mut cmd);

        let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        let pid = child.id();
        info!(interval_id, pid, "Spawned timer worker");
        Ok(pid)
    }
}

/// Put the child in its own session so it survives the terminal closing.
#[cfg(unix)]
fn detach(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;

    // SAFETY: setsid is async-signal-safe and touches no parent state.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid()
                .map(drop)
                .map_err(std::io::Error::from)
        });
    }
}

#[cfg(not(unix))]
fn detach(_cmd: &mut Command) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_name_is_the_file_name() {
        let launcher = WorkerLauncher::new("/usr/local/bin/pomoloop", "/tmp/data");
        assert_eq!(launcher.program_name(), OsString::from("pomoloop"));
        assert_eq!(launcher.program(), Path::new("/usr/local/bin/pomoloop"));
    }

    #[test]
    fn missing_program_reports_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = WorkerLauncher::new(dir.path().join("no-such-binary"), dir.path());
        assert!(matches!(launcher.spawn(1), Err(ProcessError::Spawn { .. })));
    }
}
