//! OS-level process checks.

use std::ffi::OsStr;

use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

/// Whether `pid` names an existing process.
///
/// A process we are not permitted to signal still exists, so permission
/// errors count as alive.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid as NixPid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match kill(NixPid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub fn is_process_alive(pid: u32) -> bool {
    let mut sys = System::new();
    let target = Pid::from_u32(pid);
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[target]),
        ProcessRefreshKind::new(),
    );
    sys.process(target).is_some()
}

/// Result of comparing a live process against the program we expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    Matches,
    /// The pid was reused by some other program.
    Foreign,
    /// The process has exited and waits to be reaped.
    Defunct,
    /// The process could not be inspected.
    Unknown,
}

/// Compare the process behind `pid` with `expected` (an executable file name).
pub fn process_identity(pid: u32, expected: &OsStr) -> Identity {
    let target = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[target]),
        ProcessRefreshKind::new().with_exe(sysinfo::UpdateKind::OnlyIfNotSet),
    );
    let Some(process) = sys.process(target) else {
        return Identity::Unknown;
    };
    if process.status() == ProcessStatus::Zombie {
        return Identity::Defunct;
    }

    if process.exe().and_then(|exe| exe.file_name()) == Some(expected) {
        return Identity::Matches;
    }
    if name_matches(process.name(), expected) {
        return Identity::Matches;
    }
    Identity::Foreign
}

// Linux truncates the command name to 15 bytes.
fn name_matches(name: &OsStr, expected: &OsStr) -> bool {
    if name.is_empty() {
        return false;
    }
    if name == expected {
        return true;
    }
    let name = name.as_encoded_bytes();
    let expected = expected.as_encoded_bytes();
    name.len() == 15 && expected.starts_with(name)
}
