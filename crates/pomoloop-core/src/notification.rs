//! Asking the user how a finished interval went.
//!
//! The timer worker calls a [`Resolver`] exactly once, right after it moved
//! an interval to `finished`. Any failure, timeout or unexpected answer is
//! `None`: the interval then stays `finished` until resolved by hand.

use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::{info, warn};

use crate::interval::{Interval, Resolution};

const DIALOG_TITLE: &str = "Pomodoro Complete";
const DIALOG_TEXT: &str = "Your work interval has finished.";

/// Extra time granted to the dialog process beyond its own give-up timer.
const KILL_GRACE: Duration = Duration::from_secs(5);

pub trait Resolver {
    /// Return the user's answer, or `None` if there is none within the
    /// resolver's bounded wait. Must not panic or block indefinitely.
    fn resolve(&self, interval: &Interval) -> Option<Resolution>;
}

impl<R: Resolver + ?Sized> Resolver for &R {
    fn resolve(&self, interval: &Interval) -> Option<Resolution> {
        (**self).resolve(interval)
    }
}

impl<R: Resolver + ?Sized> Resolver for Box<R> {
    fn resolve(&self, interval: &Interval) -> Option<Resolution> {
        (**self).resolve(interval)
    }
}

/// Never asks; every finished interval waits for manual resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResolver;

impl Resolver for NoopResolver {
    fn resolve(&self, _interval: &Interval) -> Option<Resolution> {
        None
    }
}

/// Native dialog program used to ask the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogBackend {
    /// `osascript` (macOS).
    AppleScript,
    /// `zenity` (Linux desktops).
    Zenity,
}

impl DialogBackend {
    pub fn native() -> Self {
        if cfg!(target_os = "macos") {
            DialogBackend::AppleScript
        } else {
            DialogBackend::Zenity
        }
    }

    fn command(self, timeout: Duration) -> Command {
        let secs = timeout.as_secs().max(1);
        match self {
            DialogBackend::AppleScript => {
                let mut cmd = Command::new("osascript");
                cmd.arg("-e").arg(format!(
                    "display dialog \"{DIALOG_TEXT}\" with title \"{DIALOG_TITLE}\" \
                     buttons {{\"Abandoned\", \"Completed\"}} default button \"Completed\" \
                     giving up after {secs}"
                ));
                cmd
            }
            DialogBackend::Zenity => {
                let mut cmd = Command::new("zenity");
                cmd.arg("--question")
                    .arg("--switch")
                    .arg(format!("--title={DIALOG_TITLE}"))
                    .arg(format!("--text={DIALOG_TEXT}"))
                    .arg("--extra-button=Completed")
                    .arg("--extra-button=Abandoned")
                    .arg(format!("--timeout={secs}"));
                cmd
            }
        }
    }

    fn parse(self, output: &Output) -> Option<Resolution> {
        match self {
            DialogBackend::AppleScript => {
                if !output.status.success() {
                    return None;
                }
                parse_applescript_answer(&String::from_utf8_lossy(&output.stdout))
            }
            // extra buttons exit with 1, same as closing the window
            DialogBackend::Zenity => parse_zenity_answer(&String::from_utf8_lossy(&output.stdout)),
        }
    }
}

/// `display dialog` prints e.g. `button returned:Completed, gave up:false`.
pub fn parse_applescript_answer(stdout: &str) -> Option<Resolution> {
    let mut button = None;
    for field in stdout.trim().split(", ") {
        match field.split_once(':') {
            Some(("gave up", "true")) => return None,
            Some(("button returned", value)) => button = Some(value),
            _ => {}
        }
    }
    button_resolution(button?)
}

/// zenity `--question --switch` prints the label of the extra button that
/// was pressed. Closing the window, Esc and the timeout print nothing.
pub fn parse_zenity_answer(stdout: &str) -> Option<Resolution> {
    match stdout.trim() {
        "" => None,
        label => button_resolution(label),
    }
}

fn button_resolution(label: &str) -> Option<Resolution> {
    match label {
        "Completed" => Some(Resolution::Completed),
        "Abandoned" => Some(Resolution::Abandoned),
        other => {
            warn!(button = other, "Unexpected dialog button");
            None
        }
    }
}

/// Shows a native two-button dialog and waits for the answer, bounded by
/// `timeout`.
#[derive(Debug, Clone)]
pub struct DialogResolver {
    backend: DialogBackend,
    timeout: Duration,
}

impl DialogResolver {
    pub fn new(timeout: Duration) -> Self {
        Self {
            backend: DialogBackend::native(),
            timeout,
        }
    }

    async fn ask(&self) -> Option<Resolution> {
        let mut cmd = self.backend.command(self.timeout);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout + KILL_GRACE, cmd.output()).await {
            Err(_) => {
                warn!(timeout_sec = self.timeout.as_secs(), "Resolution dialog timed out");
                None
            }
            Ok(Err(e)) => {
                warn!(error = %e, backend = ?self.backend, "Resolution dialog failed to launch");
                None
            }
            Ok(Ok(output)) => {
                let answer = self.backend.parse(&output);
                if answer.is_none() {
                    warn!(status = %output.status, "Resolution dialog returned no answer");
                }
                answer
            }
        }
    }
}

impl Resolver for DialogResolver {
    fn resolve(&self, interval: &Interval) -> Option<Resolution> {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "Cannot start runtime for resolution dialog");
                return None;
            }
        };
        info!(interval_id = interval.id, "Asking for interval resolution");
        runtime.block_on(self.ask())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applescript_answers() {
        assert_eq!(
            parse_applescript_answer("button returned:Completed, gave up:false\n"),
            Some(Resolution::Completed)
        );
        assert_eq!(
            parse_applescript_answer("button returned:Abandoned, gave up:false"),
            Some(Resolution::Abandoned)
        );
        assert_eq!(parse_applescript_answer("button returned:, gave up:true"), None);
        assert_eq!(parse_applescript_answer("button returned:Maybe"), None);
        assert_eq!(parse_applescript_answer(""), None);
    }

    #[test]
    fn zenity_button_labels() {
        assert_eq!(parse_zenity_answer("Completed\n"), Some(Resolution::Completed));
        assert_eq!(parse_zenity_answer("Abandoned\n"), Some(Resolution::Abandoned));
        assert_eq!(parse_zenity_answer("Maybe\n"), None);
        assert_eq!(parse_zenity_answer(""), None);
    }

    #[cfg(unix)]
    #[test]
    fn dismissed_zenity_dialog_is_no_answer() {
        use std::os::unix::process::ExitStatusExt;

        let output = |code: i32, stdout: &str| Output {
            status: std::process::ExitStatus::from_raw(code << 8),
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        };
        // window closed or Esc: exit 1 with nothing on stdout
        assert_eq!(DialogBackend::Zenity.parse(&output(1, "")), None);
        // timed out
        assert_eq!(DialogBackend::Zenity.parse(&output(5, "")), None);
        assert_eq!(
            DialogBackend::Zenity.parse(&output(1, "Abandoned\n")),
            Some(Resolution::Abandoned)
        );
        assert_eq!(
            DialogBackend::Zenity.parse(&output(1, "Completed\n")),
            Some(Resolution::Completed)
        );
    }
}
