//! Detached helper processes.
//!
//! Used to open the published URL in the invoking user's browser. The
//! helper runs in its own session with all standard streams on /dev/null so
//! it neither holds our terminal nor receives our Ctrl+C.

use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use crate::error::StepOutcome;

/// Spawn `command` as a session leader and return its PID without waiting.
///
/// The child is reaped on a background thread so it does not linger as a
/// zombie while a publish session keeps running.
pub fn spawn_detached(command: &mut Command) -> std::io::Result<u32> {
    command.stdin(Stdio::null());
    command.stdout(Stdio::null());
    command.stderr(Stdio::null());

    // setsid() in the child detaches it from our controlling terminal
    unsafe {
        command.pre_exec(|| {
            nix::unistd::setsid()
                .map(|_| ())
                .map_err(|e| std::io::Error::from_raw_os_error(e as i32))
        });
    }

    let mut child = command.spawn()?;
    let pid = child.id();
    std::thread::Builder::new()
        .name(format!("reap-{pid}"))
        .spawn(move || match child.wait() {
            Ok(status) => tracing::debug!(pid, %status, "detached helper exited"),
            Err(e) => tracing::debug!(pid, "waiting for detached helper failed: {e}"),
        })?;
    Ok(pid)
}

/// Command that opens `url` in a browser, as `user` when given.
pub fn browser_command(url: &str, user: Option<&str>) -> Command {
    match user {
        Some(user) => {
            let mut command = Command::new("runuser");
            command.args(["-u", user, "--", "xdg-open", url]);
            command
        }
        None => {
            let mut command = Command::new("xdg-open");
            command.arg(url);
            command
        }
    }
}

/// Best-effort: open `url` in the invoking user's desktop session.
pub fn open_url(url: &str, user: Option<&str>) -> StepOutcome {
    let result = spawn_detached(&mut browser_command(url, user)).map(|pid| {
        tracing::debug!(pid, url, "browser launcher started");
    });
    StepOutcome::record("opening browser", result)
}
