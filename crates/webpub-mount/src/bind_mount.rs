//! Bind mount and unmount via the system `mount`/`umount` tools.
//!
//! # Safety
//!
//! [`unmount`] will detach ANY path it is given. Callers check the mount
//! table first (see [`crate::MountManager::unmount`]).
//!
//! # Fallback order
//!
//! - Mount: `mount --bind <source> <target>`
//! - Unmount: `umount <target>`, falling back to `umount -l` (lazy), which
//!   detaches the mount from the namespace even while files are still open

use std::path::Path;
use std::process::{Command, Output};

use crate::error::MountError;

/// Bind `source` onto the existing directory `target`.
pub fn bind_mount(source: &Path, target: &Path) -> Result<(), MountError> {
    let output = Command::new("mount")
        .arg("--bind")
        .arg(source)
        .arg(target)
        .output()?;

    if output.status.success() {
        tracing::debug!(
            "Bind mount of {} onto {} succeeded",
            source.display(),
            target.display()
        );
        return Ok(());
    }

    Err(MountError::BindFailed {
        from: source.to_path_buf(),
        to: target.to_path_buf(),
        reason: diagnostic(&output),
    })
}

/// Unmount `target`, retrying lazily if the plain unmount is refused.
pub fn unmount(target: &Path) -> Result<(), MountError> {
    let output = Command::new("umount").arg(target).output()?;
    if output.status.success() {
        tracing::debug!("umount succeeded for {}", target.display());
        return Ok(());
    }

    tracing::debug!(
        "umount failed for {}: {}; retrying with umount -l",
        target.display(),
        diagnostic(&output)
    );

    let output = Command::new("umount").arg("-l").arg(target).output()?;
    if output.status.success() {
        tracing::debug!("Lazy unmount via umount -l succeeded for {}", target.display());
        return Ok(());
    }

    Err(MountError::UnmountFailed {
        target: target.to_path_buf(),
        reason: diagnostic(&output),
    })
}

fn diagnostic(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("exited with {}", output.status)
    } else {
        stderr.to_string()
    }
}
