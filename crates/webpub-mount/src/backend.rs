//! Mount backend abstraction.
//!
//! The [`MountBackend`] trait is the seam between the publish lifecycle and
//! the host's mount facility. [`SystemMountBackend`] drives the real kernel;
//! [`crate::testing::FakeMountBackend`] keeps an in-memory table for tests.

use std::path::{Path, PathBuf};

use crate::bind_mount;
use crate::error::MountError;
use crate::mount_table::{self, SystemMount};

/// Bind-mount capability plus a queryable mount table.
pub trait MountBackend {
    /// Bind `source` onto the existing directory `target`.
    fn bind(&self, source: &Path, target: &Path) -> Result<(), MountError>;

    /// Detach whatever is mounted at `target`.
    fn unmount(&self, target: &Path) -> Result<(), MountError>;

    /// Snapshot of the live mount table.
    fn mount_table(&self) -> Result<Vec<SystemMount>, MountError>;
}

/// Backend using `mount`/`umount` and `/proc/self/mountinfo`.
#[derive(Debug, Clone)]
pub struct SystemMountBackend {
    mountinfo: PathBuf,
}

impl SystemMountBackend {
    pub fn new() -> Self {
        Self::with_mountinfo(mount_table::MOUNTINFO_PATH)
    }

    /// Read the mount table from a different file (e.g. another process's view).
    pub fn with_mountinfo(path: impl Into<PathBuf>) -> Self {
        Self {
            mountinfo: path.into(),
        }
    }
}

impl Default for SystemMountBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MountBackend for SystemMountBackend {
    fn bind(&self, source: &Path, target: &Path) -> Result<(), MountError> {
        bind_mount::bind_mount(source, target)
    }

    fn unmount(&self, target: &Path) -> Result<(), MountError> {
        bind_mount::unmount(target)
    }

    fn mount_table(&self) -> Result<Vec<SystemMount>, MountError> {
        mount_table::read_mount_table(&self.mountinfo)
    }
}
