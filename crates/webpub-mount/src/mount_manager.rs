//! Destination directory and bind mount lifecycle.

use std::io;
use std::path::{Path, PathBuf};

use crate::backend::MountBackend;
use crate::error::{MountError, StepOutcome};
use crate::mount_table;

/// What happened while unmounting a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmountReport {
    /// Whether the destination was a mount point when checked
    pub was_mounted: bool,
    /// Result of detaching the mount
    pub unmount: StepOutcome,
    /// Result of removing the (now empty) destination directory
    pub remove_dir: StepOutcome,
}

/// Creates, binds, unmounts and removes destinations.
pub struct MountManager {
    backend: Box<dyn MountBackend>,
}

impl MountManager {
    pub fn new(backend: Box<dyn MountBackend>) -> Self {
        Self { backend }
    }

    /// Create `destination` (with parents) and bind `source` onto it.
    ///
    /// Not best-effort: any failure is returned and the directory this call
    /// created is removed again.
    pub fn mount(&self, source: &Path, destination: &Path) -> Result<(), MountError> {
        let existed = destination.exists();
        std::fs::create_dir_all(destination).map_err(|source| MountError::CreateMountPoint {
            path: destination.to_path_buf(),
            source,
        })?;

        if let Err(e) = self.backend.bind(source, destination) {
            if !existed && let Err(rm) = std::fs::remove_dir(destination) {
                tracing::warn!(
                    "Failed to remove {} after failed bind: {rm}",
                    destination.display()
                );
            }
            return Err(e);
        }

        tracing::info!(
            source = %source.display(),
            destination = %destination.display(),
            "bind mounted"
        );
        Ok(())
    }

    /// Unmount `destination` if it is a mount point, then remove the directory.
    ///
    /// Never fails: both steps are reported in the returned [`UnmountReport`].
    /// The directory is removed with `remove_dir`, so a destination that is
    /// still mounted (or otherwise non-empty) is left in place.
    pub fn unmount(&self, destination: &Path) -> UnmountReport {
        let was_mounted = match self.is_mountpoint(destination) {
            Ok(mounted) => mounted,
            Err(e) => {
                // Unknown: attempt the unmount and let the tool decide
                tracing::warn!("{e}; attempting unmount of {} anyway", destination.display());
                true
            }
        };

        let unmount = if was_mounted {
            StepOutcome::record("unmount", self.backend.unmount(destination))
        } else {
            StepOutcome::skipped("not a mount point")
        };

        let remove_dir = match std::fs::remove_dir(destination) {
            Ok(()) => StepOutcome::Done,
            Err(e) if e.kind() == io::ErrorKind::NotFound => StepOutcome::skipped("already gone"),
            Err(e) => {
                tracing::debug!("Leaving {} in place: {e}", destination.display());
                StepOutcome::skipped(format!("not removed: {e}"))
            }
        };

        UnmountReport {
            was_mounted,
            unmount,
            remove_dir,
        }
    }

    /// Whether anything is mounted exactly at `path`.
    pub fn is_mountpoint(&self, path: &Path) -> Result<bool, MountError> {
        Ok(mount_table::is_mountpoint(&self.backend.mount_table()?, path))
    }

    /// Source directory of whatever is currently bind mounted at `destination`.
    pub fn resolve_mount_source(&self, destination: &Path) -> Option<PathBuf> {
        match self.backend.mount_table() {
            Ok(table) => mount_table::resolve_mount_source(&table, destination),
            Err(e) => {
                tracing::warn!("{e}");
                None
            }
        }
    }

    /// Mount points directly under `parent`, e.g. everything published in a docroot.
    pub fn mounted_under(&self, parent: &Path) -> Result<Vec<PathBuf>, MountError> {
        let table = self.backend.mount_table()?;
        Ok(mount_table::mounts_under(&table, parent)
            .into_iter()
            .map(|m| m.mountpoint.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMountBackend;
    use std::fs;
    use tempfile::TempDir;

    fn manager() -> (MountManager, FakeMountBackend) {
        let fake = FakeMountBackend::new();
        (MountManager::new(Box::new(fake.clone())), fake)
    }

    #[test]
    fn test_mount_creates_destination_and_binds() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("site");
        fs::create_dir(&source).unwrap();
        let destination = temp.path().join("docroot/nested/site");
        let (manager, fake) = manager();

        manager.mount(&source, &destination).unwrap();

        assert!(destination.is_dir());
        assert!(fake.is_mounted(&destination));
        assert_eq!(manager.resolve_mount_source(&destination), Some(source));
    }

    #[test]
    fn test_failed_bind_removes_created_directory() {
        let temp = TempDir::new().unwrap();
        let destination = temp.path().join("site");
        let (manager, fake) = manager();
        fake.fail_binds(true);

        let err = manager.mount(temp.path(), &destination).unwrap_err();
        assert!(matches!(err, MountError::BindFailed { .. }));
        assert!(!destination.exists());
    }

    #[test]
    fn test_unmount_removes_directory() {
        let temp = TempDir::new().unwrap();
        let destination = temp.path().join("site");
        let (manager, fake) = manager();
        manager.mount(temp.path(), &destination).unwrap();

        let report = manager.unmount(&destination);

        assert!(report.was_mounted);
        assert_eq!(report.unmount, StepOutcome::Done);
        assert_eq!(report.remove_dir, StepOutcome::Done);
        assert!(!fake.is_mounted(&destination));
        assert!(!destination.exists());
    }

    #[test]
    fn test_unmount_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let destination = temp.path().join("site");
        let (manager, _fake) = manager();
        manager.mount(temp.path(), &destination).unwrap();

        let _ = manager.unmount(&destination);
        let second = manager.unmount(&destination);

        assert!(!second.was_mounted);
        assert!(!second.unmount.is_failed());
        assert!(!second.remove_dir.is_failed());
    }

    #[test]
    fn test_unmount_failure_keeps_directory() {
        let temp = TempDir::new().unwrap();
        let destination = temp.path().join("site");
        let (manager, fake) = manager();
        manager.mount(temp.path(), &destination).unwrap();
        fs::write(destination.join("still-visible"), "x").unwrap();
        fake.fail_unmounts(true);

        let report = manager.unmount(&destination);

        assert!(report.unmount.is_failed());
        assert!(!report.remove_dir.is_failed());
        assert!(destination.join("still-visible").exists());
    }

    #[test]
    fn test_mounted_under() {
        let temp = TempDir::new().unwrap();
        let docroot = temp.path().join("docroot");
        let (manager, _fake) = manager();
        manager.mount(temp.path(), &docroot.join("a")).unwrap();
        manager.mount(temp.path(), &docroot.join("b")).unwrap();

        let mut mounted = manager.mounted_under(&docroot).unwrap();
        mounted.sort();
        assert_eq!(mounted, vec![docroot.join("a"), docroot.join("b")]);
    }
}
