//! Wiring of configuration and collaborators shared by sessions and recovery.

use std::path::{Path, PathBuf};

use crate::acl::{AclBackend, PermissionGrantor, SetfaclBackend};
use crate::alias::AliasAllocator;
use crate::backend::{MountBackend, SystemMountBackend};
use crate::config::PublishConfig;
use crate::mount_manager::MountManager;
use crate::record_store::RecordStore;
use crate::reload::{ReloadNotifier, Reloader};

/// Everything a publish or a clean needs, built once per invocation.
pub struct PublishContext {
    pub config: PublishConfig,
    /// Home directory of the invoking user: the grant chain boundary
    pub home: Option<PathBuf>,
    pub aliases: AliasAllocator,
    pub grants: PermissionGrantor,
    pub mounts: MountManager,
    pub records: RecordStore,
    pub reload: ReloadNotifier,
}

impl PublishContext {
    /// Context driving the real host: `mount`, `setfacl`, the reload command.
    pub fn system(config: PublishConfig, home: Option<PathBuf>) -> Self {
        let reload = ReloadNotifier::from_command(config.reload_command.clone());
        Self::assemble(
            config,
            home,
            Box::new(SystemMountBackend::new()),
            Box::new(SetfaclBackend::new()),
            reload,
        )
    }

    /// Context with caller-supplied backends.
    pub fn with_backends(
        config: PublishConfig,
        home: Option<PathBuf>,
        mounts: Box<dyn MountBackend>,
        acl: Box<dyn AclBackend>,
        reloader: Box<dyn Reloader>,
    ) -> Self {
        Self::assemble(config, home, mounts, acl, ReloadNotifier::new(reloader))
    }

    fn assemble(
        config: PublishConfig,
        home: Option<PathBuf>,
        mounts: Box<dyn MountBackend>,
        acl: Box<dyn AclBackend>,
        reload: ReloadNotifier,
    ) -> Self {
        Self {
            aliases: AliasAllocator::new(&config.docroot),
            grants: PermissionGrantor::new(acl, config.server_user.clone()),
            mounts: MountManager::new(mounts),
            records: RecordStore::new(&config.state_dir),
            reload,
            home,
            config,
        }
    }

    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    /// Sources of every recorded publish other than `alias`.
    ///
    /// Their grants must survive when `alias` is revoked. An unreadable
    /// record directory yields an empty list.
    pub fn other_sources(&self, alias: &str) -> Vec<PathBuf> {
        match self.records.list_records() {
            Ok(records) => records
                .into_iter()
                .filter(|r| r.alias != alias)
                .map(|r| r.source)
                .collect(),
            Err(e) => {
                tracing::warn!("Failed to list records: {e}; revoking without checking other publishes");
                Vec::new()
            }
        }
    }
}
