//! Temporary publishing of local directories into a web server document root.
//!
//! A publish makes a directory reachable at `<base_url>/<alias>` for as long
//! as the foreground session lives: the server identity gets ACL access,
//! the directory is bind mounted at `<docroot>/<alias>`, a record is written
//! so the publish can be found again after a crash, and the server is asked
//! to reload. On shutdown every step is undone in reverse.
//!
//! # Components
//!
//! ## Publish lifecycle
//!
//! - [`PublishSession`] - State machine from path resolution to teardown
//! - [`RecoveryController`] - `clean`: finds a stale publish and tears it down
//! - [`PublishContext`] - Configuration plus the collaborators both of them use
//!
//! ## Building blocks
//!
//! - [`AliasAllocator`] - Non-colliding names under the docroot
//! - [`PermissionGrantor`] - Grant and revoke along the ancestor chain
//! - [`MountManager`] - Destination directory and bind mount lifecycle
//! - [`RecordStore`] - One `<alias>.path` file per active publish
//! - [`ReloadNotifier`] - Fire-and-forget server reload
//!
//! ## Seams
//!
//! Every host facility sits behind a trait so the lifecycle can be driven
//! without root in tests (see [`testing`]):
//!
//! - [`MountBackend`] - `mount --bind`, `umount`, `/proc/self/mountinfo`
//! - [`AclBackend`] - `setfacl`
//! - [`Reloader`] - the configured reload command
//! - [`ProcessTable`] - `/proc` and `kill(2)`
//! - [`Operator`] - interactive selection and confirmation
//!
//! # Best-effort steps
//!
//! Only resolution, validation, alias allocation and the bind mount itself
//! can fail a publish. Grants, record bookkeeping, reloads and every
//! teardown step report a [`StepOutcome`] instead of an error and never
//! stop the sequence.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use webpub_mount::{PublishConfig, PublishContext, PublishSession, signal};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! signal::install_signal_handler()?;
//! let context = PublishContext::system(PublishConfig::default(), None);
//! let mut session = PublishSession::new(&context);
//! session.establish(Path::new("/home/u/site"), None)?;
//! println!("{}", session.url().unwrap_or_default());
//! session.serve(|| {
//!     signal::wait_for_shutdown();
//! });
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

mod acl;
mod alias;
mod backend;
mod bind_mount;
mod config;
mod context;
pub mod daemon;
mod error;
pub mod identity;
mod mount_manager;
pub mod mount_table;
mod operator;
pub mod path_resolver;
mod process_detection;
mod record_store;
mod recovery;
mod reload;
mod session;
pub mod signal;

pub use acl::{Access, AclBackend, GrantReport, PermissionGrantor, SetfaclBackend, grant_chain};
pub use alias::{AliasAllocator, Allocation, validate_alias};
pub use backend::{MountBackend, SystemMountBackend};
pub use config::{DEFAULT_DOCROOT, DEFAULT_SERVER_USER, DEFAULT_STATE_DIR, PublishConfig};
pub use context::PublishContext;
pub use error::{MountError, PublishError, StepOutcome};
pub use mount_manager::{MountManager, UnmountReport};
pub use mount_table::SystemMount;
pub use operator::Operator;
pub use process_detection::{
    ProcessInfo, ProcessTable, ProcfsTable, Termination, TerminationResult, ancestor_chain,
    find_candidate_processes, is_process_alive, session_patterns, terminate_processes,
};
pub use record_store::{RECORD_SUFFIX, RecordEntry, RecordStore};
pub use recovery::{CleanOutcome, CleanReport, CleanTarget, RecoveryController, TargetOrigin};
pub use reload::{CommandReloader, ReloadNotifier, Reloader};
pub use session::{PublishSession, SessionState, TeardownReport};

/// Testing utilities for publish and recovery flows.
///
/// In-memory doubles for every seam, a temporary host layout, and
/// assertions on the resulting host state.
pub mod testing;
