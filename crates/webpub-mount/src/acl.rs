//! Server-identity ACL grants along the path to a published directory.
//!
//! The web server needs read access to the published tree and traverse
//! (`x`) access on every ancestor it must walk through. The ancestor chain
//! is recomputed from the source path and the home directory on every call;
//! nothing about what was granted is stored.
//!
//! Every grant and revoke is best-effort: a failure on one path is logged
//! and the rest of the chain is still processed.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};

/// Permission granted on a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Read plus traverse on directories (`rX`)
    ReadTraverse,
    /// Traverse only (`x`)
    Traverse,
}

impl Access {
    fn perms(self) -> &'static str {
        match self {
            Self::ReadTraverse => "rX",
            Self::Traverse => "x",
        }
    }
}

/// Per-user ACL capability of the filesystem.
pub trait AclBackend {
    /// Whether the capability exists on this host.
    fn is_available(&self) -> bool;

    /// Add an entry for `user` on `path`.
    fn grant(&self, path: &Path, user: &str, access: Access, recursive: bool) -> Result<()>;

    /// Remove any entry for `user` on `path`.
    fn revoke(&self, path: &Path, user: &str, recursive: bool) -> Result<()>;
}

/// [`AclBackend`] driving the `setfacl` tool.
#[derive(Debug, Clone)]
pub struct SetfaclBackend {
    program: Option<PathBuf>,
}

impl SetfaclBackend {
    /// Locate `setfacl` on `PATH`; a missing tool makes every call a no-op.
    pub fn new() -> Self {
        let program = find_in_path("setfacl");
        if program.is_none() {
            tracing::debug!("setfacl not found on PATH; ACL grants are disabled");
        }
        Self { program }
    }

    fn run(&self, args: &[&str], path: &Path) -> Result<()> {
        let Some(program) = &self.program else {
            bail!("setfacl is not installed");
        };

        let output = Command::new(program)
            .args(args)
            .arg(path)
            .output()
            .context("Failed to run setfacl")?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("setfacl {} {}: {}", args.join(" "), path.display(), stderr.trim())
    }
}

impl Default for SetfaclBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AclBackend for SetfaclBackend {
    fn is_available(&self) -> bool {
        self.program.is_some()
    }

    fn grant(&self, path: &Path, user: &str, access: Access, recursive: bool) -> Result<()> {
        let entry = format!("u:{user}:{}", access.perms());
        if recursive {
            self.run(&["-R", "-m", &entry], path)
        } else {
            self.run(&["-m", &entry], path)
        }
    }

    fn revoke(&self, path: &Path, user: &str, recursive: bool) -> Result<()> {
        let entry = format!("u:{user}");
        if recursive {
            self.run(&["-R", "-x", &entry], path)
        } else {
            self.run(&["-x", &entry], path)
        }
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Outcome of a grant or revoke over the whole chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantReport {
    /// Paths where the operation succeeded
    pub applied: Vec<PathBuf>,
    /// Paths where it failed, with the rendered error
    pub failed: Vec<(PathBuf, String)>,
    /// True when the ACL capability is missing and nothing was attempted
    pub unavailable: bool,
}

impl GrantReport {
    /// Whether at least one path failed.
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    fn push(&mut self, path: &Path, result: Result<()>) {
        match result {
            Ok(()) => self.applied.push(path.to_path_buf()),
            Err(e) => {
                tracing::warn!("ACL change on {} failed: {e:#}", path.display());
                self.failed.push((path.to_path_buf(), format!("{e:#}")));
            }
        }
    }
}

/// Ancestors of `source` that need traverse access, nearest first.
///
/// Walks parent by parent and stops at `home` or `/`, both included. When
/// the walk stopped somewhere other than `home` (the source lies outside
/// it), `home` is appended as well.
pub fn grant_chain(source: &Path, home: Option<&Path>) -> Vec<PathBuf> {
    let mut chain = Vec::new();
    let mut current = source;

    while Some(current) != home && current != Path::new("/") {
        let Some(parent) = current.parent() else {
            break;
        };
        chain.push(parent.to_path_buf());
        current = parent;
    }

    if let Some(home) = home
        && current != home
    {
        chain.push(home.to_path_buf());
    }

    chain
}

/// Grants and revokes the server identity's access to a source directory.
pub struct PermissionGrantor {
    backend: Box<dyn AclBackend>,
    server_user: String,
}

impl PermissionGrantor {
    pub fn new(backend: Box<dyn AclBackend>, server_user: impl Into<String>) -> Self {
        Self {
            backend,
            server_user: server_user.into(),
        }
    }

    /// Identity receiving the grants.
    pub fn server_user(&self) -> &str {
        &self.server_user
    }

    /// Recursive read on `source`, traverse on its grant chain.
    pub fn grant(&self, source: &Path, home: Option<&Path>) -> GrantReport {
        let mut report = GrantReport::default();
        if !self.backend.is_available() {
            report.unavailable = true;
            return report;
        }

        let user = &self.server_user;
        report.push(source, self.backend.grant(source, user, Access::ReadTraverse, true));
        for dir in grant_chain(source, home) {
            report.push(&dir, self.backend.grant(&dir, user, Access::Traverse, false));
        }

        tracing::debug!(
            applied = report.applied.len(),
            failed = report.failed.len(),
            "granted {user} access to {}",
            source.display()
        );
        report
    }

    /// Remove what [`grant`](Self::grant) adds, recomputing the same chain.
    pub fn revoke(&self, source: &Path, home: Option<&Path>) -> GrantReport {
        self.revoke_keeping(source, home, &[])
    }

    /// Like [`revoke`](Self::revoke), but leaves alone every entry another
    /// active publish of `others` still relies on: their grant chains, and
    /// anything inside or above one of their sources.
    pub fn revoke_keeping(&self, source: &Path, home: Option<&Path>, others: &[PathBuf]) -> GrantReport {
        let mut report = GrantReport::default();
        if !self.backend.is_available() {
            report.unavailable = true;
            return report;
        }

        let shared: Vec<PathBuf> = others.iter().flat_map(|o| grant_chain(o, home)).collect();
        let user = &self.server_user;

        if others.iter().any(|o| o.starts_with(source) || source.starts_with(o)) {
            tracing::debug!("{} overlaps another publish; keeping its grant", source.display());
        } else {
            report.push(source, self.backend.revoke(source, user, true));
        }
        for dir in grant_chain(source, home) {
            if shared.contains(&dir) || others.iter().any(|o| dir.starts_with(o)) {
                tracing::debug!("{} is still needed by another publish", dir.display());
                continue;
            }
            report.push(&dir, self.backend.revoke(&dir, user, false));
        }

        tracing::debug!(
            applied = report.applied.len(),
            failed = report.failed.len(),
            "revoked {user} access to {}",
            source.display()
        );
        report
    }
}
