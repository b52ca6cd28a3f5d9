//! Privileged vs. invoking identity.
//!
//! webpub runs as root (via sudo or doas) but the home-directory boundary of
//! the grant chain belongs to the user who invoked it.

use std::path::PathBuf;

use nix::unistd::{Uid, User, geteuid};

use crate::error::PublishError;

/// Environment variables naming the user behind a privilege-escalation tool.
const INVOKING_USER_VARS: &[&str] = &["SUDO_USER", "DOAS_USER"];

/// The unprivileged user who ran webpub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokingUser {
    pub name: String,
    pub uid: Uid,
    pub home: PathBuf,
}

/// Whether the effective user is root.
pub fn is_privileged() -> bool {
    geteuid().is_root()
}

/// Fail with [`PublishError::NotPrivileged`] unless running as root.
pub fn ensure_privileged() -> Result<(), PublishError> {
    if is_privileged() {
        Ok(())
    } else {
        Err(PublishError::NotPrivileged)
    }
}

/// Resolve the invoking user from `SUDO_USER`/`DOAS_USER`.
///
/// Returns `None` when not escalated or when the name is unknown to the
/// user database; the grant chain then walks up to `/`.
pub fn invoking_user() -> Option<InvokingUser> {
    let name = INVOKING_USER_VARS
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))?;
    lookup_user(&name)
}

/// Look up `name` in the user database.
pub fn lookup_user(name: &str) -> Option<InvokingUser> {
    match User::from_name(name) {
        Ok(Some(user)) => Some(InvokingUser {
            name: user.name,
            uid: user.uid,
            home: user.dir,
        }),
        Ok(None) => {
            tracing::warn!("Invoking user '{name}' not found; grants will walk up to /");
            None
        }
        Err(e) => {
            tracing::warn!("Failed to look up user '{name}': {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_root() {
        let root = lookup_user("root").unwrap();
        assert!(root.uid.is_root());
        assert!(root.home.is_absolute());
    }

    #[test]
    fn test_lookup_unknown_user() {
        assert!(lookup_user("no-such-user-webpub-test").is_none());
    }

    #[test]
    fn test_ensure_privileged_matches_euid() {
        assert_eq!(ensure_privileged().is_ok(), is_privileged());
    }
}
