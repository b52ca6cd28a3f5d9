//! Alias allocation under the document root.

use std::path::{Path, PathBuf};

use crate::error::PublishError;

/// An alias and the destination directory it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Public name, also the destination's final component
    pub alias: String,
    /// `<docroot>/<alias>`
    pub destination: PathBuf,
}

/// Derives non-colliding aliases under a document root.
///
/// The requested name (or the source's final component) is tried first. If
/// anything already exists at that destination, one retry is made with a
/// `-<unix seconds>` suffix. There is no loop: if the suffixed name is also
/// taken the allocation fails rather than reuse an existing entry.
#[derive(Debug, Clone)]
pub struct AliasAllocator {
    docroot: PathBuf,
}

impl AliasAllocator {
    pub fn new(docroot: impl Into<PathBuf>) -> Self {
        Self {
            docroot: docroot.into(),
        }
    }

    /// Allocate using the current wall clock.
    pub fn allocate(&self, source: &Path, requested: Option<&str>) -> Result<Allocation, PublishError> {
        self.allocate_at(source, requested, chrono::Utc::now().timestamp())
    }

    /// Allocate with an explicit timestamp for the collision suffix.
    pub fn allocate_at(
        &self,
        source: &Path,
        requested: Option<&str>,
        now_secs: i64,
    ) -> Result<Allocation, PublishError> {
        let candidate = match requested {
            Some(name) => {
                validate_alias(name)?;
                name.to_string()
            }
            None => source
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    PublishError::Usage(format!(
                        "Cannot derive an alias from {}; pass one explicitly",
                        source.display()
                    ))
                })?,
        };

        if !self.is_taken(&candidate) {
            return Ok(self.allocation(candidate));
        }

        let fallback = format!("{candidate}-{now_secs}");
        tracing::debug!(%candidate, %fallback, "alias taken, retrying with timestamp");
        if self.is_taken(&fallback) {
            return Err(PublishError::AliasTaken {
                candidate: fallback,
                docroot: self.docroot.clone(),
            });
        }

        Ok(self.allocation(fallback))
    }

    fn is_taken(&self, alias: &str) -> bool {
        // symlink_metadata so dangling links still count as taken
        self.docroot.join(alias).symlink_metadata().is_ok()
    }

    fn allocation(&self, alias: String) -> Allocation {
        let destination = self.docroot.join(&alias);
        Allocation { alias, destination }
    }
}

/// Check that `alias` names exactly one entry directly under the docroot.
pub fn validate_alias(alias: &str) -> Result<(), PublishError> {
    let reason = if alias.is_empty() {
        "must not be empty"
    } else if alias == "." || alias == ".." {
        "must not be '.' or '..'"
    } else if alias.contains('/') {
        "must not contain '/'"
    } else if alias.contains('\0') {
        "must not contain NUL"
    } else {
        return Ok(());
    };

    Err(PublishError::InvalidAlias {
        alias: alias.to_string(),
        reason,
    })
}
