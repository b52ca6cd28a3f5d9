//! Error types for publish and recovery operations.
//!
//! Only fatal conditions are errors. Best-effort steps (grants, reload,
//! record bookkeeping, unmount during teardown) report a [`StepOutcome`]
//! instead so a failure in one of them can never abort the sequence.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors from the mount collaborator.
#[derive(Debug, Error)]
pub enum MountError {
    /// The destination directory could not be created
    #[error("Failed to create mount point {}: {source}", path.display())]
    CreateMountPoint {
        /// Directory that could not be created
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The mount tool could not be executed at all
    #[error("Failed to run mount tool: {0}")]
    Command(#[from] std::io::Error),

    /// The bind mount was rejected
    #[error("Failed to bind {} onto {}: {reason}", from.display(), to.display())]
    BindFailed {
        /// Directory being published
        from: PathBuf,
        /// Destination under the document root
        to: PathBuf,
        /// Diagnostic from the mount tool
        reason: String,
    },

    /// Both the plain and the lazy unmount failed
    #[error("Failed to unmount {}: {reason}", target.display())]
    UnmountFailed {
        /// Mount point that is still mounted
        target: PathBuf,
        /// Diagnostic from the unmount tool
        reason: String,
    },

    /// The live mount table could not be read
    #[error("Failed to read mount table {}: {source}", path.display())]
    MountTable {
        /// Mount table path that failed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
}

/// Fatal errors of a publish or clean invocation.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Bad arguments
    #[error("{0}")]
    Usage(String),

    /// The caller lacks the privilege to mount and change ACLs
    #[error("webpub must be run as root (try: sudo webpub ...)")]
    NotPrivileged,

    /// The source is missing or not a directory
    #[error("Directory does not exist: {}", .0.display())]
    SourceMissing(PathBuf),

    /// A requested alias is not a single path component
    #[error("Invalid alias '{alias}': {reason}")]
    InvalidAlias {
        /// Alias as given
        alias: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Both the alias and its timestamped fallback already exist
    #[error("Alias '{candidate}' is taken under {} (retry in a second or pick another alias)", docroot.display())]
    AliasTaken {
        /// The fallback candidate that also collided
        candidate: String,
        /// Document root searched
        docroot: PathBuf,
    },

    /// Creating the destination or binding failed
    #[error(transparent)]
    Resource(#[from] MountError),

    /// A clean target has neither a record nor a live mount
    #[error("Cannot determine source for '{target}': no record and nothing mounted at {}", destination.display())]
    RecoveryAmbiguity {
        /// Alias given to `clean`
        target: String,
        /// Destination that was checked in the mount table
        destination: PathBuf,
    },

    /// Reading local state failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PublishError {
    /// True for errors that should map to the usage exit status.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Self::Usage(_) | Self::NotPrivileged | Self::InvalidAlias { .. }
        )
    }
}

/// Result of a single best-effort step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step ran and succeeded
    Done,
    /// The step was not needed or its capability is unavailable
    Skipped {
        /// Why it did not run
        reason: String,
    },
    /// The step ran and failed; the sequence continued anyway
    Failed {
        /// Rendered error
        error: String,
    },
}

impl StepOutcome {
    pub(crate) fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Convert a result into an outcome, logging failures as warnings.
    pub(crate) fn record<E: fmt::Display>(step: &str, result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::Done,
            Err(e) => {
                tracing::warn!("{step} failed: {e:#}");
                Self::Failed {
                    error: format!("{e:#}"),
                }
            }
        }
    }

    /// Whether the step failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => f.write_str("done"),
            Self::Skipped { reason } => write!(f, "skipped ({reason})"),
            Self::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_classification() {
        assert!(PublishError::NotPrivileged.is_usage());
        assert!(PublishError::Usage("x".into()).is_usage());
        assert!(
            PublishError::InvalidAlias {
                alias: "a/b".into(),
                reason: "contains '/'"
            }
            .is_usage()
        );
        assert!(!PublishError::SourceMissing(PathBuf::from("/nope")).is_usage());
        assert!(
            !PublishError::RecoveryAmbiguity {
                target: "site".into(),
                destination: PathBuf::from("/var/www/html/site"),
            }
            .is_usage()
        );
    }

    #[test]
    fn test_step_outcome_record() {
        assert_eq!(StepOutcome::record::<String>("reload", Ok(())), StepOutcome::Done);

        let failed = StepOutcome::record("reload", Err("exit status 1"));
        assert!(failed.is_failed());
        assert_eq!(failed.to_string(), "failed: exit status 1");
    }

    #[test]
    fn test_source_missing_message_shows_path() {
        let err = PublishError::SourceMissing(PathBuf::from("/home/u/missing"));
        assert_eq!(err.to_string(), "Directory does not exist: /home/u/missing");
    }
}
