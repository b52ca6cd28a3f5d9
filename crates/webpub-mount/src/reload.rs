//! Web server reload notification.
//!
//! Reloading is fire-and-forget: a failed reload only means the server may
//! pick up the change late, so it is never allowed to block a publish or an
//! unpublish.

use std::process::Command;

use anyhow::{Context, Result, bail};

use crate::error::StepOutcome;

/// Something that can ask the web server to reload.
pub trait Reloader {
    fn reload(&self) -> Result<()>;
}

/// Runs a configured command line, e.g. `systemctl reload apache2`.
#[derive(Debug, Clone)]
pub struct CommandReloader {
    argv: Vec<String>,
}

impl CommandReloader {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

impl Reloader for CommandReloader {
    fn reload(&self) -> Result<()> {
        let Some((program, args)) = self.argv.split_first() else {
            bail!("no reload command configured");
        };

        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("Failed to run {program}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{} exited with {}: {}", self.argv.join(" "), output.status, stderr.trim());
        }
        Ok(())
    }
}

/// Wraps a [`Reloader`] so failures become logged outcomes.
pub struct ReloadNotifier {
    reloader: Box<dyn Reloader>,
    enabled: bool,
}

impl ReloadNotifier {
    pub fn new(reloader: Box<dyn Reloader>) -> Self {
        Self {
            reloader,
            enabled: true,
        }
    }

    /// Notifier for a reload command; an empty command disables reloading.
    pub fn from_command(argv: Vec<String>) -> Self {
        let enabled = !argv.is_empty();
        Self {
            reloader: Box::new(CommandReloader::new(argv)),
            enabled,
        }
    }

    /// Ask the server to reload. Never fails.
    pub fn notify(&self) -> StepOutcome {
        if !self.enabled {
            return StepOutcome::skipped("no reload command configured");
        }
        let outcome = StepOutcome::record("server reload", self.reloader.reload());
        if outcome == StepOutcome::Done {
            tracing::debug!("web server reloaded");
        }
        outcome
    }
}
