//! The lifecycle of a single foreground publish.
//!
//! ```text
//! Resolving → Validated → Granted → Mounted → Recorded → Serving → TearingDown → Done
//! ```
//!
//! A [`PublishSession`] remembers which resources it actually acquired, and
//! [`PublishSession::teardown`] releases exactly those, once. Teardown also
//! runs from `Drop`, so an early return, an error or a panic after the grant
//! still leaves the host as it was found.

use std::path::{Path, PathBuf};

use tracing::instrument;

use crate::acl::GrantReport;
use crate::alias::Allocation;
use crate::context::PublishContext;
use crate::error::{PublishError, StepOutcome};
use crate::mount_manager::UnmountReport;
use crate::path_resolver;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Resolving,
    Validated,
    Granted,
    Mounted,
    Recorded,
    Serving,
    TearingDown,
    Done,
}

/// What each teardown step did. `None` means the step had nothing to undo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub unmount: Option<UnmountReport>,
    pub revoke: Option<GrantReport>,
    pub record: Option<StepOutcome>,
    pub reload: Option<StepOutcome>,
}

impl TeardownReport {
    /// Number of steps that failed (each ACL path counts once).
    pub fn failures(&self) -> usize {
        let unmount = self.unmount.as_ref().map_or(0, |u| {
            usize::from(u.unmount.is_failed()) + usize::from(u.remove_dir.is_failed())
        });
        let revoke = self.revoke.as_ref().map_or(0, |r| r.failed.len());
        let record = self.record.as_ref().map_or(0, |o| usize::from(o.is_failed()));
        let reload = self.reload.as_ref().map_or(0, |o| usize::from(o.is_failed()));
        unmount + revoke + record + reload
    }

    /// Whether the destination may still be mounted.
    pub fn left_mounted(&self) -> bool {
        self.unmount.as_ref().is_some_and(|u| u.unmount.is_failed())
    }
}

/// One publish, from path resolution to teardown.
pub struct PublishSession<'a> {
    ctx: &'a PublishContext,
    state: SessionState,
    source: Option<PathBuf>,
    allocation: Option<Allocation>,
    grant_report: Option<GrantReport>,
    granted: bool,
    mounted: bool,
    recorded: bool,
    torn_down: bool,
}

impl<'a> PublishSession<'a> {
    pub fn new(ctx: &'a PublishContext) -> Self {
        Self {
            ctx,
            state: SessionState::Resolving,
            source: None,
            allocation: None,
            grant_report: None,
            granted: false,
            mounted: false,
            recorded: false,
            torn_down: false,
        }
    }

    /// Run every start-up step up to [`SessionState::Serving`].
    ///
    /// Validation and mount failures are returned; anything acquired before
    /// the failure has already been released when this returns.
    #[instrument(level = "info", name = "session::establish", skip_all, fields(path = %input.display()))]
    pub fn establish(&mut self, input: &Path, requested_alias: Option<&str>) -> Result<(), PublishError> {
        if self.state != SessionState::Resolving {
            return Err(PublishError::Usage("publish session already started".to_string()));
        }

        let source = path_resolver::resolve(input);
        if !source.is_dir() {
            return Err(PublishError::SourceMissing(source));
        }
        self.source = Some(source.clone());
        self.state = SessionState::Validated;

        let allocation = self.ctx.aliases.allocate(&source, requested_alias)?;
        tracing::info!(alias = %allocation.alias, destination = %allocation.destination.display(), "alias allocated");
        self.allocation = Some(allocation.clone());

        // Partial grants still need revoking, so the flag is set regardless
        let report = self.ctx.grants.grant(&source, self.ctx.home());
        self.granted = true;
        self.grant_report = Some(report);
        self.state = SessionState::Granted;

        if let Err(e) = self.ctx.mounts.mount(&source, &allocation.destination) {
            tracing::error!("{e}");
            self.teardown();
            return Err(e.into());
        }
        self.mounted = true;
        self.state = SessionState::Mounted;

        match self.ctx.records.write(&allocation.alias, &source) {
            Ok(()) => self.recorded = true,
            Err(e) => tracing::warn!(
                "Failed to write record for '{}': {e}; clean will have to use the mount table",
                allocation.alias
            ),
        }
        self.state = SessionState::Recorded;

        self.ctx.reload.notify();
        self.state = SessionState::Serving;
        tracing::info!(url = %self.ctx.config.url_for(&allocation.alias), "serving");
        Ok(())
    }

    /// Block in `wait` (normally until a shutdown signal), then tear down.
    pub fn serve<F: FnOnce()>(&mut self, wait: F) -> TeardownReport {
        if self.state == SessionState::Serving {
            wait();
        }
        self.teardown()
    }

    /// Release everything acquired, in order: unmount and remove the
    /// destination, revoke grants, delete the record, reload.
    ///
    /// Every step is best-effort and the sequence always completes. Calling
    /// this again is a no-op returning an empty report.
    #[instrument(level = "info", name = "session::teardown", skip_all)]
    pub fn teardown(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        if self.torn_down {
            return report;
        }
        self.torn_down = true;
        self.state = SessionState::TearingDown;

        if self.mounted
            && let Some(allocation) = &self.allocation
        {
            report.unmount = Some(self.ctx.mounts.unmount(&allocation.destination));
        }

        if self.granted
            && let Some(source) = &self.source
        {
            let others = self.ctx.other_sources(self.alias().unwrap_or_default());
            report.revoke = Some(self.ctx.grants.revoke_keeping(source, self.ctx.home(), &others));
        }

        if self.recorded
            && let Some(allocation) = &self.allocation
        {
            report.record = Some(StepOutcome::record(
                "record delete",
                self.ctx.records.delete(&allocation.alias),
            ));
        }

        if self.mounted {
            report.reload = Some(self.ctx.reload.notify());
        }

        self.state = SessionState::Done;
        tracing::info!(failures = report.failures(), "teardown complete");
        report
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Canonical source directory, once resolved.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn alias(&self) -> Option<&str> {
        self.allocation.as_ref().map(|a| a.alias.as_str())
    }

    pub fn destination(&self) -> Option<&Path> {
        self.allocation.as_ref().map(|a| a.destination.as_path())
    }

    /// Externally reachable address of the publish.
    pub fn url(&self) -> Option<String> {
        self.alias().map(|alias| self.ctx.config.url_for(alias))
    }

    /// Result of the grant step, for surfacing partial failures.
    pub fn grant_report(&self) -> Option<&GrantReport> {
        self.grant_report.as_ref()
    }

    /// Whether the record was written (the publish is recoverable by alias).
    pub fn is_recorded(&self) -> bool {
        self.recorded
    }
}

impl Drop for PublishSession<'_> {
    fn drop(&mut self) {
        if !self.torn_down && (self.granted || self.mounted || self.recorded) {
            tracing::warn!("publish session ended without teardown; cleaning up");
            self.teardown();
        }
    }
}
