//! Cleaning up a publish from outside the session that created it.
//!
//! A clean target is found by path, by record, or (when the record is gone)
//! by asking the mount table what is bound at `<docroot>/<alias>`. After the
//! operator confirms, the same reverse steps a session runs on shutdown are
//! applied, followed by an optional sweep of lingering processes that still
//! reference the publish.
//!
//! Nothing here rolls back: a step that ran stays done even if a later one
//! fails.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::instrument;

use crate::acl::GrantReport;
use crate::alias::validate_alias;
use crate::context::PublishContext;
use crate::error::{PublishError, StepOutcome};
use crate::mount_manager::UnmountReport;
use crate::operator::Operator;
use crate::path_resolver;
use crate::process_detection::{
    ProcessInfo, ProcessTable, TerminationResult, ancestor_chain, find_candidate_processes,
    session_patterns, terminate_processes,
};

/// How a clean target was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOrigin {
    /// From the record store
    Record,
    /// From the live mount table (no record)
    MountTable,
    /// The argument was an existing directory
    Path,
}

/// A publish to clean up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanTarget {
    pub alias: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub origin: TargetOrigin,
}

/// What a confirmed clean did.
#[derive(Debug, Clone)]
pub struct CleanReport {
    pub target: CleanTarget,
    pub revoke: GrantReport,
    pub unmount: UnmountReport,
    pub record: StepOutcome,
    pub reload: StepOutcome,
    /// Processes that matched the publish
    pub candidates: Vec<ProcessInfo>,
    /// Termination results (empty if none matched or the operator declined)
    pub terminated: Vec<TerminationResult>,
}

impl CleanReport {
    /// Number of best-effort steps that failed.
    pub fn failures(&self) -> usize {
        self.revoke.failed.len()
            + usize::from(self.unmount.unmount.is_failed())
            + usize::from(self.unmount.remove_dir.is_failed())
            + usize::from(self.record.is_failed())
            + usize::from(self.reload.is_failed())
    }
}

/// Result of [`RecoveryController::clean`].
#[derive(Debug, Clone)]
pub enum CleanOutcome {
    /// No target was given and there are no records or orphan mounts
    NothingToClean,
    /// The operator declined; nothing was changed
    Aborted,
    /// Teardown ran
    Cleaned(Box<CleanReport>),
}

/// Drives `clean` against a context and a process table.
pub struct RecoveryController<'a> {
    ctx: &'a PublishContext,
    processes: &'a dyn ProcessTable,
    exclude: Vec<u32>,
    grace: Duration,
}

impl<'a> RecoveryController<'a> {
    /// Controller that never matches the current process or any of its
    /// ancestors.
    pub fn new(ctx: &'a PublishContext, processes: &'a dyn ProcessTable) -> Self {
        let mut controller = Self::for_process(ctx, processes, std::process::id());
        let parent = u32::try_from(nix::unistd::getppid().as_raw()).unwrap_or_default();
        if !controller.exclude.contains(&parent) {
            controller.exclude.push(parent);
        }
        controller
    }

    /// Controller acting on behalf of `pid`: the lingering-process scan
    /// skips `pid` and its whole ancestor chain.
    pub fn for_process(ctx: &'a PublishContext, processes: &'a dyn ProcessTable, pid: u32) -> Self {
        Self {
            ctx,
            processes,
            exclude: ancestor_chain(processes, pid),
            grace: Duration::from_secs(ctx.config.kill_grace_secs),
        }
    }

    /// Override the SIGTERM → SIGKILL grace period.
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Aliases an interactive clean can pick from: every record plus every
    /// mount under the docroot that has no record.
    pub fn selectable(&self) -> Result<Vec<String>, PublishError> {
        let mut aliases: BTreeSet<String> = self.ctx.records.list_aliases()?.into_iter().collect();
        aliases.extend(self.orphans());
        Ok(aliases.into_iter().collect())
    }

    /// Mounts directly under the docroot that have no record.
    pub fn orphans(&self) -> Vec<String> {
        let mounted = match self.ctx.mounts.mounted_under(&self.ctx.config.docroot) {
            Ok(mounted) => mounted,
            Err(e) => {
                tracing::warn!("{e}; orphan mounts are not listed");
                return Vec::new();
            }
        };

        let mut orphans: Vec<String> = mounted
            .iter()
            .filter_map(|m| m.file_name()?.to_str().map(str::to_string))
            .filter(|alias| matches!(self.ctx.records.read(alias), Ok(None)))
            .collect();
        orphans.sort();
        orphans.dedup();
        orphans
    }

    /// Work out what `target` refers to without changing anything.
    ///
    /// An existing directory is taken as the source itself. Anything else is
    /// an alias, looked up in the record store and then in the mount table.
    pub fn resolve_target(&self, target: &str) -> Result<CleanTarget, PublishError> {
        let as_path = path_resolver::resolve(Path::new(target));
        if as_path.is_dir() {
            let alias = as_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    PublishError::Usage(format!("Cannot clean {}: it has no alias", as_path.display()))
                })?;
            return Ok(CleanTarget {
                destination: self.ctx.config.destination_for(&alias),
                alias,
                source: as_path,
                origin: TargetOrigin::Path,
            });
        }

        validate_alias(target)?;
        let destination = self.ctx.config.destination_for(target);

        match self.ctx.records.read(target) {
            Ok(Some(source)) => {
                return Ok(CleanTarget {
                    alias: target.to_string(),
                    source,
                    destination,
                    origin: TargetOrigin::Record,
                });
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to read record for '{target}': {e}"),
        }

        match self.ctx.mounts.resolve_mount_source(&destination) {
            Some(source) => {
                tracing::info!(alias = target, source = %source.display(), "no record; source taken from the mount table");
                Ok(CleanTarget {
                    alias: target.to_string(),
                    source,
                    destination,
                    origin: TargetOrigin::MountTable,
                })
            }
            None => Err(PublishError::RecoveryAmbiguity {
                target: target.to_string(),
                destination,
            }),
        }
    }

    /// Clean `target`, or ask the operator which publish to clean.
    ///
    /// The operator must confirm before anything changes. A declined choice
    /// or confirmation is [`CleanOutcome::Aborted`], not an error.
    #[instrument(level = "info", name = "recovery::clean", skip_all, fields(target = target.unwrap_or("<select>")))]
    pub fn clean(
        &self,
        target: Option<&str>,
        operator: &mut dyn Operator,
    ) -> Result<CleanOutcome, PublishError> {
        let target = match target {
            Some(target) => self.resolve_target(target)?,
            None => {
                let options = self.selectable()?;
                if options.is_empty() {
                    return Ok(CleanOutcome::NothingToClean);
                }
                let Some(choice) = operator
                    .choose("Select the publish to clean", &options)
                    .filter(|choice| options.contains(choice))
                else {
                    return Ok(CleanOutcome::Aborted);
                };
                self.resolve_target(&choice)?
            }
        };

        let question = format!(
            "Clean up '{}': unmount {} and revoke {}'s access to {}?",
            target.alias,
            target.destination.display(),
            self.ctx.grants.server_user(),
            target.source.display()
        );
        if !operator.confirm(&question) {
            tracing::info!(alias = %target.alias, "clean declined");
            return Ok(CleanOutcome::Aborted);
        }

        let others = self.ctx.other_sources(&target.alias);
        let revoke = self.ctx.grants.revoke_keeping(&target.source, self.ctx.home(), &others);
        let unmount = self.ctx.mounts.unmount(&target.destination);
        let record = StepOutcome::record("record delete", self.ctx.records.delete(&target.alias));
        let reload = self.ctx.reload.notify();

        let (candidates, terminated) = self.stop_lingering(&target, operator);

        let report = CleanReport {
            target,
            revoke,
            unmount,
            record,
            reload,
            candidates,
            terminated,
        };
        tracing::info!(alias = %report.target.alias, failures = report.failures(), "clean complete");
        Ok(CleanOutcome::Cleaned(Box::new(report)))
    }

    /// Offer to terminate processes still referencing `target`.
    fn stop_lingering(
        &self,
        target: &CleanTarget,
        operator: &mut dyn Operator,
    ) -> (Vec<ProcessInfo>, Vec<TerminationResult>) {
        let patterns = session_patterns(&target.source, &target.destination, &target.alias);
        let candidates = find_candidate_processes(self.processes, &patterns, &self.exclude);
        if candidates.is_empty() {
            tracing::debug!(alias = %target.alias, "no lingering processes");
            return (candidates, Vec::new());
        }

        let listing: Vec<String> = candidates
            .iter()
            .map(|p| format!("  {:>7}  {}", p.pid, p.cmdline))
            .collect();
        let question = format!(
            "These processes may still be serving '{}':\n{}\nTerminate them?",
            target.alias,
            listing.join("\n")
        );
        if !operator.confirm(&question) {
            return (candidates, Vec::new());
        }

        let pids: Vec<u32> = candidates.iter().map(|p| p.pid).collect();
        let terminated = terminate_processes(self.processes, &pids, self.grace);
        (candidates, terminated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process_detection::Termination;
    use crate::testing::{FakeProcessTable, ScriptedOperator, TestHost};

    fn process(pid: u32, cmdline: &str) -> ProcessInfo {
        ProcessInfo {
            pid,
            cmdline: cmdline.to_string(),
            environ: Vec::new(),
        }
    }

    fn publish(host: &TestHost, alias: &str, source: &Path) {
        let destination = host.docroot().join(alias);
        host.context.mounts.mount(source, &destination).unwrap();
        host.context.records.write(alias, source).unwrap();
        host.context.grants.grant(source, host.context.home());
    }

    #[test]
    fn test_resolve_from_record() {
        let host = TestHost::new();
        let source = host.make_source("site");
        publish(&host, "blog", &source);
        let table = FakeProcessTable::default();
        let controller = RecoveryController::new(&host.context, &table);

        let target = controller.resolve_target("blog").unwrap();
        assert_eq!(target.origin, TargetOrigin::Record);
        assert_eq!(target.source, source);
        assert_eq!(target.destination, host.docroot().join("blog"));
    }

    #[test]
    fn test_resolve_falls_back_to_mount_table() {
        let host = TestHost::new();
        let source = host.make_source("site");
        publish(&host, "blog", &source);
        host.context.records.delete("blog").unwrap();
        let table = FakeProcessTable::default();
        let controller = RecoveryController::new(&host.context, &table);

        let target = controller.resolve_target("blog").unwrap();
        assert_eq!(target.origin, TargetOrigin::MountTable);
        assert_eq!(target.source, source);
    }

    #[test]
    fn test_resolve_unknown_alias_is_ambiguous() {
        let host = TestHost::new();
        let table = FakeProcessTable::default();
        let controller = RecoveryController::new(&host.context, &table);

        let err = controller.resolve_target("ghost").unwrap_err();
        assert!(matches!(err, PublishError::RecoveryAmbiguity { .. }));
        assert!(!err.is_usage());
    }

    #[test]
    fn test_resolve_existing_path_bypasses_records() {
        let host = TestHost::new();
        let source = host.make_source("site");
        let table = FakeProcessTable::default();
        let controller = RecoveryController::new(&host.context, &table);

        let target = controller.resolve_target(source.to_str().unwrap()).unwrap();
        assert_eq!(target.origin, TargetOrigin::Path);
        assert_eq!(target.alias, "site");
        assert_eq!(target.destination, host.docroot().join("site"));
    }

    #[test]
    fn test_resolve_rejects_invalid_alias() {
        let host = TestHost::new();
        let table = FakeProcessTable::default();
        let controller = RecoveryController::new(&host.context, &table);

        let err = controller.resolve_target("no/such/alias").unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn test_nothing_to_clean() {
        let host = TestHost::new();
        let table = FakeProcessTable::default();
        let controller = RecoveryController::new(&host.context, &table);
        let mut operator = ScriptedOperator::new();

        let outcome = controller.clean(None, &mut operator).unwrap();
        assert!(matches!(outcome, CleanOutcome::NothingToClean));
        assert!(operator.prompts.is_empty());
    }

    #[test]
    fn test_declined_confirmation_changes_nothing() {
        let host = TestHost::new();
        let source = host.make_source("site");
        publish(&host, "site", &source);
        let table = FakeProcessTable::default();
        let controller = RecoveryController::new(&host.context, &table);
        let mut operator = ScriptedOperator::new().confirm_answer(false);

        let outcome = controller.clean(Some("site"), &mut operator).unwrap();

        assert!(matches!(outcome, CleanOutcome::Aborted));
        assert!(host.mounts.is_mounted(&host.docroot().join("site")));
        assert_eq!(host.context.records.read("site").unwrap(), Some(source));
        assert_eq!(host.reloads.count(), 0);
    }

    #[test]
    fn test_unknown_selection_aborts() {
        let host = TestHost::new();
        let source = host.make_source("site");
        publish(&host, "site", &source);
        let table = FakeProcessTable::default();
        let controller = RecoveryController::new(&host.context, &table);
        let mut operator = ScriptedOperator::new().choose_answer(Some("other"));

        let outcome = controller.clean(None, &mut operator).unwrap();
        assert!(matches!(outcome, CleanOutcome::Aborted));
        assert!(host.mounts.is_mounted(&host.docroot().join("site")));
    }

    #[test]
    fn test_selection_includes_orphans() {
        let host = TestHost::new();
        let recorded = host.make_source("site");
        let orphan = host.make_source("old");
        publish(&host, "site", &recorded);
        std::fs::create_dir(host.docroot().join("old")).unwrap();
        host.mounts.insert_mount(host.docroot().join("old"), &orphan);
        let table = FakeProcessTable::default();
        let controller = RecoveryController::new(&host.context, &table);

        assert_eq!(controller.orphans(), vec!["old".to_string()]);
        assert_eq!(controller.selectable().unwrap(), vec!["old".to_string(), "site".to_string()]);
    }

    #[test]
    fn test_clean_tears_down_and_skips_process_prompt() {
        let host = TestHost::new();
        let source = host.make_source("site");
        publish(&host, "site", &source);
        let table = FakeProcessTable::new(vec![process(500, "vim notes.txt")]);
        let controller = RecoveryController::new(&host.context, &table);
        let mut operator = ScriptedOperator::always_yes();

        let CleanOutcome::Cleaned(report) = controller.clean(Some("site"), &mut operator).unwrap() else {
            panic!("expected a clean");
        };

        assert_eq!(report.failures(), 0);
        assert!(report.candidates.is_empty());
        assert_eq!(operator.prompts.len(), 1);
        assert!(!host.mounts.is_mounted(&host.docroot().join("site")));
        assert!(host.acl.is_empty());
        assert_eq!(host.context.records.read("site").unwrap(), None);
        assert_eq!(host.reloads.count(), 1);
        assert!(table.signals().is_empty());
    }

    #[test]
    fn test_clean_terminates_confirmed_processes() {
        let host = TestHost::new();
        let source = host.make_source("site");
        publish(&host, "site", &source);
        let table = FakeProcessTable::new(vec![
            process(500, &format!("webpub publish {}", source.display())),
            process(501, "python3 -m http.server"),
        ]);
        table.ignore_sigterm(500);
        let controller =
            RecoveryController::new(&host.context, &table).with_grace(Duration::from_millis(10));
        let mut operator = ScriptedOperator::always_yes();

        let CleanOutcome::Cleaned(report) = controller.clean(Some("site"), &mut operator).unwrap() else {
            panic!("expected a clean");
        };

        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.terminated[0].pid, 500);
        assert_eq!(report.terminated[0].termination, Termination::Killed);
        assert_eq!(table.signals(), vec![(500, false), (500, true)]);
    }

    #[test]
    fn test_declined_termination_keeps_processes() {
        let host = TestHost::new();
        let source = host.make_source("site");
        publish(&host, "site", &source);
        let table = FakeProcessTable::new(vec![process(500, "webpub publish site")]);
        let controller = RecoveryController::new(&host.context, &table);
        let mut operator = ScriptedOperator::new().confirm_answer(true).confirm_answer(false);

        let CleanOutcome::Cleaned(report) = controller.clean(Some("site"), &mut operator).unwrap() else {
            panic!("expected a clean");
        };

        assert_eq!(report.candidates.len(), 1);
        assert!(report.terminated.is_empty());
        assert!(table.is_alive(500));
        assert!(operator.prompts[1].contains("500"));
    }

    #[test]
    fn test_own_invocation_chain_is_never_a_candidate() {
        let host = TestHost::new();
        let source = host.make_source("site");
        publish(&host, "site", &source);
        // sudo with a pty: sudo -> sudo (monitor) -> webpub
        let table = FakeProcessTable::new(vec![
            process(100, "sudo webpub clean --yes site"),
            process(101, "sudo webpub clean --yes site"),
            process(102, "webpub clean --yes site"),
            process(500, "webpub publish /home/u/site"),
        ]);
        table.set_parent(100, 1);
        table.set_parent(101, 100);
        table.set_parent(102, 101);
        table.set_parent(500, 1);
        let controller = RecoveryController::for_process(&host.context, &table, 102)
            .with_grace(Duration::from_millis(10));
        let mut operator = ScriptedOperator::always_yes();

        let CleanOutcome::Cleaned(report) = controller.clean(Some("site"), &mut operator).unwrap() else {
            panic!("expected a clean");
        };

        let candidates: Vec<u32> = report.candidates.iter().map(|p| p.pid).collect();
        assert_eq!(candidates, vec![500]);
        assert_eq!(table.signals(), vec![(500, false)]);
        assert!(table.is_alive(100) && table.is_alive(101) && table.is_alive(102));
    }
}
