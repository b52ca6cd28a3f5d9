//! Clean command - tear down a publish whose session is gone.

use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use webpub_mount::{
    CleanOutcome, CleanReport, ProcfsTable, PublishConfig, PublishContext, RecoveryController,
    StepOutcome, TargetOrigin, Termination, identity,
};

use crate::prompt::TerminalOperator;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Alias or source directory of the publish (asked for when omitted)
    #[arg(value_name = "ALIAS_OR_PATH")]
    pub target: Option<String>,

    /// Answer yes to confirmations (the publish to clean is still asked for)
    #[arg(short, long)]
    pub yes: bool,
}

#[instrument(level = "info", name = "cmd::clean", skip_all)]
pub fn execute(args: &Args, config: PublishConfig) -> Result<()> {
    let home = identity::invoking_user().map(|u| u.home);
    let context = PublishContext::system(config, home);
    let processes = ProcfsTable::new();
    let controller = RecoveryController::new(&context, &processes);

    if args.target.is_none() {
        let orphans = controller.orphans();
        if !orphans.is_empty() {
            eprintln!(
                "Mounted under {} without a record: {}",
                context.config.docroot.display(),
                orphans.join(", ")
            );
        }
    }

    let mut operator = TerminalOperator::new(args.yes);
    match controller.clean(args.target.as_deref(), &mut operator)? {
        CleanOutcome::NothingToClean => {
            eprintln!(
                "Nothing to clean: no records in {} and nothing mounted under {}.",
                context.records.dir().display(),
                context.config.docroot.display()
            );
        }
        CleanOutcome::Aborted => eprintln!("Aborted; nothing was changed."),
        CleanOutcome::Cleaned(report) => print_report(&report),
    }

    Ok(())
}

fn print_report(report: &CleanReport) {
    let target = &report.target;
    let origin = match target.origin {
        TargetOrigin::Record => "record",
        TargetOrigin::MountTable => "mount table",
        TargetOrigin::Path => "path argument",
    };
    eprintln!("Source {} (from {origin})", target.source.display());

    if report.revoke.has_failures() {
        eprintln!("  revoke access: {} path(s) failed", report.revoke.failed.len());
    } else if report.revoke.unavailable {
        eprintln!("  revoke access: skipped (setfacl not available)");
    } else {
        eprintln!("  revoke access: done");
    }
    print_step("unmount", &report.unmount.unmount);
    print_step("remove directory", &report.unmount.remove_dir);
    print_step("delete record", &report.record);
    print_step("reload server", &report.reload);

    for result in &report.terminated {
        let outcome = match &result.termination {
            Termination::Graceful => "terminated".to_string(),
            Termination::Killed => "killed".to_string(),
            Termination::Failed(error) => format!("not stopped: {error}"),
        };
        eprintln!("  process {}: {outcome}", result.pid);
    }
    if !report.candidates.is_empty() && report.terminated.is_empty() {
        eprintln!("  {} matching process(es) left running", report.candidates.len());
    }

    match report.failures() {
        0 => eprintln!("Cleaned up {}.", target.alias),
        n => eprintln!("Cleaned up {} with {n} warning(s).", target.alias),
    }
}

fn print_step(name: &str, outcome: &StepOutcome) {
    eprintln!("  {name}: {outcome}");
}
