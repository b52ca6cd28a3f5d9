//! Publish command - serve a directory until interrupted.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use webpub_mount::{
    GrantReport, PublishConfig, PublishContext, PublishSession, TeardownReport, daemon, identity,
    signal,
};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Directory to publish
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Name under the document root (defaults to the directory name)
    #[arg(value_name = "ALIAS")]
    pub alias: Option<String>,

    /// Open the published URL in the invoking user's browser
    #[arg(long)]
    pub open: bool,
}

#[instrument(level = "info", name = "cmd::publish", skip_all, fields(path = %args.path.display()))]
pub fn execute(args: &Args, config: PublishConfig, quiet: bool) -> Result<()> {
    // Before any mutation, so a signal during start-up still ends in teardown
    signal::install_signal_handler().context("Failed to install signal handlers")?;

    let user = identity::invoking_user();
    let home = user.as_ref().map(|u| u.home.clone());
    let context = PublishContext::system(config, home);

    let mut session = PublishSession::new(&context);
    session.establish(&args.path, args.alias.as_deref())?;

    let alias = session.alias().unwrap_or_default().to_string();
    let url = session.url().unwrap_or_default();

    if let Some(report) = session.grant_report() {
        warn_about_grants(report, context.grants.server_user());
    }
    if !session.is_recorded() {
        eprintln!(
            "Warning: could not record this publish in {}; `webpub clean {alias}` will fall back to the mount table",
            context.records.dir().display()
        );
    }

    if !quiet {
        if let (Some(source), Some(destination)) = (session.source(), session.destination()) {
            eprintln!("Publishing {} at {}", source.display(), destination.display());
        }
        eprintln!("Press Ctrl+C to stop.");
    }
    println!("{url}");

    if args.open {
        daemon::open_url(&url, user.as_ref().map(|u| u.name.as_str()));
    }

    let report = session.serve(|| {
        let received = signal::wait_for_shutdown();
        tracing::info!(signal = received, "stopping publish");
    });

    print_teardown(&alias, &report, &context);
    Ok(())
}

fn warn_about_grants(report: &GrantReport, server_user: &str) {
    if report.unavailable {
        tracing::info!("setfacl not available; relying on existing permissions");
        return;
    }
    if report.has_failures() {
        eprintln!(
            "Warning: could not grant {server_user} access to {} path(s); the server may answer 403 Forbidden",
            report.failed.len()
        );
        for (path, error) in &report.failed {
            eprintln!("  {}: {error}", path.display());
        }
    }
}

fn print_teardown(alias: &str, report: &TeardownReport, context: &PublishContext) {
    if report.left_mounted() {
        eprintln!(
            "Warning: {} is still mounted; run `webpub clean {alias}` once it is no longer busy",
            context.config.destination_for(alias).display()
        );
    }

    match report.failures() {
        0 => eprintln!("Unpublished {alias}."),
        n => eprintln!("Unpublished {alias} with {n} warning(s); see the log above."),
    }
}
