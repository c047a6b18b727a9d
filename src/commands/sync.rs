use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use nebi::prompt::TerminalConfirm;
use nebi::sync::{self, ImportOutcome, PullOutcome, PullPlan, PushPlan};

use super::open_session;

#[derive(Args)]
pub struct PushArgs {
    /// name[:tag]; the name defaults to this directory's origin
    pub reference: Option<String>,

    /// Move the tag even if it already points at another version
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct PullArgs {
    /// name[:tag]; defaults to this directory's origin, tag to the newest
    pub reference: Option<String>,

    /// Directory to write into
    #[arg(short, long, conflicts_with = "global")]
    pub output: Option<PathBuf>,

    /// Overwrite an existing pixi.toml without asking
    #[arg(long)]
    pub force: bool,

    /// Materialize into a directory managed by nebi
    #[arg(long)]
    pub global: bool,
}

#[derive(Args)]
pub struct ImportArgs {
    /// host/repo[:tag]; an http:// prefix selects plain HTTP
    pub reference: String,

    /// Directory to write into
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Overwrite an existing pixi.toml without asking
    #[arg(long)]
    pub force: bool,
}

pub fn push(args: &PushArgs) -> Result<()> {
    let session = open_session()?;
    let server_url = session.server_url()?;
    let plan = PushPlan::resolve(
        &session.store,
        &session.cwd,
        server_url.as_deref(),
        args.reference.as_deref(),
    )?;
    if let Some(warning) = &plan.name_warning {
        eprintln!("Warning: {warning}");
    }
    if plan.files.lock.is_none() {
        eprintln!("Warning: no pixi.lock in {}; pushing pixi.toml only", plan.dir.display());
    }

    let server = session.connect()?;
    let outcome = plan.execute(&session.store, &server, args.force, session.sync_options())?;

    if outcome.created_remote {
        eprintln!("Created workspace '{}' on {}", outcome.name, session.require_server_url()?);
    }
    eprintln!(
        "Pushed {}:{} (version {})",
        outcome.name, outcome.tag, outcome.version_number
    );
    if outcome.deduplicated {
        eprintln!("  Content unchanged; tagged the existing version");
    }
    let extra: Vec<&str> = outcome
        .tags
        .iter()
        .map(String::as_str)
        .filter(|t| *t != outcome.tag)
        .collect();
    if !extra.is_empty() {
        eprintln!("  Also tagged: {}", extra.join(", "));
    }
    if outcome.newly_tracked {
        eprintln!(
            "  Now tracking {} as '{}'",
            outcome.workspace.path.display(),
            outcome.workspace.name
        );
    }
    Ok(())
}

pub fn pull(args: &PullArgs) -> Result<()> {
    let session = open_session()?;
    let server_url = session.server_url()?;
    let plan = PullPlan::resolve(
        &session.store,
        &session.cwd,
        server_url.as_deref(),
        args.reference.as_deref(),
        args.output.as_deref(),
        args.global,
    )?;
    let server = session.connect()?;

    match plan.execute(&session.store, &server, args.force, &TerminalConfirm)? {
        PullOutcome::Aborted => eprintln!("Aborted."),
        PullOutcome::Pulled(report) => {
            eprintln!(
                "Pulled {}:{} (version {}) into {}",
                report.name,
                report.tag,
                report.version_number,
                report.target.display()
            );
            if !report.wrote_lock {
                eprintln!("  The version has no pixi.lock");
            }
            if report.newly_tracked {
                eprintln!("  Now tracking as '{}'", report.workspace.name);
            }
        }
    }
    Ok(())
}

pub fn import(args: &ImportArgs) -> Result<()> {
    let session = open_session()?;
    let reference = sync::parse_oci_reference(&args.reference)?;
    let client = session.oci_client()?;

    let outcome = sync::import(
        &session.store,
        &session.cwd,
        &client,
        &reference,
        args.output.as_deref(),
        args.force,
        &TerminalConfirm,
    )?;
    match outcome {
        ImportOutcome::Aborted => eprintln!("Aborted."),
        ImportOutcome::Imported(report) => {
            eprintln!("Imported {} into {}", report.reference, report.target.display());
            if !report.wrote_lock {
                eprintln!("  The artifact has no pixi.lock");
            }
            if report.newly_tracked {
                eprintln!("  Now tracking as '{}'", report.workspace.name);
            }
        }
    }
    Ok(())
}
