use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use nebi::diff::{self, DEFAULT_CONTEXT, DiffReport, LockDiff};
use nebi::sync::{DiffArgs, plan_diff, run_diff};
use nebi_remote::ServerApi;

use super::open_session;
use crate::format::OutputFormat;

#[derive(Args)]
pub struct DiffCliArgs {
    /// Source: a directory or name[:tag]
    pub source: Option<String>,

    /// Target: a directory or name[:tag]
    pub target: Option<String>,

    /// With no arguments, compare against the origin's tag as it is now on
    /// the server, not the version recorded at the last sync. Not allowed
    /// together with arguments
    #[arg(long)]
    pub remote: bool,

    /// Show package-level pixi.lock changes
    #[arg(long)]
    pub lock: bool,

    /// Show key-level pixi.toml changes instead of a line diff
    #[arg(long)]
    pub toml: bool,

    #[arg(long)]
    pub json: bool,

    /// Directory standing in for the working tree
    #[arg(short = 'C', value_name = "DIR")]
    pub dir: Option<PathBuf>,
}

/// 0 when equal, 1 when different, 2 on error.
pub fn run(args: &DiffCliArgs) -> ExitCode {
    match compare(args) {
        Ok(report) => {
            if let Err(err) = print(&report, args) {
                return super::report(&err, 2);
            }
            if report.has_changes() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => super::report(&err, 2),
    }
}

fn compare(args: &DiffCliArgs) -> Result<DiffReport> {
    let session = open_session()?;
    let server_url = session.server_url()?;
    let diff_args = DiffArgs {
        args: args
            .source
            .iter()
            .chain(args.target.iter())
            .cloned()
            .collect(),
        remote: args.remote,
        dir: args.dir.clone(),
    };
    let plan = plan_diff(&session.store, &session.cwd, server_url.as_deref(), &diff_args)?;
    let server = if plan.needs_server() {
        Some(session.connect()?)
    } else {
        None
    };
    Ok(run_diff(
        &plan,
        server.as_ref().map(|s| s as &dyn ServerApi),
        DEFAULT_CONTEXT,
    )?)
}

fn print(report: &DiffReport, args: &DiffCliArgs) -> Result<()> {
    if args.json {
        println!("{}", OutputFormat::serialize(report)?);
        return Ok(());
    }
    if args.toml {
        print!("{}", diff::render_toml(report));
    } else {
        print!("{}", diff::render_unified(report));
    }
    if args.lock {
        print!("{}", diff::render_lock(report));
    } else if report.lock_differs() {
        let note = match &report.lock {
            LockDiff::Unreadable { .. } => "pixi.lock differs",
            _ => "pixi.lock differs (use --lock for package changes)",
        };
        println!("{note}");
    }
    Ok(())
}
