//! `shell` and `run`: hand a tracked workspace to pixi.

use std::path::PathBuf;
use std::process::{Command, ExitCode};

use anyhow::{Context, Result};
use clap::Args;
use nebi::files::MANIFEST_FILE;
use nebi::tracking;

use super::{open_session, report, warn_name_sync};

/// Overrides the pixi executable.
const PIXI_ENV: &str = "NEBI_PIXI";

#[derive(Args, Debug)]
pub struct ShellArgs {
    /// Workspace name or path (default: current directory)
    pub workspace: Option<String>,
}

/// Run a pixi task
///
/// Examples:
///   nebi run test
///   nebi run -w demo lint -- --fix
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Workspace name or path (default: current directory)
    #[arg(short, long)]
    pub workspace: Option<String>,

    /// Task and its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub task: Vec<String>,
}

pub fn shell(args: &ShellArgs) -> ExitCode {
    delegate("shell", args.workspace.as_deref(), &[])
}

pub fn run(args: &RunArgs) -> ExitCode {
    delegate("run", args.workspace.as_deref(), &args.task)
}

fn delegate(subcommand: &str, selector: Option<&str>, rest: &[String]) -> ExitCode {
    match spawn(subcommand, selector, rest) {
        Ok(code) => code,
        Err(err) => report(&err, 1),
    }
}

fn spawn(subcommand: &str, selector: Option<&str>, rest: &[String]) -> Result<ExitCode> {
    let manifest = manifest_path(selector)?;
    let pixi = std::env::var(PIXI_ENV).unwrap_or_else(|_| "pixi".to_owned());

    let mut command = Command::new(&pixi);
    command
        .arg(subcommand)
        .arg("--manifest-path")
        .arg(&manifest)
        .args(rest);
    if let Some(traceparent) = nebi::telemetry::current_traceparent() {
        command.env("TRACEPARENT", traceparent);
    }
    let status = command
        .status()
        .with_context(|| format!("failed to run '{pixi}'; is pixi installed and on PATH?"))?;

    // Killed by a signal: no code, report generic failure.
    let code = status.code().unwrap_or(1);
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}

fn manifest_path(selector: Option<&str>) -> Result<PathBuf> {
    let session = open_session()?;
    let workspace = match selector {
        None | Some(".") => {
            let tracked = tracking::require(&session.store, &session.cwd)?;
            warn_name_sync(&tracked.name_sync);
            tracked.workspace
        }
        Some(selector) => tracking::resolve_selector(&session.store, &session.cwd, selector)?,
    };
    let manifest = workspace.path.join(MANIFEST_FILE);
    if !manifest.is_file() {
        return Err(nebi::NebiError::MissingManifest {
            dir: workspace.path,
        }
        .into());
    }
    Ok(manifest)
}
