//! CLI command handlers.
//!
//! Handlers print results: data on stdout, progress and warnings on
//! stderr. Errors bubble up as `anyhow::Error` and are rendered once by
//! [`report`].

use std::process::ExitCode;

use anyhow::Result;
use nebi::session::Session;
use nebi::tracking::NameSync;

pub mod auth;
pub mod diff;
pub mod pixi;
pub mod publish;
pub mod registry;
pub mod status;
pub mod sync;
pub mod workspace;

pub fn open_session() -> Result<Session> {
    Ok(Session::from_env()?)
}

/// Print `err` to stderr and return `code`.
pub fn report(err: &anyhow::Error, code: u8) -> ExitCode {
    eprintln!("Error: {err:#}");
    ExitCode::from(code)
}

pub fn warn_name_sync(name_sync: &NameSync) {
    if let Some(warning) = name_sync.warning() {
        eprintln!("Warning: {warning}");
    }
}
