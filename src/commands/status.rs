use anyhow::Result;
use clap::Args;
use nebi::sync::{self, StatusReport};
use nebi_remote::ServerApi;

use super::{open_session, warn_name_sync};
use crate::format::OutputFormat;

#[derive(Args)]
pub struct StatusArgs {
    #[arg(long)]
    pub json: bool,
}

/// Server failures show up in the report; they never fail the command.
pub fn run(args: &StatusArgs) -> Result<()> {
    let session = open_session()?;
    let server_url = session.server_url()?;
    let server = match &server_url {
        Some(url) => session.try_connect_to(url)?,
        None => None,
    };
    let report = sync::status(
        &session.store,
        &session.cwd,
        server_url.as_deref(),
        server.as_ref().map(|s| s as &dyn ServerApi),
    )?;
    warn_name_sync(&report.name_sync);

    OutputFormat::from_json_flag(args.json).emit(&report, |report: &StatusReport| {
        print!("{}", report.render());
    })
}
