use anyhow::Result;
use clap::Args;
use nebi::publish::{self, PublishOutcome, PublishOverrides};

use super::open_session;
use crate::format::OutputFormat;

#[derive(Args)]
pub struct PublishArgs {
    /// Server workspace; defaults to this directory's origin
    pub name: Option<String>,

    /// Registry name or id (default: the server's choice)
    #[arg(long)]
    pub registry: Option<String>,

    /// OCI repository (default: the workspace name)
    #[arg(long = "repo")]
    pub repository: Option<String>,

    /// OCI tag (default: the next v<N> in that repository)
    #[arg(long)]
    pub tag: Option<String>,

    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &PublishArgs) -> Result<()> {
    let session = open_session()?;
    let server_url = session.server_url()?;
    let name = publish::resolve_name(
        &session.store,
        &session.cwd,
        server_url.as_deref(),
        args.name.as_deref(),
    )?;
    let server = session.connect()?;
    let overrides = PublishOverrides {
        registry: args.registry.clone(),
        repository: args.repository.clone(),
        tag: args.tag.clone(),
    };
    let outcome = publish::publish(&server, &name, &overrides)?;

    OutputFormat::from_json_flag(args.json).emit(&outcome, |o: &PublishOutcome| {
        let registry = if o.registry_name.is_empty() {
            &o.registry_id
        } else {
            &o.registry_name
        };
        println!("Published '{}' to {registry} as {}:{}", o.workspace, o.repository, o.tag);
        if !o.digest.is_empty() {
            println!("Digest: {}", o.digest);
        }
    })
}
