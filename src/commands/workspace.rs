use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use nebi::NebiError;
use nebi::sync::find_remote;
use nebi::tracking::{self, InitOutcome};
use nebi_remote::{RemoteWorkspace, ServerApi, Tag};
use nebi_store::Workspace;
use serde::Serialize;
use tracing::info;

use super::{open_session, warn_name_sync};
use crate::format::OutputFormat;

#[derive(Subcommand)]
pub enum WorkspaceCommands {
    /// List tracked workspaces, or the server's with --remote
    #[command(alias = "ls")]
    List {
        /// List workspaces on the active server instead
        #[arg(long)]
        remote: bool,
        #[arg(long)]
        json: bool,
    },

    /// List the tags of a server workspace
    Tags {
        name: String,
        #[arg(long)]
        json: bool,
    },

    /// Show one tracked workspace and all of its origins
    Info {
        /// Name, path, or '.' (default)
        selector: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Stop tracking a workspace, or delete it on the server with --remote
    ///
    /// Local files are left alone, except for global workspaces whose
    /// directory lives inside nebi's data dir.
    #[command(alias = "rm")]
    Remove {
        /// Name, path, or '.' (default)
        selector: Option<String>,
        /// Delete the workspace on the active server
        #[arg(long)]
        remote: bool,
    },

    /// Forget tracked workspaces whose directory no longer exists
    Prune,
}

pub fn run(cmd: WorkspaceCommands) -> Result<()> {
    match cmd {
        WorkspaceCommands::List { remote, json } => {
            let format = OutputFormat::from_json_flag(json);
            if remote { list_remote(format) } else { list_local(format) }
        }
        WorkspaceCommands::Tags { name, json } => tags(&name, OutputFormat::from_json_flag(json)),
        WorkspaceCommands::Info { selector, json } => {
            info_cmd(selector.as_deref().unwrap_or("."), OutputFormat::from_json_flag(json))
        }
        WorkspaceCommands::Remove { selector, remote } => {
            let selector = selector.as_deref().unwrap_or(".");
            if remote { remove_remote(selector) } else { remove_local(selector) }
        }
        WorkspaceCommands::Prune => prune(),
    }
}

pub fn init() -> Result<()> {
    let session = open_session()?;
    match tracking::init(&session.store, &session.cwd)? {
        InitOutcome::Created(ws) => {
            eprintln!("Tracking '{}' at {}", ws.name, ws.path.display());
        }
        InitOutcome::AlreadyTracked(ws) => {
            eprintln!("Already tracked as '{}' at {}", ws.name, ws.path.display());
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct LocalEntry<'a> {
    name: &'a str,
    kind: String,
    path: String,
    /// Origin on the active server, as name:tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    origin: Option<String>,
    exists: bool,
}

fn list_local(format: OutputFormat) -> Result<()> {
    let session = open_session()?;
    let server_url = session.server_url()?;
    let mut workspaces = session.store.list_workspaces()?;
    workspaces.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));

    let entries: Vec<LocalEntry<'_>> = workspaces
        .iter()
        .map(|ws| LocalEntry {
            name: &ws.name,
            kind: ws.kind.to_string(),
            path: ws.path.display().to_string(),
            origin: server_url
                .as_deref()
                .and_then(|url| ws.origin_for(url))
                .map(nebi_store::Origin::reference),
            exists: ws.path.exists(),
        })
        .collect();

    format.emit(&entries, |entries| {
        if entries.is_empty() {
            println!("No tracked workspaces. Run 'nebi init' in a pixi project.");
            return;
        }
        let width = entries.iter().map(|e| e.name.len()).max().unwrap_or(4).max(4);
        println!("{:<width$}  {:<6}  {:<20}  PATH", "NAME", "TYPE", "ORIGIN");
        for e in entries {
            let missing = if e.exists { "" } else { "  (missing)" };
            println!(
                "{:<width$}  {:<6}  {:<20}  {}{missing}",
                e.name,
                e.kind,
                e.origin.as_deref().unwrap_or("-"),
                e.path
            );
        }
    })
}

fn list_remote(format: OutputFormat) -> Result<()> {
    let session = open_session()?;
    let server = session.connect()?;
    let mut workspaces = server.list_workspaces().map_err(NebiError::from)?;
    workspaces.sort_by(|a, b| a.name.cmp(&b.name));

    format.emit(&workspaces, |workspaces: &Vec<RemoteWorkspace>| {
        if workspaces.is_empty() {
            println!("No workspaces on {}", server.server_url());
            return;
        }
        let width = workspaces.iter().map(|w| w.name.len()).max().unwrap_or(4).max(4);
        println!("{:<width$}  {:<9}  OWNER", "NAME", "STATUS");
        for ws in workspaces {
            let owner = ws.owner.as_ref().map_or("-", |o| o.username.as_str());
            println!("{:<width$}  {:<9}  {owner}", ws.name, ws.status.to_string());
        }
    })
}

// ---------------------------------------------------------------------------
// tags
// ---------------------------------------------------------------------------

fn tags(name: &str, format: OutputFormat) -> Result<()> {
    let session = open_session()?;
    let server = session.connect()?;
    let remote = find_remote(&server, name)?;
    let mut tags = server.list_tags(&remote.id).map_err(NebiError::from)?;
    tags.sort_by(|a, b| {
        b.version_number
            .cmp(&a.version_number)
            .then_with(|| a.tag.cmp(&b.tag))
    });

    format.emit(&tags, |tags: &Vec<Tag>| {
        if tags.is_empty() {
            println!("No tags for '{name}'");
            return;
        }
        let width = tags.iter().map(|t| t.tag.len()).max().unwrap_or(3).max(3);
        println!("{:<width$}  {:>7}  UPDATED", "TAG", "VERSION");
        for t in tags {
            let when = t.updated_at.as_deref().or(t.created_at.as_deref()).unwrap_or("-");
            println!("{:<width$}  {:>7}  {when}", t.tag, t.version_number);
        }
    })
}

// ---------------------------------------------------------------------------
// info
// ---------------------------------------------------------------------------

fn info_cmd(selector: &str, format: OutputFormat) -> Result<()> {
    let session = open_session()?;
    let workspace = resolve(&session.store, &session.cwd, selector)?;

    format.emit(&workspace, |ws: &Workspace| {
        println!("Name:   {}", ws.name);
        println!("ID:     {}", ws.id);
        println!("Type:   {}", ws.kind);
        println!("Path:   {}", ws.path.display());
        if ws.origins.is_empty() {
            println!("Origins: none");
        } else {
            println!("Origins:");
            for origin in ws.origins.values() {
                let version = origin
                    .version_number
                    .map(|n| format!(", version {n}"))
                    .unwrap_or_default();
                println!(
                    "  {}: {} ({}{version})",
                    origin.server_url,
                    origin.reference(),
                    origin.action
                );
            }
        }
    })
}

/// `.` and paths go through lookup so the name is synced; names go
/// straight to the store.
fn resolve(store: &nebi_store::Store, cwd: &std::path::Path, selector: &str) -> Result<Workspace> {
    if selector == "." {
        let tracked = tracking::require(store, cwd)?;
        warn_name_sync(&tracked.name_sync);
        return Ok(tracked.workspace);
    }
    Ok(tracking::resolve_selector(store, cwd, selector)?)
}

// ---------------------------------------------------------------------------
// remove / prune
// ---------------------------------------------------------------------------

fn remove_local(selector: &str) -> Result<()> {
    let session = open_session()?;
    let workspace = resolve(&session.store, &session.cwd, selector)?;
    let removed = tracking::remove(&session.store, &workspace)?;
    if removed.deleted_files {
        eprintln!(
            "Removed global workspace '{}' and deleted {}",
            removed.workspace.name,
            removed.workspace.path.display()
        );
    } else {
        eprintln!(
            "Stopped tracking '{}' ({}); files left in place",
            removed.workspace.name,
            removed.workspace.path.display()
        );
    }
    Ok(())
}

fn remove_remote(selector: &str) -> Result<()> {
    let session = open_session()?;
    let server = session.connect()?;

    // A path or '.' names the server workspace through its origin.
    let name = if selector == "." || nebi::refs::is_path_like(selector) {
        let path = nebi::refs::resolve_path(selector, &session.cwd);
        let tracked = tracking::require(&session.store, &path)?;
        match tracked.workspace.origin_for(server.server_url()) {
            Some(origin) => origin.name.clone(),
            None => bail!(
                "{} has no origin on {}\n  To fix: name the server workspace, e.g. 'nebi workspace remove <name> --remote'",
                tracked.workspace.path.display(),
                server.server_url()
            ),
        }
    } else {
        selector.to_owned()
    };

    let remote = find_remote(&server, &name)?;
    server.delete_workspace(&remote.id).map_err(NebiError::from)?;
    info!(workspace = %name, "delete requested");
    eprintln!("Deleting '{name}' on {}...", server.server_url());

    let options = session.sync_options();
    wait_until_gone(&server, &remote.id, options.ready_timeout, options.poll_interval)
        .with_context(|| format!("'{name}' may still be deleting on the server"))?;
    eprintln!("Deleted '{name}'");
    Ok(())
}

/// Poll the server listing until `id` is no longer in it.
fn wait_until_gone(
    server: &dyn ServerApi,
    id: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let listed = server.list_workspaces().map_err(NebiError::from)?;
        if !listed.iter().any(|w| w.id == id) {
            return Ok(());
        }
        let now = Instant::now();
        if now >= deadline {
            bail!("still listed after {}s", timeout.as_secs());
        }
        std::thread::sleep(interval.min(deadline - now));
    }
}

fn prune() -> Result<()> {
    let session = open_session()?;
    let pruned = session.store.prune()?;
    if pruned.is_empty() {
        eprintln!("Nothing to prune");
    } else {
        for ws in &pruned {
            eprintln!("Pruned '{}' ({})", ws.name, ws.path.display());
        }
        eprintln!("Pruned {} workspace(s)", pruned.len());
    }
    Ok(())
}
