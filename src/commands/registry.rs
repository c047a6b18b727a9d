use anyhow::{Context, Result};
use clap::Subcommand;
use nebi::NebiError;
use nebi::prompt::{Confirm, TerminalConfirm};
use nebi::publish::find_registry;
use nebi_remote::{NewRegistry, Registry, ServerApi};

use super::open_session;
use crate::format::OutputFormat;

#[derive(Subcommand)]
pub enum RegistryCommands {
    /// List registries known to the server
    #[command(alias = "ls")]
    List {
        #[arg(long)]
        json: bool,
    },

    /// Register an OCI registry on the server
    Add {
        name: String,
        /// Registry URL, e.g. https://ghcr.io
        url: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long, env = "NEBI_REGISTRY_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Repository prefix, e.g. an organization
        #[arg(long)]
        namespace: Option<String>,
        /// Make this the default publish target
        #[arg(long)]
        default: bool,
    },

    /// Remove a registry from the server
    #[command(alias = "rm")]
    Remove {
        /// Registry name or id
        name: String,
        /// Do not ask for confirmation
        #[arg(long)]
        force: bool,
    },
}

pub fn run(cmd: RegistryCommands) -> Result<()> {
    let session = open_session()?;
    let server = session.connect()?;
    match cmd {
        RegistryCommands::List { json } => list(&server, OutputFormat::from_json_flag(json)),
        RegistryCommands::Add {
            name,
            url,
            username,
            password,
            namespace,
            default,
        } => {
            let registry = server
                .create_registry(&NewRegistry {
                    name,
                    url,
                    username,
                    password,
                    namespace,
                    is_default: default,
                })
                .map_err(NebiError::from)
                .context("failed to add registry")?;
            eprintln!("Added registry '{}' ({})", registry.name, registry.url);
            Ok(())
        }
        RegistryCommands::Remove { name, force } => remove(&server, &name, force, &TerminalConfirm),
    }
}

fn list(server: &dyn ServerApi, format: OutputFormat) -> Result<()> {
    let mut registries = server.list_registries().map_err(NebiError::from)?;
    registries.sort_by(|a, b| a.name.cmp(&b.name));
    format.emit(&registries, |registries: &Vec<Registry>| {
        if registries.is_empty() {
            println!("No registries. Add one with 'nebi registry add <name> <url>'.");
            return;
        }
        let width = registries.iter().map(|r| r.name.len()).max().unwrap_or(4).max(4);
        println!("{:<width$}  {:<30}  {:<12}  DEFAULT", "NAME", "URL", "NAMESPACE");
        for r in registries {
            println!(
                "{:<width$}  {:<30}  {:<12}  {}",
                r.name,
                r.url,
                r.namespace.as_deref().unwrap_or("-"),
                if r.is_default { "yes" } else { "" }
            );
        }
    })
}

fn remove(server: &dyn ServerApi, name: &str, force: bool, confirm: &dyn Confirm) -> Result<()> {
    let registries = server.list_registries().map_err(NebiError::from)?;
    let registry = find_registry(&registries, name)?;
    if !force && !confirm.confirm(&format!("Remove registry '{}' ({})?", registry.name, registry.url)) {
        eprintln!("Aborted.");
        return Ok(());
    }
    server.delete_registry(&registry.id).map_err(NebiError::from)?;
    eprintln!("Removed registry '{}'", registry.name);
    Ok(())
}
