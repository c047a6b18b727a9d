use anyhow::{Context, Result, bail};
use clap::Args;
use nebi::NebiError;
use nebi::prompt::{ask_secret, ask_text, stdin_is_terminal};
use nebi_remote::ServerApi;
use nebi_store::{Credential, normalize_server_url};
use tracing::info;

use super::open_session;

#[derive(Args)]
pub struct LoginArgs {
    /// Server base URL, e.g. https://nebi.example.com
    pub server_url: String,

    /// Use an API token instead of prompting for a password
    #[arg(long, env = "NEBI_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Username for password login (prompted when omitted)
    #[arg(long, short)]
    pub username: Option<String>,
}

pub fn login(args: &LoginArgs) -> Result<()> {
    let session = open_session()?;
    let server_url = normalize_server_url(&args.server_url);
    let probe = session.anonymous_client(&server_url, None)?;
    probe
        .health()
        .with_context(|| format!("cannot reach nebi server at {server_url}"))?;

    let credential = match &args.token {
        Some(token) => Credential {
            token: token.trim().to_owned(),
            username: args.username.clone(),
        },
        None => {
            if !stdin_is_terminal() {
                bail!(
                    "no --token given and stdin is not a terminal\n  To fix: nebi login {server_url} --token <TOKEN>"
                );
            }
            let username = match &args.username {
                Some(u) => u.clone(),
                None => ask_text("Username").context("failed to read username")?,
            };
            let password = ask_secret("Password").context("failed to read password")?;
            let token = probe
                .login(&username, &password)
                .map_err(NebiError::from)?;
            Credential {
                token,
                username: Some(username),
            }
        }
    };

    session.credentials.set(&server_url, credential)?;
    session.store.set_server_url(&server_url)?;
    info!(server = %server_url, "logged in");
    eprintln!("Logged in to {server_url}");
    Ok(())
}

pub fn logout() -> Result<()> {
    let session = open_session()?;
    let server_url = session.require_server_url()?;
    if session.credentials.remove(&server_url)? {
        eprintln!("Logged out of {server_url}");
    } else {
        eprintln!("Not logged in to {server_url}");
    }
    Ok(())
}
