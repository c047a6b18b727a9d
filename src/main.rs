use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};

mod commands;
mod format;

use commands::{auth, diff, pixi, publish, registry, status, sync, workspace};

/// Sync pixi workspaces with a nebi server
///
/// A directory holding a pixi.toml (and usually a pixi.lock) is a
/// workspace. nebi pushes those two files to a server as immutable
/// versions, pulls them back by tag, and tells you when the directory has
/// drifted from what it last synced.
///
/// References are written name[:tag]. Anything containing a path
/// separator, or starting with '.' or '~', is a path instead.
///
/// QUICK START:
///
///   nebi login https://nebi.example.com
///   nebi push demo:v1           # first push tracks this directory
///   nebi status                 # local edits? server moved on?
///   nebi diff                   # what changed since the last sync
///   nebi pull demo:v1 -o ./copy
///
/// Each directory remembers one origin per server: the name, tag, and
/// content hashes of its last push or pull there. 'push', 'pull' and
/// 'diff' fill in a missing name from that origin.
#[derive(Parser)]
#[command(name = "nebi")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'nebi <command> --help' for more information on a specific command.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in to a nebi server and make it the active server
    Login(auth::LoginArgs),

    /// Forget the token for the active server
    Logout,

    /// Track the current directory as a workspace
    ///
    /// The directory must contain a pixi.toml. Safe to run twice.
    Init,

    /// Inspect and manage tracked workspaces
    #[command(subcommand, alias = "ws")]
    Workspace(workspace::WorkspaceCommands),

    /// Push pixi.toml and pixi.lock as a new server version
    Push(sync::PushArgs),

    /// Pull a server version into a directory
    Pull(sync::PullArgs),

    /// Show drift between this directory, its origin, and the server
    Status(status::StatusArgs),

    /// Compare two workspace snapshots
    ///
    /// Sides are directories or server references. Exits 0 when equal,
    /// 1 when they differ, 2 on error.
    Diff(diff::DiffCliArgs),

    /// Import a published workspace from an OCI registry
    Import(sync::ImportArgs),

    /// Publish a workspace to an OCI registry through the server
    Publish(publish::PublishArgs),

    /// Manage the server's OCI registries
    #[command(subcommand)]
    Registry(registry::RegistryCommands),

    /// Start a pixi shell in a tracked workspace
    Shell(pixi::ShellArgs),

    /// Run a pixi task in a tracked workspace
    Run(pixi::RunArgs),

    /// Print a shell completion script
    Completion {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },

    /// Print the nebi version
    Version,
}

fn main() -> ExitCode {
    let _telemetry = nebi::telemetry::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Login(args) => auth::login(&args),
        Commands::Logout => auth::logout(),
        Commands::Init => workspace::init(),
        Commands::Workspace(cmd) => workspace::run(cmd),
        Commands::Push(args) => sync::push(&args),
        Commands::Pull(args) => sync::pull(&args),
        Commands::Status(args) => status::run(&args),
        Commands::Diff(args) => return diff::run(&args),
        Commands::Import(args) => sync::import(&args),
        Commands::Publish(args) => publish::run(&args),
        Commands::Registry(cmd) => registry::run(cmd),
        Commands::Shell(args) => return pixi::shell(&args),
        Commands::Run(args) => return pixi::run(&args),
        Commands::Completion { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "nebi", &mut std::io::stdout());
            Ok(())
        }
        Commands::Version => {
            println!("nebi {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => commands::report(&err, 1),
    }
}
