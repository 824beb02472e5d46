//! GitDoc CLI - auto-commit a git working tree as you edit it
//!
//! Run `gitdoc enable` once in a repository, then keep `gitdoc watch`
//! running; every quiet period after a burst of edits becomes a commit.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gitdoc_core::{ConfigOverrides, Repository};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{CommitArgs, ModelsArgs, RestoreArgs, SquashArgs, UndoArgs, WatchArgs, Workspace};

/// GitDoc: automatically commit, push and pull a git working tree
#[derive(Parser, Debug)]
#[command(name = "gitdoc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Run as if started in this directory
    #[arg(short = 'C', long = "directory", global = true, default_value = ".")]
    directory: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// AI provider (claude or ollama), overrides config and env
    #[arg(long, global = true)]
    provider: Option<String>,

    /// AI model family, overrides config and env
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch the repository and auto-commit changes (default)
    #[command(visible_alias = "w")]
    Watch(WatchArgs),

    /// Commit pending changes now
    #[command(visible_alias = "c")]
    Commit(CommitArgs),

    /// Enable auto-commit for this repository
    Enable,

    /// Disable auto-commit for this repository
    Disable,

    /// Restore a file to its content at a previous version
    Restore(RestoreArgs),

    /// Squash every version since a commit into one
    Squash(SquashArgs),

    /// Undo the changes of one version
    Undo(UndoArgs),

    /// List AI models and choose the one to use
    Models(ModelsArgs),

    /// Show current configuration
    Config,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        ai_provider: cli.provider.as_deref().map(str::parse).transpose()?,
        ai_model: cli.model.clone(),
        ..Default::default()
    };

    // Settings are read before logging starts so full_trace can raise the level
    let workspace = Workspace::open(&cli.directory, overrides);
    let full_trace = workspace
        .as_ref()
        .ok()
        .and_then(|ws| ws.settings.snapshot().ok())
        .is_some_and(|c| c.full_trace);
    init_tracing(cli.verbose || full_trace);

    let command = cli.command.unwrap_or(Commands::Watch(WatchArgs::default()));
    if let Commands::Version = command {
        println!("gitdoc {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let workspace = workspace?;
    tracing::debug!(root = %workspace.repo.root().display(), "Opened repository");

    match command {
        Commands::Watch(args) => args.execute(&workspace).await?,
        Commands::Commit(args) => args.execute(&workspace).await?,
        Commands::Enable => {
            workspace.settings.set_enabled(true)?;
            println!("GitDoc enabled for {}", workspace.repo.root().display());
        }
        Commands::Disable => {
            workspace.settings.set_enabled(false)?;
            println!("GitDoc disabled for {}", workspace.repo.root().display());
        }
        Commands::Restore(args) => args.execute(&workspace).await?,
        Commands::Squash(args) => args.execute(&workspace).await?,
        Commands::Undo(args) => args.execute(&workspace).await?,
        Commands::Models(args) => args.execute(&workspace).await?,
        Commands::Config => commands::print_config(&workspace)?,
        Commands::Version => {}
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("gitdoc=debug,gitdoc_core=debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
