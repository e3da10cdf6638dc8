use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pymeta::config::ProjectContext;
use pymeta::error::PymetaError;
use pymeta::resolver::Resolution;
use pymeta::ui;

#[derive(Parser)]
#[command(
    name = "pymeta",
    about = "Resolve python packaging metadata from conventional project files",
    version
)]
struct Args {
    #[arg(
        long,
        global = true,
        default_value = ".",
        help = "Project root to resolve"
    )]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the resolved metadata mapping
    Resolve {
        #[arg(long, help = "Print the mapping as JSON")]
        json: bool,
    },

    /// Show every field with all recorded sources in priority order
    Explain,

    /// Print the resolved version
    Version,

    /// Bump the version, rewriting the recorded source lines
    Bump {
        #[arg(value_parser = ["major", "minor", "patch"], help = "Component to bump")]
        what: String,

        #[arg(long, help = "Apply the bump instead of the default dry run")]
        commit: bool,

        #[arg(long, help = "Push the branch and tags to origin")]
        push: bool,

        #[arg(long, help = "Commit all pending changes along with the bump")]
        all: bool,

        #[arg(long, help = "Print the next version and exit")]
        show: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    if let Err(e) = run(&args) {
        ui::display_error(&e.to_string());
        std::process::exit(1);
    }
    Ok(())
}

/// `PYMETA_DEBUG=1` is shorthand for `RUST_LOG=pymeta=debug`; an explicit
/// `RUST_LOG` wins.
fn init_tracing() {
    let debug = std::env::var("PYMETA_DEBUG")
        .map(|v| v == "1")
        .unwrap_or(false);
    let fallback = if debug { "pymeta=debug" } else { "pymeta=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(args: &Args) -> pymeta::Result<()> {
    match &args.command {
        Command::Resolve { json } => resolve_command(&args.root, *json),
        Command::Explain => explain_command(&args.root),
        Command::Version => version_command(&args.root),
        Command::Bump {
            what,
            commit,
            push,
            all,
            show,
        } => bump_command(&args.root, what, *commit, *push, *all, *show),
    }
}

fn resolved(root: &Path) -> pymeta::Result<Resolution> {
    Resolution::resolve(ProjectContext::load(root)?)
}

fn resolve_command(root: &Path, json: bool) -> pymeta::Result<()> {
    let resolution = resolved(root)?;
    if json {
        let rendered = serde_json::to_string_pretty(&resolution.to_dict())
            .map_err(|e| PymetaError::config(format!("could not render mapping: {}", e)))?;
        println!("{}", rendered);
    } else {
        ui::display_settings(resolution.store());
    }
    ui::display_warnings(resolution.store());
    Ok(())
}

fn explain_command(root: &Path) -> pymeta::Result<()> {
    let resolution = resolved(root)?;
    if let Some(strategy) = resolution.versioning().strategy() {
        ui::display_status(&format!("versioning: {}", strategy));
    }
    if let Some(problem) = resolution.versioning().problem() {
        ui::display_warning(problem);
    }
    ui::display_definitions(resolution.store());
    ui::display_warnings(resolution.store());
    Ok(())
}

fn version_command(root: &Path) -> pymeta::Result<()> {
    let resolution = resolved(root)?;
    match resolution.version() {
        Some(version) => {
            println!("{}", version);
            Ok(())
        }
        None => Err(PymetaError::usage("no version could be determined")),
    }
}

fn bump_command(
    root: &Path,
    what: &str,
    commit: bool,
    push: bool,
    all: bool,
    show: bool,
) -> pymeta::Result<()> {
    let resolution = resolved(root)?;
    if show {
        println!("{}", resolution.get_bump(what)?);
        return Ok(());
    }
    let next = resolution.bump(what, commit, push, all)?;
    if commit {
        ui::display_success(&format!("Version bumped to {}", next));
    } else {
        ui::display_status(&format!("Next version would be {}", next));
    }
    Ok(())
}
