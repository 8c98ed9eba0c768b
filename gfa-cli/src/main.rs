//! Point d'entrée CLI pour gfa-estimate

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// Charge `.env` : fichier désigné par `GFA_ENV_FILE`, sinon répertoire
/// courant, sinon répertoire du binaire
fn load_env() {
    if let Ok(path) = std::env::var("GFA_ENV_FILE") {
        if dotenvy::from_path(&path).is_ok() {
            return;
        }
    }
    if dotenvy::dotenv().is_ok() {
        return;
    }
    let beside_binary = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(".env")));
    if let Some(path) = beside_binary {
        let _ = dotenvy::from_path(path);
    }
}

mod cli;

use cli::Commands;

/// Estimer la surface de plancher constructible de chaque parcelle
#[derive(Parser)]
#[command(name = "gfa-estimate")]
#[command(author, version)]
#[command(about = "Estimate allowed gross floor area per parcel under planning regulations")]
#[command(long_about = "Loads a static snapshot (GeoJSON parcels and roads, JSON regulations and links), \
runs the GFA estimation engine and writes gfa.geojson, estimates.json and report.json.")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    load_env();

    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Estimate(args) => cli::cmd_estimate(args)?,
        Commands::Config { config } => cli::cmd_config(&config)?,
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
