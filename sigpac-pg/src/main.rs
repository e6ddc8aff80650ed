//! Point d'entrée CLI pour sigpac-pg

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

// Charger .env au démarrage
fn load_env() {
    // Chercher .env dans le répertoire courant ou parent
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

mod cli;
mod store;

use cli::Commands;

/// Consulter le cadastre agricole espagnol (SIGPAC) et sauvegarder des parcelles dans PostGIS
#[derive(Parser)]
#[command(name = "sigpac-pg")]
#[command(author, version)]
#[command(about = "Consulter le cadastre agricole espagnol (SIGPAC) et sauvegarder des parcelles dans PostGIS")]
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

#[tokio::main]
async fn main() -> Result<()> {
    // Charger .env avant tout
    load_env();

    let cli = Cli::parse();

    // Configurer le logging
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Options { level, parent } => {
            cli::cmd_options(&level, parent.as_deref()).await?;
        }
        Commands::Resolve { reference, point } => {
            cli::cmd_resolve(reference.as_deref(), point.as_deref()).await?;
        }
        Commands::Save {
            name,
            reference,
            polygon,
            with_geometry,
            db,
        } => {
            cli::cmd_save(
                &name,
                reference.as_deref(),
                polygon.as_deref(),
                with_geometry,
                &db,
            )
            .await?;
        }
        Commands::List { db } => {
            cli::cmd_list(&db).await?;
        }
        Commands::Show { id, db } => {
            cli::cmd_show(id, &db).await?;
        }
        Commands::Delete { id, db } => {
            cli::cmd_delete(id, &db).await?;
        }
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
