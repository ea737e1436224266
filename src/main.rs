// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use code_mapping::{
    merge_stats, write_merged, MappingConfig, MappingError, MappingSession, Side,
};
use log::LevelFilter;
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(name = "code-mapping", version, about = "Link hospital codes to company codes")]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(long, short, help = "JSON config file with registry and connection paths")]
    config: Option<PathBuf>,

    #[clap(long, help = "Hospital registry CSV (row 1 names, row 2 codes)")]
    hospital: Option<PathBuf>,

    #[clap(long, help = "Company registry CSV (row 1 names, row 2 codes)")]
    company: Option<PathBuf>,

    #[clap(long, help = "Connections file to load and save")]
    connections: Option<PathBuf>,

    #[clap(long, help = "Let confirm/revoke overwrite a connections file that failed to load")]
    force: bool,

    #[clap(long, short, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive curation (default command)
    Ui,
    /// Print the confirmed connections
    List,
    /// Link a hospital row to a company row (0-based rows) and save
    Confirm { hospital_row: usize, company_row: usize },
    /// Remove connection rows (0-based) and save
    Revoke {
        #[clap(required = true)]
        rows: Vec<usize>,
    },
    /// Show how many rows of each registry are linked
    Status,
    /// Export the union of both registries by name
    Merge {
        #[clap(long, short)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = cli.log_level.parse().unwrap_or(LevelFilter::Info);
    let command = cli.command.unwrap_or(Commands::Ui);

    if matches!(command, Commands::Ui) {
        // The terminal belongs to the UI, so logs go to a file
        let log_file = std::fs::File::create("code-mapping.log")
            .context("Failed to create code-mapping.log")?;
        env_logger::Builder::new()
            .filter_level(log_level)
            .target(env_logger::Target::Pipe(Box::new(log_file)))
            .init();
    } else {
        env_logger::Builder::new().filter_level(log_level).init();
    }

    let config = MappingConfig::load(cli.config.as_deref())?.with_overrides(
        cli.hospital,
        cli.company,
        cli.connections,
    );

    let (mut session, load_error) = open_session(&config)?;

    match command {
        Commands::Ui => run_ui_mode(session)?,
        Commands::List => run_list(&session),
        Commands::Confirm {
            hospital_row,
            company_row,
        } => {
            ensure_safe_to_save(load_error.as_ref(), cli.force)?;
            let event = session.confirm(Some(hospital_row), Some(company_row))?;
            println!("✓ {}", event.describe());
            save(&mut session)?;
        }
        Commands::Revoke { rows } => {
            ensure_safe_to_save(load_error.as_ref(), cli.force)?;
            let positions: BTreeSet<usize> = rows.into_iter().collect();
            let event = session.revoke(&positions)?;
            println!("✓ {}", event.describe());
            save(&mut session)?;
        }
        Commands::Status => run_status(&session),
        Commands::Merge { output } => {
            let output = output.unwrap_or_else(|| config.merged_output.clone());
            let merged = session.merge();
            write_merged(&output, &merged)?;

            println!("✓ Wrote {} names to {}", merged.len(), output.display());
            for (bucket, count) in merge_stats(&merged) {
                println!("   {:<14} {}", bucket, count);
            }
        }
    }

    Ok(())
}

/// Registries are required; a broken connections file only costs the saved links.
/// The load error, if any, is handed back so mutating commands can refuse to save.
fn open_session(config: &MappingConfig) -> Result<(MappingSession, Option<MappingError>)> {
    let mut session = MappingSession::from_config(config).with_context(|| {
        format!(
            "Could not open registries {} / {}",
            config.hospital_registry.display(),
            config.company_registry.display()
        )
    })?;

    let load_error = session.load_connections().err();
    if let Some(e) = &load_error {
        eprintln!("⚠️  {}", e);
        eprintln!("   Continuing with an empty connection list.");
    }

    Ok((session, load_error))
}

/// Saving after a failed load would replace the unreadable file with an empty store
fn ensure_safe_to_save(load_error: Option<&MappingError>, force: bool) -> Result<()> {
    match load_error {
        Some(e) if !force => bail!(
            "refusing to save over connections that could not be loaded ({}); \
             fix the file or rerun with --force",
            e
        ),
        Some(_) => {
            log::warn!("--force given, saved connections will be overwritten");
            Ok(())
        }
        None => Ok(()),
    }
}

fn save(session: &mut MappingSession) -> Result<()> {
    let event = session.save_connections()?;
    println!("💾 {}", event.describe());
    Ok(())
}

fn run_list(session: &MappingSession) {
    let connections = session.connections();
    if connections.is_empty() {
        println!("No connections yet.");
        return;
    }

    println!(
        "{:>4}  {:<24} {:<12} {:<24} {:<12}",
        "#", "Hospital name", "Code", "Company name", "Code"
    );
    for (i, c) in connections.iter().enumerate() {
        println!(
            "{:>4}  {:<24} {:<12} {:<24} {:<12}",
            i, c.hosp_name, c.hosp_code, c.lg_name, c.lg_code
        );
    }
}

fn run_status(session: &MappingSession) {
    println!("📊 {} connection(s) in {}", session.connections().len(), session.persistence_location());
    for side in [Side::Hospital, Side::Company] {
        println!("   {}", session.coverage_summary(side).summary());
    }
}

#[cfg(feature = "tui")]
fn run_ui_mode(session: MappingSession) -> Result<()> {
    let mut app = ui::App::new(session);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed");
    if let Some(status) = app.status() {
        println!("   {}", status);
    }

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_session: MappingSession) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the subcommands: list, confirm, revoke, status, merge");
    std::process::exit(1);
}
