//! Command handlers
//!
//! Handlers write user-facing output to the given writer and return errors to
//! the caller; `main` turns them into exit codes.

use crate::cli::{Cli, Commands};
use crate::settings::Settings;
use anyhow::Context;
use colored::Colorize;
use std::io::Write;
use tidemark::migration::{LedgerConnection, MigrationError, Migrator, RollbackOutcome};
use tidemark::TidemarkConfig;

/// Run the parsed command line
pub fn run(cli: &Cli, out: &mut dyn Write) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => TidemarkConfig::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => TidemarkConfig::load().with_context(|| {
            format!("Failed to load configuration from {}", tidemark::config::DEFAULT_CONFIG_FILE)
        })?,
    };
    let settings = Settings::resolve(cli, config)?;
    log::debug!("migrations directory: {}", settings.migrations_dir.display());

    let migrator = Migrator::new(&settings.migrations_dir);

    match &cli.command {
        Commands::Create { name } => handle_create(&migrator, &name.join(" "), out),
        Commands::Up { dry_run } => {
            let mut ledger = settings.open_ledger()?;
            handle_up(&migrator, &mut ledger, *dry_run, out)
        }
        Commands::Down { dry_run } => {
            let mut ledger = settings.open_ledger()?;
            handle_down(&migrator, &mut ledger, *dry_run, out)
        }
        Commands::Status => {
            let mut ledger = settings.open_ledger()?;
            handle_status(&migrator, &mut ledger, out)
        }
    }
}

pub fn handle_create(migrator: &Migrator, name: &str, out: &mut dyn Write) -> anyhow::Result<()> {
    let filename = migrator.create(name)?;
    let path = migrator.store().dir().join(&filename);

    writeln!(out, "{} {}", "Created migration:".green().bold(), path.display())?;
    writeln!(out, "   Add forward SQL at the top and its undo statements inside the ROLLBACK block")?;
    Ok(())
}

pub fn handle_up<C: LedgerConnection>(
    migrator: &Migrator,
    conn: &mut C,
    dry_run: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    if dry_run {
        let pending = migrator.plan_up(conn)?;
        if pending.is_empty() {
            writeln!(out, "No pending migrations to apply")?;
            return Ok(());
        }

        writeln!(out, "Would apply {} migration(s):", pending.len())?;
        for (i, file) in pending.iter().enumerate() {
            writeln!(out, "  {}. {}", i + 1, file.name)?;
        }
        return Ok(());
    }

    let report = migrator.up(conn)?;
    if report.applied.is_empty() {
        writeln!(out, "{}", "No pending migrations to apply".green())?;
    } else {
        for name in &report.applied {
            writeln!(out, "  {} {}", "✓".green(), name)?;
        }
        writeln!(
            out,
            "{}",
            format!("Successfully applied {} migration(s)", report.applied.len()).green()
        )?;
    }
    Ok(())
}

pub fn handle_down<C: LedgerConnection>(
    migrator: &Migrator,
    conn: &mut C,
    dry_run: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    if dry_run {
        match migrator.plan_rollback(conn)? {
            None => writeln!(out, "No migrations to roll back")?,
            Some(plan) => {
                writeln!(out, "Would roll back {}:", plan.entry.name)?;
                for line in plan.rollback_sql.lines() {
                    writeln!(out, "    {line}")?;
                }
            }
        }
        return Ok(());
    }

    match migrator.rollback_last(conn)? {
        RollbackOutcome::NothingToRollBack => {
            writeln!(out, "{}", "No migrations to roll back".green())?;
        }
        RollbackOutcome::RolledBack { name } => {
            writeln!(out, "{} {}", "Rolled back".green().bold(), name)?;
        }
    }
    Ok(())
}

pub fn handle_status<C: LedgerConnection>(
    migrator: &Migrator,
    conn: &mut C,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let status = migrator.status(conn)?;

    writeln!(out, "\n{}\n", "Migration Status".bold())?;

    if status.applied.is_empty() {
        writeln!(out, "Applied: none")?;
    } else {
        writeln!(out, "Applied ({}):", status.applied.len())?;
        for entry in &status.applied {
            writeln!(
                out,
                "  {} {} ({})",
                "✓".green(),
                entry.name,
                entry.applied_at.format("%Y-%m-%d %H:%M:%S UTC")
            )?;
        }
    }

    writeln!(out)?;

    if status.pending.is_empty() {
        writeln!(out, "Pending: none")?;
    } else {
        writeln!(out, "Pending ({}):", status.pending.len())?;
        for file in &status.pending {
            writeln!(out, "  {} {}", "•".yellow(), file.name)?;
        }
    }

    if !status.issues.is_empty() {
        writeln!(out, "\n{} ({}):", "Ledger issues".red().bold(), status.issues.len())?;
        for issue in &status.issues {
            writeln!(out, "  {} {issue}", "!".red())?;
        }
    }

    writeln!(
        out,
        "\nSummary: {} applied, {} pending",
        status.applied.len(),
        status.pending.len()
    )?;
    Ok(())
}

/// Render an error for the terminal
///
/// Migration errors already carry their cause in the message; anything else gets
/// its full context chain.
pub fn render_error(err: &anyhow::Error) -> String {
    match err.downcast_ref::<MigrationError>() {
        Some(migration_err) => migration_err.to_string(),
        None => format!("{err:#}"),
    }
}
