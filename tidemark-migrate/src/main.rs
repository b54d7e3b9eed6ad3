//! Tidemark Migration CLI Tool
//!
//! Applies, creates and rolls back plain-SQL migrations. Exit code 0 on success,
//! 1 on any failure or usage error.

use clap::Parser;
use colored::Colorize;
use std::process::ExitCode;
use tidemark_migrate::cli::report_parse_error;
use tidemark_migrate::{render_error, run, Cli};

fn main() -> ExitCode {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => return ExitCode::from(report_parse_error(&err, &mut std::io::stdout())),
    };

    let default_filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let mut stdout = std::io::stdout();
    match run(&cli, &mut stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), render_error(&e));
            ExitCode::FAILURE
        }
    }
}
