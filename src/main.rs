use clap::Parser;
use std::io::{self, IsTerminal};
use threadkeep::ThreadkeepError;
use threadkeep::cli::commands;
use threadkeep::cli::{Cli, Commands};
use threadkeep::logging::init_logging;
use threadkeep::output::OutputContext;

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    if let Err(e) = init_logging(cli.verbose, cli.quiet, cli.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let overrides = cli.overrides();
    let ctx = OutputContext::from_flags(cli.json, cli.quiet);

    let result = match &cli.command {
        Commands::Import(args) => commands::import::execute(args, &overrides, &ctx),
        Commands::History(args) => commands::history::execute(args, &overrides, &ctx),
        Commands::Branches(args) => commands::branches::execute(args, &overrides, &ctx),
    };

    if let Err(e) = result {
        handle_error(&e, cli.json);
    }
}

/// Report an error and exit.
///
/// With `--json` the error is a JSON object on stderr; otherwise a message
/// plus an optional hint.
fn handle_error(err: &ThreadkeepError, json_mode: bool) -> ! {
    if json_mode {
        let json = serde_json::json!({
            "error": err.to_string(),
            "duplicate": err.is_duplicate(),
            "recoverable": err.is_user_recoverable(),
            "hint": err.suggestion(),
        });
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string())
        );
    } else {
        let prefix = if err.is_duplicate() { "Skipped" } else { "Error" };
        eprintln!("{prefix}: {err}");
        if let Some(hint) = err.suggestion() {
            if io::stderr().is_terminal() {
                eprintln!("\x1b[2mHint: {hint}\x1b[0m");
            } else {
                eprintln!("Hint: {hint}");
            }
        }
    }

    std::process::exit(err.exit_code());
}
