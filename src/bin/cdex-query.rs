//! CLI entry point for the query tool.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;

use cdex::query::{QueryError, run_command};

// sysexits(3) codes
const EX_USAGE: u8 = 64;
const EX_DATAERR: u8 = 65;
const EX_UNAVAILABLE: u8 = 69;

/// cdex-query — search a database created by cdex-index.
#[derive(Parser, Debug)]
#[command(name = "cdex-query", version, about)]
struct Cli {
    /// Execute a single command and exit.
    #[arg(short = 'c', long = "command")]
    command: Option<String>,

    /// Interactive mode (default).
    #[arg(short = 'i', long = "interactive", conflicts_with = "command")]
    interactive: bool,

    /// Database file to search.
    db_path: PathBuf,
}

fn main() -> ExitCode {
    if let Err(err) = cdex::stdio::bind_stdio() {
        eprintln!("cannot bind stdio: {err}");
        return ExitCode::FAILURE;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cdex=warn")),
        )
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err)
            if err.kind() == ErrorKind::DisplayHelp
                || err.kind() == ErrorKind::DisplayVersion =>
        {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(EX_USAGE);
        }
    };

    let Some(command) = &cli.command else {
        eprintln!("interactive mode unimplemented");
        return ExitCode::from(EX_UNAVAILABLE);
    };

    match run_command(&cli.db_path, command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(QueryError::Parse(err)) => {
            eprintln!("{err}");
            ExitCode::from(EX_USAGE)
        }
        Err(QueryError::NoMatch | QueryError::Ambiguous) => ExitCode::from(EX_DATAERR),
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(EX_DATAERR)
        }
    }
}
