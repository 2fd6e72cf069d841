//! CLI entry point for the indexer.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use tracing::error;

use cdex::index::{IndexConfig, InputKind, StoreSpec, index_project};

// sysexits(3) codes
const EX_USAGE: u8 = 64;
const EX_DATAERR: u8 = 65;

/// cdex-index — create a search database from C source files.
#[derive(Parser, Debug)]
#[command(name = "cdex-index", version, about)]
struct Cli {
    /// Input is a single C source file (default).
    #[arg(short = 's', long = "src", conflicts_with = "dir")]
    src: bool,

    /// Input is the directory containing a compilation database
    /// (compile_commands.json).
    #[arg(short = 'd', long = "dir")]
    dir: bool,

    /// Path of the sqlite database to create.
    #[arg(short = 'o', long = "out", default_value = "cf.db", conflicts_with = "dry_run")]
    out: PathBuf,

    /// Index into a no-op store; nothing is written.
    #[arg(short = 'n', long = "dry-run")]
    dry_run: bool,

    /// Optional TOML config with extra front-end arguments.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Source file or build directory to index.
    input: PathBuf,
}

fn main() -> ExitCode {
    if let Err(err) = cdex::stdio::bind_stdio() {
        eprintln!("cannot bind stdio: {err}");
        return ExitCode::FAILURE;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cdex=info")),
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

    let mut extra_args = Vec::new();
    if let Some(config_path) = &cli.config {
        match cdex::config::load_config(config_path) {
            Ok(config) => {
                let base_dir = config_path.parent().unwrap_or_else(|| std::path::Path::new("."));
                extra_args = config.clang_args(base_dir);
            }
            Err(err) => {
                eprintln!("{err:#}");
                return ExitCode::from(EX_USAGE);
            }
        }
    }

    let config = IndexConfig {
        input: if cli.dir {
            InputKind::BuildDir(cli.input)
        } else {
            InputKind::SourceFile(cli.input)
        },
        store: if cli.dry_run {
            StoreSpec::Nop
        } else {
            StoreSpec::Sql(cli.out)
        },
        extra_args,
    };

    let store = match index_project(&config) {
        Ok(store) => store,
        Err(err) => {
            error!(%err, "indexing failed");
            eprintln!("{err:#}");
            return ExitCode::from(EX_DATAERR);
        }
    };
    if let Err(err) = store.close() {
        error!(%err, "closing store failed");
        return ExitCode::from(EX_DATAERR);
    }

    ExitCode::SUCCESS
}
