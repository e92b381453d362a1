//! Operator CLI for a memoria data directory.
//!
//! # Responsibility
//! - Inspect and maintain the SQLite store (`describe`, `reembed`).
//! - Run single tool calls and show the context document for debugging.
//!
//! Configuration comes from `MEMORIA_*` variables, with `.env` loaded first.

use clap::{Parser, Subcommand};
use memoria_core::{init_logging, ItemStore, MemoriaConfig, Record, SqliteGateway, StoreResult};
use memoria_tools::{tool_schemas, ToolSession};
use std::path::PathBuf;
use std::process::ExitCode;

const SAMPLE_PREVIEW_CHARS: usize = 80;

#[derive(Parser)]
#[command(name = "memoria")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect and operate a memoria knowledge store", long_about = None)]
struct Cli {
    /// Data directory holding memoria.sqlite3 (overrides MEMORIA_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check core linkage
    Ping,

    /// List collections, metadata fields and recent records
    Describe {
        /// Recent records shown per collection
        #[arg(long, default_value_t = 3)]
        samples: u32,
    },

    /// Re-encode stored items whose searchable text is out of date
    Reembed,

    /// Print the numbered context document
    Context,

    /// Execute one tool call and print the JSON response
    Tool {
        /// Tool name, e.g. `query_items`
        name: String,

        /// JSON arguments object
        #[arg(default_value = "{}")]
        arguments: String,
    },

    /// Print the tool schemas advertised to the model
    Schemas,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match MemoriaConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(data_dir) = cli.data_dir {
        config.log_dir = data_dir.join("logs");
        config.data_dir = data_dir;
    }

    if let Err(err) = init_logging(&config.log_level, &config.log_dir) {
        eprintln!("logging disabled: {err}");
    }

    match run(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands, config: &MemoriaConfig) -> StoreResult<()> {
    match command {
        Commands::Ping => {
            println!("memoria_core ping={}", memoria_core::ping());
            println!("memoria_core version={}", memoria_core::core_version());
        }
        Commands::Describe { samples } => {
            let gateway = SqliteGateway::open(config.db_path())?;
            println!("database: {}", config.db_path().display());
            let summaries = gateway.describe(samples)?;
            if summaries.is_empty() {
                println!("(no records)");
            }
            for summary in summaries {
                println!();
                println!("collection {} ({} records)", summary.name, summary.record_count);
                for (field, kinds) in &summary.metadata_fields {
                    let kinds = kinds.iter().cloned().collect::<Vec<_>>().join("|");
                    println!("  field {field}: {kinds}");
                }
                for record in &summary.samples {
                    println!("  sample {}", preview(record));
                }
            }
        }
        Commands::Reembed => {
            let store = ItemStore::new(SqliteGateway::open(config.db_path())?);
            let report = store.reembed_all()?;
            println!(
                "reembed: migrated={} skipped={}",
                report.migrated, report.skipped
            );
        }
        Commands::Context => {
            let session = ToolSession::open(config)?;
            println!("{}", session.system_context());
        }
        Commands::Tool { name, arguments } => {
            let session = ToolSession::open(config)?;
            let response = session.execute_raw(&name, &arguments);
            match serde_json::to_string_pretty(&response) {
                Ok(rendered) => println!("{rendered}"),
                Err(err) => eprintln!("failed to render response: {err}"),
            }
        }
        Commands::Schemas => {
            let schemas = serde_json::Value::Array(tool_schemas());
            println!("{schemas:#}");
        }
    }
    Ok(())
}

fn preview(record: &Record) -> String {
    let flattened = record.text.replace('\n', " | ");
    let mut text = flattened.chars().take(SAMPLE_PREVIEW_CHARS).collect::<String>();
    if flattened.chars().count() > SAMPLE_PREVIEW_CHARS {
        text.push_str("...");
    }
    format!("{} updated={} {}", record.id, record.updated_at.to_rfc3339(), text)
}
