//! MapKV CLI
//!
//! Command-line access to MapKV stores.
//!
//! # Commands
//!
//! - `get`, `set`, `remove`, `keys`, `clear` - Read and edit entries
//! - `trim` - Compact the log and shrink the file
//! - `rekey` - Re-encrypt a store or remove its encryption
//! - `inspect` - Display store statistics and header details
//! - `dump` - Print every entry

mod commands;

use clap::{Args, Parser, Subcommand};
use commands::OutputFormat;
use mapkv_core::{Config, FixedPathProvider, Mode, Registry, Store, StoreIdentity};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// MapKV command-line store tools.
#[derive(Parser)]
#[command(name = "mapkv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the store
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Store id (the data file name)
    #[arg(global = true, long, default_value = mapkv_core::DEFAULT_STORE_ID)]
    id: String,

    /// Encryption key
    #[arg(global = true, short, long)]
    key: Option<String>,

    /// Coordinate with other processes using the store
    #[arg(global = true, long)]
    multi_process: bool,

    /// Open the store read-only
    #[arg(global = true, long)]
    read_only: bool,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the value stored under a key
    Get {
        /// Key to read
        key: String,
    },

    /// Store a value under a key
    Set {
        /// Key to write
        key: String,

        #[command(flatten)]
        value: ValueArgs,
    },

    /// Remove a key
    Remove {
        /// Key to remove
        key: String,
    },

    /// List all keys
    Keys,

    /// Remove every key
    Clear,

    /// Compact the log and shrink the file
    Trim,

    /// Re-encrypt the store under a new key
    Rekey {
        /// New key; omit to store in plaintext
        #[arg(long)]
        new_key: Option<String>,
    },

    /// Display store statistics and header details
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Print every entry
    Dump {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show version information
    Version,
}

/// Exactly one typed value for `set`.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct ValueArgs {
    /// String value
    #[arg(long)]
    string: Option<String>,

    /// Number value
    #[arg(long, allow_negative_numbers = true)]
    number: Option<f64>,

    /// Boolean value (true or false)
    #[arg(long, action = clap::ArgAction::Set)]
    boolean: Option<bool>,

    /// Blob value as hex
    #[arg(long)]
    blob_hex: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("MapKV CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("MapKV Core v{}", mapkv_core::VERSION);
        return Ok(());
    }

    let path = cli.path.clone().ok_or("Store directory required (--path)")?;
    tracing::debug!(path = %path.display(), id = %cli.id, "opening store");
    let registry = Registry::new(&FixedPathProvider::new(path), Config::default());
    let store = registry.acquire(&identity(&cli))?;

    let result = run(&store, cli.command);
    registry.close_all();
    result
}

fn identity(cli: &Cli) -> StoreIdentity {
    let mode = if cli.multi_process {
        Mode::MultiProcess
    } else {
        Mode::SingleProcess
    };
    let mut identity = StoreIdentity::new(cli.id.as_str())
        .with_mode(mode)
        .with_read_only(cli.read_only);
    if let Some(key) = &cli.key {
        identity = identity.with_encryption_key(key.as_bytes());
    }
    identity
}

fn run(store: &Arc<Store>, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Get { key } => commands::data::get(store, &key)?,
        Commands::Set { key, value } => {
            let value = commands::data::parse_value(
                value.string,
                value.number,
                value.boolean,
                value.blob_hex.as_deref(),
            )?;
            commands::data::set(store, &key, value)?;
        }
        Commands::Remove { key } => commands::data::remove(store, &key)?,
        Commands::Keys => commands::data::keys(store)?,
        Commands::Clear => commands::data::clear(store)?,
        Commands::Trim => commands::maintain::trim(store)?,
        Commands::Rekey { new_key } => commands::maintain::rekey(store, new_key.as_deref())?,
        Commands::Inspect { format } => commands::inspect::run(store, format)?,
        Commands::Dump { format } => commands::dump::run(store, format)?,
        Commands::Version => {}
    }
    Ok(())
}
