//! salesindex CLI: run the domain sales indexer and inspect its encodings.
//!
//! # Commands
//! ```text
//! salesindex run      --config config.toml [--template config.template.toml]
//! salesindex decode   <felt>...
//! salesindex selector <event-name>
//! salesindex info
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use salesindex_core::{decode_domain, selector, EventKind, Felt, IndexerConfig};

mod cmd_run;
mod logging;
mod watchtower;

#[derive(Parser)]
#[command(
    name = "salesindex",
    about = "Starknet domain sales indexer",
    long_about = "
Indexes Starknet naming-service purchases and renewals into `domains` and
`sales` collections. Attributes each sale to its payment, auto-renewal flag
and referral commission.
",
    version
)]
struct Cli {
    /// Log at debug level regardless of the config
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the indexer, restarting after failures
    Run {
        /// Config file; created from the template if missing
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// Template copied into place when the config file is missing
        #[arg(long, default_value = "config.template.toml")]
        template: PathBuf,
        /// Give up after this many restarts (default: never)
        #[arg(long)]
        max_restarts: Option<u32>,
    },

    /// Decode encoded domain labels (decimal or 0x-hex felts) into a domain name
    Decode {
        #[arg(required = true)]
        labels: Vec<String>,
    },

    /// Print the starknet_keccak selector of an event or function name
    Selector { name: String },

    /// Show the events and storage backends this build supports
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            template,
            max_restarts,
        } => {
            let loaded = IndexerConfig::load(&config, &template)
                .with_context(|| format!("loading {}", config.display()))?;
            logging::init_tracing(&loaded.log, cli.verbose);
            cmd_run::run(loaded, &config, &template, max_restarts).await
        }

        Commands::Decode { labels } => cmd_decode(&labels),

        Commands::Selector { name } => {
            println!("0x{:x}", selector::selector(&name));
            Ok(())
        }

        Commands::Info => cmd_info(),
    }
}

fn parse_felt(s: &str) -> Result<Felt> {
    Felt::from_str(s).with_context(|| format!("'{s}' is not a felt"))
}

fn cmd_decode(labels: &[String]) -> Result<()> {
    let felts = labels
        .iter()
        .map(|s| parse_felt(s))
        .collect::<Result<Vec<_>>>()?;
    println!("{}", decode_domain(&felts));
    Ok(())
}

fn cmd_info() -> Result<()> {
    println!("salesindex v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Events:");
    for kind in EventKind::ALL {
        println!(
            "  {:<20} 0x{:x}",
            kind.event_name(),
            selector::selector(kind.event_name())
        );
    }
    println!();
    println!("Storage backends:");
    println!("  memory");
    if cfg!(feature = "sqlite") {
        println!("  sqlite:<path>      (feature: sqlite)");
    }
    println!();
    println!("Stream: newline-delimited JSON blocks (file path or '-' for stdin)");
    Ok(())
}
