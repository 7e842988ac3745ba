//! RestGIS CLI
//!
//! Command-line tools for working with saved feature service responses.
//!
//! # Commands
//!
//! - `schema` - Display the field list of a query or layer response
//! - `rows` - Print cursor rows of a query response
//! - `export` - Write cursor rows as JSON lines
//! - `normalize` - Canonicalise geometry input into `{geometryType, geometries}`

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// RestGIS command-line tools.
#[derive(Parser)]
#[command(name = "restgis")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the field list of a saved response
    Schema {
        /// Query or layer response (JSON)
        file: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print cursor rows of a saved query response
    Rows {
        /// Query response (JSON)
        file: PathBuf,

        /// Comma-delimited fields; OID@ and SHAPE@ are accepted
        #[arg(short = 'F', long, default_value = "*")]
        fields: String,

        /// Maximum number of rows to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Write cursor rows of a saved query response as JSON lines
    Export {
        /// Query response (JSON)
        file: PathBuf,

        /// Output file
        #[arg(short, long)]
        out: PathBuf,

        /// Comma-delimited fields; OID@ and SHAPE@ are accepted
        #[arg(short = 'F', long, default_value = "*")]
        fields: String,
    },

    /// Canonicalise geometry input
    Normalize {
        /// Geometry JSON, a bbox "xmin,ymin,xmax,ymax", or a path to a JSON file
        input: String,

        /// Replace typed geometries by their envelopes
        #[arg(short, long)]
        envelopes: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Schema { file, format } => {
            commands::schema::run(&file, &format)?;
        }
        Commands::Rows {
            file,
            fields,
            limit,
            format,
        } => {
            commands::rows::run(&file, &fields, limit, &format)?;
        }
        Commands::Export { file, out, fields } => {
            commands::export::run(&file, &out, &fields)?;
        }
        Commands::Normalize { input, envelopes } => {
            commands::normalize::run(&input, envelopes)?;
        }
        Commands::Version => {
            println!("RestGIS CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
