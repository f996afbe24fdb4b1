use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Kontra - validate tabular datasets against a declarative contract
#[derive(Parser, Debug)]
#[command(name = "kontra")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a contract's rules against its datasource
    Validate {
        /// Path to the contract YAML file
        contract: PathBuf,

        /// Override the contract's `datasource` with a different URI
        #[arg(long)]
        data: Option<String>,

        /// Disable the metadata preplan tier
        #[arg(long)]
        no_preplan: bool,

        /// Disable the SQL pushdown tier
        #[arg(long)]
        no_sql_pushdown: bool,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        output_format: Format,

        /// Include the `stats` block (phase timings, preplan/pushdown
        /// summaries, projection info) in the output
        #[arg(long)]
        stats: bool,

        /// Disable colored text output
        #[arg(long)]
        no_color: bool
    }
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Format {
    Text,
    Json,
    Yaml
}
