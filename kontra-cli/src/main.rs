//! # Kontra CLI
//!
//! Command-line wrapper around the `kontra` validation engine: loads a
//! contract, runs it against its datasource (or a `--data` override), and
//! prints the result as text, JSON, or YAML.
//!
//! # Quick Start
//!
//! ```bash
//! kontra validate orders.contract.yaml
//! kontra validate orders.contract.yaml --data s3://bucket/orders.parquet -f json
//! ```
//!
//! # Exit Codes
//!
//! - `0` - all blocking rules passed
//! - `1` - at least one blocking rule failed
//! - `2` - config error (bad contract, unknown rule, unparseable URI)
//! - `3` - runtime error (I/O, connection, or cancellation failure)
//!
//! # Environment Variables
//!
//! See `kontra::config::Config` for the full list (`KONTRA_THREADS`,
//! `KONTRA_IO_DEBUG`, plus the S3/Azure/Postgres/SQL Server variables the
//! engine reads when resolving a datasource).

mod cli;
mod output;

use std::process;

use clap::Parser;
use kontra::{config::Config, handle::DatasetHandle, orchestrator};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    cli::{Cli, Commands},
    output::{RenderOptions, render}
};

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    };

    match cli.command {
        Commands::Validate {
            contract,
            data,
            no_preplan,
            no_sql_pushdown,
            output_format,
            stats,
            no_color
        } => {
            let mut config = config;
            if no_preplan {
                config.engine.preplan = false;
            }
            if no_sql_pushdown {
                config.engine.sql_pushdown = false;
            }

            let handle_override = match data.map(|uri| DatasetHandle::from_uri(&uri)) {
                Some(Ok(handle)) => Some(handle),
                Some(Err(e)) => {
                    eprintln!("Error: {e}");
                    process::exit(2);
                }
                None => None
            };

            let contract_path = contract.display().to_string();
            info!(contract = %contract_path, "running validation");
            let (run_output, status) = orchestrator::run(&contract_path, handle_override, &config);

            let render_opts = RenderOptions {
                format: output_format,
                colored: !no_color,
                stats
            };
            println!("{}", render(&run_output, &render_opts));

            process::exit(status.exit_code());
        }
    }
}
