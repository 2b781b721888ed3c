mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use relaybyte_types::PluginKind;

#[derive(Parser)]
#[command(
    name = "relaybyte",
    version,
    about = "Inspect relaybyte engine configuration and plugins"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate engine configuration and bind its transform stages
    Check {
        /// Path to engine YAML file
        config: PathBuf,
    },
    /// List plugins under the plugin home
    Plugins {
        /// Engine YAML file naming the plugin home
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Only list one kind (reader, writer, transformer)
        #[arg(long)]
        kind: Option<PluginKind>,
    },
    /// List registered transform stages, built-in and local
    Transformers {
        /// Engine YAML file naming the plugin home
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Check { config } => commands::check::execute(&config),
        Commands::Plugins { config, kind } => commands::plugins::execute(config.as_deref(), kind),
        Commands::Transformers { config } => commands::transformers::execute(config.as_deref()),
    }
}
