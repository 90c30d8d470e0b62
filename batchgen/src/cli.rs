use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Bulk media generation across automated sessions", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(ClapArgs, Debug, Clone)]
pub struct CommonArgs {
    /// TOML configuration file; defaults and BATCHGEN_* variables apply without it
    #[arg(short, long, env = "BATCHGEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load batches and identities and report what a run would do
    Plan {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Run every batch against the simulated driver
    Simulate {
        #[command(flatten)]
        common: CommonArgs,

        /// Probability that a simulated job fails
        #[arg(long, default_value_t = 0.1)]
        failure_rate: f64,

        /// Seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,

        /// Probe the configured URL instead of assuming the network is up
        #[arg(long)]
        check_network: bool,
    },
}

impl Commands {
    pub fn common(&self) -> &CommonArgs {
        match self {
            Commands::Plan { common } => common,
            Commands::Simulate { common, .. } => common,
        }
    }
}
