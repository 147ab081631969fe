//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Node-local state convergence daemon
#[derive(Parser, Debug)]
#[command(name = "nodestated")]
#[command(version)]
#[command(about = "Converge node state from versioned resources through controllers")]
pub struct Cli {
    /// Configuration file (defaults apply when it does not exist)
    #[arg(short, long, global = true, default_value = "/etc/nodestate/config.toml")]
    pub config: PathBuf,

    /// Log filter, e.g. `info` or `nodestate_runtime=debug` (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Seed desired state and run the controllers until interrupted
    Run,

    /// Parse the configuration and print the effective values as JSON
    CheckConfig,

    /// Print the options resolved for a partition label
    Partition {
        /// Partition label (EFI, BIOS, BOOT, META, STATE, EPHEMERAL, IMAGECACHE)
        label: String,

        /// Resolve for a unified kernel image install
        #[arg(long, default_value_t = false)]
        uki: bool,
    },
}
