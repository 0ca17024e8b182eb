use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Main CLI structure for the pm-watcher application
/// Uses clap's derive macros for automatic CLI generation
#[derive(Parser)]
#[command(version)] // Automatically uses version from Cargo.toml
#[command(about = "SNMP performance monitoring collector - gather port traffic counters and rates over a vendor PM interface")]
#[command(long_about = "pm-watcher drives performance-monitoring requests against an SNMP north-bound \
interface, turns the returned counter tables into per-port byte, packet, error and discard rates, and \
buffers the results into local storage. Configuration comes from a YAML file plus PMW_-prefixed \
environment variables.")]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands for the pm-watcher application
/// Each variant represents a different mode of operation
#[derive(Subcommand)]
pub enum Commands {
    /// Continuous collection on the configured interval
    #[command(about = "Run the collector until interrupted")]
    #[command(long_about = "Starts the collection loop: every interval a PM request cycle gathers \
traffic counters for the discovered ports, computes rates against the previous cycle, and enqueues \
the records into the buffered writer. Stops cleanly on Ctrl-C, flushing buffered records first.\n\n\
Examples:\n  \
pmw run                                # Use pm-watcher.yaml from the working directory\n  \
pmw run --config /etc/pm-watcher.yaml  # Explicit configuration file")]
    Run,

    /// Single collection cycle, then exit
    #[command(about = "Collect one cycle of port traffic and exit")]
    Collect {
        /// Limit the cycle to ports whose name matches this regex
        #[arg(short, long, help = "Case-insensitive port name filter (regex)")]
        filter: Option<String>,
    },

    /// Discover ports exposed by the remote system
    #[command(about = "List ports found on the remote system")]
    Discover {
        /// Emit the port list as JSON instead of a table
        #[arg(long, help = "Output as JSON")]
        json: bool,
    },

    /// Verify SNMP reachability and storage health
    #[command(about = "Check connectivity to the SNMP agent and local storage")]
    Check,
}
