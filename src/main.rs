// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "tofcam")]
#[command(about = "TF-series Time-of-Flight depth camera tool")]
#[command(version)]
struct Cli {
    /// Also write logs to a file under the user data directory
    #[arg(long, global = true)]
    log_file: bool,

    /// Include the simulated device in discovery
    #[arg(long, global = true)]
    simulated: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available devices
    List,

    /// Show device identity and calibration
    Info {
        /// Device index to use (from 'tofcam list')
        #[arg(short, long, default_value = "0")]
        device: usize,
    },

    /// Stream frames and print live statistics
    Stream {
        /// Device index to use (from 'tofcam list')
        #[arg(short, long, default_value = "0")]
        device: usize,

        /// Streaming duration in seconds
        #[arg(long, default_value = "10")]
        duration: u64,
    },

    /// Save one depth (or IR) frame as a 16-bit PNG
    Snapshot {
        /// Device index to use (from 'tofcam list')
        #[arg(short, long, default_value = "0")]
        device: usize,

        /// Output file path (default: ~/Pictures/tofcam/depth_TIMESTAMP.png)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Save the IR plane instead of the depth plane
        #[arg(long)]
        ir: bool,
    },

    /// Capture one point-cloud frame as LAS/LAZ
    Points {
        /// Device index to use (from 'tofcam list')
        #[arg(short, long, default_value = "0")]
        device: usize,

        /// Output file path (default: ~/Pictures/tofcam/cloud_TIMESTAMP.las)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    // Set RUST_LOG to control the log level, e.g. RUST_LOG=tofcam=debug
    tofcam::set_log_status(true, args.log_file);

    match args.command {
        Commands::List => cli::list_devices(args.simulated),
        Commands::Info { device } => cli::show_info(device, args.simulated),
        Commands::Stream { device, duration } => cli::stream(device, args.simulated, duration),
        Commands::Snapshot { device, output, ir } => {
            cli::snapshot(device, args.simulated, output, ir)
        }
        Commands::Points { device, output } => cli::capture_points(device, args.simulated, output),
    }
}
