// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use storycam::config::Config;

mod cli;

#[derive(Parser)]
#[command(name = "storycam")]
#[command(about = "Record vertical 1080x1920 video stories")]
#[command(version = storycam::constants::app_info::version())]
#[command(subcommand_required = false)]
struct Cli {
    /// Maximum recording length in seconds
    #[arg(long, global = true)]
    max_duration: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras and microphones
    List,

    /// Record a story without the terminal UI
    Record {
        /// Camera index to use (from 'storycam list')
        #[arg(short, long, default_value = "0")]
        camera: usize,

        /// Microphone index to use (default: the system default)
        #[arg(short, long)]
        microphone: Option<usize>,

        /// Stop after this many seconds (default: 60)
        #[arg(short, long)]
        duration: Option<u64>,

        /// Output file or directory (default: ~/Videos)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export an existing video to the story format
    Transcode {
        /// Video to export
        input: PathBuf,

        /// Output file or directory (default: ~/Videos)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=storycam=debug, RUST_LOG=info
    // The terminal view owns the screen, so it stays quiet unless asked.
    let default_level = if cli.command.is_none() { "off" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::List) => cli::list_devices_command(),
        Some(Commands::Record {
            camera,
            microphone,
            duration,
            output,
        }) => cli::record_story(camera, microphone, duration.or(cli.max_duration), output),
        Some(Commands::Transcode { input, output }) => cli::transcode_file(input, output),
        None => {
            let config = Config::default().with_max_duration(cli.max_duration)?;
            storycam::terminal::run(config)
        }
    }
}
