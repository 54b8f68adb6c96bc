//! avimux - write and inspect OpenDML AVI files.

mod commands;

use clap::{Parser, Subcommand};
use commands::{CmdGenerate, CmdInspect};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the avimux tool.
#[derive(Parser, Debug)]
#[command(name = "avimux")]
#[command(version)]
#[command(about = "Write and inspect AVI files with OpenDML indexes")]
#[command(long_about = "avimux writes synthetic AVI recordings through the transcode AVI writer \n\
    and prints the chunk tree, headers and indexes of existing files.\n\n\
    EXAMPLES:\n    \
    avimux generate pattern.avi --frames 300 --audio-rate 48000\n    \
    avimux generate legacy.avi --index basic --fourcc MJPG\n    \
    avimux inspect pattern.avi\n    \
    avimux inspect pattern.avi --json")]
struct Args {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the chunk tree, headers and indexes of an AVI file
    Inspect(CmdInspect),
    /// Write a synthetic test-pattern recording
    Generate(CmdGenerate),
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so JSON output stays clean; try_init also routes
    // `log` records from the library through tracing
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter(args.verbose))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    match &args.command {
        Command::Inspect(cmd) => cmd.run(),
        Command::Generate(cmd) => cmd.run(),
    }
}

/// `--verbose` forces debug output; otherwise `RUST_LOG` applies, falling
/// back to info.
fn log_filter(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
