mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{init, inspect, replay, InitArgs, InspectArgs, ReplayArgs};

/// Actionlog CLI - inspect and replay offline command logs
#[derive(Parser, Debug)]
#[command(name = "actionlog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default actionlog.config.json
    Init(InitArgs),

    /// Print one summary line per logged command
    Inspect(InspectArgs),

    /// Replay a log onto documents and print the result
    Replay(ReplayArgs),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Init(args) => init(args),
        Command::Inspect(args) => inspect(args),
        Command::Replay(args) => replay(args),
    };

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
