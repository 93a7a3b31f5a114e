mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{
    check, denormalize, inspect, normalize, roundtrip, CheckArgs, DenormalizeArgs, InspectArgs,
    NormalizeArgs, RoundtripArgs,
};
use tracing_subscriber::EnvFilter;

/// Archive Vault CLI - inspect and convert archive documents
#[derive(Parser, Debug)]
#[command(name = "vault")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log store internals (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize a document or state file
    Inspect(InspectArgs),

    /// Verify that a document survives normalize → denormalize unchanged
    Roundtrip(RoundtripArgs),

    /// Convert a document into a flat state file
    Normalize(NormalizeArgs),

    /// Convert a state file back into a document
    Denormalize(DenormalizeArgs),

    /// Check a state file against the store invariants
    Check(CheckArgs),
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("{} cannot read current directory: {}", "Error:".red().bold(), err);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Inspect(args) => inspect(args, &cwd),
        Command::Roundtrip(args) => roundtrip(args, &cwd),
        Command::Normalize(args) => normalize(args, &cwd),
        Command::Denormalize(args) => denormalize(args, &cwd),
        Command::Check(args) => check(args, &cwd),
    };

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
