use super::load_state;
use anyhow::Result;
use archive_vault::{check_integrity, DiagnosticLevel, VaultConfig};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Document or state file to check
    pub input: PathBuf,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

pub fn check(args: CheckArgs, cwd: &Path) -> Result<()> {
    let config = VaultConfig::load(cwd)?;
    let state = load_state(&args.input, &config)?;
    let diagnostics = check_integrity(&state);

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    } else {
        println!("🔍 {} {}", "Checking".green().bold(), args.input.display());

        for diagnostic in &diagnostics {
            let level = match diagnostic.level {
                DiagnosticLevel::Error => "error".red().bold(),
                DiagnosticLevel::Warning => "warning".yellow().bold(),
                DiagnosticLevel::Info => "info".blue().bold(),
            };
            println!("   {}: {}", level, diagnostic.message);
            if let Some(suggestion) = &diagnostic.suggestion {
                println!("      {} {}", "help:".cyan(), suggestion);
            }
        }

        if diagnostics.is_empty() {
            println!("   {} All invariants hold", "✓".green());
        } else {
            println!();
            println!("   {} {}", "Findings:".red(), diagnostics.len());
        }
    }

    if !diagnostics.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}
