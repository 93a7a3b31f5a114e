use super::{load_state, read_input, write_json, Input};
use anyhow::{bail, Result};
use archive_vault::{
    denormalize_entity_with_diagnostics, denormalize_with_diagnostics, normalize_with, VaultConfig,
};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct NormalizeArgs {
    /// Document to normalize
    pub input: PathBuf,

    /// Output file (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DenormalizeArgs {
    /// State file to rebuild
    pub input: PathBuf,

    /// Output file (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Rebuild only the subtree under this entity
    #[arg(long)]
    pub id: Option<String>,
}

pub fn normalize(args: NormalizeArgs, cwd: &Path) -> Result<()> {
    let config = VaultConfig::load(cwd)?;
    let doc = match read_input(&args.input)? {
        Input::Document(doc) => doc,
        Input::State(_) => bail!("{} is already a state file", args.input.display()),
    };

    let state = normalize_with(&doc, &config.schema())?;
    write_json(&state, args.output.as_deref())?;

    if let Some(output) = &args.output {
        eprintln!(
            "{} {} entities → {}",
            "✓".green(),
            state.type_index.len(),
            output.display()
        );
    }
    Ok(())
}

pub fn denormalize(args: DenormalizeArgs, cwd: &Path) -> Result<()> {
    let config = VaultConfig::load(cwd)?;
    let state = load_state(&args.input, &config)?;

    let (doc, diagnostics) = match &args.id {
        Some(id) => denormalize_entity_with_diagnostics(&state, id)?,
        None => denormalize_with_diagnostics(&state)?,
    };
    for diagnostic in &diagnostics {
        eprintln!("{}: {}", "warning".yellow().bold(), diagnostic.message);
    }
    write_json(&doc, args.output.as_deref())?;

    if let Some(output) = &args.output {
        eprintln!("{} document → {}", "✓".green(), output.display());
    }
    Ok(())
}
