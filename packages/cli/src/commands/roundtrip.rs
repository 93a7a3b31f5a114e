use super::{read_input, Input};
use anyhow::{bail, Result};
use archive_vault::{denormalize, normalize_with, VaultConfig};
use clap::Args;
use colored::Colorize;
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct RoundtripArgs {
    /// Document to check
    pub input: PathBuf,
}

pub fn roundtrip(args: RoundtripArgs, cwd: &Path) -> Result<()> {
    let config = VaultConfig::load(cwd)?;
    let doc = match read_input(&args.input)? {
        Input::Document(doc) => doc,
        Input::State(_) => bail!("{} is a state file, expected a document", args.input.display()),
    };

    let state = normalize_with(&doc, &config.schema())?;
    let rebuilt = denormalize(&state)?;

    let mut differences = Vec::new();
    diff(&doc, &rebuilt, "$", &mut differences);

    if differences.is_empty() {
        println!(
            "{} {} round-trips ({} entities, {} extension bags)",
            "✓".green(),
            args.input.display(),
            state.type_index.len(),
            state.extensions.len()
        );
        return Ok(());
    }

    println!("{} {} changed after round trip", "✗".red(), args.input.display());
    for difference in &differences {
        println!("   {}", difference);
    }
    bail!("{} difference(s)", differences.len())
}

/// Paths at which two JSON values differ
fn diff(expected: &Value, actual: &Value, path: &str, out: &mut Vec<String>) {
    match (expected, actual) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, value) in a {
                let child = format!("{path}.{key}");
                match b.get(key) {
                    Some(other) => diff(value, other, &child, out),
                    None => out.push(format!("{child}: missing")),
                }
            }
            for key in b.keys().filter(|key| !a.contains_key(*key)) {
                out.push(format!("{path}.{key}: unexpected"));
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            if a.len() != b.len() {
                out.push(format!("{path}: {} items became {}", a.len(), b.len()));
            }
            for (index, (left, right)) in a.iter().zip(b).enumerate() {
                diff(left, right, &format!("{path}[{index}]"), out);
            }
        }
        _ if expected != actual => out.push(format!("{path}: {expected} became {actual}")),
        _ => {}
    }
}
