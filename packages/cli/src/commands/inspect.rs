use super::load_state;
use anyhow::{anyhow, Result};
use archive_vault::{
    count_by_type, entity_count, get_ancestors, get_child_ids, get_collection_members,
    get_entity, get_extensions, get_member_of_collections, get_orphan_manifests, get_parent_id,
    list_trash, EntityKind, VaultConfig, VaultState,
};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Document or state file
    pub input: PathBuf,

    /// Show a single entity instead of the summary
    #[arg(long)]
    pub id: Option<String>,
}

pub fn inspect(args: InspectArgs, cwd: &Path) -> Result<()> {
    let config = VaultConfig::load(cwd)?;
    let state = load_state(&args.input, &config)?;

    match args.id {
        Some(id) => inspect_entity(&state, &id),
        None => {
            summarize(&state, &args.input);
            Ok(())
        }
    }
}

fn summarize(state: &VaultState, input: &Path) {
    println!("📦 {} {}", "Vault".green().bold(), input.display());
    println!(
        "   Root: {}",
        state.root_id.as_deref().unwrap_or("(none)")
    );
    println!("   Entities: {}", entity_count(state));
    for kind in EntityKind::ALL {
        let count = count_by_type(state, kind);
        if count > 0 {
            println!("     {:<15} {}", kind.as_str(), count);
        }
    }
    println!("   Extension bags: {}", state.extensions.len());

    let orphans = get_orphan_manifests(state);
    if !orphans.is_empty() {
        println!("   {} {}", "Orphan manifests:".yellow(), orphans.len());
        for id in &orphans {
            println!("     {}", id);
        }
    }

    let trash = list_trash(state);
    if !trash.is_empty() {
        println!("   {} {}", "Trash:".yellow(), trash.len());
        for entry in trash {
            println!(
                "     {} ({}, {} descendants, trashed {})",
                entry.entity.id,
                entry.entity.kind,
                entry.descendants.len(),
                entry.trashed_at.to_rfc3339()
            );
        }
    }
}

fn inspect_entity(state: &VaultState, id: &str) -> Result<()> {
    let entity = get_entity(state, id).ok_or_else(|| anyhow!("no active entity with id {}", id))?;

    println!("{} {}", entity.kind.as_str().cyan().bold(), entity.id);
    if let Some(parent) = get_parent_id(state, id) {
        println!("   Parent: {}", parent);
    }
    let ancestors = get_ancestors(state, id);
    if !ancestors.is_empty() {
        println!("   Path: {}", ancestors.join(" › "));
    }

    let children = get_child_ids(state, id);
    println!("   Children: {}", children.len());
    for child in children {
        println!("     {}", child);
    }

    let members = get_collection_members(state, id);
    if !members.is_empty() {
        println!("   Members: {}", members.join(", "));
    }
    let collections = get_member_of_collections(state, id);
    if !collections.is_empty() {
        println!("   Member of: {}", collections.join(", "));
    }

    if !entity.properties.is_empty() {
        println!("   Properties:");
        println!("{}", serde_json::to_string_pretty(&entity.properties)?);
    }
    if let Some(extensions) = get_extensions(state, id) {
        println!("   {}", "Extensions:".yellow());
        println!("{}", serde_json::to_string_pretty(extensions)?);
    }

    Ok(())
}
