//! vault-hub command line front-end.
//!
//! Opens a vault directory, loads entity type definitions from a YAML file,
//! and drives the folder-organization engine over it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vault_hub_core::property::PropertyKind;
use vault_hub_core::vault::Vault;
use vault_hub_core::{DiskVault, Engine, EntityType, TypeRegistry};

#[derive(Parser)]
#[command(name = "vault-hub")]
#[command(about = "Keep a markdown vault's folder layout consistent with its parent metadata")]
struct Cli {
    /// Vault root directory
    #[arg(short, long, default_value = ".")]
    vault: PathBuf,

    /// Entity type definitions (YAML)
    #[arg(short, long)]
    types: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile one entity's folder placement (and its subtree)
    Reconcile {
        /// Vault-relative path of the entity's document
        file: String,
    },

    /// Reconcile every typed entity in the vault
    ReconcileAll,

    /// Print an entity's resolved type, parent, and children
    Inspect {
        /// Vault-relative path of the entity's document
        file: String,
    },
}

#[derive(Debug, Deserialize)]
struct TypesFile {
    #[serde(default)]
    types: Vec<TypeSpec>,
}

#[derive(Debug, Deserialize)]
struct TypeSpec {
    name: String,
    #[serde(default)]
    parent_property: Option<String>,
    #[serde(default)]
    parent_folder_name: Option<String>,
    #[serde(default)]
    properties: HashMap<String, PropertyKind>,
}

fn load_registry(path: Option<&PathBuf>) -> Result<TypeRegistry> {
    let registry = TypeRegistry::new();
    let Some(path) = path else {
        return Ok(registry);
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading type definitions from {}", path.display()))?;
    let parsed: TypesFile =
        serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    for spec in parsed.types {
        registry.register(EntityType {
            name: spec.name,
            parent_property: spec.parent_property,
            parent_folder_name: spec.parent_folder_name,
            properties: spec.properties,
        });
    }
    Ok(registry)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let registry = load_registry(cli.types.as_ref())?;
    let vault = Arc::new(DiskVault::open(&cli.vault)?);
    let engine = Engine::new(Arc::clone(&vault) as Arc<dyn Vault>, registry);

    // Surface engine notifications on stderr as they happen.
    let mut notices = vault.events().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = notices.recv().await {
            if let vault_hub_core::events::Event::Notice { message } = event {
                eprintln!("note: {message}");
            }
        }
    });

    match cli.command {
        Commands::Reconcile { file } => {
            let mut entity = engine.entity_at(&file).await;
            if entity.kind().parent_property.is_none() {
                info!(path = %file, "no parent reference configured; nothing to do");
                return Ok(());
            }
            entity.update_parent_folder().await?;
            let settled = entity.path().unwrap_or(&file);
            println!("{settled}");
        }
        Commands::ReconcileAll => {
            let visited = engine.reconcile_all().await?;
            println!("reconciled {visited} entities");
        }
        Commands::Inspect { file } => {
            let entity = engine.entity_at(&file).await;
            let parent = match entity.resolve_parent().await {
                Some(parent) => parent.path().map(str::to_string),
                None => None,
            };
            let children: Vec<String> = entity
                .find_children()
                .await?
                .iter()
                .filter_map(|child| child.path().map(str::to_string))
                .collect();
            let kind = entity.kind();
            let report = serde_json::json!({
                "path": entity.path(),
                "type": if kind.name.is_empty() { None } else { Some(&kind.name) },
                "parent_property": kind.parent_property,
                "parent": parent,
                "children": children,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
