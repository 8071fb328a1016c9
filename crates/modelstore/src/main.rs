//! modelstore - local administration for a content-addressed model store
//!
//! Subcommands:
//! - `modelstore rm <name>...` - Delete models and reclaim their blobs
//! - `modelstore ls` - List models
//! - `modelstore show <name>` - Print a manifest
//! - `modelstore create <name> <layer>...` - Store files and write a manifest
//! - `modelstore put <file>` - Store one blob
//! - `modelstore prune` - Reclaim orphaned blobs and stale staging files

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use modelstore::{
    DeleteStatus, Layer, ModelConfig, ModelStore, StoreConfig, CONFIG_MEDIA_TYPE,
    MODEL_LAYER_MEDIA_TYPE,
};
use tracing::{debug, info};
use tracing_subscriber::filter::Directive;

#[derive(Parser)]
#[command(name = "modelstore")]
#[command(about = "Local content-addressed model store")]
#[command(version)]
struct Cli {
    /// Config file (TOML with a [store] section)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store root, overriding config and environment
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete models and reclaim blobs nothing else references
    Rm {
        /// Model names, e.g. llama3:8b
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// List models
    Ls,

    /// Print a model's manifest
    Show {
        name: String,
    },

    /// Store files as blobs and write a manifest referencing them
    Create {
        name: String,

        /// Layer files, in order
        #[arg(required = true)]
        layers: Vec<PathBuf>,

        /// Config blob file (defaults to an empty model config)
        #[arg(long)]
        config_blob: Option<PathBuf>,

        /// Media type recorded for each layer
        #[arg(long, default_value = MODEL_LAYER_MEDIA_TYPE)]
        media_type: String,
    },

    /// Store one file as a blob and print its layer
    Put {
        file: PathBuf,

        #[arg(long, default_value = "application/octet-stream")]
        media_type: String,
    },

    /// Reclaim blobs no manifest references
    Prune {
        /// Keep staging files younger than this
        #[arg(long, default_value = "3600")]
        grace_secs: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = StoreConfig::load(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.root = root;
    }

    let default_level: Directive = config
        .log_level
        .parse()
        .with_context(|| format!("invalid log level {:?}", config.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level),
        )
        .with_writer(std::io::stderr)
        .init();

    let store = ModelStore::open(&config)?;
    debug!(root = %store.root().display(), "store ready");

    match cli.command {
        Commands::Rm { names } => rm(&store, &names),
        Commands::Ls => ls(&store),
        Commands::Show { name } => {
            let manifest = store.show(&name)?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
            Ok(())
        }
        Commands::Create {
            name,
            layers,
            config_blob,
            media_type,
        } => create(&store, &name, &layers, config_blob.as_deref(), &media_type),
        Commands::Put { file, media_type } => {
            let layer = put_file(&store, &file, &media_type)?;
            println!("{}", serde_json::to_string_pretty(&layer)?);
            Ok(())
        }
        Commands::Prune { grace_secs } => {
            let report = store.prune(Duration::from_secs(grace_secs))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn rm(store: &ModelStore, names: &[String]) -> Result<()> {
    let mut failed = 0;

    for name in names {
        let result = store.delete_model(name);
        let status = DeleteStatus::from_result(&result);
        match result {
            Ok(report) => {
                println!("deleted '{name}'");
                info!(
                    name = %name,
                    blobs_removed = report.blobs_removed,
                    blobs_retained = report.blobs_retained,
                    "model deleted"
                );
                for failure in &report.failures {
                    eprintln!(
                        "warning: could not remove blob {}: {}",
                        failure.digest, failure.message
                    );
                }
            }
            Err(err) => {
                failed += 1;
                if status == DeleteStatus::NotFound {
                    eprintln!("model '{name}' not found");
                } else {
                    eprintln!("error: {err}");
                }
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} model(s) could not be deleted", names.len());
    }
    Ok(())
}

fn ls(store: &ModelStore) -> Result<()> {
    for (name, manifest) in store.list()? {
        println!(
            "{:<48} {:>14}",
            name.display_shortest(store.defaults()),
            manifest.total_size()
        );
    }
    Ok(())
}

fn create(
    store: &ModelStore,
    name: &str,
    layer_files: &[PathBuf],
    config_blob: Option<&Path>,
    media_type: &str,
) -> Result<()> {
    let config = match config_blob {
        Some(path) => put_file(store, path, CONFIG_MEDIA_TYPE)?,
        None => {
            let bytes = ModelConfig::default().to_json()?;
            store.put_blob(&mut bytes.as_slice(), CONFIG_MEDIA_TYPE)?
        }
    };

    let layers = layer_files
        .iter()
        .map(|path| put_file(store, path, media_type))
        .collect::<Result<Vec<Layer>>>()?;

    let name = store.create_model(name, config, layers)?;
    println!("created '{}'", name.display_shortest(store.defaults()));
    Ok(())
}

fn put_file(store: &ModelStore, path: &Path, media_type: &str) -> Result<Layer> {
    let mut file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let layer = store
        .put_blob(&mut file, media_type)
        .with_context(|| format!("failed to store {}", path.display()))?;
    debug!(path = %path.display(), digest = %layer.digest, "stored file");
    Ok(layer)
}
