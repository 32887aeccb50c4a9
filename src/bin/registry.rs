//! Parking registry administration
//!
//! Pre-registers vehicles in the occupancy registry. Records are always
//! created absent; presence is only ever changed by the gate controller.
//!
//! Usage:
//!   parking-registry init
//!   parking-registry add --plate P123 --tag 584190137
//!   parking-registry remove --plate P123
//!   parking-registry list --json

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use parking_gate::domain::{Identity, Source, VehicleRecord};
use parking_gate::infra::Config;
use parking_gate::io::SqliteStore;
use parking_gate::services::Normalizer;

#[derive(Parser, Debug)]
#[command(name = "parking-registry", version)]
#[command(about = "Manage registered vehicles in the parking occupancy registry")]
struct Args {
    /// Path to TOML configuration file (registry path and plate pattern)
    #[arg(short, long)]
    config: Option<String>,

    /// Registry database file, overriding the config
    #[arg(long)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the registry schema if it does not exist
    Init,
    /// Register a vehicle (absent)
    Add {
        #[arg(long)]
        plate: String,
        #[arg(long)]
        tag: Option<String>,
    },
    /// Remove a vehicle by plate
    Remove {
        #[arg(long)]
        plate: String,
    },
    /// List registered vehicles
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load_from_path(&args.config.unwrap_or_else(Config::default_path));
    let db_path = args.db.unwrap_or_else(|| config.registry_path().to_string());

    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("failed to open registry {db_path}"))?;
    let normalizer = Normalizer::new(config.plate_pattern())
        .with_context(|| format!("invalid plate pattern {:?}", config.plate_pattern()))?;

    match args.command {
        Command::Init => println!("registry ready at {db_path}"),
        Command::Add { plate, tag } => {
            let plate = canonical_plate(&normalizer, &plate)?;
            let tag = tag.map(|t| canonical_tag(&normalizer, &t)).transpose()?;
            store
                .register(&VehicleRecord::new(plate.clone(), tag))
                .with_context(|| format!("failed to register {plate}"))?;
            println!("registered {plate}");
        }
        Command::Remove { plate } => {
            let plate = canonical_plate(&normalizer, &plate)?;
            if !store.remove(&plate).context("failed to remove vehicle")? {
                bail!("{plate} is not registered");
            }
            println!("removed {plate}");
        }
        Command::List { json } => {
            let records = store.list().context("failed to list vehicles")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                println!("{:<10} {:<16} {:<8} UPDATED", "PLATE", "TAG", "PRESENT");
                for r in &records {
                    println!(
                        "{:<10} {:<16} {:<8} {}",
                        r.plate,
                        r.tag.as_deref().unwrap_or("-"),
                        if r.present { "yes" } else { "no" },
                        r.updated_at.to_rfc3339()
                    );
                }
            }
        }
    }

    Ok(())
}

/// Plates are stored in the same canonical form the camera path produces
fn canonical_plate(normalizer: &Normalizer, raw: &str) -> anyhow::Result<String> {
    match normalizer.normalize(raw, Source::Camera) {
        Ok(Identity::Plate(plate)) => Ok(plate),
        Ok(other) => bail!("unexpected identity {other}"),
        Err(e) => bail!("plate {raw:?} rejected: {e}"),
    }
}

fn canonical_tag(normalizer: &Normalizer, raw: &str) -> anyhow::Result<String> {
    match normalizer.normalize(raw, Source::TagReader) {
        Ok(identity) => Ok(identity.as_str().to_string()),
        Err(e) => bail!("tag {raw:?} rejected: {e}"),
    }
}
