//! Sauron Schema CLI
//!
//! Validates schema snapshots, prints compiled wire schemas, checks
//! compatibility between snapshots and round-trips values through the codec.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use sauron_schema::{
    Codec, CompatibilityChecker, SauronConfig, SchemaRegistry, SchemaSnapshot,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sauron-schema")]
#[command(about = "Validate, compile and compare Sauron schema snapshots")]
struct Cli {
    /// Config file (defaults to sauron.toml and friends)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-validate a snapshot and print its summary
    Validate {
        /// Snapshot file (defaults to the configured path)
        snapshot: Option<PathBuf>,
    },

    /// Print the Avro schema of one record, or of all records
    Compile {
        /// Record name; all records when omitted
        record: Option<String>,
        /// Snapshot file (defaults to the configured path)
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },

    /// Check whether data written with one snapshot can be read with another
    Check {
        /// Writer snapshot
        #[arg(short, long)]
        from: PathBuf,
        /// Reader snapshot
        #[arg(short, long)]
        to: PathBuf,
        /// Strict mode - any change is breaking
        #[arg(long)]
        strict: bool,
    },

    /// Encode a JSON value, print the bytes and the decoded value
    Roundtrip {
        /// Record name
        record: String,
        /// Value as JSON
        value: String,
        /// Snapshot file (defaults to the configured path)
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },

    /// Show the effective configuration, or write it to a file
    Config {
        /// Write the configuration here instead of printing it
        #[arg(long)]
        init: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = SauronConfig::load_from(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Validate { snapshot } => {
            let path = snapshot.unwrap_or_else(|| config.snapshot_path());
            let snapshot = load(&path)?;
            let fingerprint = snapshot.fingerprint()?;
            let registry = SchemaRegistry::parse(snapshot)
                .with_context(|| format!("validating {}", path.display()))?;

            println!("✅ {} ({})", registry.name(), registry.serializer());
            println!("   Records:    {}", registry.records().count());
            for namespace in registry.namespaces() {
                println!("   Namespace:  {} ({} receivers)", namespace, registry.receivers(namespace).count());
            }
            if !registry.signals().is_empty() {
                println!("   Signals:    {}", registry.signals().join(", "));
            }
            println!("   Checksum:   {}", fingerprint.short());
        }

        Commands::Compile { record, snapshot } => {
            let codec = open_codec(&config, snapshot)?;
            let names: Vec<String> = match record {
                Some(name) => vec![name],
                None => codec.registry().records().map(|r| r.name.clone()).collect(),
            };
            for name in names {
                let schema = codec.wire_schema(&name)?;
                if config.snapshot.output_format.is_pretty() {
                    println!("{}", serde_json::to_string_pretty(&schema)?);
                } else {
                    println!("{}", serde_json::to_string(&schema)?);
                }
            }
        }

        Commands::Check { from, to, strict } => {
            let writer = load(&from)?;
            let codec = Codec::with_config(
                SchemaRegistry::parse(load(&to)?)?,
                config.codec.clone(),
            )?;

            let results = if strict {
                codec.check_against_with(&writer, &CompatibilityChecker::new().strict())?
            } else {
                codec.check_against(&writer)?
            };

            let mut breaking = 0;
            for (record, result) in &results {
                let marker = if result.is_compatible { "✅" } else { "❌" };
                println!("{} {}: {}", marker, record, result.summary);
                for change in &result.changes {
                    let flag = if change.is_breaking { "BREAKING" } else { "ok" };
                    println!("   [{}] {}: {}", flag, change.path, change.description);
                }
                if !result.is_compatible {
                    breaking += 1;
                }
            }
            if breaking > 0 {
                bail!("{} of {} records are incompatible", breaking, results.len());
            }
        }

        Commands::Roundtrip { record, value, snapshot } => {
            let codec = open_codec(&config, snapshot)?;
            let value: serde_json::Value = serde_json::from_str(&value).context("parsing value")?;
            let bytes = codec.encode(&record, &value)?;
            let hex: Vec<String> = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            println!("Encoded ({} bytes): {}", bytes.len(), hex.join(" "));
            println!("Decoded: {}", codec.decode(&record, &bytes)?);
        }

        Commands::Config { init } => match init {
            Some(path) => {
                config.save(&path)?;
                println!("Wrote configuration to {}", path);
            }
            None => print!("{}", toml::to_string_pretty(&config)?),
        },
    }

    Ok(())
}

fn load(path: &Path) -> anyhow::Result<SchemaSnapshot> {
    SchemaSnapshot::load(path).with_context(|| format!("reading {}", path.display()))
}

fn open_codec(config: &SauronConfig, snapshot: Option<PathBuf>) -> anyhow::Result<Codec> {
    let path = snapshot.unwrap_or_else(|| config.snapshot_path());
    let registry = SchemaRegistry::parse(load(&path)?)?;
    Ok(Codec::with_config(registry, config.codec.clone())?)
}
