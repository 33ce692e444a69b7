//! Shelter CLI - command-line access to the animals collection
//!
//! Usage:
//!   shelter indexes                              Ensure the standard indexes exist
//!   shelter create '{"breed": "Pug", ...}'       Insert one record
//!   shelter read [--query '{"breed": "Pug"}']    List matching records
//!   shelter update '<query>' '<new values>'      Set fields on matching records
//!   shelter delete '<query>'                     Remove matching records
//!   shelter avg-stay                             Average stay in weeks per breed
//!
//! Connection settings come from DB_URI / DB_NAME / DB_COLLECTION, or a .env file.

use anyhow::{bail, Context, Result};
use bson::{Bson, Document};
use clap::{Parser, Subcommand};
use shelter_mongodb::{AnimalRecord, AnimalRecordStore, StoreConfig};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "shelter")]
#[command(about = "Animal shelter record store", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: Level,

    /// Override the collection name from the environment
    #[arg(long)]
    collection: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ensure the breed / animal_type / age indexes exist
    Indexes,
    /// Insert one record given as a JSON object
    Create {
        record: String,
    },
    /// Print records matching a JSON query (all records if omitted)
    Read {
        #[arg(short, long)]
        query: Option<String>,
    },
    /// Set the given fields on every record matching the query
    Update {
        query: String,
        new_values: String,
    },
    /// Delete every record matching the query (an empty query is refused)
    Delete {
        query: String,
    },
    /// Average age at outcome in weeks, grouped by breed
    AvgStay,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = StoreConfig::from_env()?;
    if let Some(collection) = cli.collection {
        config = config.collection(collection);
    }
    tracing::debug!(?config, "Loaded configuration");

    let store = AnimalRecordStore::connect(&config)
        .await
        .with_context(|| format!("Could not connect to {}", config.redacted_uri()))?;

    match cli.command {
        Command::Indexes => {
            for name in store.ensure_indexes().await? {
                println!("{}", name);
            }
        }
        Command::Create { record } => {
            let record = AnimalRecord::from(parse_document(&record)?);
            let acknowledged = store.create(&record).await?;
            println!("{}", serde_json::json!({ "acknowledged": acknowledged }));
        }
        Command::Read { query } => {
            let query = query.as_deref().map(parse_document).transpose()?;
            let records = store.read(query.as_ref()).await?;
            let rendered: Vec<serde_json::Value> = records
                .into_iter()
                .map(|r| Bson::Document(r.into()).into_relaxed_extjson())
                .collect();
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }
        Command::Update { query, new_values } => {
            let modified = store
                .update(&parse_document(&query)?, &parse_document(&new_values)?)
                .await?;
            println!("{}", serde_json::json!({ "modified_count": modified }));
        }
        Command::Delete { query } => {
            let deleted = store.delete(&parse_document(&query)?).await?;
            println!("{}", serde_json::json!({ "deleted_count": deleted }));
        }
        Command::AvgStay => {
            let stats = store.average_stay_by_breed().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}

/// Parse a JSON object argument into a BSON document
fn parse_document(json: &str) -> Result<Document> {
    let value: serde_json::Value =
        serde_json::from_str(json).with_context(|| format!("Invalid JSON: {}", json))?;
    if !value.is_object() {
        bail!("Expected a JSON object, got: {}", json);
    }
    bson::to_document(&value).context("JSON object could not be converted to BSON")
}
