//! MongoDB-backed store for animal shelter records
//!
//! This crate exposes [`AnimalRecordStore`], a thin validating wrapper over a
//! single document collection. All query execution, indexing and connection
//! management is delegated to the driver through the [`DocumentCollection`]
//! capability trait.
//!
//! # Features
//! - Create / read / update / delete with input validation before any store call
//! - Idempotent index creation on the fields the store filters by
//! - Average stay duration grouped by breed (aggregation pipeline)
//! - In-memory collection for tests and offline use

pub mod collection;
pub mod config;
pub mod connection;
pub mod memory;
pub mod pipeline;
pub mod record;
pub mod store;
pub mod validation;

pub use collection::{DocumentCollection, InsertOutcome, MongoCollection, UpdateOutcome};
pub use config::{PoolConfig, StoreConfig};
pub use connection::Connection;
pub use memory::MemoryCollection;
pub use pipeline::{average_stay_pipeline, BreedStayStat};
pub use record::AnimalRecord;
pub use shelter_common::{Result, ShelterError};
pub use store::{AnimalRecordStore, INDEXED_FIELDS};
pub use validation::{validate_collection_name, validate_field_name, validate_query};
