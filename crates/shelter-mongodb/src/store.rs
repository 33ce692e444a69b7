//! Animal record store
//!
//! [`AnimalRecordStore`] validates caller input, forwards the call to its
//! [`DocumentCollection`], and logs the outcome. It keeps no state besides the
//! collection handle.
//!
//! # Error contract
//! - Invalid input returns [`ShelterError::Validation`] and the collection is
//!   never called.
//! - Store failures are logged and returned as the driver's error. The store
//!   stays usable afterwards.
//! - `Ok(vec![])` / `Ok(0)` always means "nothing matched", never "failed".

use crate::collection::{DocumentCollection, MongoCollection};
use crate::config::StoreConfig;
use crate::connection::Connection;
use crate::pipeline::{average_stay_pipeline, BreedStayStat};
use crate::record::{AnimalRecord, FIELD_AGE_WEEKS, FIELD_ANIMAL_TYPE, FIELD_BREED};
use crate::validation::{require_non_empty, validate_field_names, validate_query};
use crate::Result;
use bson::{doc, Bson, Document as BsonDocument};
use shelter_common::ShelterError;

/// Fields that receive an ascending index on startup
pub const INDEXED_FIELDS: [&str; 3] = [FIELD_BREED, FIELD_ANIMAL_TYPE, FIELD_AGE_WEEKS];

/// CRUD and reporting over the animals collection
pub struct AnimalRecordStore<C: DocumentCollection> {
    collection: C,
}

impl AnimalRecordStore<MongoCollection> {
    /// Connect to MongoDB, verify the server answers, and ensure indexes
    ///
    /// Failures are logged (with credentials masked) and returned; nothing
    /// here terminates the process.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let connected = async {
            config.validate()?;
            let connection = Connection::with_config(config).await?;
            connection.ping().await?;
            let store = Self::open(connection.collection(&config.collection)).await?;
            Ok::<_, ShelterError>((store, connection))
        }
        .await;

        match connected {
            Ok((store, connection)) => {
                tracing::info!(
                    database = %connection.database_name(),
                    collection = %config.collection,
                    "Connected to MongoDB and verified indexes"
                );
                Ok(store)
            }
            Err(e) => {
                let e = e.map_message(|message| config.redact_secrets(message));
                tracing::error!(uri = %config.redacted_uri(), error = %e, "Could not connect to MongoDB");
                Err(e)
            }
        }
    }
}

impl<C: DocumentCollection> AnimalRecordStore<C> {
    /// Wrap a collection without contacting it
    pub fn new(collection: C) -> Self {
        Self { collection }
    }

    /// Wrap a collection and ensure its indexes exist
    pub async fn open(collection: C) -> Result<Self> {
        let store = Self::new(collection);
        store.ensure_indexes().await?;
        Ok(store)
    }

    /// The wrapped collection
    pub fn collection(&self) -> &C {
        &self.collection
    }

    /// Create the ascending indexes on [`INDEXED_FIELDS`]
    ///
    /// Safe to call repeatedly; existing indexes are left as they are.
    pub async fn ensure_indexes(&self) -> Result<Vec<String>> {
        let mut names = Vec::with_capacity(INDEXED_FIELDS.len());
        for field in INDEXED_FIELDS {
            let mut keys = BsonDocument::new();
            keys.insert(field, 1);
            let name = self
                .collection
                .create_index(keys)
                .await
                .map_err(|e| self.store_failure("Index creation", e))?;
            names.push(name);
        }
        tracing::debug!(collection = %self.collection.name(), indexes = ?names, "Indexes verified");
        Ok(names)
    }

    /// Insert one record
    ///
    /// Returns whether the store acknowledged the write.
    pub async fn create(&self, record: &AnimalRecord) -> Result<bool> {
        record
            .validate_for_insert()
            .map_err(|e| rejected("Insert", e))?;

        let outcome = self
            .collection
            .insert_one(BsonDocument::from(record.clone()))
            .await
            .map_err(|e| self.store_failure("Insert", e))?;
        tracing::debug!(collection = %self.collection.name(), acknowledged = outcome.acknowledged, "Record inserted");
        Ok(outcome.acknowledged)
    }

    /// Fetch every record matching `query`
    ///
    /// `None` or an empty query matches the whole collection. Store-assigned
    /// identifiers are not returned.
    pub async fn read(&self, query: Option<&BsonDocument>) -> Result<Vec<AnimalRecord>> {
        let filter = query.cloned().unwrap_or_default();
        validate_query(&Bson::Document(filter.clone())).map_err(|e| rejected("Read", e))?;

        let docs = self
            .collection
            .find(filter, Some(doc! { "_id": false }))
            .await
            .map_err(|e| self.store_failure("Read", e))?;
        Ok(docs.into_iter().map(AnimalRecord::from).collect())
    }

    /// Set `new_values` on every record matching `query`
    ///
    /// Only the given fields change. Returns the number of records actually
    /// modified, which excludes matches that already held those values.
    pub async fn update(&self, query: &BsonDocument, new_values: &BsonDocument) -> Result<u64> {
        require_non_empty(query, "Update query")
            .and_then(|_| require_non_empty(new_values, "Update values"))
            .and_then(|_| validate_query(&Bson::Document(query.clone())))
            .and_then(|_| validate_field_names(new_values))
            .map_err(|e| rejected("Update", e))?;

        let outcome = self
            .collection
            .update_many(query.clone(), doc! { "$set": new_values.clone() })
            .await
            .map_err(|e| self.store_failure("Update", e))?;
        tracing::info!(
            collection = %self.collection.name(),
            matched = outcome.matched_count,
            count = outcome.modified_count,
            "{} document(s) updated",
            outcome.modified_count
        );
        Ok(outcome.modified_count)
    }

    /// Remove every record matching `query`
    ///
    /// An empty query is rejected so the collection cannot be wiped by accident.
    pub async fn delete(&self, query: &BsonDocument) -> Result<u64> {
        require_non_empty(query, "Delete query")
            .and_then(|_| validate_query(&Bson::Document(query.clone())))
            .map_err(|e| rejected("Delete", e))?;

        let deleted = self
            .collection
            .delete_many(query.clone())
            .await
            .map_err(|e| self.store_failure("Delete", e))?;
        tracing::info!(
            collection = %self.collection.name(),
            count = deleted,
            "{} document(s) deleted",
            deleted
        );
        Ok(deleted)
    }

    /// Mean `age_upon_outcome_in_weeks` per breed, highest first
    pub async fn average_stay_by_breed(&self) -> Result<Vec<BreedStayStat>> {
        let rows = self
            .collection
            .aggregate(average_stay_pipeline())
            .await
            .map_err(|e| self.store_failure("Aggregation", e))?;
        rows.iter()
            .map(BreedStayStat::from_document)
            .collect::<Result<Vec<_>>>()
            .map_err(|e| self.store_failure("Aggregation", e))
    }

    fn store_failure(&self, operation: &str, err: ShelterError) -> ShelterError {
        tracing::error!(collection = %self.collection.name(), error = %err, "{} failed", operation);
        err
    }
}

fn rejected(operation: &str, err: ShelterError) -> ShelterError {
    tracing::warn!(error = %err, "{} rejected", operation);
    err
}
