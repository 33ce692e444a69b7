//! Collection capability used by the store
//!
//! [`DocumentCollection`] is the only surface the store needs from a document
//! database. [`MongoCollection`] forwards each call to the driver;
//! [`crate::MemoryCollection`] implements the same contract in process.

use crate::Result;
use async_trait::async_trait;
use bson::Document as BsonDocument;
use futures::TryStreamExt;
use mongodb::{Collection, IndexModel};

/// Result of a single-document insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    pub acknowledged: bool,
}

/// Result of a multi-document update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOutcome {
    /// Documents matching the filter
    pub matched_count: u64,
    /// Documents whose contents actually changed
    pub modified_count: u64,
}

/// Operations a document collection must support
///
/// Filters, updates and pipeline stages are passed through verbatim; the
/// implementation owns their semantics.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    /// Name of the underlying collection
    fn name(&self) -> &str;

    /// Create an index on `keys`, returning its name
    ///
    /// Creating an index that already exists is not an error.
    async fn create_index(&self, keys: BsonDocument) -> Result<String>;

    async fn insert_one(&self, document: BsonDocument) -> Result<InsertOutcome>;

    async fn find(
        &self,
        filter: BsonDocument,
        projection: Option<BsonDocument>,
    ) -> Result<Vec<BsonDocument>>;

    async fn update_many(&self, filter: BsonDocument, update: BsonDocument)
        -> Result<UpdateOutcome>;

    /// Delete every matching document, returning how many were removed
    async fn delete_many(&self, filter: BsonDocument) -> Result<u64>;

    async fn aggregate(&self, pipeline: Vec<BsonDocument>) -> Result<Vec<BsonDocument>>;
}

/// Driver-backed collection
#[derive(Debug, Clone)]
pub struct MongoCollection {
    inner: Collection<BsonDocument>,
}

impl MongoCollection {
    pub fn new(inner: Collection<BsonDocument>) -> Self {
        Self { inner }
    }

    /// The wrapped driver collection
    pub fn inner(&self) -> &Collection<BsonDocument> {
        &self.inner
    }
}

#[async_trait]
impl DocumentCollection for MongoCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn create_index(&self, keys: BsonDocument) -> Result<String> {
        let index = IndexModel::builder().keys(keys).build();
        let result = self.inner.create_index(index).await?;
        Ok(result.index_name)
    }

    async fn insert_one(&self, document: BsonDocument) -> Result<InsertOutcome> {
        // The driver only returns once the write concern is satisfied
        self.inner.insert_one(document).await?;
        Ok(InsertOutcome { acknowledged: true })
    }

    async fn find(
        &self,
        filter: BsonDocument,
        projection: Option<BsonDocument>,
    ) -> Result<Vec<BsonDocument>> {
        let cursor = match projection {
            Some(projection) => self.inner.find(filter).projection(projection).await?,
            None => self.inner.find(filter).await?,
        };
        let docs: Vec<BsonDocument> = cursor.try_collect().await?;
        Ok(docs)
    }

    async fn update_many(
        &self,
        filter: BsonDocument,
        update: BsonDocument,
    ) -> Result<UpdateOutcome> {
        let result = self.inner.update_many(filter, update).await?;
        Ok(UpdateOutcome {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
        })
    }

    async fn delete_many(&self, filter: BsonDocument) -> Result<u64> {
        let result = self.inner.delete_many(filter).await?;
        Ok(result.deleted_count)
    }

    async fn aggregate(&self, pipeline: Vec<BsonDocument>) -> Result<Vec<BsonDocument>> {
        let cursor = self.inner.aggregate(pipeline).await?;
        let docs: Vec<BsonDocument> = cursor.try_collect().await?;
        Ok(docs)
    }
}
