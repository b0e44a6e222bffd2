//! Collection service abstraction consumed by documents and queries.
//!
//! This module defines the async contract a document collection must fulfil so that
//! [`Document::save`](crate::document::Document::save) and the query builders can talk
//! to it. The core never opens connections itself.
//!
//! # Traits
//!
//! - [`CollectionService`]: The collection contract (`find`, `insert_one`, `update_one`, `delete_many`)
//! - [`CollectionServiceBuilder`]: Factory trait for creating collection instances
//!
//! # Examples
//!
//! ```ignore
//! use docmodel::backend::CollectionService;
//! use docmodel::query::Filter;
//! use bson::doc;
//!
//! let ack = collection.insert_one(doc! { "name": "Alice" }).await?;
//! let rows = collection.find(Filter::by_id(ack.inserted_id)).await?;
//! ```

use async_trait::async_trait;
use bson::{Bson, Document as BsonDocument};
use std::{fmt::Debug, sync::Arc};

use crate::{diff::Patch, error::ModelResult, query::Filter};

/// Acknowledgment of an insert.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertAck {
    /// The identity the stored document was given.
    pub inserted_id: Bson,
}

/// Acknowledgment of an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateAck {
    /// Number of documents matching the filter.
    pub matched: u64,
    /// Number of documents actually changed.
    pub modified: u64,
}

/// Acknowledgment of a delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteAck {
    /// Number of documents removed.
    pub deleted: u64,
}

/// Abstract interface for a single document collection.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a collection is typically shared between many
/// documents and queries.
///
/// # Error Handling
///
/// Failures are reported as [`ModelError`](crate::error::ModelError) values and are
/// propagated to the caller unchanged. No operation is retried.
#[async_trait]
pub trait CollectionService: Send + Sync + Debug {
    /// The collection name, used in diagnostics.
    fn name(&self) -> &str;

    /// Returns every document matching `filter`, fully materialized.
    ///
    /// # Arguments
    ///
    /// * `filter` - The filter expression; an empty filter matches every document
    async fn find(&self, filter: Filter) -> ModelResult<Vec<BsonDocument>>;

    /// Returns the first document matching `filter`, or `None`.
    ///
    /// The default implementation takes the first result of [`find`](Self::find).
    async fn find_one(&self, filter: Filter) -> ModelResult<Option<BsonDocument>> {
        Ok(self.find(filter).await?.into_iter().next())
    }

    /// Inserts a document, assigning an `_id` if it has none.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DuplicateKey`](crate::error::ModelError::DuplicateKey) if a
    /// document with the same `_id` already exists.
    async fn insert_one(&self, document: BsonDocument) -> ModelResult<InsertAck>;

    /// Applies `patch` to the first document matching `filter`.
    ///
    /// # Arguments
    ///
    /// * `filter` - Selects the document to update
    /// * `patch` - Paths to assign and remove; may be empty
    async fn update_one(&self, filter: Filter, patch: Patch) -> ModelResult<UpdateAck>;

    /// Deletes every document matching `filter`.
    async fn delete_many(&self, filter: Filter) -> ModelResult<DeleteAck>;
}

#[async_trait]
impl<C> CollectionService for &C
where
    C: CollectionService + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn find(&self, filter: Filter) -> ModelResult<Vec<BsonDocument>> {
        (**self).find(filter).await
    }

    async fn find_one(&self, filter: Filter) -> ModelResult<Option<BsonDocument>> {
        (**self).find_one(filter).await
    }

    async fn insert_one(&self, document: BsonDocument) -> ModelResult<InsertAck> {
        (**self).insert_one(document).await
    }

    async fn update_one(&self, filter: Filter, patch: Patch) -> ModelResult<UpdateAck> {
        (**self).update_one(filter, patch).await
    }

    async fn delete_many(&self, filter: Filter) -> ModelResult<DeleteAck> {
        (**self).delete_many(filter).await
    }
}

#[async_trait]
impl<C> CollectionService for Box<C>
where
    C: CollectionService + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn find(&self, filter: Filter) -> ModelResult<Vec<BsonDocument>> {
        (**self).find(filter).await
    }

    async fn find_one(&self, filter: Filter) -> ModelResult<Option<BsonDocument>> {
        (**self).find_one(filter).await
    }

    async fn insert_one(&self, document: BsonDocument) -> ModelResult<InsertAck> {
        (**self).insert_one(document).await
    }

    async fn update_one(&self, filter: Filter, patch: Patch) -> ModelResult<UpdateAck> {
        (**self).update_one(filter, patch).await
    }

    async fn delete_many(&self, filter: Filter) -> ModelResult<DeleteAck> {
        (**self).delete_many(filter).await
    }
}

#[async_trait]
impl<C> CollectionService for Arc<C>
where
    C: CollectionService + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn find(&self, filter: Filter) -> ModelResult<Vec<BsonDocument>> {
        (**self).find(filter).await
    }

    async fn find_one(&self, filter: Filter) -> ModelResult<Option<BsonDocument>> {
        (**self).find_one(filter).await
    }

    async fn insert_one(&self, document: BsonDocument) -> ModelResult<InsertAck> {
        (**self).insert_one(document).await
    }

    async fn update_one(&self, filter: Filter, patch: Patch) -> ModelResult<UpdateAck> {
        (**self).update_one(filter, patch).await
    }

    async fn delete_many(&self, filter: Filter) -> ModelResult<DeleteAck> {
        (**self).delete_many(filter).await
    }
}

/// Factory for collection services, used to configure backends before connecting.
#[async_trait]
pub trait CollectionServiceBuilder {
    type Service: CollectionService;

    async fn build(self) -> ModelResult<Self::Service>;
}
