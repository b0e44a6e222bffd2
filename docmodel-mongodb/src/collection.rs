use async_trait::async_trait;
use bson::Document;
use futures::TryStreamExt;
use mongodb::{
    Client, Collection,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::ClientOptions,
};
use tracing::debug;

use docmodel_core::{
    backend::{CollectionService, CollectionServiceBuilder, DeleteAck, InsertAck, UpdateAck},
    diff::Patch,
    document::ID_FIELD,
    error::{ModelError, ModelResult},
    query::Filter,
};

use crate::translate::{filter_document, update_document};

const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Debug, Clone)]
pub struct MongoCollection {
    collection: Collection<Document>,
}

impl MongoCollection {
    pub fn new(collection: Collection<Document>) -> Self {
        Self { collection }
    }

    pub fn builder(dsn: &str, database: &str, collection: &str) -> MongoCollectionBuilder {
        MongoCollectionBuilder::new(dsn, database, collection)
    }

    /// The underlying driver collection.
    pub fn inner(&self) -> &Collection<Document> {
        &self.collection
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY_CODE
    )
}

#[async_trait]
impl CollectionService for MongoCollection {
    fn name(&self) -> &str {
        self.collection.name()
    }

    async fn find(&self, filter: Filter) -> ModelResult<Vec<Document>> {
        self.collection
            .find(filter_document(&filter)?)
            .await
            .map_err(|e| ModelError::Store(e.to_string()))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| ModelError::Store(e.to_string()))
    }

    async fn find_one(&self, filter: Filter) -> ModelResult<Option<Document>> {
        self.collection
            .find_one(filter_document(&filter)?)
            .await
            .map_err(|e| ModelError::Store(e.to_string()))
    }

    async fn insert_one(&self, document: Document) -> ModelResult<InsertAck> {
        let id = document
            .get(ID_FIELD)
            .map(ToString::to_string)
            .unwrap_or_default();

        let result = self
            .collection
            .insert_one(document)
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    ModelError::DuplicateKey(id, self.name().to_string())
                } else {
                    ModelError::Store(e.to_string())
                }
            })?;

        debug!(collection = self.name(), id = %result.inserted_id, "inserted document");
        Ok(InsertAck {
            inserted_id: result.inserted_id,
        })
    }

    async fn update_one(&self, filter: Filter, patch: Patch) -> ModelResult<UpdateAck> {
        let filter = filter_document(&filter)?;

        // MongoDB rejects empty update documents; an empty patch only confirms the match.
        if patch.is_empty() {
            let matched = self
                .collection
                .count_documents(filter)
                .limit(1)
                .await
                .map_err(|e| ModelError::Store(e.to_string()))?;

            return Ok(UpdateAck { matched, modified: 0 });
        }

        let result = self
            .collection
            .update_one(filter, update_document(patch))
            .await
            .map_err(|e| ModelError::Store(e.to_string()))?;

        debug!(
            collection = self.name(),
            matched = result.matched_count,
            modified = result.modified_count,
            "updated document"
        );
        Ok(UpdateAck {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn delete_many(&self, filter: Filter) -> ModelResult<DeleteAck> {
        let result = self
            .collection
            .delete_many(filter_document(&filter)?)
            .await
            .map_err(|e| ModelError::Store(e.to_string()))?;

        debug!(collection = self.name(), deleted = result.deleted_count, "deleted documents");
        Ok(DeleteAck {
            deleted: result.deleted_count,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MongoCollectionBuilder {
    dsn: String,
    database: String,
    collection: String,
}

impl MongoCollectionBuilder {
    pub fn new(dsn: &str, database: &str, collection: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
            collection: collection.to_string(),
        }
    }
}

#[async_trait]
impl CollectionServiceBuilder for MongoCollectionBuilder {
    type Service = MongoCollection;

    async fn build(self) -> ModelResult<Self::Service> {
        let client = Client::with_options(
            ClientOptions::parse(&self.dsn)
                .await
                .map_err(|e| ModelError::Initialization(e.to_string()))?,
        )
        .map_err(|e| ModelError::Initialization(e.to_string()))?;

        Ok(MongoCollection::new(
            client
                .database(&self.database)
                .collection(&self.collection),
        ))
    }
}
