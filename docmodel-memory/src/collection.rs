//! In-memory collection implementation.
//!
//! Rows are kept in insertion order in a `Vec` behind an async-aware read-write lock.
//! Cloning an [`InMemoryCollection`] yields another handle to the same rows.

use async_trait::async_trait;
use bson::{Bson, Document as BsonDocument, Uuid, oid::ObjectId};
use mea::rwlock::RwLock;
use std::sync::Arc;
use tracing::{debug, trace};

use docmodel_core::{
    backend::{CollectionService, CollectionServiceBuilder, DeleteAck, InsertAck, UpdateAck},
    diff::Patch,
    document::ID_FIELD,
    error::{ModelError, ModelResult},
    query::Filter,
};

use crate::{evaluator::{Comparable, DocumentEvaluator}, patch};

/// How identities are generated for inserted documents without an `_id`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdStrategy {
    /// A fresh [`ObjectId`].
    #[default]
    ObjectId,
    /// A random UUID stored as BSON binary (subtype 4).
    Uuid,
}

impl IdStrategy {
    fn generate(self) -> Bson {
        match self {
            IdStrategy::ObjectId => Bson::ObjectId(ObjectId::new()),
            IdStrategy::Uuid => Bson::from(Uuid::new()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryCollection {
    name: String,
    ids: IdStrategy,
    rows: Arc<RwLock<Vec<BsonDocument>>>,
}

impl InMemoryCollection {
    /// Creates an empty collection that assigns `ObjectId` identities.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ids: IdStrategy::default(),
            rows: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn builder(name: impl Into<String>) -> InMemoryCollectionBuilder {
        InMemoryCollectionBuilder::new(name)
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// A copy of every stored document, in insertion order.
    pub async fn snapshot(&self) -> Vec<BsonDocument> {
        self.rows.read().await.clone()
    }
}

fn same_id(row: &BsonDocument, id: &Bson) -> bool {
    row.get(ID_FIELD)
        .is_some_and(|existing| Comparable::from(existing) == Comparable::from(id))
}

#[async_trait]
impl CollectionService for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, filter: Filter) -> ModelResult<Vec<BsonDocument>> {
        let rows = self.rows.read().await;
        let mut found = Vec::new();

        for row in rows.iter() {
            if DocumentEvaluator::matches(row, &filter)? {
                found.push(row.clone());
            }
        }

        trace!(collection = %self.name, matched = found.len(), "find");
        Ok(found)
    }

    async fn insert_one(&self, document: BsonDocument) -> ModelResult<InsertAck> {
        let mut rows = self.rows.write().await;

        let id = match document.get(ID_FIELD) {
            Some(id) if !matches!(id, Bson::Null | Bson::Undefined) => id.clone(),
            _ => self.ids.generate(),
        };

        if rows.iter().any(|row| same_id(row, &id)) {
            return Err(ModelError::DuplicateKey(id.to_string(), self.name.clone()));
        }

        let mut stored = BsonDocument::new();
        stored.insert(ID_FIELD, id.clone());
        for (key, value) in document {
            if key != ID_FIELD {
                stored.insert(key, value);
            }
        }
        rows.push(stored);

        debug!(collection = %self.name, id = %id, "inserted document");
        Ok(InsertAck { inserted_id: id })
    }

    async fn update_one(&self, filter: Filter, patch: Patch) -> ModelResult<UpdateAck> {
        let mut rows = self.rows.write().await;

        let mut position = None;
        for (index, row) in rows.iter().enumerate() {
            if DocumentEvaluator::matches(row, &filter)? {
                position = Some(index);
                break;
            }
        }

        let Some(position) = position else {
            debug!(collection = %self.name, "update matched no document");
            return Ok(UpdateAck::default());
        };

        let mut updated = rows[position].clone();
        patch::apply(&mut updated, &patch)?;

        if updated.get(ID_FIELD) != rows[position].get(ID_FIELD) {
            return Err(ModelError::Store(format!(
                "`{ID_FIELD}` of a stored document cannot change"
            )));
        }

        let modified = u64::from(updated != rows[position]);
        rows[position] = updated;

        debug!(collection = %self.name, modified, "updated document");
        Ok(UpdateAck { matched: 1, modified })
    }

    async fn delete_many(&self, filter: Filter) -> ModelResult<DeleteAck> {
        let mut rows = self.rows.write().await;
        let before = rows.len();

        let mut matched = Vec::with_capacity(before);
        for row in rows.iter() {
            matched.push(DocumentEvaluator::matches(row, &filter)?);
        }

        let mut matched = matched.into_iter();
        rows.retain(|_| !matched.next().unwrap_or(false));

        let deleted = (before - rows.len()) as u64;
        debug!(collection = %self.name, deleted, "deleted documents");
        Ok(DeleteAck { deleted })
    }
}

/// Builder for constructing [`InMemoryCollection`] instances.
///
/// # Example
///
/// ```ignore
/// use docmodel_memory::{IdStrategy, InMemoryCollection};
/// use docmodel::backend::CollectionServiceBuilder;
///
/// let posts = InMemoryCollection::builder("posts")
///     .id_strategy(IdStrategy::Uuid)
///     .build()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryCollectionBuilder {
    name: String,
    ids: IdStrategy,
    rows: Vec<BsonDocument>,
}

impl InMemoryCollectionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ids: IdStrategy::default(),
            rows: Vec::new(),
        }
    }

    /// Sets how identities are generated for documents inserted without one.
    pub fn id_strategy(mut self, ids: IdStrategy) -> Self {
        self.ids = ids;
        self
    }

    /// Pre-populates the collection. Rows are inserted as given, in order.
    pub fn rows(mut self, rows: impl IntoIterator<Item = BsonDocument>) -> Self {
        self.rows.extend(rows);
        self
    }
}

#[async_trait]
impl CollectionServiceBuilder for InMemoryCollectionBuilder {
    type Service = InMemoryCollection;

    /// Builds the collection, inserting the seed rows.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Initialization`] if two seed rows share an `_id`.
    async fn build(self) -> ModelResult<Self::Service> {
        let collection = InMemoryCollection {
            ids: self.ids,
            ..InMemoryCollection::new(self.name)
        };

        for row in self.rows {
            collection
                .insert_one(row)
                .await
                .map_err(|err| ModelError::Initialization(err.to_string()))?;
        }

        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmodel_core::query::{FilterBuilder, Predicates};

    fn filter(build: impl FnOnce(FilterBuilder) -> FilterBuilder) -> Filter {
        build(FilterBuilder::new()).build().unwrap()
    }

    #[tokio::test]
    async fn insert_assigns_an_id_first_and_rejects_duplicates() {
        let collection = InMemoryCollection::new("users");

        let ack = collection.insert_one(doc! { "name": "ann" }).await.unwrap();
        assert!(matches!(ack.inserted_id, Bson::ObjectId(_)));

        let rows = collection.snapshot().await;
        assert_eq!(rows[0].keys().next().map(String::as_str), Some(ID_FIELD));

        let duplicate = collection
            .insert_one(doc! { "_id": ack.inserted_id.clone(), "name": "bob" })
            .await;
        assert!(matches!(duplicate, Err(ModelError::DuplicateKey(_, name)) if name == "users"));
        assert_eq!(collection.len().await, 1);
    }

    #[tokio::test]
    async fn uuid_strategy_generates_binary_ids() {
        let collection = InMemoryCollection::builder("users")
            .id_strategy(IdStrategy::Uuid)
            .build()
            .await
            .unwrap();

        let ack = collection.insert_one(doc! {}).await.unwrap();
        assert!(matches!(ack.inserted_id, Bson::Binary(_)));
    }

    #[tokio::test]
    async fn update_applies_the_patch_to_the_first_match() {
        let collection = InMemoryCollection::builder("posts")
            .rows([
                doc! { "_id": 1, "title": "a", "meta": { "views": 1 } },
                doc! { "_id": 2, "title": "a" },
            ])
            .build()
            .await
            .unwrap();

        let mut patch = Patch::new();
        patch.insert_set("meta.views", 2);
        patch.insert_unset("title");

        let ack = collection
            .update_one(filter(|q| q.field("title").equals("a")), patch)
            .await
            .unwrap();
        assert_eq!(ack, UpdateAck { matched: 1, modified: 1 });

        let rows = collection.snapshot().await;
        assert_eq!(rows[0], doc! { "_id": 1, "meta": { "views": 2 } });
        assert_eq!(rows[1], doc! { "_id": 2, "title": "a" });

        let empty = collection
            .update_one(Filter::by_id(2), Patch::new())
            .await
            .unwrap();
        assert_eq!(empty, UpdateAck { matched: 1, modified: 0 });

        let missing = collection
            .update_one(Filter::by_id(3), Patch::new())
            .await
            .unwrap();
        assert_eq!(missing, UpdateAck::default());
    }

    #[tokio::test]
    async fn update_cannot_change_the_identity() {
        let collection = InMemoryCollection::builder("posts")
            .rows([doc! { "_id": 1 }])
            .build()
            .await
            .unwrap();

        let mut patch = Patch::new();
        patch.insert_set(ID_FIELD, 5);

        let result = collection.update_one(Filter::by_id(1), patch).await;
        assert!(matches!(result, Err(ModelError::Store(_))));
        assert_eq!(collection.snapshot().await, vec![doc! { "_id": 1 }]);
    }

    #[tokio::test]
    async fn delete_many_honours_the_filter() {
        let collection = InMemoryCollection::builder("posts")
            .rows([
                doc! { "_id": 1, "draft": true },
                doc! { "_id": 2, "draft": false },
                doc! { "_id": 3, "draft": true },
            ])
            .build()
            .await
            .unwrap();

        let ack = collection
            .delete_many(filter(|q| q.field("draft").equals(true)))
            .await
            .unwrap();

        assert_eq!(ack.deleted, 2);
        assert_eq!(collection.snapshot().await, vec![doc! { "_id": 2, "draft": false }]);

        let all = collection.delete_many(Filter::new()).await.unwrap();
        assert_eq!(all.deleted, 1);
        assert!(collection.is_empty().await);
    }

    #[tokio::test]
    async fn seeding_duplicate_ids_fails_to_build() {
        let result = InMemoryCollection::builder("posts")
            .rows([doc! { "_id": 1 }, doc! { "_id": 1_i64 }])
            .build()
            .await;

        assert!(matches!(result, Err(ModelError::Initialization(_))));
    }

    #[tokio::test]
    async fn find_one_returns_none_without_a_match() {
        let collection = InMemoryCollection::new("posts");

        assert_eq!(collection.find_one(Filter::by_id(1)).await.unwrap(), None);
    }
}
