//! Document types bound to a collection.
//!
//! A [`Model`] pairs a compiled [`DocumentType`] with the [`CollectionService`] its
//! documents live in. Queries started from a model return [`Document`]s of that type.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::prelude::*;
//!
//! let users = Model::new(user_type, collection);
//!
//! let mut user = users.create(doc! { "name": "ann" });
//! users.save(&mut user).await?;
//!
//! let verified = users.field("verified").equals(true).await?;
//! users.field("name").equals("ann").remove().await?;
//! ```
//!
//! Custom query scopes are extension traits over [`ModelQuery`]:
//!
//! ```ignore
//! trait PostScopes: Predicates {
//!     fn with_readers(self) -> Self {
//!         self.field("readers.0").exists(true)
//!     }
//! }
//!
//! impl<C: CollectionService + ?Sized> PostScopes for ModelQuery<'_, C> {}
//! ```

use bson::Document as BsonDocument;
use futures::future::BoxFuture;
use serde_json::Value;
use std::{future::IntoFuture, sync::Arc};

use crate::{
    backend::{CollectionService, DeleteAck},
    document::Document,
    error::ModelResult,
    query::{Filter, FilterBuilder, Predicates, QueryBuilder},
    schema::DocumentType,
};

/// A document type bound to a collection service.
#[derive(Debug, Clone)]
pub struct Model<C> {
    document_type: Arc<DocumentType>,
    collection: C,
}

impl<C: CollectionService> Model<C> {
    pub fn new(document_type: Arc<DocumentType>, collection: C) -> Self {
        Self {
            document_type,
            collection,
        }
    }

    pub fn document_type(&self) -> &Arc<DocumentType> {
        &self.document_type
    }

    pub fn collection(&self) -> &C {
        &self.collection
    }

    /// Builds a new, unsaved document of this model's type.
    pub fn create(&self, raw: BsonDocument) -> Document {
        Document::new(self.document_type.clone(), raw)
    }

    /// Builds a new, unsaved document from a JSON object.
    ///
    /// # Errors
    ///
    /// See [`Document::from_json`].
    pub fn create_from_json(&self, value: &Value) -> ModelResult<Document> {
        Document::from_json(self.document_type.clone(), value)
    }

    /// Saves `document` into this model's collection.
    ///
    /// # Errors
    ///
    /// See [`Document::save`].
    pub async fn save(&self, document: &mut Document) -> ModelResult<()> {
        document.save(&self.collection).await
    }

    /// Starts a query with no focused path.
    pub fn query(&self) -> ModelQuery<'_, C> {
        ModelQuery::new(&self.document_type, QueryBuilder::new(&self.collection))
    }

    /// Starts a query focused on `path`.
    pub fn field(&self, path: impl Into<String>) -> ModelQuery<'_, C> {
        ModelQuery::new(&self.document_type, QueryBuilder::at(&self.collection, path))
    }

    /// Fetches every document of the collection.
    ///
    /// # Errors
    ///
    /// Returns the collection's error.
    pub async fn find(&self) -> ModelResult<Vec<Document>> {
        self.query().find().await
    }

    /// Fetches the first document of the collection, or `None`.
    ///
    /// # Errors
    ///
    /// Returns the collection's error.
    pub async fn find_one(&self) -> ModelResult<Option<Document>> {
        self.query().find_one().await
    }

    /// Deletes every document of the collection.
    ///
    /// # Errors
    ///
    /// Returns the collection's error.
    pub async fn remove(&self) -> ModelResult<DeleteAck> {
        self.query().remove().await
    }
}

/// A fluent query that wraps result rows into [`Document`]s.
///
/// Awaiting the query directly is the same as calling [`ModelQuery::find`].
#[derive(Debug)]
pub struct ModelQuery<'a, C: CollectionService + ?Sized> {
    document_type: &'a Arc<DocumentType>,
    query: QueryBuilder<'a, C>,
}

impl<'a, C: CollectionService + ?Sized> ModelQuery<'a, C> {
    pub fn new(document_type: &'a Arc<DocumentType>, query: QueryBuilder<'a, C>) -> Self {
        Self { document_type, query }
    }

    /// The accumulated filter.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Query`](crate::error::ModelError::Query) if the query was
    /// assembled incorrectly.
    pub fn filter(&self) -> ModelResult<Filter> {
        self.query.filter()
    }

    /// Fetches every matching document.
    ///
    /// # Errors
    ///
    /// Returns a query or collection error. Rows the schema cannot coerce still load.
    pub async fn find(self) -> ModelResult<Vec<Document>> {
        let document_type = self.document_type;

        let documents = self
            .query
            .find()
            .await?
            .into_iter()
            .map(|row| Document::new(document_type.clone(), row))
            .collect();

        Ok(documents)
    }

    /// Fetches the first matching document, or `None`.
    ///
    /// # Errors
    ///
    /// Returns a query or collection error.
    pub async fn find_one(self) -> ModelResult<Option<Document>> {
        let document_type = self.document_type;

        Ok(self
            .query
            .find_one()
            .await?
            .map(|row| Document::new(document_type.clone(), row)))
    }

    /// Deletes every matching document.
    ///
    /// # Errors
    ///
    /// Returns a query or collection error.
    pub async fn remove(self) -> ModelResult<DeleteAck> {
        self.query.remove().await
    }
}

impl<C: CollectionService + ?Sized> Predicates for ModelQuery<'_, C> {
    fn filter_builder(&mut self) -> &mut FilterBuilder {
        self.query.filter_builder()
    }
}

impl<'a, C: CollectionService + ?Sized> IntoFuture for ModelQuery<'a, C> {
    type Output = ModelResult<Vec<Document>>;
    type IntoFuture = BoxFuture<'a, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.find())
    }
}
