//! Convenient re-exports of commonly used types from docmodel.
//!
//! ```ignore
//! use docmodel::prelude::*;
//! ```
//!
//! This provides access to:
//! - Schemas, type descriptors and compiled document types
//! - Documents and the field accessor trait
//! - Models, queries and the predicate vocabulary
//! - The collection service traits
//! - Error types

pub use docmodel_core::{
    backend::{CollectionService, CollectionServiceBuilder, DeleteAck, InsertAck, UpdateAck},
    diff::{Patch, diff},
    document::{Document, FieldAccess, FieldValue, SubDocument},
    error::{ModelError, ModelResult},
    model::{Model, ModelQuery},
    query::{Filter, FilterBuilder, Predicate, Predicates, QueryBuilder},
    schema::{DefaultValue, DocumentType, Schema, TypeDescriptor, TypeRegistry},
};
