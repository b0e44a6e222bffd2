//! Main docmodel crate: typed documents over BSON collections.
//!
//! This crate is the primary entry point for users of docmodel. It re-exports the core
//! types from the sub-crates and provides access to the collection backends.
//!
//! # Features
//!
//! - **Typed schemas** - Declare fields as strings, booleans, numbers, dates, arrays and
//!   sub-documents, in Rust or as JSON
//! - **Coercion and defaults** - Loosely typed input is normalized on construction and assignment
//! - **Minimal updates** - Saving a document sends only the paths that changed
//! - **Fluent queries** - Chain predicates, nest `elem_match` sub-queries, combine with `or`
//! - **Multiple backends** - In-memory and MongoDB collections behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryCollection};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> ModelResult<()> {
//!     let user = DocumentType::compile(
//!         "User",
//!         Schema::new()
//!             .field("name", TypeDescriptor::String)
//!             .field("verified", TypeDescriptor::Boolean.with_default_fn(|| false.into()))
//!             .field("birthday", TypeDescriptor::Date),
//!     )?;
//!     let users = Model::new(user, InMemoryCollection::new("users"));
//!
//!     let mut ann = users.create(doc! { "name": 123, "birthday": "2018-08-11" });
//!     users.save(&mut ann).await?;
//!
//!     ann.set("verified", true)?;
//!     users.save(&mut ann).await?; // sends {set: {verified: true}}
//!
//!     let verified = users.field("verified").equals(true).await?;
//!     println!("verified users: {}", verified.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! # JSON Schemas
//!
//! ```ignore
//! let mut registry = TypeRegistry::new();
//! registry.register(user)?;
//!
//! let post = DocumentType::compile(
//!     "Post",
//!     Schema::from_json(
//!         &json!({
//!             "title": "string",
//!             "author": "User",
//!             "readers": ["User"],
//!             "meta": { "views": { "type": "number", "default": 0 } },
//!         }),
//!         &registry,
//!     )?,
//! )?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory collections for development and testing
//! - [`mongodb`] - MongoDB collections (requires `mongodb` feature)

pub mod prelude;

pub use docmodel_core::{analyzer, backend, diff, document, error, model, query, schema};

// Re-export BSON types for convenience
pub use bson;

/// In-memory collection backend.
pub mod memory {
    pub use docmodel_memory::{IdStrategy, InMemoryCollection, InMemoryCollectionBuilder};
}

/// MongoDB collection backend.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmodel_mongodb::{MongoCollection, MongoCollectionBuilder};
}
