//! A small object-document mapper over BSON document collections.
//!
//! This crate is the core of the docmodel project and provides:
//!
//! - **Schemas** ([`schema`]) - Declarative type descriptors compiled into shareable document types
//! - **Coercion rules** ([`analyzer`]) - The compiler from type descriptors to value normalizers and defaults
//! - **Documents** ([`document`]) - Typed instances with rule-driven accessors and change tracking
//! - **Diffing** ([`diff`]) - Minimal set/unset patches between two snapshots
//! - **Queries** ([`query`]) - Fluent filter construction and a visitor for backends
//! - **Collection services** ([`backend`]) - The async collection contract backends implement
//! - **Models** ([`model`]) - Document types bound to a collection
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use docmodel::prelude::*;
//! use bson::doc;
//!
//! let user = DocumentType::compile(
//!     "User",
//!     Schema::new()
//!         .field("name", TypeDescriptor::String)
//!         .field("verified", TypeDescriptor::Boolean.with_default(false))
//!         .field("readers", TypeDescriptor::array(TypeDescriptor::String)),
//! )?;
//!
//! let users = Model::new(user, collection);
//! let mut ann = users.create(doc! { "name": "ann" });
//! users.save(&mut ann).await?;
//! ```

pub mod analyzer;
pub mod backend;
pub mod diff;
pub mod document;
pub mod error;
pub mod model;
pub mod query;
pub mod schema;
