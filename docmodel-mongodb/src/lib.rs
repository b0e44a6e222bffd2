//! MongoDB collection backend for docmodel.
//!
//! This crate provides a MongoDB-based implementation of the `CollectionService` trait.
//! Filters are translated to MongoDB query operators and patches to `$set`/`$unset`
//! updates, so documents saved through docmodel only send the fields that changed.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docmodel = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docmodel::{backend::CollectionServiceBuilder, mongodb::MongoCollection, prelude::*};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let posts = MongoCollection::builder("mongodb://localhost:27017", "blog", "posts")
//!         .build()
//!         .await?;
//!     let posts = Model::new(post_type, posts);
//!
//!     let drafts = posts.field("draft").equals(true).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod collection;
pub(crate) mod translate;

pub use collection::{MongoCollection, MongoCollectionBuilder};
