//! In-memory collection backend for docmodel.
//!
//! This crate provides a thread-safe, in-memory implementation of the `CollectionService`
//! trait. It uses async-aware read-write locks for concurrent access and is meant for
//! development and tests.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Full filter support** - Dotted paths, array indexing, `elemMatch` and `or`
//! - **Patch application** - Dotted `set`/`unset` paths, including array positions
//! - **Configurable identities** - `ObjectId` or UUID `_id` generation
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::prelude::*;
//! use docmodel::memory::InMemoryCollection;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let users = Model::new(user_type, InMemoryCollection::new("users"));
//!
//!     let mut ann = users.create(doc! { "name": "ann" });
//!     users.save(&mut ann).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod collection;
pub(crate) mod evaluator;
pub(crate) mod patch;

pub use collection::{IdStrategy, InMemoryCollection, InMemoryCollectionBuilder};
