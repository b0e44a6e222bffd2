#![allow(dead_code)]

use std::sync::Arc;

use docmodel::{
    bson::Bson,
    memory::InMemoryCollection,
    prelude::*,
};
use serde_json::json;

pub fn user_type() -> Arc<DocumentType> {
    DocumentType::compile(
        "User",
        Schema::new()
            .field("name", TypeDescriptor::String)
            .field(
                "verified",
                TypeDescriptor::Boolean.with_default_fn(|| Bson::Boolean(false)),
            )
            .field("verifiedAt", TypeDescriptor::Date),
    )
    .unwrap()
}

/// `Book`, declared through the JSON surface with `User` resolved from a registry.
pub fn book_type(user: Arc<DocumentType>) -> Arc<DocumentType> {
    let mut registry = TypeRegistry::new();
    registry.register(user).unwrap();

    let schema = Schema::from_json(
        &json!({
            "author": "User",
            "published": { "at": "date", "by": "string" },
            "readers": ["User"],
            "readerIds": ["string"],
        }),
        &registry,
    )
    .unwrap();

    DocumentType::compile("Book", schema).unwrap()
}

pub fn users() -> Model<InMemoryCollection> {
    Model::new(user_type(), InMemoryCollection::new("users"))
}

pub fn books() -> Model<InMemoryCollection> {
    Model::new(book_type(user_type()), InMemoryCollection::new("books"))
}
