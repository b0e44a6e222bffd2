//! Translation from docmodel filters and patches to MongoDB syntax.
//!
//! Operators map one to one onto MongoDB query operators (`eq` to `$eq`, `elemMatch`
//! to `$elemMatch`, the top-level `or` key to `$or`); patches become `$set`/`$unset`
//! update documents.

use bson::Document;

use docmodel_core::{
    diff::Patch,
    error::ModelResult,
    query::{Filter, FilterVisitor, FilterWriter},
};

const OPERATOR_PREFIX: &str = "$";

/// Renders `filter` as a MongoDB query document.
pub(crate) fn filter_document(filter: &Filter) -> ModelResult<Document> {
    Ok(FilterWriter::new(OPERATOR_PREFIX).visit_filter(filter)?)
}

/// Renders `patch` as a MongoDB update document. Empty buckets are omitted.
pub(crate) fn update_document(patch: Patch) -> Document {
    let (set, unset) = patch.into_parts();
    let mut update = Document::new();

    if !set.is_empty() {
        update.insert("$set", set);
    }
    if !unset.is_empty() {
        update.insert("$unset", unset);
    }

    update
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmodel_core::{
        diff::diff,
        query::{FilterBuilder, Predicates},
    };

    #[test]
    fn filters_use_dollar_operators() {
        let filter = FilterBuilder::new()
            .field("age")
            .gte(18)
            .lt(65)
            .field("role")
            .in_array(["admin"])
            .field("readers")
            .elem_match(|q| q.field("name").ne("ann"))
            .or(|q| [q().field("deleted").exists(false), q().field("deleted").equals(false)])
            .build()
            .unwrap();

        assert_eq!(
            filter_document(&filter).unwrap(),
            doc! {
                "age": { "$gte": 18, "$lt": 65 },
                "role": { "$in": ["admin"] },
                "readers": { "$elemMatch": { "name": { "$ne": "ann" } } },
                "$or": [
                    { "deleted": { "$exists": false } },
                    { "deleted": { "$eq": false } },
                ],
            }
        );
    }

    #[test]
    fn identity_filter() {
        assert_eq!(
            filter_document(&Filter::by_id("abc")).unwrap(),
            doc! { "_id": { "$eq": "abc" } }
        );
        assert_eq!(filter_document(&Filter::new()).unwrap(), doc! {});
    }

    #[test]
    fn patches_become_set_and_unset() {
        let patch = diff(
            &doc! { "a": 1, "b": { "c": 1 }, "gone": true },
            &doc! { "a": 2, "b": { "c": 1, "d": 2 } },
        );

        assert_eq!(
            update_document(patch),
            doc! { "$set": { "a": 2, "b.d": 2 }, "$unset": { "gone": "" } }
        );
        assert_eq!(update_document(Patch::new()), doc! {});
    }
}
