//! Applies set/unset patches to stored documents.
//!
//! Dotted paths create missing intermediate documents. Numeric segments index arrays;
//! assigning past the end pads the array with `null`, unsetting an element replaces it
//! with `null` so later positions keep their index.

use bson::{Bson, Document as BsonDocument};

use docmodel_core::{
    diff::Patch,
    error::{ModelError, ModelResult},
};

/// Applies `patch` to `document` in place.
///
/// # Errors
///
/// Returns [`ModelError::Store`] if a path traverses a scalar or uses a non-numeric
/// segment on an array.
pub(crate) fn apply(document: &mut BsonDocument, patch: &Patch) -> ModelResult<()> {
    if let Some(set) = patch.set() {
        for (path, value) in set {
            let segments = path.split('.').collect::<Vec<_>>();
            set_in_document(document, &segments, value.clone(), path)?;
        }
    }

    if let Some(unset) = patch.unset() {
        for path in unset.keys() {
            let segments = path.split('.').collect::<Vec<_>>();
            unset_in_document(document, &segments);
        }
    }

    Ok(())
}

fn set_in_document(
    document: &mut BsonDocument,
    segments: &[&str],
    value: Bson,
    path: &str,
) -> ModelResult<()> {
    let Some((head, rest)) = segments.split_first() else {
        return Ok(());
    };

    if rest.is_empty() {
        document.insert(*head, value);
        return Ok(());
    }

    if !document.contains_key(*head) {
        document.insert(*head, BsonDocument::new());
    }

    match document.get_mut(*head) {
        Some(child) => set_in_value(child, rest, value, path),
        None => Ok(()),
    }
}

fn set_in_value(target: &mut Bson, segments: &[&str], value: Bson, path: &str) -> ModelResult<()> {
    match target {
        Bson::Document(document) => set_in_document(document, segments, value, path),
        Bson::Array(items) => {
            let Some((head, rest)) = segments.split_first() else {
                return Ok(());
            };
            let index = head.parse::<usize>().map_err(|_| {
                ModelError::Store(format!("cannot set `{path}`: `{head}` is not an array index"))
            })?;

            if items.len() <= index {
                items.resize(index + 1, Bson::Null);
            }

            if rest.is_empty() {
                items[index] = value;
                return Ok(());
            }

            if matches!(items[index], Bson::Null) {
                items[index] = Bson::Document(BsonDocument::new());
            }
            set_in_value(&mut items[index], rest, value, path)
        }
        other => Err(ModelError::Store(format!(
            "cannot set `{path}`: traverses a {:?} value",
            other.element_type()
        ))),
    }
}

fn unset_in_document(document: &mut BsonDocument, segments: &[&str]) {
    match segments {
        [] => {}
        [last] => {
            document.remove(*last);
        }
        [head, rest @ ..] => {
            if let Some(child) = document.get_mut(*head) {
                unset_in_value(child, rest);
            }
        }
    }
}

fn unset_in_value(target: &mut Bson, segments: &[&str]) {
    match target {
        Bson::Document(document) => unset_in_document(document, segments),
        Bson::Array(items) => {
            let Some((head, rest)) = segments.split_first() else {
                return;
            };
            let Some(item) = head.parse::<usize>().ok().and_then(|index| items.get_mut(index)) else {
                return;
            };

            if rest.is_empty() {
                *item = Bson::Null;
            } else {
                unset_in_value(item, rest);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmodel_core::diff::diff;
    use proptest::prelude::*;

    fn patched(mut document: BsonDocument, patch: &Patch) -> BsonDocument {
        apply(&mut document, patch).unwrap();
        document
    }

    #[test]
    fn sets_and_unsets_dotted_paths() {
        let mut patch = Patch::new();
        patch.insert_set("author.name", "ann");
        patch.insert_set("tags.1", "b");
        patch.insert_unset("title");

        assert_eq!(
            patched(doc! { "title": "x", "tags": ["a"] }, &patch),
            doc! { "tags": ["a", "b"], "author": { "name": "ann" } }
        );
    }

    #[test]
    fn assigning_past_the_end_pads_with_null() {
        let mut patch = Patch::new();
        patch.insert_set("tags.2", "c");

        assert_eq!(
            patched(doc! { "tags": [] }, &patch),
            doc! { "tags": [Bson::Null, Bson::Null, "c"] }
        );
    }

    #[test]
    fn unsetting_an_element_leaves_a_null_hole() {
        let mut patch = Patch::new();
        patch.insert_unset("tags.0");
        patch.insert_unset("missing.deep");

        assert_eq!(
            patched(doc! { "tags": ["a", "b"] }, &patch),
            doc! { "tags": [Bson::Null, "b"] }
        );
    }

    #[test]
    fn traversing_a_scalar_is_an_error() {
        let mut patch = Patch::new();
        patch.insert_set("title.x", 1);

        let mut document = doc! { "title": "x" };
        assert!(matches!(apply(&mut document, &patch), Err(ModelError::Store(_))));
    }

    fn leaf() -> impl Strategy<Value = Bson> {
        prop_oneof![
            any::<i32>().prop_map(Bson::Int32),
            any::<bool>().prop_map(Bson::Boolean),
            "[a-z]{0,4}".prop_map(Bson::String),
        ]
    }

    fn value() -> impl Strategy<Value = Bson> {
        leaf().prop_recursive(3, 16, 3, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..3).prop_map(Bson::Array),
                prop::collection::btree_map("[a-c]", inner, 0..3)
                    .prop_map(|map| Bson::Document(map.into_iter().collect())),
            ]
        })
    }

    fn document() -> impl Strategy<Value = BsonDocument> {
        prop::collection::btree_map("[a-d]", value(), 0..4).prop_map(|map| map.into_iter().collect())
    }

    /// Pairs where no array at a shared path shrinks.
    fn growing(before: &Bson, after: &Bson) -> bool {
        match (before, after) {
            (Bson::Array(a), Bson::Array(b)) => {
                a.len() <= b.len() && a.iter().zip(b).all(|(x, y)| growing(x, y))
            }
            (Bson::Document(a), Bson::Document(b)) => a
                .iter()
                .all(|(key, x)| b.get(key).is_none_or(|y| growing(x, y))),
            _ => true,
        }
    }

    proptest! {
        #[test]
        fn applying_a_diff_reproduces_the_target(before in document(), after in document()) {
            prop_assume!(growing(&Bson::Document(before.clone()), &Bson::Document(after.clone())));

            let patch = diff(&before, &after);
            prop_assert_eq!(patched(before, &patch), after);
        }
    }
}
