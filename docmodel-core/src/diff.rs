//! Minimal set/unset patches between two document snapshots.
//!
//! [`diff`] walks the `after` snapshot against the `before` snapshot and records the
//! smallest set of dotted-path assignments and removals that turns one into the other.
//! Nested documents and arrays are compared positionally; moved elements are reported
//! as per-index assignments.
//!
//! ```ignore
//! use bson::doc;
//! use docmodel::diff::diff;
//!
//! let patch = diff(&doc! { "foo": { "bar": 1 } }, &doc! { "foo": { "bar": 2 } });
//! assert_eq!(patch.to_document(), doc! { "set": { "foo.bar": 2 } });
//! ```

use bson::{Bson, Document as BsonDocument};

/// Placeholder value stored under every removed path.
pub const UNSET_MARKER: &str = "";

/// A change set produced by [`diff`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    set: BsonDocument,
    unset: BsonDocument,
}

impl Patch {
    /// Creates an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths to assign, or `None` when nothing is assigned.
    pub fn set(&self) -> Option<&BsonDocument> {
        (!self.set.is_empty()).then_some(&self.set)
    }

    /// Paths to remove, or `None` when nothing is removed.
    pub fn unset(&self) -> Option<&BsonDocument> {
        (!self.unset.is_empty()).then_some(&self.unset)
    }

    /// Returns `true` if applying the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Records an assignment.
    pub fn insert_set(&mut self, path: impl Into<String>, value: impl Into<Bson>) {
        self.set.insert(path.into(), value.into());
    }

    /// Records a removal.
    pub fn insert_unset(&mut self, path: impl Into<String>) {
        self.unset.insert(path.into(), UNSET_MARKER);
    }

    /// The wire shape `{set?: {path: value}, unset?: {path: ""}}`. Empty buckets are omitted.
    pub fn to_document(&self) -> BsonDocument {
        let mut document = BsonDocument::new();

        if let Some(set) = self.set() {
            document.insert("set", set.clone());
        }
        if let Some(unset) = self.unset() {
            document.insert("unset", unset.clone());
        }

        document
    }

    /// Splits the patch into its `set` and `unset` buckets.
    pub fn into_parts(self) -> (BsonDocument, BsonDocument) {
        (self.set, self.unset)
    }
}

/// Computes the minimal patch turning `before` into `after`.
///
/// `Bson::Undefined` is treated as absent on both sides: an undefined key in `after`
/// is removed, an undefined key in `before` never produces a removal.
pub fn diff(before: &BsonDocument, after: &BsonDocument) -> Patch {
    let mut patch = Patch::new();
    diff_documents("", before, after, &mut patch);
    patch
}

fn diff_documents(prefix: &str, before: &BsonDocument, after: &BsonDocument, patch: &mut Patch) {
    for (key, value) in after {
        diff_entry(format!("{prefix}{key}"), before.get(key), Some(value), patch);
    }

    for (key, value) in before {
        if !after.contains_key(key) {
            diff_entry(format!("{prefix}{key}"), Some(value), None, patch);
        }
    }
}

fn diff_arrays(prefix: &str, before: &[Bson], after: &[Bson], patch: &mut Patch) {
    for index in 0..before.len().max(after.len()) {
        diff_entry(format!("{prefix}{index}"), before.get(index), after.get(index), patch);
    }
}

fn diff_entry(path: String, before: Option<&Bson>, after: Option<&Bson>, patch: &mut Patch) {
    match (defined(before), defined(after)) {
        (None, None) => {}
        (Some(_), None) => patch.insert_unset(path),
        (Some(Bson::Document(before)), Some(Bson::Document(after))) => {
            diff_documents(&format!("{path}."), before, after, patch)
        }
        (Some(Bson::Array(before)), Some(Bson::Array(after))) => {
            diff_arrays(&format!("{path}."), before, after, patch)
        }
        (Some(before), Some(after)) if same_value(before, after) => {}
        (_, Some(after)) => patch.insert_set(path, after.clone()),
    }
}

fn defined(value: Option<&Bson>) -> Option<&Bson> {
    value.filter(|value| !matches!(value, Bson::Undefined))
}

fn same_value(before: &Bson, after: &Bson) -> bool {
    match (before, after) {
        (Bson::Double(a), Bson::Double(b)) => a == b || (a.is_nan() && b.is_nan()),
        _ => before == after,
    }
}
