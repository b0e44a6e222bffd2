//! Filter evaluation for in-memory document matching.
//!
//! This module provides the evaluation engine for [`Filter`] expressions over BSON
//! documents. Dotted paths descend into sub-documents, numeric segments index arrays and
//! other segments fan out over arrays of sub-documents. Equality and comparisons against
//! an array field match if any element matches.

use bson::{Bson, Document as BsonDocument, datetime::DateTime, oid::ObjectId};
use std::{cmp::Ordering, collections::HashMap};

use docmodel_core::{
    error::{ModelError, ModelResult},
    query::{Filter, FilterVisitor, Predicate},
};

/// Type-erased, comparable representation of BSON values.
///
/// Numbers are normalized to `f64` so that `Int32(1)`, `Int64(1)` and `Double(1.0)`
/// compare equal. Types without a natural order fall back to BSON equality.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(f64::from(*value)),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(items) => Comparable::Array(items.iter().map(Comparable::from).collect()),
            Bson::Document(document) => Comparable::Map(
                document
                    .iter()
                    .map(|(key, value)| (key.as_str(), Comparable::from(value)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Collects every value reachable from `value` through the dotted `segments`.
fn resolve<'a>(value: &'a Bson, segments: &[&str], found: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = segments.split_first() else {
        found.push(value);
        return;
    };

    match value {
        Bson::Document(document) => {
            if let Some(child) = document.get(*head) {
                resolve(child, rest, found);
            }
        }
        Bson::Array(items) => {
            if let Some(child) = head.parse::<usize>().ok().and_then(|index| items.get(index)) {
                resolve(child, rest, found);
            }
            for item in items.iter().filter(|item| matches!(item, Bson::Document(_))) {
                resolve(item, segments, found);
            }
        }
        _ => {}
    }
}

/// Resolved values plus, for array values, each of their elements.
fn expand<'a>(values: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut expanded = Vec::with_capacity(values.len());

    for value in values {
        expanded.push(*value);
        if let Bson::Array(items) = value {
            expanded.extend(items.iter());
        }
    }

    expanded
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Bson,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Bson) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, filter: &Filter) -> ModelResult<bool> {
        self.visit_filter(filter)
    }

    /// Returns `true` if `document` matches `filter`.
    pub fn matches(document: &BsonDocument, filter: &Filter) -> ModelResult<bool> {
        let document = Bson::Document(document.clone());
        DocumentEvaluator::new(&document).evaluate(filter)
    }

    fn values(&self, path: &str) -> Vec<&'a Bson> {
        let segments = path.split('.').collect::<Vec<_>>();
        let mut found = Vec::new();

        resolve(self.document, &segments, &mut found);
        found.retain(|value| !matches!(value, Bson::Undefined));
        found
    }

    fn equals(values: &[&Bson], target: &Bson) -> bool {
        if values.is_empty() {
            return matches!(target, Bson::Null);
        }

        let target = Comparable::from(target);
        expand(values)
            .into_iter()
            .any(|value| Comparable::from(value) == target)
    }

    fn compare(values: &[&Bson], target: &Bson, accept: fn(Ordering) -> bool) -> bool {
        let target = Comparable::from(target);

        expand(values).into_iter().any(|value| {
            Comparable::from(value)
                .partial_cmp(&target)
                .is_some_and(accept)
        })
    }

    fn elem_match(values: &[&Bson], filter: &Filter) -> ModelResult<bool> {
        for value in values {
            let Bson::Array(items) = value else {
                continue;
            };

            for item in items.iter().filter(|item| matches!(item, Bson::Document(_))) {
                if DocumentEvaluator::new(item).evaluate(filter)? {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }
}

impl FilterVisitor for DocumentEvaluator<'_> {
    type Output = bool;
    type Error = ModelError;

    fn visit_predicate(&mut self, path: &str, predicate: &Predicate) -> Result<bool, ModelError> {
        let values = self.values(path);

        Ok(match predicate {
            Predicate::Eq(target) => Self::equals(&values, target),
            Predicate::Ne(target) => !Self::equals(&values, target),
            Predicate::Exists(exists) => values.is_empty() != *exists,
            Predicate::In(targets) => targets.iter().any(|target| Self::equals(&values, target)),
            Predicate::Nin(targets) => !targets.iter().any(|target| Self::equals(&values, target)),
            Predicate::Gt(target) => Self::compare(&values, target, Ordering::is_gt),
            Predicate::Gte(target) => Self::compare(&values, target, Ordering::is_ge),
            Predicate::Lt(target) => Self::compare(&values, target, Ordering::is_lt),
            Predicate::Lte(target) => Self::compare(&values, target, Ordering::is_le),
            Predicate::ElemMatch(filter) => Self::elem_match(&values, filter)?,
        })
    }

    fn visit_or(&mut self, filters: &[Filter]) -> Result<bool, ModelError> {
        for filter in filters {
            if self.visit_filter(filter)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_and(&mut self, parts: Vec<bool>) -> Result<bool, ModelError> {
        Ok(parts.into_iter().all(|part| part))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmodel_core::query::{FilterBuilder, Predicates};

    fn matches(document: BsonDocument, build: impl FnOnce(FilterBuilder) -> FilterBuilder) -> bool {
        let filter = build(FilterBuilder::new()).build().unwrap();
        DocumentEvaluator::matches(&document, &filter).unwrap()
    }

    fn post() -> BsonDocument {
        doc! {
            "title": "hello",
            "views": 10,
            "tags": ["a", "b"],
            "author": { "name": "ann", "age": 30 },
            "readers": [{ "name": "bob", "age": 3 }, { "name": "cid", "age": 40 }],
        }
    }

    #[test]
    fn equality_normalizes_numbers_and_matches_array_elements() {
        assert!(matches(post(), |q| q.field("views").equals(10.0)));
        assert!(matches(post(), |q| q.field("tags").equals("b")));
        assert!(matches(post(), |q| q.field("author.name").equals("ann")));
        assert!(!matches(post(), |q| q.field("author.name").equals("bob")));
        assert!(matches(post(), |q| q.field("missing").equals(Bson::Null)));
    }

    #[test]
    fn comparisons_share_one_path() {
        assert!(matches(post(), |q| q.field("views").gt(5).lt(20)));
        assert!(!matches(post(), |q| q.field("views").gt(5).lt(10)));
        assert!(matches(post(), |q| q.field("views").gte(10).lte(10)));
        assert!(!matches(post(), |q| q.field("title").gt(3)));
    }

    #[test]
    fn paths_index_and_fan_out_over_arrays() {
        assert!(matches(post(), |q| q.field("readers.0").exists(true)));
        assert!(!matches(post(), |q| q.field("readers.5").exists(true)));
        assert!(matches(post(), |q| q.field("readers.name").equals("cid")));
        assert!(matches(post(), |q| q.field("readers.1.age").gt(30)));
        assert!(matches(doc! { "readers": [] }, |q| q.field("readers.0").exists(false)));
    }

    #[test]
    fn membership() {
        assert!(matches(post(), |q| q.field("title").in_array(["x", "hello"])));
        assert!(!matches(post(), |q| q.field("title").not_in_array(["x", "hello"])));
        assert!(matches(post(), |q| q.field("tags").not_in_array(["z"])));
        assert!(matches(post(), |q| q.field("author.name").ne("bob")));
    }

    #[test]
    fn elem_match_requires_one_element_to_satisfy_everything() {
        assert!(matches(post(), |q| q
            .field("readers")
            .elem_match(|r| r.field("name").equals("cid").field("age").gt(30))));
        assert!(!matches(post(), |q| q
            .field("readers")
            .elem_match(|r| r.field("name").equals("bob").field("age").gt(30))));
    }

    #[test]
    fn or_needs_one_alternative() {
        assert!(matches(post(), |q| q
            .field("views")
            .equals(10)
            .or(|b| [b().field("title").equals("nope"), b().field("tags").equals("a")])));
        assert!(!matches(post(), |q| q.or(|b| [b().field("title").equals("nope")])));
        assert!(matches(post(), |q| q));
    }
}
