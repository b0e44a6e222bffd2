//! Fluent query construction and filter expressions.
//!
//! Predicate calls accumulate into a [`Filter`]: an ordered map from dotted field path to
//! an operator map, plus an optional list of alternatives under the `or` key. A path is
//! focused with [`Predicates::field`]; every following predicate lands under that path.
//!
//! # Query Building
//!
//! ```ignore
//! use docmodel::query::{Predicates, QueryBuilder};
//!
//! let rows = QueryBuilder::new(&collection)
//!     .field("age")
//!     .gt(18)
//!     .lt(65)
//!     .field("readers")
//!     .elem_match(|q| q.field("name").equals("ann"))
//!     .or(|q| [q().field("role").equals("admin"), q().field("owner").exists(true)])
//!     .await?;
//! ```
//!
//! The example above builds the filter
//! `{age: {gt: 18, lt: 65}, readers: {elemMatch: {name: {eq: "ann"}}}, or: [..]}`.
//!
//! # Operators
//!
//! - Equality: `equals` (`eq`), `ne`
//! - Comparison: `gt`, `gte`, `lt`, `lte`
//! - Existence: `exists`
//! - Membership: `in_array` (`in`), `not_in_array` (`nin`)
//! - Arrays: `elem_match`
//! - Logical: `or`
//!
//! Backends interpret a [`Filter`] through a [`FilterVisitor`].

use bson::{Bson, Document as BsonDocument};
use futures::future::BoxFuture;
use std::{convert::Infallible, future::IntoFuture};
use tracing::debug;

use crate::{
    backend::{CollectionService, DeleteAck},
    document::ID_FIELD,
    error::{ModelError, ModelResult},
};

/// Key holding the alternatives of a [`Filter`] in its wire shape.
pub const OR_KEY: &str = "or";

/// A single operator applied to a field path.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Equal to.
    Eq(Bson),
    /// Field is present (`true`) or absent (`false`).
    Exists(bool),
    /// Value is one of the listed values.
    In(Vec<Bson>),
    /// Value is none of the listed values.
    Nin(Vec<Bson>),
    /// Greater than.
    Gt(Bson),
    /// Greater than or equal to.
    Gte(Bson),
    /// Less than.
    Lt(Bson),
    /// Less than or equal to.
    Lte(Bson),
    /// Not equal to.
    Ne(Bson),
    /// At least one array element matches the nested filter.
    ElemMatch(Filter),
}

impl Predicate {
    /// The operator name used in the wire shape.
    pub fn operator(&self) -> &'static str {
        match self {
            Predicate::Eq(_) => "eq",
            Predicate::Exists(_) => "exists",
            Predicate::In(_) => "in",
            Predicate::Nin(_) => "nin",
            Predicate::Gt(_) => "gt",
            Predicate::Gte(_) => "gte",
            Predicate::Lt(_) => "lt",
            Predicate::Lte(_) => "lte",
            Predicate::Ne(_) => "ne",
            Predicate::ElemMatch(_) => "elemMatch",
        }
    }
}

/// The operator map of one field path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    predicates: Vec<Predicate>,
}

impl Condition {
    /// Predicates in insertion order.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Adds `predicate`, replacing an existing predicate with the same operator.
    pub fn merge(&mut self, predicate: Predicate) {
        match self
            .predicates
            .iter_mut()
            .find(|existing| existing.operator() == predicate.operator())
        {
            Some(existing) => *existing = predicate,
            None => self.predicates.push(predicate),
        }
    }
}

/// A structured filter expression.
///
/// All conditions must hold; when alternatives are present at least one of them must
/// hold as well. An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Condition)>,
    or: Option<Vec<Filter>>,
}

impl Filter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches the document whose `_id` equals `id`.
    pub fn by_id(id: impl Into<Bson>) -> Self {
        let mut filter = Self::new();
        filter.insert(ID_FIELD, Predicate::Eq(id.into()));
        filter
    }

    /// Merges `predicate` into the operator map of `path`.
    pub fn insert(&mut self, path: impl Into<String>, predicate: Predicate) {
        let path = path.into();

        match self.conditions.iter_mut().find(|(existing, _)| *existing == path) {
            Some((_, condition)) => condition.merge(predicate),
            None => {
                let mut condition = Condition::default();
                condition.merge(predicate);
                self.conditions.push((path, condition));
            }
        }
    }

    /// Per-path conditions in insertion order.
    pub fn conditions(&self) -> &[(String, Condition)] {
        &self.conditions
    }

    /// The condition on `path`, if any.
    pub fn condition(&self, path: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|(existing, _)| existing == path)
            .map(|(_, condition)| condition)
    }

    /// Alternatives stored under the `or` key.
    pub fn or(&self) -> Option<&[Filter]> {
        self.or.as_deref()
    }

    /// Returns `true` if the filter has no conditions and no alternatives.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.or.is_none()
    }

    /// The wire shape `{path: {op: value}, or?: [filter, ...]}`.
    pub fn to_document(&self) -> BsonDocument {
        match FilterWriter::plain().visit_filter(self) {
            Ok(document) => document,
            Err(never) => match never {},
        }
    }
}

/// Accumulates predicates into a [`Filter`].
///
/// Used directly for sub-queries (`elem_match`, `or`) and embedded in [`QueryBuilder`].
#[derive(Debug, Clone, Default)]
pub struct FilterBuilder {
    filter: Filter,
    path: Option<String>,
    error: Option<String>,
}

impl FilterBuilder {
    /// Creates a builder with no focused path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder focused on `path`.
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Returns the accumulated filter.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Query`] if a predicate was added without a focused path,
    /// here or in any sub-query.
    pub fn build(self) -> ModelResult<Filter> {
        match self.error {
            Some(message) => Err(ModelError::Query(message)),
            None => Ok(self.filter),
        }
    }

    fn push(&mut self, predicate: Predicate) {
        match &self.path {
            Some(path) => self.filter.insert(path.clone(), predicate),
            None => self.record_error(format!(
                "`{}` predicate has no field; call `field(path)` first",
                predicate.operator()
            )),
        }
    }

    fn record_error(&mut self, message: String) {
        self.error.get_or_insert(message);
    }
}

/// The fluent predicate vocabulary.
///
/// Implementors only expose their [`FilterBuilder`]; every predicate is provided. Custom
/// query scopes are extension traits over implementors of this trait.
pub trait Predicates: Sized {
    /// The builder predicates accumulate into.
    fn filter_builder(&mut self) -> &mut FilterBuilder;

    /// Focuses `path` (dot notation). Following predicates apply to it.
    fn field(mut self, path: impl Into<String>) -> Self {
        self.filter_builder().path = Some(path.into());
        self
    }

    /// Merges `predicate` into the focused path's operator map.
    fn predicate(mut self, predicate: Predicate) -> Self {
        self.filter_builder().push(predicate);
        self
    }

    /// Focused value equals `value`.
    ///
    /// `value` is always an equality operand, documents included: `equals(doc! { "gt": 1 })`
    /// matches the literal document. Pass raw operators through
    /// [`predicate`](Self::predicate), e.g. `predicate(Predicate::Gt(1.into()))`.
    fn equals(self, value: impl Into<Bson>) -> Self {
        self.predicate(Predicate::Eq(value.into()))
    }

    /// Focused field is present (`true`) or absent (`false`).
    fn exists(self, exists: bool) -> Self {
        self.predicate(Predicate::Exists(exists))
    }

    /// Focused value is one of `values`.
    fn in_array<V: Into<Bson>>(self, values: impl IntoIterator<Item = V>) -> Self {
        self.predicate(Predicate::In(values.into_iter().map(Into::into).collect()))
    }

    /// Focused value is none of `values`.
    fn not_in_array<V: Into<Bson>>(self, values: impl IntoIterator<Item = V>) -> Self {
        self.predicate(Predicate::Nin(values.into_iter().map(Into::into).collect()))
    }

    /// Focused value is greater than `value`.
    fn gt(self, value: impl Into<Bson>) -> Self {
        self.predicate(Predicate::Gt(value.into()))
    }

    /// Focused value is greater than or equal to `value`.
    fn gte(self, value: impl Into<Bson>) -> Self {
        self.predicate(Predicate::Gte(value.into()))
    }

    /// Focused value is less than `value`.
    fn lt(self, value: impl Into<Bson>) -> Self {
        self.predicate(Predicate::Lt(value.into()))
    }

    /// Focused value is less than or equal to `value`.
    fn lte(self, value: impl Into<Bson>) -> Self {
        self.predicate(Predicate::Lte(value.into()))
    }

    /// Focused value is not equal to `value`.
    fn ne(self, value: impl Into<Bson>) -> Self {
        self.predicate(Predicate::Ne(value.into()))
    }

    /// Some element of the focused array matches the sub-query built by `build`.
    ///
    /// `build` receives a fresh builder with no focused path.
    fn elem_match(mut self, build: impl FnOnce(FilterBuilder) -> FilterBuilder) -> Self {
        match build(FilterBuilder::new()).build() {
            Ok(filter) => self.predicate(Predicate::ElemMatch(filter)),
            Err(err) => {
                self.filter_builder().record_error(format!("in elemMatch: {err}"));
                self
            }
        }
    }

    /// At least one of the sub-queries returned by `build` matches.
    ///
    /// `build` receives a factory for fresh builders. Replaces any previous alternatives.
    fn or<I>(mut self, build: impl FnOnce(fn() -> FilterBuilder) -> I) -> Self
    where
        I: IntoIterator<Item = FilterBuilder>,
    {
        let alternatives = build(FilterBuilder::new)
            .into_iter()
            .map(FilterBuilder::build)
            .collect::<ModelResult<Vec<_>>>();

        let builder = self.filter_builder();
        match alternatives {
            Ok(alternatives) => builder.filter.or = Some(alternatives),
            Err(err) => builder.record_error(format!("in or: {err}")),
        }

        self
    }
}

impl Predicates for FilterBuilder {
    fn filter_builder(&mut self) -> &mut FilterBuilder {
        self
    }
}

/// A fluent query bound to a collection service. Returns raw rows.
///
/// Awaiting the builder directly is the same as calling [`QueryBuilder::find`].
#[derive(Debug)]
pub struct QueryBuilder<'a, C: CollectionService + ?Sized> {
    collection: &'a C,
    builder: FilterBuilder,
}

impl<'a, C: CollectionService + ?Sized> QueryBuilder<'a, C> {
    /// Creates a query with no focused path and an empty filter.
    pub fn new(collection: &'a C) -> Self {
        Self {
            collection,
            builder: FilterBuilder::new(),
        }
    }

    /// Creates a query focused on `path`.
    pub fn at(collection: &'a C, path: impl Into<String>) -> Self {
        Self {
            collection,
            builder: FilterBuilder::at(path),
        }
    }

    /// The accumulated filter.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Query`] if the query was assembled incorrectly.
    pub fn filter(&self) -> ModelResult<Filter> {
        self.builder.clone().build()
    }

    /// Fetches every matching row.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Query`] for a malformed query, or the collection's error.
    pub async fn find(self) -> ModelResult<Vec<BsonDocument>> {
        let filter = self.builder.build()?;
        debug!(collection = self.collection.name(), filter = %filter.to_document(), "find");

        self.collection.find(filter).await
    }

    /// Fetches the first matching row, or `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Query`] for a malformed query, or the collection's error.
    pub async fn find_one(self) -> ModelResult<Option<BsonDocument>> {
        let filter = self.builder.build()?;
        debug!(collection = self.collection.name(), filter = %filter.to_document(), "find_one");

        self.collection.find_one(filter).await
    }

    /// Deletes every row matching the accumulated filter.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Query`] for a malformed query, or the collection's error.
    pub async fn remove(self) -> ModelResult<DeleteAck> {
        let filter = self.builder.build()?;
        debug!(collection = self.collection.name(), filter = %filter.to_document(), "remove");

        self.collection.delete_many(filter).await
    }
}

impl<C: CollectionService + ?Sized> Predicates for QueryBuilder<'_, C> {
    fn filter_builder(&mut self) -> &mut FilterBuilder {
        &mut self.builder
    }
}

impl<'a, C: CollectionService + ?Sized> IntoFuture for QueryBuilder<'a, C> {
    type Output = ModelResult<Vec<BsonDocument>>;
    type IntoFuture = BoxFuture<'a, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.find())
    }
}

/// Interprets a [`Filter`].
///
/// `visit_filter` walks every predicate in order, then the alternatives, and combines the
/// results with `visit_and`.
pub trait FilterVisitor {
    type Output;
    type Error: Into<ModelError>;

    fn visit_predicate(&mut self, path: &str, predicate: &Predicate) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, filters: &[Filter]) -> Result<Self::Output, Self::Error>;
    fn visit_and(&mut self, parts: Vec<Self::Output>) -> Result<Self::Output, Self::Error>;

    fn visit_filter(&mut self, filter: &Filter) -> Result<Self::Output, Self::Error> {
        let mut parts = Vec::new();

        for (path, condition) in filter.conditions() {
            for predicate in condition.predicates() {
                parts.push(self.visit_predicate(path, predicate)?);
            }
        }
        if let Some(alternatives) = filter.or() {
            parts.push(self.visit_or(alternatives)?);
        }

        self.visit_and(parts)
    }
}

/// Renders a [`Filter`] as a BSON document, prefixing every operator key.
///
/// [`FilterWriter::plain`] produces the wire shape; a `"$"` prefix produces MongoDB
/// query operators.
#[derive(Debug, Clone)]
pub struct FilterWriter {
    prefix: &'static str,
}

impl FilterWriter {
    /// A writer prefixing operators with `prefix`.
    pub fn new(prefix: &'static str) -> Self {
        Self { prefix }
    }

    /// A writer emitting bare operator names.
    pub fn plain() -> Self {
        Self::new("")
    }

    fn key(&self, operator: &str) -> String {
        format!("{}{operator}", self.prefix)
    }
}

impl FilterVisitor for FilterWriter {
    type Output = BsonDocument;
    type Error = Infallible;

    fn visit_predicate(&mut self, path: &str, predicate: &Predicate) -> Result<BsonDocument, Infallible> {
        let operand = match predicate {
            Predicate::Eq(value)
            | Predicate::Gt(value)
            | Predicate::Gte(value)
            | Predicate::Lt(value)
            | Predicate::Lte(value)
            | Predicate::Ne(value) => value.clone(),
            Predicate::Exists(exists) => Bson::Boolean(*exists),
            Predicate::In(values) | Predicate::Nin(values) => Bson::Array(values.clone()),
            Predicate::ElemMatch(filter) => Bson::Document(self.visit_filter(filter)?),
        };

        let mut operators = BsonDocument::new();
        operators.insert(self.key(predicate.operator()), operand);

        let mut document = BsonDocument::new();
        document.insert(path, operators);
        Ok(document)
    }

    fn visit_or(&mut self, filters: &[Filter]) -> Result<BsonDocument, Infallible> {
        let alternatives = filters
            .iter()
            .map(|filter| self.visit_filter(filter).map(Bson::Document))
            .collect::<Result<Vec<_>, _>>()?;

        let mut document = BsonDocument::new();
        document.insert(self.key(OR_KEY), alternatives);
        Ok(document)
    }

    fn visit_and(&mut self, parts: Vec<BsonDocument>) -> Result<BsonDocument, Infallible> {
        let mut document = BsonDocument::new();

        for part in parts {
            for (key, value) in part {
                if let (Some(Bson::Document(existing)), Bson::Document(operators)) =
                    (document.get_mut(&key), &value)
                {
                    for (operator, operand) in operators {
                        existing.insert(operator.clone(), operand.clone());
                    }
                    continue;
                }

                document.insert(key, value);
            }
        }

        Ok(document)
    }
}
