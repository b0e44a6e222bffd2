//! Typed document instances and their change tracking.
//!
//! A [`Document`] is an instance of a compiled [`DocumentType`]. It keeps two views:
//!
//! - the current field values, coerced through the type's rules on every assignment;
//! - `previous`, the last persisted plain shape (the raw construction input until the
//!   first save).
//!
//! [`Document::save`] diffs the two views and sends the smallest patch to a
//! [`CollectionService`], or inserts the full document when it has no `_id` yet.
//! Sub-documents ([`SubDocument`]) share the field accessors through [`FieldAccess`]
//! but carry no identity and no change tracking of their own.
//!
//! ```ignore
//! use bson::doc;
//! use docmodel::prelude::*;
//!
//! let mut user = Document::new(user_type, doc! { "name": 123 });
//! assert_eq!(user.get_str("name"), Some("123"));
//!
//! user.set("verified", true)?;
//! user.save(&collection).await?;
//! ```

use bson::{
    Bson, DateTime, Document as BsonDocument, de::deserialize_from_bson, oid::ObjectId,
    ser::serialize_to_bson,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

use crate::{
    analyzer::{Coercion, CoercionRule},
    backend::CollectionService,
    diff::{Patch, diff},
    error::{ModelError, ModelResult},
    query::Filter,
    schema::{DefaultValue, DocumentType},
};

/// The identity field of top-level documents.
pub const ID_FIELD: &str = "_id";

/// A coerced field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A primitive (or untyped) BSON value.
    Scalar(Bson),
    /// An array whose elements were coerced individually.
    Array(Vec<FieldValue>),
    /// A typed sub-document.
    Document(SubDocument),
}

impl FieldValue {
    /// Returns `true` for `null` and `undefined`, which bypass coercion.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Scalar(Bson::Null | Bson::Undefined))
    }

    /// Serializes the value to plain BSON.
    pub fn to_bson(&self) -> Bson {
        match self {
            FieldValue::Scalar(value) => value.clone(),
            FieldValue::Array(items) => Bson::Array(items.iter().map(FieldValue::to_bson).collect()),
            FieldValue::Document(sub) => Bson::Document(sub.to_plain_data()),
        }
    }

    pub fn as_bson(&self) -> Option<&Bson> {
        match self {
            FieldValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&SubDocument> {
        match self {
            FieldValue::Document(sub) => Some(sub),
            _ => None,
        }
    }

    pub fn as_document_mut(&mut self) -> Option<&mut SubDocument> {
        match self {
            FieldValue::Document(sub) => Some(sub),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<FieldValue>> {
        match self {
            FieldValue::Array(items) => Some(items),
            _ => None,
        }
    }
}

macro_rules! scalar_field_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::Scalar(value.into())
                }
            }
        )*
    };
}

scalar_field_value!(
    Bson,
    &str,
    String,
    bool,
    i32,
    i64,
    f64,
    DateTime,
    chrono::DateTime<chrono::Utc>,
    ObjectId,
    BsonDocument,
    Vec<Bson>,
);

impl From<SubDocument> for FieldValue {
    fn from(value: SubDocument) -> Self {
        FieldValue::Document(value)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(value: Vec<FieldValue>) -> Self {
        FieldValue::Array(value)
    }
}

/// Rule-driven field accessors shared by [`Document`] and [`SubDocument`].
///
/// Reads return the coerced value; writes coerce through the declared field rule.
pub trait FieldAccess {
    /// The backing field storage.
    fn fields(&self) -> &SubDocument;

    /// The backing field storage, mutably.
    fn fields_mut(&mut self) -> &mut SubDocument;

    /// The compiled type of this instance.
    fn document_type(&self) -> &Arc<DocumentType> {
        &self.fields().document_type
    }

    /// The current value of `name`, or `None` if it is unset or undeclared.
    fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields().values.get(name)
    }

    /// Assigns `value` to `name` through the field's coercion rule.
    ///
    /// Assigning `Bson::Undefined` removes the field; `Bson::Null` is stored as is.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownField`] if the type does not declare `name`, or
    /// [`ModelError::CoercionMismatch`] if the value cannot be converted.
    fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> ModelResult<()> {
        let value = value.into();
        let fields = self.fields_mut();
        let rule = fields.rule(name)?;

        if matches!(value, FieldValue::Scalar(Bson::Undefined)) {
            fields.values.remove(name);
            return Ok(());
        }

        let coerced = rule.coerce(value)?;
        fields.values.insert(name.to_string(), coerced);
        Ok(())
    }

    /// Removes `name`. The next save unsets it.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownField`] if the type does not declare `name`.
    fn unset(&mut self, name: &str) -> ModelResult<()> {
        self.set(name, Bson::Undefined)
    }

    /// Appends `value` to the array field `name`, coercing it through the element rule.
    ///
    /// An unset or `null` array is started fresh.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownField`] for undeclared fields, and
    /// [`ModelError::CoercionMismatch`] if `name` is not an array field or the element
    /// cannot be converted.
    fn push(&mut self, name: &str, value: impl Into<FieldValue>) -> ModelResult<()> {
        let fields = self.fields_mut();
        let rule = fields.rule(name)?;
        let Coercion::Array(element) = rule.coercion() else {
            return Err(ModelError::CoercionMismatch {
                expected: "array",
                found: format!("field `{name}`"),
            });
        };

        let element = element.coerce(value.into())?;
        let slot = fields
            .values
            .entry(name.to_string())
            .or_insert_with(|| FieldValue::Array(Vec::new()));
        if slot.is_null() {
            *slot = FieldValue::Array(Vec::new());
        }

        match slot.as_array_mut() {
            Some(items) => {
                items.push(element);
                Ok(())
            }
            None => Err(ModelError::mismatch("array", &*slot)),
        }
    }

    fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name)?.as_bson()?.as_str()
    }

    fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name)?.as_bson()?.as_bool()
    }

    /// Reads any numeric representation as `f64`.
    fn get_f64(&self, name: &str) -> Option<f64> {
        match self.get(name)?.as_bson()? {
            Bson::Int32(n) => Some(f64::from(*n)),
            Bson::Int64(n) => Some(*n as f64),
            Bson::Double(n) => Some(*n),
            _ => None,
        }
    }

    fn get_datetime(&self, name: &str) -> Option<DateTime> {
        self.get(name)?.as_bson()?.as_datetime().copied()
    }

    fn get_document(&self, name: &str) -> Option<&SubDocument> {
        self.get(name)?.as_document()
    }

    fn get_document_mut(&mut self, name: &str) -> Option<&mut SubDocument> {
        self.fields_mut().values.get_mut(name)?.as_document_mut()
    }

    fn get_array(&self, name: &str) -> Option<&[FieldValue]> {
        self.get(name)?.as_array()
    }

    fn get_array_mut(&mut self, name: &str) -> Option<&mut Vec<FieldValue>> {
        self.fields_mut().values.get_mut(name)?.as_array_mut()
    }
}

/// An embedded document of a compiled type. No identity, no change tracking.
#[derive(Debug, Clone)]
pub struct SubDocument {
    document_type: Arc<DocumentType>,
    values: HashMap<String, FieldValue>,
}

impl SubDocument {
    /// Builds an instance from raw data.
    ///
    /// Declared fields that are missing (or `undefined`) take their default; unknown
    /// fields are dropped. A value the field rule cannot convert is kept as given.
    pub fn new(document_type: Arc<DocumentType>, raw: BsonDocument) -> Self {
        Self::from_raw(document_type, &raw)
    }

    fn from_raw(document_type: Arc<DocumentType>, raw: &BsonDocument) -> Self {
        let mut values = HashMap::with_capacity(document_type.fields().len());

        for field in document_type.fields() {
            let value = match raw.get(field.name()) {
                None | Some(Bson::Undefined) => {
                    field.rule().default_value().map(DefaultValue::resolve)
                }
                Some(value) => Some(value.clone()),
            };

            let Some(value) = value else {
                continue;
            };

            let value = match field.rule().coerce(value.clone()) {
                Ok(coerced) => coerced,
                Err(err) => {
                    debug!(field = field.name(), error = %err, "keeping uncoercible value as is");
                    FieldValue::Scalar(value)
                }
            };
            values.insert(field.name().to_string(), value);
        }

        Self {
            document_type,
            values,
        }
    }

    /// Serializes the declared fields, in declaration order. Unset fields are omitted.
    pub fn to_plain_data(&self) -> BsonDocument {
        let mut document = BsonDocument::new();

        for field in self.document_type.fields() {
            if let Some(value) = self.values.get(field.name()) {
                document.insert(field.name(), value.to_bson());
            }
        }

        document
    }

    fn rule(&self, name: &str) -> ModelResult<CoercionRule> {
        self.document_type
            .field(name)
            .map(|field| field.rule().clone())
            .ok_or_else(|| ModelError::UnknownField(name.to_string()))
    }
}

impl PartialEq for SubDocument {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.document_type, &other.document_type) && self.values == other.values
    }
}

impl FieldAccess for SubDocument {
    fn fields(&self) -> &SubDocument {
        self
    }

    fn fields_mut(&mut self) -> &mut SubDocument {
        self
    }
}

/// A top-level document: typed fields, an optional `_id` and the last persisted snapshot.
#[derive(Debug, Clone)]
pub struct Document {
    body: SubDocument,
    id: Option<Bson>,
    previous: BsonDocument,
}

impl Document {
    /// Builds a document from raw data.
    ///
    /// Declared fields and `_id` are copied; everything else is dropped. Coercion is best
    /// effort: a stored value the field rule rejects is kept as given, so rows written
    /// before a schema change still load. `previous` is the raw input as given.
    pub fn new(document_type: Arc<DocumentType>, raw: BsonDocument) -> Self {
        let body = SubDocument::from_raw(document_type, &raw);
        let id = raw
            .get(ID_FIELD)
            .filter(|id| !matches!(id, Bson::Null | Bson::Undefined))
            .cloned();

        Self {
            body,
            id,
            previous: raw,
        }
    }

    /// Builds a document from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Serialization`] if `value` is not an object.
    pub fn from_json(document_type: Arc<DocumentType>, value: &Value) -> ModelResult<Self> {
        Self::from_serializable(document_type, value)
    }

    /// Builds a document from any value serializing to a BSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Serialization`] if `value` does not serialize to a document.
    pub fn from_serializable<T>(document_type: Arc<DocumentType>, value: &T) -> ModelResult<Self>
    where
        T: Serialize + ?Sized,
    {
        match serialize_to_bson(value)? {
            Bson::Document(raw) => Ok(Self::new(document_type, raw)),
            other => Err(ModelError::Serialization(format!(
                "expected a document, found {:?}",
                other.element_type()
            ))),
        }
    }

    /// The document identity (`_id`), if assigned.
    pub fn id(&self) -> Option<&Bson> {
        self.id.as_ref()
    }

    /// Assigns the document identity. The next save becomes an update.
    pub fn set_id(&mut self, id: impl Into<Bson>) {
        self.id = Some(id.into());
    }

    /// Returns `true` until the document has an identity.
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    /// The last persisted plain shape.
    pub fn previous(&self) -> &BsonDocument {
        &self.previous
    }

    /// Serializes `_id` followed by the declared fields.
    pub fn to_plain_data(&self) -> BsonDocument {
        let mut document = BsonDocument::new();

        if let Some(id) = &self.id {
            document.insert(ID_FIELD, id.clone());
        }
        for (key, value) in self.body.to_plain_data() {
            document.insert(key, value);
        }

        document
    }

    /// The patch the next save would send for a persisted document.
    pub fn pending_changes(&self) -> Patch {
        diff(&self.previous, &self.to_plain_data())
    }

    /// Serializes the document to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Serialization`] if a value has no JSON representation.
    pub fn to_json(&self) -> ModelResult<Value> {
        Ok(serde_json::to_value(self.to_plain_data())?)
    }

    /// Deserializes the document into a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Serialization`] if the plain data does not fit `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> ModelResult<T> {
        Ok(deserialize_from_bson(Bson::Document(self.to_plain_data()))?)
    }

    /// Persists the document with exactly one collection call.
    ///
    /// With an `_id`, the diff against `previous` is sent through `update_one`; without
    /// one, the full document is inserted and the assigned identity adopted. `previous`
    /// is replaced only after the collection acknowledged the write. An update that
    /// matches no stored document is not an error; it is logged at debug level.
    ///
    /// # Errors
    ///
    /// Returns the collection's error unchanged; the document is left as it was.
    pub async fn save<C>(&mut self, collection: &C) -> ModelResult<()>
    where
        C: CollectionService + ?Sized,
    {
        let current = self.to_plain_data();

        match self.id.clone() {
            Some(id) => {
                let patch = diff(&self.previous, &current);
                debug!(
                    collection = collection.name(),
                    id = %id,
                    patch = %patch.to_document(),
                    "updating document"
                );

                let ack = collection.update_one(Filter::by_id(id.clone()), patch).await?;
                if ack.matched == 0 {
                    debug!(
                        collection = collection.name(),
                        id = %id,
                        "update matched no stored document"
                    );
                }
                self.previous = current;
            }
            None => {
                debug!(collection = collection.name(), "inserting document");

                let ack = collection.insert_one(current).await?;
                self.id = Some(ack.inserted_id);
                self.previous = self.to_plain_data();
            }
        }

        Ok(())
    }
}

impl FieldAccess for Document {
    fn fields(&self) -> &SubDocument {
        &self.body
    }

    fn fields_mut(&mut self) -> &mut SubDocument {
        &mut self.body
    }
}
