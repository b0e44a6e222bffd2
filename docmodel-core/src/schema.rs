//! Schema definition surface and compiled document types.
//!
//! A [`Schema`] is an ordered list of field names and [`TypeDescriptor`]s. Compiling
//! it through [`DocumentType::compile`] runs every descriptor through the
//! [`TypeAnalyzer`](crate::analyzer::TypeAnalyzer) once; the resulting field table is
//! shared by every document of that type.
//!
//! Schemas can be written with the builder API:
//!
//! ```ignore
//! use docmodel::schema::{DocumentType, Schema, TypeDescriptor};
//!
//! let user = DocumentType::compile(
//!     "User",
//!     Schema::new()
//!         .field("name", TypeDescriptor::String)
//!         .field("verified", TypeDescriptor::Boolean.with_default_fn(|| false.into()))
//!         .field("verified_at", TypeDescriptor::Date),
//! )?;
//! ```
//!
//! or declared as JSON, resolving named sub-document types through a [`TypeRegistry`]:
//!
//! ```ignore
//! let mut registry = TypeRegistry::new();
//! registry.register(user)?;
//!
//! let book = Schema::from_json(&json!({
//!     "author": "User",
//!     "published": { "at": "date", "by": "string" },
//!     "readers": ["User"],
//!     "reader_ids": ["string"],
//! }), &registry)?;
//! ```

use bson::{Bson, ser::serialize_to_bson};
use serde_json::{Map, Value};
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::trace;

use crate::{
    analyzer::{CoercionRule, TypeAnalyzer},
    document::ID_FIELD,
    error::{ModelError, ModelResult},
    query::OR_KEY,
};

/// Default value attached to a field: either a fixed value or a zero-argument provider
/// invoked for every new document.
#[derive(Clone)]
pub enum DefaultValue {
    /// A literal, cloned into each document.
    Value(Bson),
    /// A provider called once per document.
    Provider(Arc<dyn Fn() -> Bson + Send + Sync>),
}

impl DefaultValue {
    /// Wraps a closure as a default provider.
    pub fn provider<F>(provider: F) -> Self
    where
        F: Fn() -> Bson + Send + Sync + 'static,
    {
        DefaultValue::Provider(Arc::new(provider))
    }

    /// Produces the default for one document, invoking the provider if there is one.
    pub fn resolve(&self) -> Bson {
        match self {
            DefaultValue::Value(value) => value.clone(),
            DefaultValue::Provider(provider) => provider(),
        }
    }

    /// Returns `true` if this default is computed by a provider.
    pub fn is_provider(&self) -> bool {
        matches!(self, DefaultValue::Provider(_))
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Value(value) => f.debug_tuple("Value").field(value).finish(),
            DefaultValue::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

/// Declarative description of a field's type, default and nesting.
#[derive(Debug, Clone)]
pub enum TypeDescriptor {
    /// Boolean primitive.
    Boolean,
    /// String primitive.
    String,
    /// Numeric primitive (integers are kept, everything else becomes a double).
    Number,
    /// BSON datetime.
    Date,
    /// Homogeneous array of the inner type.
    Array(Box<TypeDescriptor>),
    /// Inline schema, compiled into an anonymous sub-document type.
    Nested(Schema),
    /// A named, already compiled sub-document type.
    Document(Arc<DocumentType>),
    /// Inner type with an explicit default.
    Annotated {
        /// The annotated type.
        inner: Box<TypeDescriptor>,
        /// Overrides the inner type's default when present.
        default: Option<DefaultValue>,
    },
}

impl TypeDescriptor {
    /// Array of `inner` values.
    pub fn array(inner: TypeDescriptor) -> Self {
        TypeDescriptor::Array(Box::new(inner))
    }

    /// Inline sub-document.
    pub fn nested(schema: Schema) -> Self {
        TypeDescriptor::Nested(schema)
    }

    /// Named sub-document type.
    pub fn document(document_type: Arc<DocumentType>) -> Self {
        TypeDescriptor::Document(document_type)
    }

    /// Annotates this descriptor with a fixed default value.
    pub fn with_default(self, value: impl Into<Bson>) -> Self {
        self.annotate(DefaultValue::Value(value.into()))
    }

    /// Annotates this descriptor with a default provider.
    pub fn with_default_fn<F>(self, provider: F) -> Self
    where
        F: Fn() -> Bson + Send + Sync + 'static,
    {
        self.annotate(DefaultValue::provider(provider))
    }

    fn annotate(self, default: DefaultValue) -> Self {
        TypeDescriptor::Annotated {
            inner: Box::new(self),
            default: Some(default),
        }
    }

    /// Parses a JSON type descriptor.
    ///
    /// Accepted shapes are the primitive tags `"boolean"`, `"string"`, `"number"` and
    /// `"date"`, a registered type name, a one-element array, an annotated object
    /// `{ "type": .., "default": .. }`, or a nested schema object.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Configuration`] for any other shape.
    pub fn from_json(value: &Value, registry: &TypeRegistry) -> ModelResult<Self> {
        match value {
            Value::String(tag) => match tag.to_ascii_lowercase().as_str() {
                "boolean" | "bool" => Ok(TypeDescriptor::Boolean),
                "string" => Ok(TypeDescriptor::String),
                "number" => Ok(TypeDescriptor::Number),
                "date" => Ok(TypeDescriptor::Date),
                _ => registry
                    .get(tag)
                    .map(TypeDescriptor::Document)
                    .ok_or_else(|| {
                        ModelError::Configuration(format!("unknown type `{tag}`"))
                    }),
            },
            Value::Array(items) => match items.as_slice() {
                [inner] => Ok(TypeDescriptor::array(Self::from_json(inner, registry)?)),
                _ => Err(ModelError::Configuration(format!(
                    "array descriptors take exactly one element type, got {}",
                    items.len()
                ))),
            },
            Value::Object(map) if map.contains_key("type") => Self::annotated_from_json(map, registry),
            Value::Object(map) => Ok(TypeDescriptor::Nested(Schema::from_json_map(map, registry)?)),
            other => Err(ModelError::Configuration(format!(
                "unsupported type descriptor `{other}`"
            ))),
        }
    }

    fn annotated_from_json(map: &Map<String, Value>, registry: &TypeRegistry) -> ModelResult<Self> {
        if let Some(key) = map.keys().find(|key| !["type", "default"].contains(&key.as_str())) {
            return Err(ModelError::Configuration(format!(
                "unexpected key `{key}` in annotated type descriptor"
            )));
        }

        let inner = match map.get("type") {
            Some(inner) => Self::from_json(inner, registry)?,
            None => return Err(ModelError::Configuration("missing `type`".into())),
        };

        Ok(TypeDescriptor::Annotated {
            inner: Box::new(inner),
            default: map
                .get("default")
                .map(serialize_to_bson)
                .transpose()?
                .map(DefaultValue::Value),
        })
    }
}

/// An ordered mapping from field names to type descriptors.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<(String, TypeDescriptor)>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Schema { fields: Vec::new() }
    }

    /// Appends a field.
    pub fn field(mut self, name: impl Into<String>, descriptor: TypeDescriptor) -> Self {
        self.fields.push((name.into(), descriptor));
        self
    }

    /// Iterates over the declared fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &TypeDescriptor)> {
        self.fields
            .iter()
            .map(|(name, descriptor)| (name.as_str(), descriptor))
    }

    /// Number of declared fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if no field is declared.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parses a JSON schema object. Field order follows the JSON object's key order.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Configuration`] if `value` is not an object or any field
    /// descriptor is malformed.
    pub fn from_json(value: &Value, registry: &TypeRegistry) -> ModelResult<Self> {
        match value {
            Value::Object(map) => Self::from_json_map(map, registry),
            other => Err(ModelError::Configuration(format!(
                "schema must be an object, got `{other}`"
            ))),
        }
    }

    fn from_json_map(map: &Map<String, Value>, registry: &TypeRegistry) -> ModelResult<Self> {
        map.iter()
            .try_fold(Schema::new(), |schema, (name, descriptor)| {
                Ok(schema.field(name.clone(), TypeDescriptor::from_json(descriptor, registry)?))
            })
    }
}

/// Named document types available to JSON schemas.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<DocumentType>>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a named document type.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Configuration`] if the type is anonymous or the name is
    /// already taken.
    pub fn register(&mut self, document_type: Arc<DocumentType>) -> ModelResult<()> {
        let name = document_type
            .name()
            .ok_or_else(|| ModelError::Configuration("cannot register an anonymous type".into()))?
            .to_string();

        if self.types.contains_key(&name) {
            return Err(ModelError::Configuration(format!("type `{name}` is already registered")));
        }

        self.types.insert(name, document_type);

        Ok(())
    }

    /// Looks up a registered type by name.
    pub fn get(&self, name: &str) -> Option<Arc<DocumentType>> {
        self.types.get(name).cloned()
    }
}

/// One compiled schema field.
#[derive(Debug, Clone)]
pub struct FieldRule {
    name: String,
    rule: CoercionRule,
}

impl FieldRule {
    /// The field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The compiled coercion rule for this field.
    pub fn rule(&self) -> &CoercionRule {
        &self.rule
    }
}

/// A compiled schema: the field table shared by every document of one type.
///
/// Two sub-document values have the same type only if they point at the same
/// `DocumentType` allocation.
#[derive(Debug)]
pub struct DocumentType {
    name: Option<String>,
    fields: Vec<FieldRule>,
    index: HashMap<String, usize>,
}

impl DocumentType {
    /// Compiles a named document type.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Configuration`] if a field name is empty, duplicated,
    /// reserved (`_id`, or `or` outside inline schemas), contains a `.` or starts with
    /// `$`, or if a descriptor is invalid.
    pub fn compile(name: impl Into<String>, schema: Schema) -> ModelResult<Arc<Self>> {
        Self::build(Some(name.into()), &schema)
    }

    pub(crate) fn anonymous(schema: &Schema) -> ModelResult<Arc<Self>> {
        Self::build(None, schema)
    }

    fn build(name: Option<String>, schema: &Schema) -> ModelResult<Arc<Self>> {
        let mut fields = Vec::with_capacity(schema.len());
        let mut index = HashMap::with_capacity(schema.len());

        for (field, descriptor) in schema.fields() {
            validate_field_name(field)?;

            // Named types can be stored at the top level, where `or` holds filter alternatives.
            if name.is_some() && field == OR_KEY {
                return Err(ModelError::Configuration(format!(
                    "`{OR_KEY}` is reserved for query alternatives"
                )));
            }

            if index.insert(field.to_string(), fields.len()).is_some() {
                return Err(ModelError::Configuration(format!("duplicate field `{field}`")));
            }

            let rule = TypeAnalyzer::analyze(descriptor).map_err(|err| match err {
                ModelError::Configuration(message) => {
                    ModelError::Configuration(format!("field `{field}`: {message}"))
                }
                other => other,
            })?;

            fields.push(FieldRule {
                name: field.to_string(),
                rule,
            });
        }

        trace!(
            document_type = name.as_deref().unwrap_or("<anonymous>"),
            fields = fields.len(),
            "compiled document type"
        );

        Ok(Arc::new(DocumentType { name, fields, index }))
    }

    /// The type name, `None` for types synthesized from inline schemas.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The compiled fields in declaration order.
    pub fn fields(&self) -> &[FieldRule] {
        &self.fields
    }

    /// Looks up a compiled field.
    pub fn field(&self, name: &str) -> Option<&FieldRule> {
        self.index
            .get(name)
            .map(|position| &self.fields[*position])
    }
}

fn validate_field_name(name: &str) -> ModelResult<()> {
    if name.is_empty() {
        Err(ModelError::Configuration("empty field name".into()))
    } else if name == ID_FIELD {
        Err(ModelError::Configuration(format!("`{ID_FIELD}` is reserved for the document id")))
    } else if name.contains('.') || name.starts_with('$') {
        Err(ModelError::Configuration(format!(
            "field `{name}` must not contain `.` or start with `$`"
        )))
    } else {
        Ok(())
    }
}
