//! Compiles type descriptors into coercion rules.
//!
//! [`TypeAnalyzer::analyze`] turns a [`TypeDescriptor`] into a [`CoercionRule`]: a
//! [`Coercion`] that normalizes raw values into the declared type plus an optional
//! [`DefaultValue`]. Coercion is idempotent; an already normalized value passes
//! through unchanged. `null` values are never coerced.

use bson::{Bson, DateTime, Document as BsonDocument};
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;

use crate::{
    document::{FieldAccess, FieldValue, SubDocument},
    error::{ModelError, ModelResult},
    schema::{DefaultValue, DocumentType, TypeDescriptor},
};

/// Normalizer for one declared type, resolved once at schema compilation.
#[derive(Debug, Clone)]
pub enum Coercion {
    /// Converts to `Bson::Boolean`.
    Boolean,
    /// Converts to `Bson::String`.
    String,
    /// Converts to a BSON number.
    Number,
    /// Converts to `Bson::DateTime`.
    Date,
    /// Maps every element through the inner coercion.
    Array(Box<Coercion>),
    /// Wraps raw documents into sub-documents of the given type.
    Document(Arc<DocumentType>),
}

impl Coercion {
    /// Normalizes `value` into this type.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::CoercionMismatch`] if the value cannot be meaningfully converted.
    pub fn coerce(&self, value: FieldValue) -> ModelResult<FieldValue> {
        if value.is_null() {
            return Ok(value);
        }

        match self {
            Coercion::Boolean => coerce_scalar(value, "boolean", coerce_boolean),
            Coercion::String => coerce_scalar(value, "string", coerce_string),
            Coercion::Number => coerce_scalar(value, "number", coerce_number),
            Coercion::Date => coerce_scalar(value, "date", coerce_date),
            Coercion::Array(inner) => match value {
                FieldValue::Array(items) => items
                    .into_iter()
                    .map(|item| inner.coerce(item))
                    .collect::<ModelResult<Vec<_>>>()
                    .map(FieldValue::Array),
                FieldValue::Scalar(Bson::Array(items)) => items
                    .into_iter()
                    .map(|item| inner.coerce(FieldValue::Scalar(item)))
                    .collect::<ModelResult<Vec<_>>>()
                    .map(FieldValue::Array),
                other => Err(ModelError::mismatch("array", &other)),
            },
            Coercion::Document(document_type) => match value {
                FieldValue::Document(sub) if Arc::ptr_eq(sub.document_type(), document_type) => {
                    Ok(FieldValue::Document(sub))
                }
                FieldValue::Document(sub) => {
                    Ok(FieldValue::Document(SubDocument::new(document_type.clone(), sub.to_plain_data())))
                }
                FieldValue::Scalar(Bson::Document(raw)) => {
                    Ok(FieldValue::Document(SubDocument::new(document_type.clone(), raw)))
                }
                other => Err(ModelError::mismatch("document", &other)),
            },
        }
    }
}

/// The compiled form of one type descriptor.
#[derive(Debug, Clone)]
pub struct CoercionRule {
    coercion: Coercion,
    default: Option<DefaultValue>,
}

impl CoercionRule {
    fn new(coercion: Coercion, default: Option<DefaultValue>) -> Self {
        Self { coercion, default }
    }

    /// The value normalizer.
    pub fn coercion(&self) -> &Coercion {
        &self.coercion
    }

    /// The default applied when the field is absent, if any.
    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    /// Normalizes `value` through this rule.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::CoercionMismatch`] if the value cannot be converted.
    pub fn coerce(&self, value: impl Into<FieldValue>) -> ModelResult<FieldValue> {
        self.coercion.coerce(value.into())
    }
}

/// Compiler from type descriptors to coercion rules. Stateless and side-effect free.
pub struct TypeAnalyzer;

impl TypeAnalyzer {
    /// Analyzes one descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Configuration`] if a nested schema is invalid or a literal
    /// default cannot be coerced into its declared type.
    pub fn analyze(descriptor: &TypeDescriptor) -> ModelResult<CoercionRule> {
        match descriptor {
            TypeDescriptor::Boolean => Ok(CoercionRule::new(Coercion::Boolean, None)),
            TypeDescriptor::String => Ok(CoercionRule::new(Coercion::String, None)),
            TypeDescriptor::Number => Ok(CoercionRule::new(Coercion::Number, None)),
            TypeDescriptor::Date => Ok(CoercionRule::new(Coercion::Date, None)),
            TypeDescriptor::Array(inner) => {
                let element = Self::analyze(inner)?;

                Ok(CoercionRule::new(
                    Coercion::Array(Box::new(element.coercion)),
                    Some(DefaultValue::provider(|| Bson::Array(Vec::new()))),
                ))
            }
            TypeDescriptor::Nested(schema) => Ok(Self::sub_document(DocumentType::anonymous(schema)?)),
            TypeDescriptor::Document(document_type) => Ok(Self::sub_document(document_type.clone())),
            TypeDescriptor::Annotated { inner, default } => {
                let rule = Self::analyze(inner)?;

                if let Some(DefaultValue::Value(value)) = default {
                    rule.coerce(value.clone())
                        .map_err(|err| ModelError::Configuration(format!("invalid default: {err}")))?;
                }

                Ok(CoercionRule::new(
                    rule.coercion,
                    default.clone().or(rule.default),
                ))
            }
        }
    }

    fn sub_document(document_type: Arc<DocumentType>) -> CoercionRule {
        CoercionRule::new(
            Coercion::Document(document_type),
            Some(DefaultValue::Value(Bson::Document(BsonDocument::new()))),
        )
    }
}

fn coerce_scalar(
    value: FieldValue,
    expected: &'static str,
    convert: fn(Bson) -> ModelResult<Bson>,
) -> ModelResult<FieldValue> {
    match value {
        FieldValue::Scalar(bson) => convert(bson).map(FieldValue::Scalar),
        other => Err(ModelError::mismatch(expected, &other)),
    }
}

fn coerce_boolean(value: Bson) -> ModelResult<Bson> {
    match value {
        value @ Bson::Boolean(_) => Ok(value),
        Bson::Int32(n) => Ok(Bson::Boolean(n != 0)),
        Bson::Int64(n) => Ok(Bson::Boolean(n != 0)),
        Bson::Double(n) => Ok(Bson::Boolean(n != 0.0 && !n.is_nan())),
        Bson::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Bson::Boolean(true)),
            "false" => Ok(Bson::Boolean(false)),
            _ => Err(ModelError::mismatch("boolean", &text)),
        },
        other => Err(ModelError::mismatch("boolean", &other)),
    }
}

fn coerce_string(value: Bson) -> ModelResult<Bson> {
    match value {
        value @ Bson::String(_) => Ok(value),
        Bson::Symbol(symbol) => Ok(Bson::String(symbol)),
        Bson::Boolean(flag) => Ok(Bson::String(flag.to_string())),
        Bson::Int32(n) => Ok(Bson::String(n.to_string())),
        Bson::Int64(n) => Ok(Bson::String(n.to_string())),
        Bson::Double(n) => Ok(Bson::String(format_double(n))),
        Bson::ObjectId(id) => Ok(Bson::String(id.to_hex())),
        Bson::DateTime(datetime) => Ok(Bson::String(datetime.try_to_rfc3339_string()?)),
        other => Err(ModelError::mismatch("string", &other)),
    }
}

/// Formats a double the way ECMAScript number-to-string does: no negative zero, and
/// exponent notation outside `[1e-6, 1e21)`.
fn format_double(n: f64) -> String {
    let magnitude = n.abs();

    if n == 0.0 {
        "0".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if magnitude >= 1e21 || magnitude < 1e-6 {
        let text = format!("{n:e}");
        match text.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{mantissa}e+{exponent}")
            }
            _ => text,
        }
    } else {
        n.to_string()
    }
}

fn coerce_number(value: Bson) -> ModelResult<Bson> {
    match value {
        value @ (Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_)) => Ok(value),
        Bson::Boolean(flag) => Ok(Bson::Int32(i32::from(flag))),
        Bson::DateTime(datetime) => Ok(Bson::Int64(datetime.timestamp_millis())),
        Bson::String(text) => {
            let trimmed = text.trim();

            if let Ok(n) = trimmed.parse::<i64>() {
                Ok(Bson::Int64(n))
            } else if let Ok(n) = trimmed.parse::<f64>() {
                Ok(Bson::Double(n))
            } else {
                Err(ModelError::mismatch("number", &text))
            }
        }
        other => Err(ModelError::mismatch("number", &other)),
    }
}

fn coerce_date(value: Bson) -> ModelResult<Bson> {
    match value {
        value @ Bson::DateTime(_) => Ok(value),
        Bson::Int32(millis) => Ok(Bson::DateTime(DateTime::from_millis(i64::from(millis)))),
        Bson::Int64(millis) => Ok(Bson::DateTime(DateTime::from_millis(millis))),
        Bson::Double(millis) if millis.is_finite() => {
            Ok(Bson::DateTime(DateTime::from_millis(millis as i64)))
        }
        Bson::Timestamp(timestamp) => Ok(Bson::DateTime(DateTime::from_millis(
            i64::from(timestamp.time) * 1000,
        ))),
        Bson::String(text) => parse_date(&text)
            .map(Bson::DateTime)
            .ok_or_else(|| ModelError::mismatch("date", &text)),
        other => Err(ModelError::mismatch("date", &other)),
    }
}

/// Accepts RFC 3339 timestamps, naive `YYYY-MM-DDTHH:MM:SS[.f]` (read as UTC) and
/// plain `YYYY-MM-DD` dates (UTC midnight).
fn parse_date(text: &str) -> Option<DateTime> {
    let text = text.trim();

    if let Ok(datetime) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(DateTime::from_millis(datetime.timestamp_millis()));
    }

    if let Ok(datetime) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(DateTime::from_millis(datetime.and_utc().timestamp_millis()));
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| DateTime::from_millis(datetime.and_utc().timestamp_millis()))
}
