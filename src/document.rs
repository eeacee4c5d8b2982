//! Document records, raw field maps, and mutation intents.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    error::{WriteError, WriteOp},
    types::{CREATED_AT, DocId, Millis, UPDATED_AT},
};

/// Field name to value mapping as stored remotely.
pub type Fields = serde_json::Map<String, Value>;

/// Untyped document as delivered by a remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    /// Server-assigned identifier.
    pub id: DocId,
    /// Stored fields, including `createdAt`/`updatedAt`.
    pub fields: Fields,
}

impl RawDocument {
    /// Creation time stamped by the sync layer, zero when missing.
    pub fn created_at(&self) -> Millis {
        read_millis(&self.fields, CREATED_AT).unwrap_or(0)
    }

    /// Last-update time stamped by the sync layer, zero when missing.
    pub fn updated_at(&self) -> Millis {
        read_millis(&self.fields, UPDATED_AT).unwrap_or(0)
    }
}

/// Typed document: identifier, sync timestamps, and the decoded record.
#[derive(Debug, Clone, PartialEq)]
pub struct Document<T> {
    /// Server-assigned identifier.
    pub id: DocId,
    /// Creation time.
    pub created_at: Millis,
    /// Last-update time.
    pub updated_at: Millis,
    /// Record body.
    pub data: T,
}

impl<T: DeserializeOwned> Document<T> {
    /// Decodes a raw document's fields into `T`.
    pub fn decode(raw: &RawDocument) -> Result<Self, serde_json::Error> {
        let data = T::deserialize(Value::Object(raw.fields.clone()))?;
        Ok(Self {
            id: raw.id.clone(),
            created_at: raw.created_at(),
            updated_at: raw.updated_at(),
            data,
        })
    }
}

/// One write a caller wants applied to a collection.
///
/// Carries no retry state.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation<T, P> {
    /// Create a new document from a full payload.
    Create(T),
    /// Merge a partial payload into an existing document.
    Update(DocId, P),
    /// Remove a document.
    Delete(DocId),
}

impl<T, P> Mutation<T, P> {
    /// Kind of write this intent performs.
    pub fn op(&self) -> WriteOp {
        match self {
            Self::Create(_) => WriteOp::Create,
            Self::Update(..) => WriteOp::Update,
            Self::Delete(_) => WriteOp::Delete,
        }
    }
}

/// Serializes `value` into a field map.
///
/// Fails when `value` does not serialize to an object.
pub fn to_fields<S: Serialize + ?Sized>(value: &S) -> Result<Fields, WriteError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(WriteError::Encode(format!(
            "expected an object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Overwrites top-level fields of `target` with those present in `patch`.
pub fn merge_fields(target: &mut Fields, patch: &Fields) {
    for (key, value) in patch {
        target.insert(key.clone(), value.clone());
    }
}

/// Reads a non-negative integer field.
pub fn read_millis(fields: &Fields, key: &str) -> Option<Millis> {
    fields.get(key).and_then(Value::as_u64)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
