//! Wire types for the Firestore REST API.
//!
//! Shapes mirror the JSON of `firestore.googleapis.com/v1`; serde handles
//! the camelCase renaming. Conversions between Rust scalars and [`Value`]
//! live in [`ToFirestoreValue`] and [`FromFirestoreValue`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FirestoreError, FirestoreResult};

/// One Firestore field value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    StringValue(String),
    /// Integers travel as decimal strings on the wire.
    IntegerValue(String),
    DoubleValue(f64),
    BooleanValue(bool),
    /// RFC 3339.
    TimestampValue(String),
    NullValue(()),
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(GeoPoint),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayValue {
    pub values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapValue {
    pub fields: Option<HashMap<String, Value>>,
}

/// Convert a Rust value to a Firestore [`Value`].
pub trait ToFirestoreValue {
    fn to_firestore_value(&self) -> Value;
}

/// Convert a Firestore [`Value`] back to a Rust type. Returns `None` on a
/// type mismatch; callers decide whether that means default or error.
pub trait FromFirestoreValue: Sized {
    fn from_firestore_value(value: &Value) -> Option<Self>;
}

// Doubles are accepted on the way in because the Firestore console
// sometimes writes whole numbers as doubleValue.
macro_rules! int_conversions {
    ($($ty:ty),*) => {$(
        impl ToFirestoreValue for $ty {
            fn to_firestore_value(&self) -> Value {
                Value::IntegerValue((*self as i64).to_string())
            }
        }

        impl FromFirestoreValue for $ty {
            fn from_firestore_value(value: &Value) -> Option<Self> {
                match value {
                    Value::IntegerValue(s) => s.parse().ok(),
                    Value::DoubleValue(f) => Some(*f as $ty),
                    _ => None,
                }
            }
        }
    )*};
}

int_conversions!(i64, u32, u64);

impl ToFirestoreValue for String {
    fn to_firestore_value(&self) -> Value {
        Value::StringValue(self.clone())
    }
}

impl ToFirestoreValue for &str {
    fn to_firestore_value(&self) -> Value {
        Value::StringValue((*self).to_string())
    }
}

impl ToFirestoreValue for f64 {
    fn to_firestore_value(&self) -> Value {
        Value::DoubleValue(*self)
    }
}

impl ToFirestoreValue for bool {
    fn to_firestore_value(&self) -> Value {
        Value::BooleanValue(*self)
    }
}

impl ToFirestoreValue for DateTime<Utc> {
    fn to_firestore_value(&self) -> Value {
        Value::TimestampValue(self.to_rfc3339())
    }
}

impl<T: ToFirestoreValue> ToFirestoreValue for Option<T> {
    fn to_firestore_value(&self) -> Value {
        match self {
            Some(v) => v.to_firestore_value(),
            None => Value::NullValue(()),
        }
    }
}

impl<T: ToFirestoreValue> ToFirestoreValue for Vec<T> {
    fn to_firestore_value(&self) -> Value {
        let values = self.iter().map(T::to_firestore_value).collect();
        Value::ArrayValue(ArrayValue {
            values: Some(values),
        })
    }
}

impl FromFirestoreValue for String {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::StringValue(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromFirestoreValue for f64 {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::DoubleValue(f) => Some(*f),
            Value::IntegerValue(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl FromFirestoreValue for bool {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::BooleanValue(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromFirestoreValue for DateTime<Utc> {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::TimestampValue(s) => DateTime::parse_from_rfc3339(s).ok().map(Into::into),
            _ => None,
        }
    }
}

/// A Firestore document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource name; absent on documents built locally for writes.
    pub name: Option<String>,
    pub fields: Option<HashMap<String, Value>>,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
}

impl Document {
    pub fn new(fields: HashMap<String, Value>) -> Self {
        Self {
            fields: Some(fields),
            ..Self::default()
        }
    }

    /// Document ID, i.e. the last path component of the resource name.
    pub fn doc_id(&self) -> Option<&str> {
        self.name.as_deref().and_then(|n| n.rsplit('/').next())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDocumentsResponse {
    pub documents: Option<Vec<Document>>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGetDocumentsRequest {
    /// Full resource names.
    pub documents: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask: Option<DocumentMask>,
}

/// One element of the batchGet response stream; exactly one of `found`
/// and `missing` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGetDocumentsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMask {
    pub field_paths: Vec<String>,
}

/// Write guard; either an existence requirement or an update-time match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Precondition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

/// A single operation inside a batchWrite.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Write {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_mask: Option<DocumentMask>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_document: Option<Precondition>,
}

impl Write {
    /// Full-document upsert at the given resource name.
    pub fn upsert(name: String, fields: HashMap<String, Value>) -> Self {
        Self {
            update: Some(Document {
                name: Some(name),
                fields: Some(fields),
                ..Document::default()
            }),
            ..Self::default()
        }
    }

    /// Insert requiring that the document does not exist yet.
    pub fn insert(name: String, fields: HashMap<String, Value>) -> Self {
        Self {
            current_document: Some(Precondition {
                exists: Some(false),
                update_time: None,
            }),
            ..Self::upsert(name, fields)
        }
    }

    /// Idempotent delete by resource name.
    pub fn delete(name: String) -> Self {
        Self {
            delete: Some(name),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchWriteRequest {
    pub writes: Vec<Write>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    pub update_time: Option<String>,
}

/// Per-write status in a batch response. gRPC code 0 is OK.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub code: Option<i32>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchWriteResponse {
    pub write_results: Option<Vec<WriteResult>>,
    pub status: Option<Vec<Status>>,
}

impl BatchWriteResponse {
    /// Response shape for a batch that had nothing to write.
    pub fn empty() -> Self {
        Self {
            write_results: Some(vec![]),
            status: Some(vec![]),
        }
    }

    /// Surface the first failed write, if any. batchWrite is not atomic
    /// across writes, so partial failure is possible.
    pub fn check_for_errors(&self) -> FirestoreResult<()> {
        let failed = self
            .status
            .iter()
            .flatten()
            .enumerate()
            .find(|(_, s)| s.code.unwrap_or(0) != 0);

        match failed {
            Some((i, s)) => {
                let msg = s.message.as_deref().unwrap_or("Unknown error");
                let code = s.code.unwrap_or(-1);
                Err(FirestoreError::request_failed(format!(
                    "Batch write failed at index {i}: {msg} (code {code})"
                )))
            }
            None => Ok(()),
        }
    }
}

/// A Firestore structured query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredQuery {
    pub from: Vec<CollectionSelector>,
    /// Named `filter` here because `where` is reserved in Rust.
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Vec<Order>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_at: Option<Cursor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i32>,
}

/// Collection to query. `all_descendants` turns this into a collection
/// group query across every collection with the given ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSelector {
    pub collection_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_descendants: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldReference {
    pub field_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub field: FieldReference,
    /// "ASCENDING" or "DESCENDING".
    pub direction: String,
}

/// Query cursor positioned on the order-by values of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub values: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Filter {
    FieldFilter(FieldFilter),
    CompositeFilter(CompositeFilter),
}

impl Filter {
    /// Equality filter on a single field.
    pub fn field_eq(field_path: impl Into<String>, value: Value) -> Self {
        Filter::FieldFilter(FieldFilter {
            field: FieldReference {
                field_path: field_path.into(),
            },
            op: "EQUAL".to_string(),
            value,
        })
    }

    /// AND of several filters.
    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::CompositeFilter(CompositeFilter {
            op: "AND".to_string(),
            filters,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldFilter {
    pub field: FieldReference,
    pub op: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeFilter {
    pub op: String,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryRequest {
    pub structured_query: StructuredQuery,
}

/// One element of the runQuery response stream. Elements without a
/// document carry only read metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_time: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_wire_format() {
        let v = serde_json::to_value("hello".to_firestore_value()).unwrap();
        assert_eq!(v, serde_json::json!({"stringValue": "hello"}));

        let v = serde_json::to_value(42u32.to_firestore_value()).unwrap();
        assert_eq!(v, serde_json::json!({"integerValue": "42"}));

        let v = serde_json::to_value(true.to_firestore_value()).unwrap();
        assert_eq!(v, serde_json::json!({"booleanValue": true}));
    }

    #[test]
    fn test_field_filter_wire_format() {
        let filter = Filter::field_eq("email", Value::StringValue("a@b.c".into()));
        let v = serde_json::to_value(&filter).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "fieldFilter": {
                    "field": {"fieldPath": "email"},
                    "op": "EQUAL",
                    "value": {"stringValue": "a@b.c"}
                }
            })
        );
    }

    #[test]
    fn test_composite_filter_wire_format() {
        let filter = Filter::and(vec![
            Filter::field_eq("email", Value::StringValue("a@b.c".into())),
            Filter::field_eq("status", Value::StringValue("pending".into())),
        ]);
        let v = serde_json::to_value(&filter).unwrap();
        assert_eq!(v["compositeFilter"]["op"], "AND");
        assert_eq!(
            v["compositeFilter"]["filters"].as_array().map(|f| f.len()),
            Some(2)
        );
    }

    #[test]
    fn test_query_where_key_is_renamed() {
        let query = StructuredQuery {
            from: vec![CollectionSelector {
                collection_id: "members".into(),
                all_descendants: Some(true),
            }],
            filter: Some(Filter::field_eq("user_id", Value::StringValue("u1".into()))),
            order_by: None,
            start_at: None,
            limit: Some(10),
        };
        let v = serde_json::to_value(&query).unwrap();
        assert!(v.get("where").is_some());
        assert!(v.get("filter").is_none());
        assert_eq!(v["from"][0]["allDescendants"], true);
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let now = Utc::now();
        let value = now.to_firestore_value();
        let parsed = DateTime::<Utc>::from_firestore_value(&value).unwrap();
        assert_eq!(parsed.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn test_integer_parses_from_double() {
        assert_eq!(u32::from_firestore_value(&Value::DoubleValue(3.0)), Some(3));
        assert_eq!(
            i64::from_firestore_value(&Value::IntegerValue("12".into())),
            Some(12)
        );
    }

    #[test]
    fn test_doc_id_from_resource_name() {
        let doc = Document {
            name: Some(
                "projects/p/databases/(default)/documents/teams/t1/videos/v1".to_string(),
            ),
            ..Document::default()
        };
        assert_eq!(doc.doc_id(), Some("v1"));
    }

    #[test]
    fn test_batch_response_surfaces_first_failure() {
        let resp = BatchWriteResponse {
            write_results: None,
            status: Some(vec![
                Status {
                    code: Some(0),
                    message: None,
                },
                Status {
                    code: Some(9),
                    message: Some("precondition".into()),
                },
            ]),
        };
        let err = resp.check_for_errors().unwrap_err();
        assert!(err.to_string().contains("index 1"));

        assert!(BatchWriteResponse::empty().check_for_errors().is_ok());
    }

    #[test]
    fn test_write_constructors() {
        let w = Write::insert("projects/p/databases/d/documents/c/x".into(), HashMap::new());
        assert_eq!(w.current_document.as_ref().and_then(|p| p.exists), Some(false));
        assert!(w.update.is_some());

        let d = Write::delete("projects/p/databases/d/documents/c/x".into());
        assert!(d.delete.is_some());
        assert!(d.update.is_none());
    }
}
