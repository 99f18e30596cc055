//! Record and query types exchanged between the codec and the storage transport.
//!
//! [`Record`] is the application-facing shape. [`WireRecord`] is what leaves
//! the process: searchable keys replaced by hex digests and the body replaced
//! by an encrypted envelope string.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A plaintext application record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Primary key. Hashed before storage.
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key3: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_key: Option<String>,
    /// Numeric sort key. Stored as-is, never hashed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_key: Option<i64>,
    /// Free-form body. Always travels inside the encrypted envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl Record {
    /// Construct a record with only a primary key set.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Builder-style setter for the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A record in its stored form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    /// Hex SHA-256 digest of the primary key.
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key3: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_key: Option<i64>,
    /// Envelope string (`<tag>:<payload>`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Secret version the body was encrypted under.
    #[serde(default)]
    pub version: u32,
}

impl WireRecord {
    /// Return the value of a named field as JSON, for filter evaluation.
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            "key" => Some(Value::String(self.key.clone())),
            "key2" => self.key2.clone().map(Value::String),
            "key3" => self.key3.clone().map(Value::String),
            "profile_key" => self.profile_key.clone().map(Value::String),
            "range_key" => self.range_key.map(Value::from),
            "version" => Some(Value::from(self.version)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Find filters
// ---------------------------------------------------------------------------

/// Numeric range bounds: `$gt`, `$gte`, `$lt`, `$lte`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeBounds {
    pub gt: Option<i64>,
    pub gte: Option<i64>,
    pub lt: Option<i64>,
    pub lte: Option<i64>,
}

impl RangeBounds {
    fn contains(&self, n: i64) -> bool {
        self.gt.map_or(true, |b| n > b)
            && self.gte.map_or(true, |b| n >= b)
            && self.lt.map_or(true, |b| n < b)
            && self.lte.map_or(true, |b| n <= b)
    }
}

/// Condition applied to a single field in a [`FindFilter`].
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// `field: value`
    Eq(Value),
    /// `field: [values]`
    In(Vec<Value>),
    /// `field: {$not: ...}`
    Not(Box<FilterValue>),
    /// `field: {$gt: .., $lte: ..}`
    Range(RangeBounds),
}

impl FilterValue {
    /// Shorthand for [`FilterValue::Not`].
    pub fn not(inner: FilterValue) -> Self {
        FilterValue::Not(Box::new(inner))
    }

    /// Evaluate this condition against a field value (`None` when absent).
    pub fn matches(&self, field: Option<&Value>) -> bool {
        match self {
            FilterValue::Eq(v) => field == Some(v),
            FilterValue::In(vs) => field.map_or(false, |f| vs.contains(f)),
            FilterValue::Not(inner) => !inner.matches(field),
            FilterValue::Range(bounds) => field
                .and_then(Value::as_i64)
                .map_or(false, |n| bounds.contains(n)),
        }
    }

    /// Rewrite every string operand with `f`, leaving numbers and ranges alone.
    pub fn map_strings<F>(&self, f: &F) -> FilterValue
    where
        F: Fn(&str) -> String,
    {
        let map_one = |v: &Value| match v {
            Value::String(s) => Value::String(f(s)),
            other => other.clone(),
        };
        match self {
            FilterValue::Eq(v) => FilterValue::Eq(map_one(v)),
            FilterValue::In(vs) => FilterValue::In(vs.iter().map(map_one).collect()),
            FilterValue::Not(inner) => FilterValue::not(inner.map_strings(f)),
            FilterValue::Range(b) => FilterValue::Range(b.clone()),
        }
    }

    /// JSON shape sent to the storage service.
    pub fn to_json(&self) -> Value {
        match self {
            FilterValue::Eq(v) => v.clone(),
            FilterValue::In(vs) => Value::Array(vs.clone()),
            FilterValue::Not(inner) => json!({ "$not": inner.to_json() }),
            FilterValue::Range(b) => {
                let mut ops = serde_json::Map::new();
                for (op, bound) in [("$gt", b.gt), ("$gte", b.gte), ("$lt", b.lt), ("$lte", b.lte)] {
                    if let Some(n) = bound {
                        ops.insert(op.to_owned(), Value::from(n));
                    }
                }
                Value::Object(ops)
            }
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Eq(Value::String(s.to_owned()))
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        FilterValue::Eq(Value::from(n))
    }
}

impl Serialize for FilterValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Field-to-condition map passed to `find`. All conditions must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FindFilter(BTreeMap<String, FilterValue>);

impl FindFilter {
    /// Create an empty filter (matches every record).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.insert(field, value);
        self
    }

    /// Set (or replace) the condition on `field`.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FilterValue>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&FilterValue> {
        self.0.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.0.iter()
    }

    /// Evaluate the filter against a stored record.
    pub fn matches(&self, record: &WireRecord) -> bool {
        self.0
            .iter()
            .all(|(field, cond)| cond.matches(record.field(field).as_ref()))
    }
}

impl FromIterator<(String, FilterValue)> for FindFilter {
    fn from_iter<I: IntoIterator<Item = (String, FilterValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Paging options for `find`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindOptions {
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

/// Paging metadata returned alongside a page of results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindMeta {
    /// Records in this page.
    pub count: u64,
    pub limit: u32,
    pub offset: u32,
    /// Records matching the filter across all pages.
    pub total: u64,
}

/// One page of raw stored records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindPage {
    pub records: Vec<WireRecord>,
    pub meta: FindMeta,
}

// ---------------------------------------------------------------------------
// Migration
// ---------------------------------------------------------------------------

/// Result of one migration step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationProgress {
    /// Records re-encrypted by this step.
    pub migrated: u64,
    /// Records still under a stale secret version after this step.
    pub total_left: u64,
}
