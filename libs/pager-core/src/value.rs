//! Scalar values shared by filter literals, cursor payloads and fetched rows.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Declared semantic type of an allow-listed field.
///
/// Literals and cursor values are coerced into the declared kind before they
/// reach a backend, so adapters never have to guess.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    I64,
    F64,
    Decimal,
    Bool,
    Uuid,
    DateTimeUtc,
    Date,
    Time,
}

impl FieldKind {
    /// Whether `<`, `<=`, `>`, `>=` make sense for this kind.
    pub fn is_ordered(self) -> bool {
        !matches!(self, FieldKind::Bool | FieldKind::Uuid)
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, FieldKind::I64 | FieldKind::F64 | FieldKind::Decimal)
    }

    /// Two field kinds can be compared against each other.
    pub fn is_comparable_with(self, other: FieldKind) -> bool {
        self == other || (self.is_numeric() && other.is_numeric())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::I64 => "i64",
            FieldKind::F64 => "f64",
            FieldKind::Decimal => "decimal",
            FieldKind::Bool => "bool",
            FieldKind::Uuid => "uuid",
            FieldKind::DateTimeUtc => "datetime",
            FieldKind::Date => "date",
            FieldKind::Time => "time",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" | "text" => FieldKind::String,
            "i64" | "int" | "integer" => FieldKind::I64,
            "f64" | "float" | "number" => FieldKind::F64,
            "decimal" => FieldKind::Decimal,
            "bool" | "boolean" => FieldKind::Bool,
            "uuid" => FieldKind::Uuid,
            "datetime" | "datetime_utc" | "timestamp" => FieldKind::DateTimeUtc,
            "date" => FieldKind::Date,
            "time" => FieldKind::Time,
            other => return Err(format!("unknown field kind: {other}")),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(BigDecimal),
    String(String),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::Uuid(_) => "uuid",
            Value::DateTime(_) => "datetime",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Coerce into the representation used for `kind`.
    ///
    /// Returns `None` when the value cannot represent that kind. `Null` is
    /// accepted for every kind; whether null is meaningful is up to the caller.
    pub fn coerce(&self, kind: FieldKind) -> Option<Value> {
        use FieldKind as K;
        use Value as V;

        Some(match (kind, self) {
            (_, V::Null) => V::Null,

            (K::String, V::String(s)) => V::String(s.clone()),

            (K::I64, V::Int(i)) => V::Int(*i),

            (K::F64, V::Int(i)) => V::Float(*i as f64),
            (K::F64, V::Float(f)) => V::Float(*f),

            (K::Decimal, V::Int(i)) => V::Decimal(BigDecimal::from(*i)),
            (K::Decimal, V::Float(f)) => V::Decimal(BigDecimal::from_str(&f.to_string()).ok()?),
            (K::Decimal, V::String(s)) => V::Decimal(BigDecimal::from_str(s.trim()).ok()?),
            (K::Decimal, V::Decimal(d)) => V::Decimal(d.clone()),

            (K::Bool, V::Bool(b)) => V::Bool(*b),

            (K::Uuid, V::String(s)) => V::Uuid(s.parse().ok()?),
            (K::Uuid, V::Uuid(u)) => V::Uuid(*u),

            (K::DateTimeUtc, V::String(s)) => V::DateTime(
                DateTime::parse_from_rfc3339(s)
                    .ok()?
                    .with_timezone(&Utc),
            ),
            (K::DateTimeUtc, V::DateTime(dt)) => V::DateTime(*dt),

            (K::Date, V::String(s)) => V::Date(s.parse().ok()?),
            (K::Date, V::Date(d)) => V::Date(*d),

            (K::Time, V::String(s)) => V::Time(s.parse().ok()?),
            (K::Time, V::Time(t)) => V::Time(*t),

            _ => return None,
        })
    }

    /// Total-enough ordering for values of compatible types.
    ///
    /// Mixed numeric representations compare by magnitude. `Null` and
    /// incompatible pairs yield `None`, which callers treat as "unknown".
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        use Value as V;

        match (self, other) {
            (V::Bool(a), V::Bool(b)) => Some(a.cmp(b)),
            (V::Int(a), V::Int(b)) => Some(a.cmp(b)),
            (V::Float(a), V::Float(b)) => a.partial_cmp(b),
            (V::Int(a), V::Float(b)) => (*a as f64).partial_cmp(b),
            (V::Float(a), V::Int(b)) => a.partial_cmp(&(*b as f64)),
            (V::Decimal(a), V::Decimal(b)) => Some(a.cmp(b)),
            (V::Decimal(a), V::Int(b)) => Some(a.cmp(&BigDecimal::from(*b))),
            (V::Int(a), V::Decimal(b)) => Some(BigDecimal::from(*a).cmp(b)),
            (V::Decimal(a), V::Float(b)) => a.to_f64()?.partial_cmp(b),
            (V::Float(a), V::Decimal(b)) => a.partial_cmp(&b.to_f64()?),
            (V::String(a), V::String(b)) => Some(a.cmp(b)),
            (V::Uuid(a), V::Uuid(b)) => Some(a.cmp(b)),
            (V::DateTime(a), V::DateTime(b)) => Some(a.cmp(b)),
            (V::Date(a), V::Date(b)) => Some(a.cmp(b)),
            (V::Time(a), V::Time(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// JSON form used on the cursor wire and in rendered rows.
    ///
    /// Typed values travel as canonical strings; decimals as strings so no
    /// digits are lost. Non-finite floats have no JSON form and become `null`;
    /// [`Cursor::encode`](crate::Cursor::encode) refuses them.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;

        match self {
            Value::Null => J::Null,
            Value::Bool(b) => J::Bool(*b),
            Value::Int(i) => J::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(J::Number)
                .unwrap_or(J::Null),
            Value::Decimal(d) => J::String(d.normalized().to_string()),
            Value::String(s) => J::String(s.clone()),
            Value::Uuid(u) => J::String(u.as_hyphenated().to_string()),
            Value::DateTime(dt) => J::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Date(d) => J::String(d.format("%Y-%m-%d").to_string()),
            Value::Time(t) => J::String(t.format("%H:%M:%S%.f").to_string()),
        }
    }

    /// Read a scalar JSON value. Arrays and objects have no scalar form.
    pub fn from_json(json: &serde_json::Value) -> Option<Value> {
        use serde_json::Value as J;

        match json {
            J::Null => Some(Value::Null),
            J::Bool(b) => Some(Value::Bool(*b)),
            J::Number(n) => match n.as_i64() {
                Some(i) => Some(Value::Int(i)),
                None => n.as_f64().map(Value::Float),
            },
            J::String(s) => Some(Value::String(s.clone())),
            J::Array(_) | J::Object(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Uuid> for Value {
    fn from(u: Uuid) -> Self {
        Value::Uuid(u)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Value::from_json(&json)
            .ok_or_else(|| de::Error::custom("expected a scalar value, got an array or object"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_string_into_datetime() {
        let v = Value::from("2024-03-01T10:00:00+02:00");
        let coerced = v.coerce(FieldKind::DateTimeUtc).unwrap();
        let expected = DateTime::parse_from_rfc3339("2024-03-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(coerced, Value::DateTime(expected));
    }

    #[test]
    fn test_coerce_rejects_wrong_kind() {
        assert_eq!(Value::from("abc").coerce(FieldKind::I64), None);
        assert_eq!(Value::Bool(true).coerce(FieldKind::String), None);
        assert_eq!(Value::from("not-a-uuid").coerce(FieldKind::Uuid), None);
        assert_eq!(Value::Null.coerce(FieldKind::Uuid), Some(Value::Null));
    }

    #[test]
    fn test_compare_mixed_numbers() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Some(Ordering::Less));
        assert_eq!(
            Value::Decimal(BigDecimal::from(3)).compare(&Value::Int(3)),
            Some(Ordering::Equal)
        );
        assert_eq!(Value::Null.compare(&Value::Int(1)), None);
        assert_eq!(Value::from("a").compare(&Value::Int(1)), None);
    }

    #[test]
    fn test_typed_values_survive_json() {
        let dt = DateTime::parse_from_rfc3339("2024-01-02T03:04:05.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        let json = Value::DateTime(dt).to_json();
        let back = Value::from_json(&json)
            .unwrap()
            .coerce(FieldKind::DateTimeUtc)
            .unwrap();
        assert_eq!(back, Value::DateTime(dt));

        let d = Value::Decimal(BigDecimal::from_str("12345678901234567890.000123").unwrap());
        let back = Value::from_json(&d.to_json())
            .unwrap()
            .coerce(FieldKind::Decimal)
            .unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_field_kind_from_str() {
        assert_eq!("datetime".parse::<FieldKind>().unwrap(), FieldKind::DateTimeUtc);
        assert_eq!("Integer".parse::<FieldKind>().unwrap(), FieldKind::I64);
        assert!("blob".parse::<FieldKind>().is_err());
    }
}
