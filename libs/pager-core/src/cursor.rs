//! Opaque pagination cursors.
//!
//! Wire form: unpadded URL-safe base64 of a compact JSON object
//!
//! ```text
//! {"o":["+name","-id"],"v":{"name":"Product","id":123},"d":"prev","f":"0123456789abcdef"}
//! ```
//!
//! `o` and `v` are required. `d` appears only on previous-page cursors and `f`
//! only when the page was produced under a filter. Values are serialized in
//! ordering order. The payload is not signed: structural tampering (fields,
//! order, directions) is detected, forged values are not.

use std::collections::{BTreeMap, HashSet};

use serde::ser::SerializeMap;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::compiler::FieldKinds;
use crate::error::CursorError;
use crate::keyset::PageDirection;
use crate::order::{OrderKey, OrderSpec, SortDir};
use crate::value::Value;

/// Upper bound on accepted token length.
pub const MAX_CURSOR_LEN: usize = 4096;

pub type CursorValues = BTreeMap<String, Value>;

pub mod base64_url {
    use base64::alphabet;
    use base64::engine::{self, DecodePaddingMode, GeneralPurposeConfig};
    use base64::Engine;

    const ENGINE: engine::GeneralPurpose = engine::GeneralPurpose::new(
        &alphabet::URL_SAFE,
        GeneralPurposeConfig::new()
            .with_encode_padding(false)
            .with_decode_padding_mode(DecodePaddingMode::Indifferent),
    );

    /// Encodes without padding.
    pub fn encode(bytes: &[u8]) -> String {
        ENGINE.encode(bytes)
    }

    /// Accepts input with or without `=` padding.
    pub fn decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
        ENGINE.decode(s)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Cursor {
    pub ordering: OrderSpec,
    pub values: CursorValues,
    /// Which way this cursor continues. Defaults to forward.
    pub direction: PageDirection,
    /// Fingerprint of the filter the cursor was minted under.
    pub filter_hash: Option<String>,
}

impl Cursor {
    pub fn new(ordering: OrderSpec, values: CursorValues) -> Self {
        Self {
            ordering,
            values,
            direction: PageDirection::Forward,
            filter_hash: None,
        }
    }

    pub fn with_direction(mut self, direction: PageDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_filter_hash(mut self, hash: Option<String>) -> Self {
        self.filter_hash = hash;
        self
    }

    pub fn encode(&self) -> Result<String, CursorError> {
        if self.ordering.is_empty() {
            return Err(CursorError::EmptyOrdering);
        }
        check_field_set(&self.ordering, &self.values)?;
        if let Some((field, _)) = self
            .values
            .iter()
            .find(|(_, v)| matches!(v, Value::Float(f) if !f.is_finite()))
        {
            return Err(CursorError::UnencodableValue {
                field: field.clone(),
            });
        }

        let payload = WirePayload {
            o: self.ordering.keys().iter().map(OrderKey::signed_token).collect(),
            v: OrderedValues {
                ordering: &self.ordering,
                values: &self.values,
            },
            d: match self.direction {
                PageDirection::Forward => None,
                PageDirection::Backward => Some(PageDirection::Backward.wire_name()),
            },
            f: self.filter_hash.as_deref(),
        };

        let json = serde_json::to_vec(&payload)
            .map_err(|_| CursorError::InvalidShape("values cannot be serialized"))?;
        Ok(base64_url::encode(&json))
    }

    pub fn decode(token: &str) -> Result<Self, CursorError> {
        decode_payload(token).inspect_err(|e| {
            tracing::debug!(len = token.len(), code = e.code(), error = %e, "cursor rejected");
        })
    }

    /// The cursor must have been minted under exactly `effective`.
    pub fn validate_ordering(&self, effective: &OrderSpec) -> Result<(), CursorError> {
        validate_cursor_ordering(&self.ordering, effective)
    }

    /// Fails only when both sides carry a fingerprint and they differ.
    pub fn validate_filter(&self, current: Option<&str>) -> Result<(), CursorError> {
        match (self.filter_hash.as_deref(), current) {
            (Some(minted), Some(now)) if minted != now => Err(CursorError::FilterMismatch),
            _ => Ok(()),
        }
    }

    /// Re-type JSON-decoded values into each field's declared kind.
    ///
    /// Fields the lookup does not know keep their decoded representation.
    pub fn coerce_values<K: FieldKinds + ?Sized>(mut self, kinds: &K) -> Result<Self, CursorError> {
        for (field, value) in self.values.iter_mut() {
            let Some(kind) = kinds.kind_of(field) else {
                continue;
            };
            *value = value.coerce(kind).ok_or_else(|| CursorError::ValueType {
                field: field.clone(),
                expected: kind,
            })?;
        }
        Ok(self)
    }
}

/// Encode `values` at the boundary of `ordering`. Keys must match exactly.
pub fn encode_cursor(ordering: &OrderSpec, values: &CursorValues) -> Result<String, CursorError> {
    Cursor::new(ordering.clone(), values.clone()).encode()
}

/// Decode a token into its ordering and values.
///
/// Typed values (datetimes, UUIDs, decimals) come back as strings; run
/// [`Cursor::coerce_values`] against the field kinds to restore them.
pub fn decode_cursor(token: &str) -> Result<(OrderSpec, CursorValues), CursorError> {
    let cursor = Cursor::decode(token)?;
    Ok((cursor.ordering, cursor.values))
}

/// Same fields, same order, same directions, or [`CursorError::OrderMismatch`].
pub fn validate_cursor_ordering(
    decoded: &OrderSpec,
    effective: &OrderSpec,
) -> Result<(), CursorError> {
    if decoded == effective {
        return Ok(());
    }
    Err(CursorError::OrderMismatch {
        expected: effective.to_string(),
        got: decoded.to_string(),
    })
}

fn check_field_set(ordering: &OrderSpec, values: &CursorValues) -> Result<(), CursorError> {
    let missing: Vec<String> = ordering
        .field_names()
        .filter(|f| !values.contains_key(*f))
        .map(str::to_string)
        .collect();
    let unexpected: Vec<String> = values
        .keys()
        .filter(|k| !ordering.contains_field(k))
        .cloned()
        .collect();

    if missing.is_empty() && unexpected.is_empty() {
        Ok(())
    } else {
        Err(CursorError::FieldSetMismatch {
            missing,
            unexpected,
        })
    }
}

/* ---------- wire ---------- */

#[derive(Serialize)]
struct WirePayload<'a> {
    o: Vec<String>,
    v: OrderedValues<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    d: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    f: Option<&'a str>,
}

/// Serializes values in ordering order rather than map order.
struct OrderedValues<'a> {
    ordering: &'a OrderSpec,
    values: &'a CursorValues,
}

impl Serialize for OrderedValues<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.ordering.len()))?;
        for field in self.ordering.field_names() {
            let value = self.values.get(field).unwrap_or(&Value::Null);
            map.serialize_entry(field, &value.to_json())?;
        }
        map.end()
    }
}

fn decode_payload(token: &str) -> Result<Cursor, CursorError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(CursorError::Empty);
    }
    if token.len() > MAX_CURSOR_LEN {
        return Err(CursorError::TooLong {
            len: token.len(),
            max: MAX_CURSOR_LEN,
        });
    }

    let bytes = base64_url::decode(token).map_err(|_| CursorError::InvalidBase64)?;
    let json: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|_| CursorError::InvalidJson)?;
    let serde_json::Value::Object(obj) = json else {
        return Err(CursorError::NotAnObject);
    };

    let (Some(raw_order), Some(raw_values)) = (obj.get("o"), obj.get("v")) else {
        return Err(CursorError::MissingKeys);
    };
    let Some(raw_order) = raw_order.as_array() else {
        return Err(CursorError::InvalidShape("'o' must be a list"));
    };
    let Some(raw_values) = raw_values.as_object() else {
        return Err(CursorError::InvalidShape("'v' must be an object"));
    };

    let mut keys = Vec::with_capacity(raw_order.len());
    let mut seen = HashSet::with_capacity(raw_order.len());
    for token in raw_order {
        let Some(token) = token.as_str() else {
            return Err(CursorError::InvalidShape("'o' entries must be strings"));
        };
        let key = parse_wire_token(token)?;
        if !seen.insert(key.field.clone()) {
            return Err(CursorError::DuplicateField(key.field));
        }
        keys.push(key);
    }
    if keys.is_empty() {
        return Err(CursorError::EmptyOrdering);
    }
    let ordering = OrderSpec(keys);

    let mut values = CursorValues::new();
    for (field, raw) in raw_values {
        let value = Value::from_json(raw).ok_or_else(|| CursorError::UnreadableValue {
            field: field.clone(),
        })?;
        values.insert(field.clone(), value);
    }
    check_field_set(&ordering, &values)?;

    let direction = match obj.get("d") {
        None | Some(serde_json::Value::Null) => PageDirection::Forward,
        Some(serde_json::Value::String(s)) => PageDirection::from_wire(s)
            .ok_or_else(|| CursorError::InvalidDirection(s.clone()))?,
        Some(other) => return Err(CursorError::InvalidDirection(other.to_string())),
    };

    let filter_hash = match obj.get("f") {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(CursorError::InvalidShape("'f' must be a string")),
    };

    Ok(Cursor {
        ordering,
        values,
        direction,
        filter_hash,
    })
}

/// Wire tokens always carry an explicit sign.
fn parse_wire_token(token: &str) -> Result<OrderKey, CursorError> {
    let invalid = || CursorError::InvalidOrderingToken(token.to_string());
    let dir = match token.as_bytes().first() {
        Some(b'+') => SortDir::Asc,
        Some(b'-') => SortDir::Desc,
        _ => return Err(invalid()),
    };
    let field = &token[1..];
    if field.is_empty() || field.starts_with(['+', '-']) || field.contains(char::is_whitespace) {
        return Err(invalid());
    }
    Ok(OrderKey::new(field, dir))
}

impl Serialize for Cursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let token = self.encode().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&token)
    }
}

impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Cursor::decode(&token).map_err(de::Error::custom)
    }
}
