//! Ordering specifications: parsing, signed tokens and tiebreakers.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::compiler::FieldSet;
use crate::error::OrderingError;

pub const MAX_ORDER_FIELDS: usize = 10;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    pub fn reverse(self) -> Self {
        match self {
            SortDir::Asc => SortDir::Desc,
            SortDir::Desc => SortDir::Asc,
        }
    }

    /// `+` or `-`, as used in signed tokens.
    pub fn sign(self) -> char {
        match self {
            SortDir::Asc => '+',
            SortDir::Desc => '-',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortDir::Asc => "asc",
            SortDir::Desc => "desc",
        }
    }
}

impl fmt::Display for SortDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderKey {
    pub field: String,
    pub dir: SortDir,
}

impl OrderKey {
    pub fn new(field: impl Into<String>, dir: SortDir) -> Self {
        Self {
            field: field.into(),
            dir,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortDir::Asc)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortDir::Desc)
    }

    /// `+field` / `-field`
    pub fn signed_token(&self) -> String {
        format!("{}{}", self.dir.sign(), self.field)
    }
}

/// Validated, priority-ordered list of sort keys.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderSpec(pub Vec<OrderKey>);

impl OrderSpec {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn keys(&self) -> &[OrderKey] {
        &self.0
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|k| k.field.as_str())
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.0.iter().any(|k| k.field == field)
    }

    /// Parse a comma-separated ordering string such as `"name,-created_at"`.
    /// Empty segments are skipped.
    pub fn parse<A: FieldSet + ?Sized>(order_by: &str, allow: &A) -> Result<Self, OrderingError> {
        let tokens: Vec<&str> = order_by
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        parse_ordering(&tokens, allow)
    }

    /// Render as `"+a,-b"`. Empty order renders as `""`.
    pub fn to_signed_tokens(&self) -> String {
        self.0
            .iter()
            .map(OrderKey::signed_token)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse `"+a,-b"` without an allow-list; the sign is optional.
    pub fn from_signed_tokens(signed: &str) -> Result<Self, OrderingError> {
        let mut keys = Vec::new();
        let mut seen = HashSet::new();
        for token in signed.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let key = parse_token(token)?;
            if !seen.insert(key.field.clone()) {
                return Err(OrderingError::Duplicate(key.field));
            }
            keys.push(key);
        }
        if keys.is_empty() {
            return Err(OrderingError::Empty);
        }
        Ok(Self(keys))
    }

    /// Whitespace-tolerant comparison against a signed token string.
    pub fn equals_signed_tokens(&self, signed: &str) -> bool {
        match Self::from_signed_tokens(signed) {
            Ok(other) => other == *self,
            Err(_) => false,
        }
    }

    /// Append `tiebreaker` unless it is already present, whatever its direction.
    pub fn ensure_tiebreaker(mut self, tiebreaker: &str, dir: SortDir) -> Self {
        if !self.contains_field(tiebreaker) {
            self.0.push(OrderKey::new(tiebreaker, dir));
        }
        self
    }

    /// Same fields, every direction flipped. Used to fetch backwards.
    pub fn reversed(&self) -> Self {
        Self(
            self.0
                .iter()
                .map(|k| OrderKey::new(k.field.clone(), k.dir.reverse()))
                .collect(),
        )
    }
}

impl fmt::Display for OrderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("(none)");
        }
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", key.field, key.dir)?;
        }
        Ok(())
    }
}

impl From<Vec<OrderKey>> for OrderSpec {
    fn from(keys: Vec<OrderKey>) -> Self {
        Self(keys)
    }
}

fn parse_token(token: &str) -> Result<OrderKey, OrderingError> {
    let (dir, field) = match token.as_bytes().first() {
        Some(b'+') => (SortDir::Asc, &token[1..]),
        Some(b'-') => (SortDir::Desc, &token[1..]),
        _ => (SortDir::Asc, token),
    };
    if field.is_empty() || field.starts_with(['+', '-']) || field.contains(char::is_whitespace) {
        return Err(OrderingError::InvalidToken(token.to_string()));
    }
    Ok(OrderKey::new(field, dir))
}

/// Parse signed tokens (`+field`, `-field`, `field`) against an allow-list.
///
/// Token order is kept as sort priority. Unknown fields, repeated fields,
/// malformed tokens and more than [`MAX_ORDER_FIELDS`] keys are rejected.
pub fn parse_ordering<S, A>(tokens: &[S], allow: &A) -> Result<OrderSpec, OrderingError>
where
    S: AsRef<str>,
    A: FieldSet + ?Sized,
{
    if tokens.is_empty() {
        return Err(OrderingError::Empty);
    }
    if tokens.len() > MAX_ORDER_FIELDS {
        return Err(OrderingError::TooManyFields {
            count: tokens.len(),
            max: MAX_ORDER_FIELDS,
        });
    }

    let mut keys = Vec::with_capacity(tokens.len());
    let mut seen = HashSet::with_capacity(tokens.len());

    for raw in tokens {
        let key = parse_token(raw.as_ref().trim())?;

        if !allow.contains_field(&key.field) {
            return Err(OrderingError::NotAllowed {
                field: key.field,
                allowed: allow.field_names().join(", "),
            });
        }
        if !seen.insert(key.field.clone()) {
            return Err(OrderingError::Duplicate(key.field));
        }
        keys.push(key);
    }

    tracing::trace!(order = %OrderSpec(keys.clone()), "ordering parsed");
    Ok(OrderSpec(keys))
}
