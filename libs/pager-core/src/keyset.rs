//! Keyset pagination: row bounds derived from a cursor, and page assembly
//! from the `size + 1` rows an adapter fetched under that bound.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::cursor::{Cursor, CursorValues};
use crate::error::PaginationError;
use crate::order::{OrderSpec, SortDir};
use crate::page::PageResult;
use crate::value::Value;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageDirection {
    #[default]
    Forward,
    Backward,
}

impl PageDirection {
    /// Cursor payload spelling: `next` / `prev`.
    pub fn wire_name(self) -> &'static str {
        match self {
            PageDirection::Forward => "next",
            PageDirection::Backward => "prev",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "next" => Some(PageDirection::Forward),
            "prev" => Some(PageDirection::Backward),
            _ => None,
        }
    }
}

/* ---------- row bound ---------- */

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundOp {
    Eq,
    Gt,
    Lt,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoundTerm {
    pub field: String,
    pub op: BoundOp,
    pub value: Value,
}

/// Lexicographic "rows after the cursor" condition, as an OR of AND groups:
///
/// ```text
/// (f1 > v1) OR (f1 = v1 AND f2 < v2) OR ...
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct KeysetBound {
    pub groups: Vec<Vec<BoundTerm>>,
}

impl BoundTerm {
    /// Whether `actual` satisfies this term, with null ranking below every
    /// other value. Mismatched types never match.
    pub fn matches(&self, actual: &Value) -> bool {
        let expected = match self.op {
            BoundOp::Eq => Ordering::Equal,
            BoundOp::Gt => Ordering::Greater,
            BoundOp::Lt => Ordering::Less,
        };
        let got = match (actual.is_null(), self.value.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => match actual.compare(&self.value) {
                Some(ord) => ord,
                None => return false,
            },
        };
        got == expected
    }
}

impl KeysetBound {
    /// Evaluate against a row. Nulls sort first ascending and last
    /// descending; adapters must order the same way.
    pub fn admits<R: KeysetRow + ?Sized>(&self, row: &R) -> bool {
        self.groups.iter().any(|group| {
            group.iter().all(|term| {
                row.key_value(&term.field)
                    .is_some_and(|actual| term.matches(&actual))
            })
        })
    }
}

/// Build the bound for continuing past `values` in `direction`.
///
/// Ascending keys compare with `>` going forward, descending keys with `<`;
/// backward paging swaps both.
pub fn keyset_bound(
    ordering: &OrderSpec,
    values: &CursorValues,
    direction: PageDirection,
) -> Result<KeysetBound, PaginationError> {
    if ordering.is_empty() {
        return Err(PaginationError::EmptyOrdering);
    }

    let mut resolved = Vec::with_capacity(ordering.len());
    for key in ordering.keys() {
        let value = values
            .get(&key.field)
            .ok_or_else(|| PaginationError::MissingKeyValue(key.field.clone()))?;
        let op = match (key.dir, direction) {
            (SortDir::Asc, PageDirection::Forward) | (SortDir::Desc, PageDirection::Backward) => {
                BoundOp::Gt
            }
            (SortDir::Desc, PageDirection::Forward) | (SortDir::Asc, PageDirection::Backward) => {
                BoundOp::Lt
            }
        };
        resolved.push((key.field.as_str(), op, value));
    }

    let groups = (0..resolved.len())
        .map(|i| {
            let mut group: Vec<BoundTerm> = resolved[..i]
                .iter()
                .map(|(field, _, value)| BoundTerm {
                    field: field.to_string(),
                    op: BoundOp::Eq,
                    value: (*value).clone(),
                })
                .collect();
            let (field, op, value) = resolved[i];
            group.push(BoundTerm {
                field: field.to_string(),
                op,
                value: value.clone(),
            });
            group
        })
        .collect();

    Ok(KeysetBound { groups })
}

/// Order the adapter must fetch in: the effective order, or its reverse when
/// paging backward.
pub fn fetch_order(ordering: &OrderSpec, direction: PageDirection) -> OrderSpec {
    match direction {
        PageDirection::Forward => ordering.clone(),
        PageDirection::Backward => ordering.reversed(),
    }
}

/* ---------- options ---------- */

#[derive(Clone, Debug, PartialEq)]
pub struct PageOptions {
    pub size: u64,
    pub cursor: Option<Cursor>,
    pub direction: PageDirection,
    pub include_prev_cursor_on_first_page: bool,
    /// Fingerprint stamped on minted cursors.
    pub filter_hash: Option<String>,
}

impl PageOptions {
    pub fn new(size: u64) -> Self {
        Self {
            size,
            cursor: None,
            direction: PageDirection::Forward,
            include_prev_cursor_on_first_page: false,
            filter_hash: None,
        }
    }

    /// Continue from `cursor` in the direction it was minted for.
    pub fn from_cursor(size: u64, cursor: Cursor) -> Self {
        let direction = cursor.direction;
        Self::new(size).with_cursor(cursor).with_direction(direction)
    }

    pub fn with_cursor(mut self, cursor: Cursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn with_direction(mut self, direction: PageDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn include_prev_cursor_on_first_page(mut self, include: bool) -> Self {
        self.include_prev_cursor_on_first_page = include;
        self
    }

    pub fn with_filter_hash(mut self, hash: Option<String>) -> Self {
        self.filter_hash = hash;
        self
    }

    /// Rows to ask the adapter for.
    pub fn fetch_limit(&self) -> u64 {
        self.size.saturating_add(1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LimitCfg {
    pub default: u64,
    pub max: u64,
}

impl Default for LimitCfg {
    fn default() -> Self {
        Self {
            default: 20,
            max: 100,
        }
    }
}

/// Absent → default, 0 → 1, above max → max.
pub fn clamp_limit(requested: Option<u64>, cfg: LimitCfg) -> u64 {
    requested.unwrap_or(cfg.default).clamp(1, cfg.max.max(1))
}

/* ---------- rows ---------- */

/// Access to a row's ordering-key values.
pub trait KeysetRow {
    fn key_value(&self, field: &str) -> Option<Value>;
}

impl KeysetRow for BTreeMap<String, Value> {
    fn key_value(&self, field: &str) -> Option<Value> {
        self.get(field).cloned()
    }
}

impl KeysetRow for HashMap<String, Value> {
    fn key_value(&self, field: &str) -> Option<Value> {
        self.get(field).cloned()
    }
}

impl KeysetRow for serde_json::Map<String, serde_json::Value> {
    fn key_value(&self, field: &str) -> Option<Value> {
        self.get(field).and_then(Value::from_json)
    }
}

impl KeysetRow for serde_json::Value {
    fn key_value(&self, field: &str) -> Option<Value> {
        self.as_object()?.key_value(field)
    }
}

/// Values of `row` at every ordering field.
pub fn boundary_values<R, F>(
    row: &R,
    ordering: &OrderSpec,
    key_of: &F,
) -> Result<CursorValues, PaginationError>
where
    F: Fn(&R, &str) -> Option<Value>,
{
    ordering
        .field_names()
        .map(|field| {
            key_of(row, field)
                .map(|v| (field.to_string(), v))
                .ok_or_else(|| PaginationError::MissingKeyValue(field.to_string()))
        })
        .collect()
}

/* ---------- page assembly ---------- */

/// Assemble a page from rows fetched with [`PageOptions::fetch_limit`] under
/// the cursor's bound and [`fetch_order`].
pub fn paginate<R: KeysetRow>(
    rows: Vec<R>,
    ordering: &OrderSpec,
    options: &PageOptions,
) -> Result<PageResult<R>, PaginationError> {
    paginate_with(rows, ordering, options, |row: &R, field: &str| row.key_value(field))
}

/// [`paginate`] for rows that do not implement [`KeysetRow`].
pub fn paginate_with<R, F>(
    mut rows: Vec<R>,
    ordering: &OrderSpec,
    options: &PageOptions,
    key_of: F,
) -> Result<PageResult<R>, PaginationError>
where
    F: Fn(&R, &str) -> Option<Value>,
{
    if options.size == 0 {
        return Err(PaginationError::InvalidPageSize);
    }
    if ordering.is_empty() {
        return Err(PaginationError::EmptyOrdering);
    }
    if let Some(cursor) = &options.cursor {
        cursor.validate_ordering(ordering)?;
    }

    let size = options.size;
    let fetched = rows.len();
    if fetched as u64 > options.fetch_limit() {
        return Err(PaginationError::Overfetch { got: fetched, size });
    }

    let has_more = fetched as u64 > size;
    if has_more {
        rows.truncate(size as usize);
    }
    if options.direction == PageDirection::Backward {
        rows.reverse();
    }

    if rows.is_empty() {
        tracing::trace!(direction = ?options.direction, "empty page");
        return Ok(PageResult::empty());
    }

    let has_cursor = options.cursor.is_some();
    let (has_next, has_prev) = match options.direction {
        PageDirection::Forward => (has_more, has_cursor),
        PageDirection::Backward => (has_cursor, has_more),
    };

    let mint = |row: &R, direction: PageDirection| -> Result<String, PaginationError> {
        let values = boundary_values(row, ordering, &key_of)?;
        let cursor = Cursor::new(ordering.clone(), values)
            .with_direction(direction)
            .with_filter_hash(options.filter_hash.clone());
        Ok(cursor.encode()?)
    };

    let next_cursor = match rows.last() {
        Some(last) if has_next => Some(mint(last, PageDirection::Forward)?),
        _ => None,
    };

    let first_page_probe = options.include_prev_cursor_on_first_page
        && !has_cursor
        && options.direction == PageDirection::Forward;
    let prev_cursor = match rows.first() {
        Some(first) if has_prev || first_page_probe => Some(mint(first, PageDirection::Backward)?),
        _ => None,
    };

    tracing::debug!(
        items = rows.len(),
        size,
        has_next,
        has_prev,
        direction = ?options.direction,
        "page assembled"
    );

    Ok(PageResult {
        items: rows,
        next_cursor,
        prev_cursor,
        has_next,
        has_prev,
        total_size: None,
    })
}
