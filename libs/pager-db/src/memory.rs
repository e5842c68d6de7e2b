//! Backend over rows held in memory.
//!
//! Evaluation follows SQL semantics so results match the SeaORM backend:
//! comparisons against a missing or null value are unknown, and unknown rows
//! are filtered out. Nulls sort first.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use pager_core::{
    AllowList, BinaryOperator, KeysetBound, KeysetRow, LogicalOperator, OrderSpec, Predicate,
    SortDir, Value,
};

use crate::backend::KeysetBackend;
use crate::error::{BackendError, Result};

/// One in-memory row, keyed by handle.
pub type Record = BTreeMap<String, Value>;

/// Build a record from a JSON object, typing each allowed field by its kind.
///
/// Keys the allow-list does not name are kept untyped. Values that cannot
/// take their field's kind are rejected.
pub fn record_from_json(
    object: &serde_json::Map<String, serde_json::Value>,
    fields: &AllowList<String>,
) -> Result<Record> {
    let mut record = Record::new();
    for (key, json) in object {
        let Some(value) = Value::from_json(json) else {
            continue;
        };
        let value = match fields.kind_of(key) {
            Some(kind) => value.coerce(kind).ok_or_else(|| BackendError::Bind {
                field: key.clone(),
                reason: "value does not match the field kind",
            })?,
            None => value,
        };
        record.insert(key.clone(), value);
    }
    Ok(record)
}

/// Rows plus the ordering picked for them; filtering happens eagerly.
#[derive(Clone, Debug, Default)]
pub struct MemoryQuery {
    rows: Vec<Record>,
    order: Vec<(String, SortDir)>,
}

impl MemoryQuery {
    pub fn new(rows: Vec<Record>) -> Self {
        Self {
            rows,
            order: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Stateless evaluator for [`MemoryQuery`]. Handles are record keys.
#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryBackend;

#[async_trait]
impl KeysetBackend for MemoryBackend {
    type Query = MemoryQuery;
    type Handle = String;
    type Row = Record;

    fn apply_predicate(
        &self,
        mut query: MemoryQuery,
        predicate: &Predicate<String>,
    ) -> Result<MemoryQuery> {
        query.rows.retain(|row| eval(predicate, row) == Some(true));
        Ok(query)
    }

    fn apply_ordering(
        &self,
        mut query: MemoryQuery,
        order: &OrderSpec,
        fields: &AllowList<String>,
    ) -> Result<MemoryQuery> {
        query.order = order
            .keys()
            .iter()
            .map(|key| {
                fields
                    .get(&key.field)
                    .map(|spec| (spec.handle.clone(), key.dir))
                    .ok_or_else(|| BackendError::UnmappedField(key.field.clone()))
            })
            .collect::<Result<_>>()?;
        Ok(query)
    }

    fn apply_bound(
        &self,
        mut query: MemoryQuery,
        bound: &KeysetBound,
        fields: &AllowList<String>,
    ) -> Result<MemoryQuery> {
        for term in bound.groups.iter().flatten() {
            if !fields.contains(&term.field) {
                return Err(BackendError::UnmappedField(term.field.clone()));
            }
        }
        query
            .rows
            .retain(|row| bound.admits(&ByName { row, fields }));
        Ok(query)
    }

    fn key_value(&self, row: &Record, handle: &String) -> Option<Value> {
        row.get(handle).cloned()
    }

    async fn fetch(&self, query: MemoryQuery, limit: u64) -> Result<Vec<Record>> {
        let MemoryQuery { mut rows, order } = query;
        rows.sort_by(|a, b| {
            order
                .iter()
                .map(|(handle, dir)| {
                    let ord = sort_cmp(&lookup(a, handle), &lookup(b, handle));
                    match dir {
                        SortDir::Asc => ord,
                        SortDir::Desc => ord.reverse(),
                    }
                })
                .find(|ord| ord.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }

    async fn count(&self, query: &MemoryQuery) -> Result<u64> {
        Ok(query.rows.len() as u64)
    }
}

/// Record viewed through allowed field names instead of handles.
struct ByName<'a> {
    row: &'a Record,
    fields: &'a AllowList<String>,
}

impl KeysetRow for ByName<'_> {
    fn key_value(&self, field: &str) -> Option<Value> {
        let spec = self.fields.get(field)?;
        self.row.get(&spec.handle).cloned()
    }
}

fn lookup(row: &Record, handle: &str) -> Value {
    row.get(handle).cloned().unwrap_or(Value::Null)
}

fn sort_cmp(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

fn operand(p: &Predicate<String>, row: &Record) -> Option<Value> {
    match p {
        Predicate::Literal(v) => Some(v.clone()),
        Predicate::Field(f) => Some(lookup(row, &f.handle)),
        _ => None,
    }
}

/// Three-valued evaluation; `None` is SQL's unknown.
fn eval(p: &Predicate<String>, row: &Record) -> Option<bool> {
    match p {
        Predicate::Literal(Value::Bool(b)) => Some(*b),
        Predicate::Literal(_) | Predicate::List(_) => None,
        Predicate::Field(f) => match lookup(row, &f.handle) {
            Value::Bool(b) => Some(b),
            _ => None,
        },
        Predicate::Not(inner) => eval(inner, row).map(|b| !b),
        Predicate::Logical(op, items) => {
            // And short-circuits on false, Or on true.
            let decisive = matches!(op, LogicalOperator::Or);
            let mut unknown = false;
            for item in items {
                match eval(item, row) {
                    Some(b) if b == decisive => return Some(decisive),
                    Some(_) => {}
                    None => unknown = true,
                }
            }
            (!unknown).then_some(!decisive)
        }
        Predicate::Binary(op, left, right) => compare(*op, left, right, row),
        Predicate::Call(function, args) => match args.as_slice() {
            [haystack, needle] => match (operand(haystack, row)?, operand(needle, row)?) {
                (Value::String(h), Value::String(n)) => Some(function.matches(&h, &n)),
                _ => None,
            },
            _ => None,
        },
    }
}

fn compare(
    op: BinaryOperator,
    left: &Predicate<String>,
    right: &Predicate<String>,
    row: &Record,
) -> Option<bool> {
    let actual = operand(left, row)?;

    if op == BinaryOperator::In {
        let Predicate::List(items) = right else {
            return None;
        };
        if actual.is_null() {
            return None;
        }
        return Some(
            items
                .iter()
                .any(|item| actual.compare(item) == Some(Ordering::Equal)),
        );
    }

    if let Predicate::Literal(Value::Null) = right {
        return match op {
            BinaryOperator::Eq => Some(actual.is_null()),
            BinaryOperator::Ne => Some(!actual.is_null()),
            _ => None,
        };
    }

    let expected = operand(right, row)?;
    let ord = actual.compare(&expected)?;
    Some(match op {
        BinaryOperator::Eq => ord == Ordering::Equal,
        BinaryOperator::Ne => ord != Ordering::Equal,
        BinaryOperator::Lt => ord == Ordering::Less,
        BinaryOperator::Le => ord != Ordering::Greater,
        BinaryOperator::Gt => ord == Ordering::Greater,
        BinaryOperator::Ge => ord != Ordering::Less,
        BinaryOperator::In => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pager_core::{compile_filter, FieldKind};

    fn fields() -> AllowList<String> {
        AllowList::from_kinds([
            ("name", FieldKind::String),
            ("price", FieldKind::I64),
            ("active", FieldKind::Bool),
            ("note", FieldKind::String),
        ])
    }

    fn rec(name: &str, price: i64, note: Option<&str>) -> Record {
        Record::from([
            ("name".to_string(), Value::from(name)),
            ("price".to_string(), Value::Int(price)),
            ("active".to_string(), Value::Bool(price > 10)),
            ("note".to_string(), Value::from(note)),
        ])
    }

    fn matching(filter: &str) -> Vec<String> {
        let predicate = compile_filter(filter, &fields()).unwrap();
        let rows = vec![
            rec("Alpha", 5, None),
            rec("beta", 15, Some("fragile")),
            rec("Gamma", 25, Some("")),
        ];
        rows.iter()
            .filter(|r| eval(&predicate, r) == Some(true))
            .map(|r| match &r["name"] {
                Value::String(s) => s.clone(),
                other => panic!("unexpected {other:?}"),
            })
            .collect()
    }

    #[test]
    fn test_comparisons_and_logic() {
        assert_eq!(matching("price > 10"), vec!["beta", "Gamma"]);
        assert_eq!(matching("price >= 5 && price < 25"), vec!["Alpha", "beta"]);
        assert_eq!(matching("price == 5 || name == 'Gamma'"), vec!["Alpha", "Gamma"]);
        assert_eq!(matching("!active"), vec!["Alpha"]);
        assert_eq!(matching("10 < price"), vec!["beta", "Gamma"]);
    }

    #[test]
    fn test_null_semantics() {
        assert_eq!(matching("note == null"), vec!["Alpha"]);
        assert_eq!(matching("note != null"), vec!["beta", "Gamma"]);
        // Unknown stays unknown under negation.
        assert_eq!(matching("!(note == 'fragile')"), vec!["Gamma"]);
    }

    #[test]
    fn test_membership_and_functions() {
        assert_eq!(matching("price in [5, 25]"), vec!["Alpha", "Gamma"]);
        assert!(matching("price in []").is_empty());
        assert_eq!(matching("name.contains('A')"), vec!["Alpha", "beta", "Gamma"]);
        assert_eq!(matching("name.startsWith('g')"), vec!["Gamma"]);
        assert_eq!(matching("note.endsWith('ile')"), vec!["beta"]);
    }

    #[test]
    fn test_record_from_json_types_fields() {
        let allow = AllowList::from_kinds([("id", FieldKind::Uuid), ("n", FieldKind::F64)]);
        let json = serde_json::json!({
            "id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "n": 3,
            "extra": "kept"
        });
        let record = record_from_json(json.as_object().unwrap(), &allow).unwrap();
        assert!(matches!(record["id"], Value::Uuid(_)));
        assert_eq!(record["n"], Value::Float(3.0));
        assert_eq!(record["extra"], Value::from("kept"));

        let bad = serde_json::json!({ "id": "nope" });
        assert!(record_from_json(bad.as_object().unwrap(), &allow).is_err());
    }

    #[tokio::test]
    async fn test_fetch_sorts_nulls_first_and_limits() {
        let rows = vec![rec("b", 2, Some("x")), rec("a", 1, None), rec("c", 3, Some("a"))];
        let backend = MemoryBackend;
        let query = backend
            .apply_ordering(
                MemoryQuery::new(rows),
                &OrderSpec::from_signed_tokens("+note,-price").unwrap(),
                &fields(),
            )
            .unwrap();
        let out = backend.fetch(query, 2).await.unwrap();
        assert_eq!(out[0]["name"], Value::from("a"));
        assert_eq!(out[1]["name"], Value::from("c"));
        assert_eq!(out.len(), 2);
    }
}
