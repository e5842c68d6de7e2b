//! Compiled predicates and keyset bounds → `sea_orm::Condition`.
//!
//! Handles are entity columns. Filter text never reaches this module; it only
//! consumes [`Predicate`]s already checked against the allow-list.

use std::marker::PhantomData;
use std::str::FromStr;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use pager_core::{
    AllowList, BinaryOperator, BoundOp, FieldKind, Function, KeysetBound, LogicalOperator,
    OrderSpec, Predicate, SortDir, Value,
};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func, LikeExpr, NullOrdering, Order},
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select,
};

use crate::backend::KeysetBackend;
use crate::error::{BackendError, Result};

/* ---------- value conversion ---------- */

fn bigdecimal_to_decimal(field: &str, bd: &BigDecimal) -> Result<Decimal> {
    // Preserve precision via string.
    let s = bd.normalized().to_string();
    Decimal::from_str_exact(&s)
        .or_else(|_| s.parse::<Decimal>())
        .map_err(|_| BackendError::Bind {
            field: field.to_string(),
            reason: "decimal out of range",
        })
}

/// Typed SQL NULL for a field kind.
fn null_of(kind: FieldKind) -> sea_orm::Value {
    use sea_orm::Value as V;
    match kind {
        FieldKind::String => V::String(None),
        FieldKind::I64 => V::BigInt(None),
        FieldKind::F64 => V::Double(None),
        FieldKind::Decimal => V::Decimal(None),
        FieldKind::Bool => V::Bool(None),
        FieldKind::Uuid => V::Uuid(None),
        FieldKind::DateTimeUtc => V::ChronoDateTimeUtc(None),
        FieldKind::Date => V::ChronoDate(None),
        FieldKind::Time => V::ChronoTime(None),
    }
}

/// Bind a core value as the SQL value of a field of `kind`.
pub fn to_sea_value(field: &str, kind: FieldKind, value: &Value) -> Result<sea_orm::Value> {
    use sea_orm::Value as V;
    Ok(match (kind, value) {
        (_, Value::Null) => null_of(kind),
        (FieldKind::String, Value::String(s)) => V::String(Some(Box::new(s.clone()))),
        (FieldKind::I64, Value::Int(i)) => V::BigInt(Some(*i)),
        (FieldKind::F64, Value::Float(f)) => V::Double(Some(*f)),
        (FieldKind::F64, Value::Int(i)) => V::Double(Some(*i as f64)),
        (FieldKind::Decimal, Value::Decimal(d)) => {
            V::Decimal(Some(Box::new(bigdecimal_to_decimal(field, d)?)))
        }
        (FieldKind::Decimal, Value::Int(i)) => V::Decimal(Some(Box::new(Decimal::from(*i)))),
        (FieldKind::Bool, Value::Bool(b)) => V::Bool(Some(*b)),
        (FieldKind::Uuid, Value::Uuid(u)) => V::Uuid(Some(Box::new(*u))),
        (FieldKind::DateTimeUtc, Value::DateTime(dt)) => V::ChronoDateTimeUtc(Some(Box::new(*dt))),
        (FieldKind::Date, Value::Date(d)) => V::ChronoDate(Some(Box::new(*d))),
        (FieldKind::Time, Value::Time(t)) => V::ChronoTime(Some(Box::new(*t))),
        _ => {
            return Err(BackendError::Bind {
                field: field.to_string(),
                reason: "value does not match the field kind",
            })
        }
    })
}

/// Read a column value back into a core value. `None` for column types
/// that have no core counterpart.
pub fn from_sea_value(value: sea_orm::Value) -> Option<Value> {
    use sea_orm::Value as V;
    Some(match value {
        V::Bool(v) => v.map_or(Value::Null, Value::Bool),
        V::TinyInt(v) => v.map_or(Value::Null, |i| Value::Int(i.into())),
        V::SmallInt(v) => v.map_or(Value::Null, |i| Value::Int(i.into())),
        V::Int(v) => v.map_or(Value::Null, |i| Value::Int(i.into())),
        V::BigInt(v) => v.map_or(Value::Null, Value::Int),
        V::TinyUnsigned(v) => v.map_or(Value::Null, |i| Value::Int(i.into())),
        V::SmallUnsigned(v) => v.map_or(Value::Null, |i| Value::Int(i.into())),
        V::Unsigned(v) => v.map_or(Value::Null, |i| Value::Int(i.into())),
        V::BigUnsigned(v) => match v {
            None => Value::Null,
            Some(u) => Value::Int(i64::try_from(u).ok()?),
        },
        V::Float(v) => v.map_or(Value::Null, |f| Value::Float(f.into())),
        V::Double(v) => v.map_or(Value::Null, Value::Float),
        V::String(v) => v.map_or(Value::Null, |s| Value::String(*s)),
        V::Char(v) => v.map_or(Value::Null, |c| Value::String(c.to_string())),
        V::Uuid(v) => v.map_or(Value::Null, |u| Value::Uuid(*u)),
        V::ChronoDateTimeUtc(v) => v.map_or(Value::Null, |dt| Value::DateTime(*dt)),
        V::ChronoDateTime(v) => v.map_or(Value::Null, |dt| Value::DateTime(dt.and_utc())),
        V::ChronoDateTimeWithTimeZone(v) => {
            v.map_or(Value::Null, |dt| Value::DateTime(dt.with_timezone(&Utc)))
        }
        V::ChronoDate(v) => v.map_or(Value::Null, |d| Value::Date(*d)),
        V::ChronoTime(v) => v.map_or(Value::Null, |t| Value::Time(*t)),
        V::Decimal(v) => match v {
            None => Value::Null,
            Some(d) => Value::Decimal(BigDecimal::from_str(&d.to_string()).ok()?),
        },
        _ => return None,
    })
}

/* ---------- LIKE helpers ---------- */

fn like_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Lower-cased LIKE pattern for a text function, so matching ignores case.
pub fn like_pattern(function: Function, needle: &str) -> String {
    let escaped = like_escape(&needle.to_lowercase());
    match function {
        Function::Contains => format!("%{escaped}%"),
        Function::StartsWith => format!("{escaped}%"),
        Function::EndsWith => format!("%{escaped}"),
    }
}

/* ---------- Predicate -> Condition ---------- */

fn always(truth: bool) -> Condition {
    Condition::all().add(Expr::cust(if truth { "1=1" } else { "1=0" }))
}

pub fn predicate_to_condition<C>(predicate: &Predicate<C>) -> Result<Condition>
where
    C: ColumnTrait + Copy,
{
    Ok(match predicate {
        Predicate::Literal(Value::Bool(b)) => always(*b),
        Predicate::Field(f) if f.kind == FieldKind::Bool => {
            Condition::all().add(Expr::col(f.handle).eq(true))
        }
        Predicate::Not(inner) => Condition::all().not().add(predicate_to_condition(inner)?),
        Predicate::Logical(op, items) => {
            let mut cond = match op {
                LogicalOperator::And => Condition::all(),
                LogicalOperator::Or => Condition::any(),
            };
            for item in items {
                cond = cond.add(predicate_to_condition(item)?);
            }
            cond
        }
        Predicate::Binary(op, left, right) => comparison(*op, left, right)?,
        Predicate::Call(function, args) => match args.as_slice() {
            [Predicate::Field(f), Predicate::Literal(Value::String(needle))] => Condition::all()
                .add(
                    Expr::expr(Func::lower(Expr::col(f.handle)))
                        .like(LikeExpr::new(like_pattern(*function, needle)).escape('\\')),
                ),
            _ => {
                return Err(BackendError::Unsupported(
                    "function arguments other than (field, text)",
                ))
            }
        },
        Predicate::Literal(_) | Predicate::Field(_) | Predicate::List(_) => {
            return Err(BackendError::Unsupported("a non-boolean predicate"))
        }
    })
}

fn comparison<C>(
    op: BinaryOperator,
    left: &Predicate<C>,
    right: &Predicate<C>,
) -> Result<Condition>
where
    C: ColumnTrait + Copy,
{
    let Predicate::Field(field) = left else {
        return Err(BackendError::Unsupported("a comparison without a leading field"));
    };
    let col = field.handle;

    let expr = match (op, right) {
        (BinaryOperator::In, Predicate::List(items)) => {
            if items.is_empty() {
                // IN () → always false
                return Ok(always(false));
            }
            let vals = items
                .iter()
                .map(|v| to_sea_value(&field.name, field.kind, v))
                .collect::<Result<Vec<_>>>()?;
            Expr::col(col).is_in(vals)
        }
        (BinaryOperator::Eq, Predicate::Literal(Value::Null)) => Expr::col(col).is_null(),
        (BinaryOperator::Ne, Predicate::Literal(Value::Null)) => Expr::col(col).is_not_null(),
        (_, Predicate::Literal(v)) => {
            let v = to_sea_value(&field.name, field.kind, v)?;
            compare_expr(op, col, v)?
        }
        (_, Predicate::Field(other)) => compare_expr(op, col, Expr::col(other.handle))?,
        _ => return Err(BackendError::Unsupported("this comparison form")),
    };
    Ok(Condition::all().add(expr))
}

fn compare_expr<C, V>(op: BinaryOperator, col: C, v: V) -> Result<sea_orm::sea_query::SimpleExpr>
where
    C: ColumnTrait + Copy,
    V: Into<sea_orm::sea_query::SimpleExpr>,
{
    Ok(match op {
        BinaryOperator::Eq => Expr::col(col).eq(v),
        BinaryOperator::Ne => Expr::col(col).ne(v),
        BinaryOperator::Gt => Expr::col(col).gt(v),
        BinaryOperator::Ge => Expr::col(col).gte(v),
        BinaryOperator::Lt => Expr::col(col).lt(v),
        BinaryOperator::Le => Expr::col(col).lte(v),
        BinaryOperator::In => return Err(BackendError::Unsupported("'in' without a list")),
    })
}

/* ---------- keyset bound ---------- */

/// Lexicographic OR-chain: `(k0 > v0) OR (k0 = v0 AND k1 > v1) OR ...`.
pub fn bound_to_condition<C>(bound: &KeysetBound, fields: &AllowList<C>) -> Result<Condition>
where
    C: ColumnTrait + Copy,
{
    let mut any = Condition::any();
    for group in &bound.groups {
        let mut all = Condition::all();
        for term in group {
            let spec = fields
                .get(&term.field)
                .ok_or_else(|| BackendError::UnmappedField(term.field.clone()))?;
            let col = Expr::col(spec.handle);
            // Null ranks below every value, matching NULLS FIRST ascending.
            all = match (term.op, term.value.is_null()) {
                (BoundOp::Eq, true) => all.add(col.is_null()),
                (BoundOp::Gt, true) => all.add(col.is_not_null()),
                (BoundOp::Lt, true) => all.add(always(false)),
                (op, false) => {
                    let value = to_sea_value(&term.field, spec.kind, &term.value)?;
                    match op {
                        BoundOp::Eq => all.add(col.eq(value)),
                        BoundOp::Gt => all.add(col.gt(value)),
                        BoundOp::Lt => all.add(
                            Condition::any()
                                .add(Expr::col(spec.handle).lt(value))
                                .add(Expr::col(spec.handle).is_null()),
                        ),
                    }
                }
            };
        }
        any = any.add(all);
    }
    Ok(any)
}

/* ---------- backend ---------- */

/// [`KeysetBackend`] over `Select<E>` on one connection.
pub struct SeaOrmBackend<E> {
    conn: DatabaseConnection,
    _entity: PhantomData<fn() -> E>,
}

impl<E: EntityTrait> SeaOrmBackend<E> {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self {
            conn,
            _entity: PhantomData,
        }
    }

    /// Fresh `SELECT * FROM <entity>`.
    pub fn select(&self) -> Select<E> {
        E::find()
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }
}

#[async_trait]
impl<E> KeysetBackend for SeaOrmBackend<E>
where
    E: EntityTrait,
    E::Column: ColumnTrait + Copy,
    E::Model: Sync,
{
    type Query = Select<E>;
    type Handle = E::Column;
    type Row = E::Model;

    fn apply_predicate(
        &self,
        query: Select<E>,
        predicate: &Predicate<E::Column>,
    ) -> Result<Select<E>> {
        Ok(query.filter(predicate_to_condition(predicate)?))
    }

    fn apply_ordering(
        &self,
        mut query: Select<E>,
        order: &OrderSpec,
        fields: &AllowList<E::Column>,
    ) -> Result<Select<E>> {
        for key in order.keys() {
            let spec = fields
                .get(&key.field)
                .ok_or_else(|| BackendError::UnmappedField(key.field.clone()))?;
            let (ord, nulls) = match key.dir {
                SortDir::Asc => (Order::Asc, NullOrdering::First),
                SortDir::Desc => (Order::Desc, NullOrdering::Last),
            };
            query = query.order_by_with_nulls(spec.handle, ord, nulls);
        }
        Ok(query)
    }

    fn apply_bound(
        &self,
        query: Select<E>,
        bound: &KeysetBound,
        fields: &AllowList<E::Column>,
    ) -> Result<Select<E>> {
        Ok(query.filter(bound_to_condition(bound, fields)?))
    }

    fn key_value(&self, row: &E::Model, handle: &E::Column) -> Option<Value> {
        from_sea_value(row.get(*handle))
    }

    async fn fetch(&self, query: Select<E>, limit: u64) -> Result<Vec<E::Model>> {
        Ok(query.limit(limit).all(&self.conn).await?)
    }

    async fn count(&self, query: &Select<E>) -> Result<u64> {
        Ok(query.clone().count(&self.conn).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_and_lowercases() {
        assert_eq!(like_pattern(Function::Contains, "50%_Off"), "%50\\%\\_off%");
        assert_eq!(like_pattern(Function::StartsWith, "A\\b"), "a\\\\b%");
        assert_eq!(like_pattern(Function::EndsWith, "x"), "%x");
    }

    #[test]
    fn test_value_binding_follows_kind() {
        assert_eq!(
            to_sea_value("n", FieldKind::F64, &Value::Int(2)).unwrap(),
            sea_orm::Value::Double(Some(2.0))
        );
        assert_eq!(
            to_sea_value("n", FieldKind::I64, &Value::Null).unwrap(),
            sea_orm::Value::BigInt(None)
        );
        assert!(to_sea_value("n", FieldKind::I64, &Value::from("2")).is_err());
    }

    #[test]
    fn test_values_read_back() {
        assert_eq!(from_sea_value(sea_orm::Value::Int(Some(7))), Some(Value::Int(7)));
        assert_eq!(from_sea_value(sea_orm::Value::String(None)), Some(Value::Null));
        assert_eq!(from_sea_value(sea_orm::Value::BigUnsigned(Some(u64::MAX))), None);
    }

    #[test]
    fn test_offset_datetimes_read_back_as_utc() {
        use chrono::{DateTime, TimeZone};

        let local = DateTime::parse_from_rfc3339("2024-05-01T14:30:00+02:00").unwrap();
        assert_eq!(
            from_sea_value(sea_orm::Value::ChronoDateTimeWithTimeZone(Some(Box::new(local)))),
            Some(Value::DateTime(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()))
        );
        assert_eq!(
            from_sea_value(sea_orm::Value::ChronoDateTimeWithTimeZone(None)),
            Some(Value::Null)
        );
    }
}
