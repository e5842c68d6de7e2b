//! Filter compilation: syntax tree + allow-list → typed [`Predicate`].
//!
//! A single depth-first pass resolves every field name to the handle the
//! allow-list maps it to, coerces literals into the field's declared kind and
//! rejects operators that make no sense for that kind. Nothing here knows what
//! a handle is; adapters interpret it.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::ast::{BinaryOperator, LogicalOperator, SyntaxNode, UnaryOperator};
use crate::error::{Error, ValidationError};
use crate::parser::{parse_with_limits, ParserLimits};
use crate::value::{FieldKind, Value};

/* ---------- allow-list ---------- */

#[derive(Clone, Debug, PartialEq)]
pub struct FieldSpec<H> {
    pub handle: H,
    pub kind: FieldKind,
}

/// Externally visible field name → backend handle and declared kind.
///
/// Names match exactly. The list is never mutated by compilation, so one
/// instance can be shared across concurrent requests.
#[derive(Clone, Debug, PartialEq)]
pub struct AllowList<H> {
    fields: BTreeMap<String, FieldSpec<H>>,
}

impl<H> Default for AllowList<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> AllowList<H> {
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, handle: H, kind: FieldKind) -> Self {
        self.insert(name, handle, kind);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, handle: H, kind: FieldKind) {
        self.fields.insert(name.into(), FieldSpec { handle, kind });
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec<H>> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.fields.get(name).map(|f| f.kind)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Comma-separated sorted names, used in error messages.
    pub fn describe(&self) -> String {
        self.names().collect::<Vec<_>>().join(", ")
    }
}

impl AllowList<String> {
    /// Allow-list whose handles are the field names themselves.
    pub fn from_kinds<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, FieldKind)>,
        S: Into<String>,
    {
        let mut list = Self::new();
        for (name, kind) in fields {
            let name = name.into();
            list.insert(name.clone(), name, kind);
        }
        list
    }
}

/// A set of permitted field names, as used by the ordering parser.
pub trait FieldSet {
    fn contains_field(&self, name: &str) -> bool;

    /// Sorted, for error messages.
    fn field_names(&self) -> Vec<String>;
}

impl<H> FieldSet for AllowList<H> {
    fn contains_field(&self, name: &str) -> bool {
        self.contains(name)
    }

    fn field_names(&self) -> Vec<String> {
        self.names().map(str::to_string).collect()
    }
}

impl FieldSet for HashSet<String> {
    fn contains_field(&self, name: &str) -> bool {
        self.contains(name)
    }

    fn field_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.iter().cloned().collect();
        names.sort();
        names
    }
}

impl FieldSet for HashSet<&str> {
    fn contains_field(&self, name: &str) -> bool {
        self.contains(name)
    }

    fn field_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.iter().map(|s| s.to_string()).collect();
        names.sort();
        names
    }
}

impl FieldSet for BTreeSet<String> {
    fn contains_field(&self, name: &str) -> bool {
        self.contains(name)
    }

    fn field_names(&self) -> Vec<String> {
        self.iter().cloned().collect()
    }
}

impl FieldSet for [&str] {
    fn contains_field(&self, name: &str) -> bool {
        self.iter().any(|f| *f == name)
    }

    fn field_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.iter().map(|s| s.to_string()).collect();
        names.sort();
        names
    }
}

impl<const N: usize> FieldSet for [&str; N] {
    fn contains_field(&self, name: &str) -> bool {
        self.as_slice().contains_field(name)
    }

    fn field_names(&self) -> Vec<String> {
        self.as_slice().field_names()
    }
}

impl FieldSet for Vec<String> {
    fn contains_field(&self, name: &str) -> bool {
        self.iter().any(|f| f == name)
    }

    fn field_names(&self) -> Vec<String> {
        let mut names = self.clone();
        names.sort();
        names
    }
}

/// Declared kinds by field name, used to re-type cursor values.
pub trait FieldKinds {
    fn kind_of(&self, name: &str) -> Option<FieldKind>;
}

impl<H> FieldKinds for AllowList<H> {
    fn kind_of(&self, name: &str) -> Option<FieldKind> {
        AllowList::kind_of(self, name)
    }
}

impl FieldKinds for HashMap<String, FieldKind> {
    fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.get(name).copied()
    }
}

impl FieldKinds for BTreeMap<String, FieldKind> {
    fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.get(name).copied()
    }
}

/* ---------- predicate tree ---------- */

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedField<H> {
    pub name: String,
    pub handle: H,
    pub kind: FieldKind,
}

/// Functions callable from filter expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Function {
    Contains,
    StartsWith,
    EndsWith,
}

impl Function {
    pub const ALL: [Function; 3] = [Function::Contains, Function::StartsWith, Function::EndsWith];

    pub fn name(self) -> &'static str {
        match self {
            Function::Contains => "contains",
            Function::StartsWith => "startsWith",
            Function::EndsWith => "endsWith",
        }
    }

    /// Arguments including the receiver.
    pub fn arity(self) -> usize {
        2
    }

    /// Names are matched case-insensitively, `startswith` == `startsWith`.
    pub fn lookup(name: &str) -> Option<Function> {
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
    }

    /// Case-insensitive text test shared by adapters that evaluate in memory.
    pub fn matches(self, haystack: &str, needle: &str) -> bool {
        let haystack = haystack.to_lowercase();
        let needle = needle.to_lowercase();
        match self {
            Function::Contains => haystack.contains(&needle),
            Function::StartsWith => haystack.starts_with(&needle),
            Function::EndsWith => haystack.ends_with(&needle),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Validated filter, ready for a backend adapter.
///
/// Comparisons are normalized so a field is always on the left: `5 < price`
/// compiles to `price > 5`. Literals already carry the field's declared kind.
/// The shapes an adapter has to handle are therefore:
///
/// - `Binary(op, Field, Literal)` and `Binary(op, Field, Field)`
/// - `Binary(In, Field, List)`
/// - `Call(f, [Field, Literal(String)])`
/// - `Field` of kind `Bool`, `Literal(Bool)`
/// - `Not` and `Logical` around any of the above
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate<H> {
    Literal(Value),
    Field(ResolvedField<H>),
    List(Vec<Value>),
    Not(Box<Predicate<H>>),
    Binary(BinaryOperator, Box<Predicate<H>>, Box<Predicate<H>>),
    Logical(LogicalOperator, Vec<Predicate<H>>),
    Call(Function, Vec<Predicate<H>>),
}

impl<H> Predicate<H> {
    /// Every resolved field, in visiting order.
    pub fn fields(&self) -> Vec<&ResolvedField<H>> {
        fn walk<'a, H>(p: &'a Predicate<H>, out: &mut Vec<&'a ResolvedField<H>>) {
            match p {
                Predicate::Field(f) => out.push(f),
                Predicate::Literal(_) | Predicate::List(_) => {}
                Predicate::Not(x) => walk(x, out),
                Predicate::Binary(_, a, b) => {
                    walk(a, out);
                    walk(b, out);
                }
                Predicate::Logical(_, items) | Predicate::Call(_, items) => {
                    items.iter().for_each(|x| walk(x, out))
                }
            }
        }

        let mut out = Vec::new();
        walk(self, &mut out);
        out
    }
}

/* ---------- compilation ---------- */

/// Compile a parsed tree against `allow`.
pub fn compile<H: Clone>(
    tree: &SyntaxNode,
    allow: &AllowList<H>,
) -> Result<Predicate<H>, ValidationError> {
    Compiler { allow }.boolean(tree, "filter")
}

/// Parse and compile filter text in one step.
pub fn compile_filter<H: Clone>(text: &str, allow: &AllowList<H>) -> Result<Predicate<H>, Error> {
    compile_filter_with_limits(text, allow, &ParserLimits::default())
}

pub fn compile_filter_with_limits<H: Clone>(
    text: &str,
    allow: &AllowList<H>,
    limits: &ParserLimits,
) -> Result<Predicate<H>, Error> {
    let tree = parse_with_limits(text, limits).inspect_err(|e| {
        tracing::debug!(error = %e, len = text.len(), "filter rejected by parser");
    })?;
    let predicate = compile(&tree, allow).inspect_err(|e| {
        tracing::debug!(error = %e, "filter rejected by allow-list");
    })?;
    tracing::debug!(nodes = tree.node_count(), "filter compiled");
    Ok(predicate)
}

enum Operand<H> {
    Field(ResolvedField<H>),
    Literal(Value),
}

struct Compiler<'a, H> {
    allow: &'a AllowList<H>,
}

impl<H: Clone> Compiler<'_, H> {
    fn resolve(&self, name: &str) -> Result<ResolvedField<H>, ValidationError> {
        let spec = self
            .allow
            .get(name)
            .ok_or_else(|| ValidationError::UnknownField {
                field: name.to_string(),
                allowed: self.allow.describe(),
            })?;
        Ok(ResolvedField {
            name: name.to_string(),
            handle: spec.handle.clone(),
            kind: spec.kind,
        })
    }

    /// A node in a position that must produce true/false.
    fn boolean(
        &self,
        node: &SyntaxNode,
        context: &'static str,
    ) -> Result<Predicate<H>, ValidationError> {
        match node {
            SyntaxNode::Literal(Value::Bool(b)) => Ok(Predicate::Literal(Value::Bool(*b))),
            SyntaxNode::Literal(_) | SyntaxNode::List(_) => {
                Err(ValidationError::NotBoolean { context })
            }
            SyntaxNode::FieldRef(name) => {
                let field = self.resolve(name)?;
                if field.kind != FieldKind::Bool {
                    return Err(ValidationError::TypeMismatch {
                        field: field.name,
                        expected: FieldKind::Bool,
                        got: field.kind.as_str(),
                    });
                }
                Ok(Predicate::Field(field))
            }
            SyntaxNode::Unary(UnaryOperator::Not, inner) => {
                Ok(Predicate::Not(Box::new(self.boolean(inner, "'!'")?)))
            }
            SyntaxNode::Unary(UnaryOperator::Neg, _) => {
                Err(ValidationError::UnsupportedOperand { op: "-" })
            }
            SyntaxNode::Logical(op, items) => {
                let context = match op {
                    LogicalOperator::And => "'&&'",
                    LogicalOperator::Or => "'||'",
                };
                let items = items
                    .iter()
                    .map(|item| self.boolean(item, context))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Predicate::Logical(*op, items))
            }
            SyntaxNode::Binary(BinaryOperator::In, left, right) => self.membership(left, right),
            SyntaxNode::Binary(op, left, right) => self.comparison(*op, left, right),
            SyntaxNode::Call(name, args) => self.call(name, args),
        }
    }

    fn operand(&self, node: &SyntaxNode, op: BinaryOperator) -> Result<Operand<H>, ValidationError> {
        match node {
            SyntaxNode::FieldRef(name) => Ok(Operand::Field(self.resolve(name)?)),
            SyntaxNode::Literal(v) => Ok(Operand::Literal(v.clone())),
            SyntaxNode::Unary(UnaryOperator::Neg, inner) => match self.operand(inner, op)? {
                Operand::Literal(Value::Int(i)) => Ok(Operand::Literal(Value::Int(-i))),
                Operand::Literal(Value::Float(f)) => Ok(Operand::Literal(Value::Float(-f))),
                _ => Err(ValidationError::UnsupportedOperand { op: "-" }),
            },
            _ => Err(ValidationError::UnsupportedComparison { op }),
        }
    }

    fn comparison(
        &self,
        op: BinaryOperator,
        left: &SyntaxNode,
        right: &SyntaxNode,
    ) -> Result<Predicate<H>, ValidationError> {
        match (self.operand(left, op)?, self.operand(right, op)?) {
            (Operand::Field(field), Operand::Literal(value)) => {
                self.field_vs_literal(op, field, value)
            }
            (Operand::Literal(value), Operand::Field(field)) => {
                self.field_vs_literal(op.flipped(), field, value)
            }
            (Operand::Field(a), Operand::Field(b)) => {
                if !a.kind.is_comparable_with(b.kind) {
                    return Err(ValidationError::FieldTypeMismatch {
                        left: a.name,
                        left_kind: a.kind,
                        right: b.name,
                        right_kind: b.kind,
                    });
                }
                if op.is_ordering() && !a.kind.is_ordered() {
                    return Err(ValidationError::OperatorNotAllowed {
                        op,
                        field: a.name,
                        kind: a.kind,
                    });
                }
                Ok(Predicate::Binary(
                    op,
                    Box::new(Predicate::Field(a)),
                    Box::new(Predicate::Field(b)),
                ))
            }
            (Operand::Literal(_), Operand::Literal(_)) => {
                Err(ValidationError::UnsupportedComparison { op })
            }
        }
    }

    fn field_vs_literal(
        &self,
        op: BinaryOperator,
        field: ResolvedField<H>,
        value: Value,
    ) -> Result<Predicate<H>, ValidationError> {
        if value.is_null() {
            if !matches!(op, BinaryOperator::Eq | BinaryOperator::Ne) {
                return Err(ValidationError::NullComparison { op });
            }
            return Ok(Predicate::Binary(
                op,
                Box::new(Predicate::Field(field)),
                Box::new(Predicate::Literal(Value::Null)),
            ));
        }

        if op.is_ordering() && !field.kind.is_ordered() {
            return Err(ValidationError::OperatorNotAllowed {
                op,
                field: field.name,
                kind: field.kind,
            });
        }

        let coerced = coerce_literal(&field, &value)?;
        Ok(Predicate::Binary(
            op,
            Box::new(Predicate::Field(field)),
            Box::new(Predicate::Literal(coerced)),
        ))
    }

    fn membership(
        &self,
        left: &SyntaxNode,
        right: &SyntaxNode,
    ) -> Result<Predicate<H>, ValidationError> {
        let (SyntaxNode::FieldRef(name), SyntaxNode::List(items)) = (left, right) else {
            return Err(ValidationError::InvalidMembership);
        };
        let field = self.resolve(name)?;

        let mut values = Vec::with_capacity(items.len());
        for item in items {
            let value = match self.operand(item, BinaryOperator::In) {
                Ok(Operand::Literal(v)) => v,
                _ => return Err(ValidationError::NonLiteralInList),
            };
            if value.is_null() {
                return Err(ValidationError::NullComparison {
                    op: BinaryOperator::In,
                });
            }
            values.push(coerce_literal(&field, &value)?);
        }

        Ok(Predicate::Binary(
            BinaryOperator::In,
            Box::new(Predicate::Field(field)),
            Box::new(Predicate::List(values)),
        ))
    }

    fn call(&self, name: &str, args: &[SyntaxNode]) -> Result<Predicate<H>, ValidationError> {
        let function =
            Function::lookup(name).ok_or_else(|| ValidationError::UnknownFunction(name.to_string()))?;

        if args.len() != function.arity() {
            return Err(ValidationError::WrongArity {
                function: function.name().to_string(),
                expected: function.arity(),
                got: args.len(),
            });
        }

        let SyntaxNode::FieldRef(receiver) = &args[0] else {
            return Err(ValidationError::InvalidArgument {
                function: function.name().to_string(),
                reason: "receiver must be a field",
            });
        };
        let field = self.resolve(receiver)?;
        if field.kind != FieldKind::String {
            return Err(ValidationError::TypeMismatch {
                field: field.name,
                expected: FieldKind::String,
                got: field.kind.as_str(),
            });
        }

        let SyntaxNode::Literal(Value::String(needle)) = &args[1] else {
            return Err(ValidationError::InvalidArgument {
                function: function.name().to_string(),
                reason: "argument must be a string literal",
            });
        };

        Ok(Predicate::Call(
            function,
            vec![
                Predicate::Field(field),
                Predicate::Literal(Value::String(needle.clone())),
            ],
        ))
    }
}

fn coerce_literal<H>(field: &ResolvedField<H>, value: &Value) -> Result<Value, ValidationError> {
    value
        .coerce(field.kind)
        .ok_or_else(|| ValidationError::TypeMismatch {
            field: field.name.clone(),
            expected: field.kind,
            got: value.type_name(),
        })
}
