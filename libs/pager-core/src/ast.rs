//! Syntax tree produced by the filter parser.

use std::fmt;

pub use crate::value::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum SyntaxNode {
    Literal(Value),
    /// Field reference; dotted paths stay a single opaque name.
    FieldRef(String),
    /// `[a, b, c]`, only meaningful as the right side of `in`.
    List(Vec<SyntaxNode>),
    Unary(UnaryOperator, Box<SyntaxNode>),
    Binary(BinaryOperator, Box<SyntaxNode>, Box<SyntaxNode>),
    Logical(LogicalOperator, Vec<SyntaxNode>),
    /// Function call. Method syntax `x.f(a)` is stored as `f(x, a)`.
    Call(String, Vec<SyntaxNode>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Not,
    Neg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    And,
    Or,
}

impl BinaryOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOperator::Eq => "==",
            BinaryOperator::Ne => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::In => "in",
        }
    }

    /// `<`, `<=`, `>`, `>=`
    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            BinaryOperator::Lt | BinaryOperator::Le | BinaryOperator::Gt | BinaryOperator::Ge
        )
    }

    /// The operator that gives the same result with operands swapped.
    pub fn flipped(self) -> Self {
        match self {
            BinaryOperator::Lt => BinaryOperator::Gt,
            BinaryOperator::Le => BinaryOperator::Ge,
            BinaryOperator::Gt => BinaryOperator::Lt,
            BinaryOperator::Ge => BinaryOperator::Le,
            other => other,
        }
    }
}

impl UnaryOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOperator::Not => "!",
            UnaryOperator::Neg => "-",
        }
    }
}

impl LogicalOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            LogicalOperator::And => "&&",
            LogicalOperator::Or => "||",
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SyntaxNode {
    pub fn field(name: impl Into<String>) -> Self {
        SyntaxNode::FieldRef(name.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        SyntaxNode::Literal(value.into())
    }

    pub fn binary(op: BinaryOperator, left: SyntaxNode, right: SyntaxNode) -> Self {
        SyntaxNode::Binary(op, Box::new(left), Box::new(right))
    }

    /// Number of nodes in the tree, used for complexity budgets.
    pub fn node_count(&self) -> usize {
        match self {
            SyntaxNode::Literal(_) | SyntaxNode::FieldRef(_) => 1,
            SyntaxNode::Unary(_, x) => 1 + x.node_count(),
            SyntaxNode::Binary(_, a, b) => 1 + a.node_count() + b.node_count(),
            SyntaxNode::List(items)
            | SyntaxNode::Logical(_, items)
            | SyntaxNode::Call(_, items) => {
                1 + items.iter().map(SyntaxNode::node_count).sum::<usize>()
            }
        }
    }

    /// Every field name referenced anywhere in the tree, in visiting order.
    pub fn field_names(&self) -> Vec<&str> {
        fn walk<'a>(node: &'a SyntaxNode, out: &mut Vec<&'a str>) {
            match node {
                SyntaxNode::FieldRef(name) => out.push(name),
                SyntaxNode::Literal(_) => {}
                SyntaxNode::Unary(_, x) => walk(x, out),
                SyntaxNode::Binary(_, a, b) => {
                    walk(a, out);
                    walk(b, out);
                }
                SyntaxNode::List(items)
                | SyntaxNode::Logical(_, items)
                | SyntaxNode::Call(_, items) => items.iter().for_each(|x| walk(x, out)),
            }
        }

        let mut out = Vec::new();
        walk(self, &mut out);
        out
    }
}

impl fmt::Display for SyntaxNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyntaxNode::Literal(v) => write!(f, "{v}"),
            SyntaxNode::FieldRef(name) => f.write_str(name),
            SyntaxNode::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            SyntaxNode::Unary(op, x) => write!(f, "{op}({x})"),
            SyntaxNode::Binary(op, a, b) => write!(f, "({a} {op} {b})"),
            SyntaxNode::Logical(op, items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {op} ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            SyntaxNode::Call(name, args) => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}
