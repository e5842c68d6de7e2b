//! Filter fingerprints bound into cursors.

use sha2::{Digest, Sha256};

use crate::ast::{BinaryOperator, LogicalOperator, SyntaxNode, UnaryOperator};
use crate::value::Value;

/// Stable textual form of a filter tree.
///
/// Whitespace, quote style and function-name case in the original text do not
/// affect the result; field names and literal contents do.
#[must_use]
pub fn normalize_filter_for_hash(node: &SyntaxNode) -> String {
    fn join(items: &[SyntaxNode]) -> String {
        items.iter().map(normalize_filter_for_hash).collect::<Vec<_>>().join(",")
    }

    match node {
        SyntaxNode::Literal(value) => match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => format!("BOOL({b})"),
            Value::Int(i) => format!("INT({i})"),
            Value::Float(f) => format!("FLOAT({f:?})"),
            Value::String(s) => format!("STR({s:?})"),
            other => format!("LIT({})", other.to_json()),
        },
        SyntaxNode::FieldRef(name) => format!("ID({name})"),
        SyntaxNode::List(items) => format!("LIST({})", join(items)),
        SyntaxNode::Unary(op, inner) => {
            let op = match op {
                UnaryOperator::Not => "NOT",
                UnaryOperator::Neg => "NEG",
            };
            format!("{op}({})", normalize_filter_for_hash(inner))
        }
        SyntaxNode::Binary(op, left, right) => {
            let op = match op {
                BinaryOperator::Eq => "EQ",
                BinaryOperator::Ne => "NE",
                BinaryOperator::Lt => "LT",
                BinaryOperator::Le => "LE",
                BinaryOperator::Gt => "GT",
                BinaryOperator::Ge => "GE",
                BinaryOperator::In => "IN",
            };
            format!(
                "CMP({},{op},{})",
                normalize_filter_for_hash(left),
                normalize_filter_for_hash(right)
            )
        }
        SyntaxNode::Logical(op, items) => {
            let op = match op {
                LogicalOperator::And => "AND",
                LogicalOperator::Or => "OR",
            };
            format!("{op}({})", join(items))
        }
        SyntaxNode::Call(name, args) => format!("FN({},{})", name.to_lowercase(), join(args)),
    }
}

/// 16 hex chars (first 64 bits of SHA-256) of the normalized tree.
#[must_use]
pub fn short_filter_hash(node: Option<&SyntaxNode>) -> Option<String> {
    node.map(|n| {
        let digest = Sha256::digest(normalize_filter_for_hash(n).as_bytes());
        hex::encode(&digest[..8])
    })
}
