//! Filter expression parser.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr     := or
//! or       := and ( "||" and )*
//! and      := relation ( "&&" relation )*
//! relation := unary ( ("==" | "!=" | "<" | "<=" | ">" | ">=" | "in") unary )?
//! unary    := ("!" | "-") unary | primary
//! primary  := literal | "(" expr ")" | "[" list "]" | path ( "(" args ")" )?
//! path     := IDENT ( "." IDENT )*
//! ```
//!
//! A path followed by arguments is a call; with more than one segment the last
//! segment is the method and the rest is the receiver field.

use crate::ast::{BinaryOperator, LogicalOperator, SyntaxNode, UnaryOperator};
use crate::error::ParseError;
use crate::value::Value;

pub const MAX_FILTER_LEN: usize = 8 * 1024;
pub const MAX_NODES: usize = 2000;
pub const MAX_DEPTH: usize = 64;

/// Budgets applied to untrusted filter text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParserLimits {
    pub max_len: usize,
    pub max_nodes: usize,
    pub max_depth: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_len: MAX_FILTER_LEN,
            max_nodes: MAX_NODES,
            max_depth: MAX_DEPTH,
        }
    }
}

/// Parse filter text with the default budgets.
pub fn parse(expr: &str) -> Result<SyntaxNode, ParseError> {
    parse_with_limits(expr, &ParserLimits::default())
}

pub fn parse_with_limits(expr: &str, limits: &ParserLimits) -> Result<SyntaxNode, ParseError> {
    if expr.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    if expr.len() > limits.max_len {
        return Err(ParseError::TooLong {
            len: expr.len(),
            max: limits.max_len,
        });
    }

    let tokens = tokenize(expr)?;
    let mut parser = Parser {
        tokens,
        idx: 0,
        depth: 0,
        max_depth: limits.max_depth,
    };

    let node = parser.parse_expr()?;
    let next = parser.peek();
    if next.tok != Tok::Eof {
        return Err(ParseError::UnexpectedToken {
            found: next.tok.describe(),
            expected: "end of expression",
            position: next.pos,
        });
    }

    let nodes = node.node_count();
    if nodes > limits.max_nodes {
        return Err(ParseError::TooComplex {
            nodes,
            max: limits.max_nodes,
        });
    }

    Ok(node)
}

/* ---------- lexer ---------- */

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    Null,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Minus,
    Eof,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Ident(s) => format!("identifier '{s}'"),
            Tok::Int(i) => format!("number {i}"),
            Tok::Float(f) => format!("number {f}"),
            Tok::Str(s) => format!("string {s:?}"),
            Tok::True => "'true'".into(),
            Tok::False => "'false'".into(),
            Tok::Null => "'null'".into(),
            Tok::In => "'in'".into(),
            Tok::LParen => "'('".into(),
            Tok::RParen => "')'".into(),
            Tok::LBracket => "'['".into(),
            Tok::RBracket => "']'".into(),
            Tok::Comma => "','".into(),
            Tok::Dot => "'.'".into(),
            Tok::EqEq => "'=='".into(),
            Tok::NotEq => "'!='".into(),
            Tok::Lt => "'<'".into(),
            Tok::Le => "'<='".into(),
            Tok::Gt => "'>'".into(),
            Tok::Ge => "'>='".into(),
            Tok::AndAnd => "'&&'".into(),
            Tok::OrOr => "'||'".into(),
            Tok::Bang => "'!'".into(),
            Tok::Minus => "'-'".into(),
            Tok::Eof => "end of input".into(),
        }
    }

    fn relation(&self) -> Option<BinaryOperator> {
        Some(match self {
            Tok::EqEq => BinaryOperator::Eq,
            Tok::NotEq => BinaryOperator::Ne,
            Tok::Lt => BinaryOperator::Lt,
            Tok::Le => BinaryOperator::Le,
            Tok::Gt => BinaryOperator::Gt,
            Tok::Ge => BinaryOperator::Ge,
            Tok::In => BinaryOperator::In,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug)]
struct Token {
    tok: Tok,
    pos: usize,
}

fn tokenize(src: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer { src, pos: 0 };
    let mut out = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.tok == Tok::Eof;
        out.push(token);
        if done {
            return Ok(out);
        }
    }
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl Lexer<'_> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.src[self.pos..].chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }

        let start = self.pos;
        let Some(c) = self.bump() else {
            return Ok(Token {
                tok: Tok::Eof,
                pos: start,
            });
        };

        let unexpected = |ch| ParseError::UnexpectedChar {
            ch,
            position: start,
        };

        let tok = match c {
            '(' => Tok::LParen,
            ')' => Tok::RParen,
            '[' => Tok::LBracket,
            ']' => Tok::RBracket,
            ',' => Tok::Comma,
            '.' => Tok::Dot,
            '-' => Tok::Minus,
            '=' if self.eat('=') => Tok::EqEq,
            '!' if self.eat('=') => Tok::NotEq,
            '!' => Tok::Bang,
            '<' if self.eat('=') => Tok::Le,
            '<' => Tok::Lt,
            '>' if self.eat('=') => Tok::Ge,
            '>' => Tok::Gt,
            '&' if self.eat('&') => Tok::AndAnd,
            '|' if self.eat('|') => Tok::OrOr,
            '\'' | '"' => self.string(c, start)?,
            c if c.is_ascii_digit() => self.number(start)?,
            c if c.is_ascii_alphabetic() || c == '_' => self.ident(start),
            other => return Err(unexpected(other)),
        };

        Ok(Token { tok, pos: start })
    }

    fn string(&mut self, quote: char, start: usize) -> Result<Tok, ParseError> {
        let mut out = String::new();
        loop {
            let at = self.pos;
            match self.bump() {
                None => return Err(ParseError::UnterminatedString { position: start }),
                Some(c) if c == quote => return Ok(Tok::Str(out)),
                Some('\\') => {
                    let escaped = match self.bump() {
                        None => return Err(ParseError::UnterminatedString { position: start }),
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('\\') => '\\',
                        Some('\'') => '\'',
                        Some('"') => '"',
                        Some(other) => {
                            return Err(ParseError::InvalidEscape {
                                ch: other,
                                position: at,
                            })
                        }
                    };
                    out.push(escaped);
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn number(&mut self, start: usize) -> Result<Tok, ParseError> {
        let mut is_float = false;
        self.digits();

        if self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.bump();
            self.digits();
        }

        if matches!(self.peek(), Some('e' | 'E')) {
            let exp_follows = match self.peek_second() {
                Some(c) if c.is_ascii_digit() => true,
                Some('+' | '-') => self.src[self.pos..]
                    .chars()
                    .nth(2)
                    .is_some_and(|c| c.is_ascii_digit()),
                _ => false,
            };
            if exp_follows {
                is_float = true;
                self.bump();
                if matches!(self.peek(), Some('+' | '-')) {
                    self.bump();
                }
                self.digits();
            }
        }

        // `12abc` is one bad literal, not a number followed by a name.
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.bump();
        }

        let literal = &self.src[start..self.pos];
        let invalid = || ParseError::InvalidNumber {
            literal: literal.to_string(),
            position: start,
        };

        if is_float {
            literal
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Tok::Float)
                .ok_or_else(invalid)
        } else {
            literal.parse::<i64>().map(Tok::Int).map_err(|_| invalid())
        }
    }

    fn digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
    }

    fn ident(&mut self, start: usize) -> Tok {
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.bump();
        }
        match &self.src[start..self.pos] {
            "true" => Tok::True,
            "false" => Tok::False,
            "null" => Tok::Null,
            "in" => Tok::In,
            name => Tok::Ident(name.to_string()),
        }
    }
}

/* ---------- recursive descent ---------- */

struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The token stream always ends with Eof.
        &self.tokens[self.idx.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.idx < self.tokens.len() - 1 {
            self.idx += 1;
        }
        token
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        let token = self.peek();
        ParseError::UnexpectedToken {
            found: token.tok.describe(),
            expected,
            position: token.pos,
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(ParseError::TooDeep {
                max: self.max_depth,
                position: self.peek().pos,
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn parse_expr(&mut self) -> Result<SyntaxNode, ParseError> {
        self.enter()?;
        let node = self.parse_or();
        self.leave();
        node
    }

    fn parse_or(&mut self) -> Result<SyntaxNode, ParseError> {
        self.parse_chain(LogicalOperator::Or, Tok::OrOr, Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<SyntaxNode, ParseError> {
        self.parse_chain(LogicalOperator::And, Tok::AndAnd, Self::parse_relation)
    }

    fn parse_chain(
        &mut self,
        op: LogicalOperator,
        token: Tok,
        operand: fn(&mut Self) -> Result<SyntaxNode, ParseError>,
    ) -> Result<SyntaxNode, ParseError> {
        let first = operand(self)?;
        if self.peek().tok != token {
            return Ok(first);
        }

        let mut operands = vec![first];
        while self.peek().tok == token {
            self.advance();
            operands.push(operand(self)?);
        }
        Ok(SyntaxNode::Logical(op, operands))
    }

    fn parse_relation(&mut self) -> Result<SyntaxNode, ParseError> {
        let left = self.parse_unary()?;
        let Some(op) = self.peek().tok.relation() else {
            return Ok(left);
        };
        self.advance();

        let right = self.parse_unary()?;
        if self.peek().tok.relation().is_some() {
            return Err(self.unexpected("'&&', '||' or ')' (comparisons do not chain)"));
        }
        Ok(SyntaxNode::binary(op, left, right))
    }

    fn parse_unary(&mut self) -> Result<SyntaxNode, ParseError> {
        let op = match self.peek().tok {
            Tok::Bang => UnaryOperator::Not,
            Tok::Minus => UnaryOperator::Neg,
            _ => return self.parse_primary(),
        };
        self.advance();

        self.enter()?;
        let operand = self.parse_unary();
        self.leave();
        Ok(SyntaxNode::Unary(op, Box::new(operand?)))
    }

    fn parse_primary(&mut self) -> Result<SyntaxNode, ParseError> {
        let node = match &self.peek().tok {
            Tok::Int(i) => SyntaxNode::Literal(Value::Int(*i)),
            Tok::Float(f) => SyntaxNode::Literal(Value::Float(*f)),
            Tok::Str(s) => SyntaxNode::Literal(Value::String(s.clone())),
            Tok::True => SyntaxNode::Literal(Value::Bool(true)),
            Tok::False => SyntaxNode::Literal(Value::Bool(false)),
            Tok::Null => SyntaxNode::Literal(Value::Null),
            Tok::LParen => return self.parse_group(),
            Tok::LBracket => return self.parse_list(),
            Tok::Ident(_) => return self.parse_path(),
            _ => return Err(self.unexpected("an expression")),
        };
        self.advance();
        Ok(node)
    }

    fn parse_group(&mut self) -> Result<SyntaxNode, ParseError> {
        let open = self.advance().pos;
        let inner = self.parse_expr()?;
        match self.peek().tok {
            Tok::RParen => {
                self.advance();
                Ok(inner)
            }
            Tok::Eof => Err(ParseError::Unbalanced {
                open: '(',
                position: open,
            }),
            _ => Err(self.unexpected("')'")),
        }
    }

    fn parse_list(&mut self) -> Result<SyntaxNode, ParseError> {
        let open = self.advance().pos;
        let items = self.parse_sequence(Tok::RBracket, '[', open, "',' or ']'")?;
        Ok(SyntaxNode::List(items))
    }

    /// Comma-separated expressions up to `close`, which is consumed.
    fn parse_sequence(
        &mut self,
        close: Tok,
        open_char: char,
        open: usize,
        expected: &'static str,
    ) -> Result<Vec<SyntaxNode>, ParseError> {
        let mut items = Vec::new();
        if self.peek().tok == close {
            self.advance();
            return Ok(items);
        }

        loop {
            items.push(self.parse_expr()?);
            match &self.peek().tok {
                Tok::Comma => {
                    self.advance();
                }
                t if *t == close => {
                    self.advance();
                    return Ok(items);
                }
                Tok::Eof => {
                    return Err(ParseError::Unbalanced {
                        open: open_char,
                        position: open,
                    })
                }
                _ => return Err(self.unexpected(expected)),
            }
        }
    }

    fn parse_path(&mut self) -> Result<SyntaxNode, ParseError> {
        let mut segments = Vec::new();
        if let Tok::Ident(first) = self.advance().tok {
            segments.push(first);
        }

        while self.peek().tok == Tok::Dot {
            self.advance();
            match self.peek().tok.clone() {
                Tok::Ident(segment) => {
                    self.advance();
                    segments.push(segment);
                }
                _ => return Err(self.unexpected("an identifier after '.'")),
            }
        }

        if self.peek().tok != Tok::LParen {
            return Ok(SyntaxNode::FieldRef(segments.join(".")));
        }

        let open = self.advance().pos;
        let args = self.parse_sequence(Tok::RParen, '(', open, "',' or ')'")?;

        let name = segments.pop().unwrap_or_default();
        if segments.is_empty() {
            return Ok(SyntaxNode::Call(name, args));
        }

        let mut call_args = Vec::with_capacity(args.len() + 1);
        call_args.push(SyntaxNode::FieldRef(segments.join(".")));
        call_args.extend(args);
        Ok(SyntaxNode::Call(name, call_args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SyntaxNode as N;

    fn field(name: &str) -> N {
        N::field(name)
    }

    #[test]
    fn test_simple_comparison() {
        let node = parse("price >= 20000").unwrap();
        assert_eq!(
            node,
            N::binary(BinaryOperator::Ge, field("price"), N::literal(20000i64))
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let node = parse("a == 1 || b == 2 && c == 3").unwrap();
        let N::Logical(LogicalOperator::Or, ops) = node else {
            panic!("expected OR at the root");
        };
        assert_eq!(ops.len(), 2);
        assert!(matches!(ops[1], N::Logical(LogicalOperator::And, ref inner) if inner.len() == 2));
    }

    #[test]
    fn test_logical_chain_is_flat() {
        let node = parse("a == 1 && b == 2 && c == 3").unwrap();
        assert!(matches!(node, N::Logical(LogicalOperator::And, ref ops) if ops.len() == 3));
    }

    #[test]
    fn test_parentheses_group() {
        let node = parse("(a == 1 || b == 2) && c == 3").unwrap();
        let N::Logical(LogicalOperator::And, ops) = node else {
            panic!("expected AND at the root");
        };
        assert!(matches!(ops[0], N::Logical(LogicalOperator::Or, _)));
    }

    #[test]
    fn test_method_call_syntax() {
        let node = parse("name.contains('phone')").unwrap();
        assert_eq!(
            node,
            N::Call("contains".into(), vec![field("name"), N::literal("phone")])
        );
    }

    #[test]
    fn test_free_call_and_method_call_agree() {
        assert_eq!(
            parse("startsWith(name, \"Pro\")").unwrap(),
            parse("name.startsWith('Pro')").unwrap()
        );
    }

    #[test]
    fn test_dotted_path_is_one_field() {
        assert_eq!(
            parse("owner.name == 'x'").unwrap(),
            N::binary(BinaryOperator::Eq, field("owner.name"), N::literal("x"))
        );
        let call = parse("owner.name.endsWith('son')").unwrap();
        assert_eq!(
            call,
            N::Call("endsWith".into(), vec![field("owner.name"), N::literal("son")])
        );
    }

    #[test]
    fn test_membership_list() {
        let node = parse("category in ['electronics', 'books']").unwrap();
        assert_eq!(
            node,
            N::binary(
                BinaryOperator::In,
                field("category"),
                N::List(vec![N::literal("electronics"), N::literal("books")])
            )
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            parse("x == 1.5e2").unwrap(),
            N::binary(BinaryOperator::Eq, field("x"), N::Literal(Value::Float(150.0)))
        );
        assert_eq!(
            parse("x != null").unwrap(),
            N::binary(BinaryOperator::Ne, field("x"), N::Literal(Value::Null))
        );
        assert_eq!(
            parse("!active").unwrap(),
            N::Unary(UnaryOperator::Not, Box::new(field("active")))
        );
        assert_eq!(
            parse("x > -3").unwrap(),
            N::binary(
                BinaryOperator::Gt,
                field("x"),
                N::Unary(UnaryOperator::Neg, Box::new(N::literal(3i64)))
            )
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            parse(r#"name == 'it\'s "ok"\n'"#).unwrap(),
            N::binary(BinaryOperator::Eq, field("name"), N::literal("it's \"ok\"\n"))
        );
        assert!(matches!(
            parse(r"name == 'bad \q'"),
            Err(ParseError::InvalidEscape { ch: 'q', .. })
        ));
    }

    #[test]
    fn test_parse_is_deterministic() {
        let text = "price >= 20000 && category in ['a', 'b'] || !name.contains('x')";
        assert_eq!(parse(text).unwrap(), parse(text).unwrap());
    }

    #[test]
    fn test_empty_expression() {
        assert_eq!(parse(""), Err(ParseError::Empty));
        assert_eq!(parse("   "), Err(ParseError::Empty));
    }

    #[test]
    fn test_malformed_expressions() {
        assert!(matches!(parse("invalid && &&"), Err(ParseError::UnexpectedToken { .. })));
        assert!(matches!(
            parse("(a == 1"),
            Err(ParseError::Unbalanced { open: '(', position: 0 })
        ));
        assert!(matches!(parse("a == 1)"), Err(ParseError::UnexpectedToken { .. })));
        assert!(matches!(
            parse("a = 1"),
            Err(ParseError::UnexpectedChar { ch: '=', position: 2 })
        ));
        assert!(matches!(parse("a == 'open"), Err(ParseError::UnterminatedString { .. })));
        assert!(matches!(parse("a == 12abc"), Err(ParseError::InvalidNumber { .. })));
        assert!(matches!(
            parse("a == 99999999999999999999"),
            Err(ParseError::InvalidNumber { .. })
        ));
        assert!(matches!(parse("1 < a < 3"), Err(ParseError::UnexpectedToken { .. })));
        assert!(matches!(parse("x in [1, 2"), Err(ParseError::Unbalanced { open: '[', .. })));
        assert!(matches!(parse("a.#"), Err(ParseError::UnexpectedChar { ch: '#', .. })));
    }

    #[test]
    fn test_error_positions() {
        let err = parse("a == 1 && @").unwrap_err();
        assert_eq!(err.position(), Some(10));
    }

    #[test]
    fn test_limits() {
        let limits = ParserLimits {
            max_len: 10,
            ..ParserLimits::default()
        };
        assert!(matches!(
            parse_with_limits("name == 'too long'", &limits),
            Err(ParseError::TooLong { max: 10, .. })
        ));

        let limits = ParserLimits {
            max_nodes: 3,
            ..ParserLimits::default()
        };
        assert!(parse_with_limits("a == 1", &limits).is_ok());
        assert!(matches!(
            parse_with_limits("a == 1 && b == 2", &limits),
            Err(ParseError::TooComplex { nodes: 7, max: 3 })
        ));

        let deep = format!("{}a == 1{}", "(".repeat(100), ")".repeat(100));
        assert!(matches!(parse(&deep), Err(ParseError::TooDeep { .. })));
    }
}
