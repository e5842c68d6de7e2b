//! Error kinds, one closed enum per component plus a unified [`Error`].

use thiserror::Error;

use crate::ast::BinaryOperator;
use crate::value::FieldKind;

/// Malformed filter text. Always a caller-input defect.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("filter expression cannot be empty")]
    Empty,

    #[error("filter expression too long: {len} bytes (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("filter expression too complex: {nodes} nodes (max {max})")]
    TooComplex { nodes: usize, max: usize },

    #[error("filter expression nested deeper than {max} levels at position {position}")]
    TooDeep { max: usize, position: usize },

    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedChar { ch: char, position: usize },

    #[error("unterminated string literal starting at position {position}")]
    UnterminatedString { position: usize },

    #[error("invalid escape sequence '\\{ch}' at position {position}")]
    InvalidEscape { ch: char, position: usize },

    #[error("invalid number literal '{literal}' at position {position}")]
    InvalidNumber { literal: String, position: usize },

    #[error("unexpected {found} at position {position}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
        position: usize,
    },

    #[error("unbalanced '{open}' opened at position {position}")]
    Unbalanced { open: char, position: usize },
}

impl ParseError {
    /// Byte offset into the expression text, when the error has one.
    pub fn position(&self) -> Option<usize> {
        match self {
            ParseError::Empty | ParseError::TooLong { .. } | ParseError::TooComplex { .. } => None,
            ParseError::TooDeep { position, .. }
            | ParseError::UnexpectedChar { position, .. }
            | ParseError::UnterminatedString { position }
            | ParseError::InvalidEscape { position, .. }
            | ParseError::InvalidNumber { position, .. }
            | ParseError::UnexpectedToken { position, .. }
            | ParseError::Unbalanced { position, .. } => Some(*position),
        }
    }
}

/// Well-formed filter that references something the allow-list forbids.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("field not allowed: {field}. Allowed: {allowed}")]
    UnknownField { field: String, allowed: String },

    #[error("type mismatch on '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: FieldKind,
        got: &'static str,
    },

    #[error("operator '{op}' is not supported for {kind} field '{field}'")]
    OperatorNotAllowed {
        op: BinaryOperator,
        field: String,
        kind: FieldKind,
    },

    #[error("null can only be compared with '==' or '!=', got '{op}'")]
    NullComparison { op: BinaryOperator },

    #[error("cannot compare {left_kind} field '{left}' with {right_kind} field '{right}'")]
    FieldTypeMismatch {
        left: String,
        left_kind: FieldKind,
        right: String,
        right_kind: FieldKind,
    },

    #[error("comparison '{op}' must reference a field")]
    UnsupportedComparison { op: BinaryOperator },

    #[error("left side of 'in' must be a field and right side a list")]
    InvalidMembership,

    #[error("list items must be literals")]
    NonLiteralInList,

    #[error("{context} expects a boolean operand")]
    NotBoolean { context: &'static str },

    #[error("operator '{op}' cannot be applied here")]
    UnsupportedOperand { op: &'static str },

    #[error("unsupported function: {0}()")]
    UnknownFunction(String),

    #[error("{function}() takes {expected} arguments, got {got}")]
    WrongArity {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid argument for {function}(): {reason}")]
    InvalidArgument {
        function: String,
        reason: &'static str,
    },
}

/// Bad ordering request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderingError {
    #[error("ordering must contain at least one field")]
    Empty,

    #[error("invalid ordering token: '{0}'")]
    InvalidToken(String),

    #[error("ordering field '{field}' not allowed. Allowed: {allowed}")]
    NotAllowed { field: String, allowed: String },

    #[error("ordering field '{0}' appears more than once")]
    Duplicate(String),

    #[error("too many ordering fields: {count} (max {max})")]
    TooManyFields { count: usize, max: usize },
}

/// Untrusted cursor that cannot be used. Callers restart from the first page.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CursorError {
    #[error("cursor cannot be empty")]
    Empty,

    #[error("cursor too long: {len} bytes (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("cursor contains invalid base64url encoding")]
    InvalidBase64,

    #[error("cursor contains malformed JSON")]
    InvalidJson,

    #[error("cursor must decode to an object")]
    NotAnObject,

    #[error("cursor missing required keys: 'o' (ordering) and 'v' (values)")]
    MissingKeys,

    #[error("invalid cursor format: {0}")]
    InvalidShape(&'static str),

    #[error("invalid ordering token in cursor: '{0}'")]
    InvalidOrderingToken(String),

    #[error("cursor ordering repeats field '{0}'")]
    DuplicateField(String),

    #[error("cursor ordering cannot be empty")]
    EmptyOrdering,

    #[error("invalid cursor direction: {0}")]
    InvalidDirection(String),

    #[error("cursor value for '{field}' is not a scalar")]
    UnreadableValue { field: String },

    #[error("cursor value for '{field}' is not a valid {expected}")]
    ValueType { field: String, expected: FieldKind },

    #[error("cursor values do not match ordering fields (missing: [{}], unexpected: [{}])", .missing.join(", "), .unexpected.join(", "))]
    FieldSetMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("cursor ordering mismatch. Expected: [{expected}], Got: [{got}]")]
    OrderMismatch { expected: String, got: String },

    #[error("cursor was issued for a different filter")]
    FilterMismatch,

    #[error("value for '{field}' has no cursor encoding")]
    UnencodableValue { field: String },
}

/// Invariant violation between an adapter and the engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PaginationError {
    #[error("page size must be positive")]
    InvalidPageSize,

    #[error("at least one ordering field is required")]
    EmptyOrdering,

    #[error("adapter returned {got} rows for a page of {size} (at most size + 1 expected)")]
    Overfetch { got: usize, size: u64 },

    #[error("row has no value for ordering field '{0}'")]
    MissingKeyValue(String),

    #[error(transparent)]
    Cursor(#[from] CursorError),
}

/// Any error raised by this crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("invalid filter: {0}")]
    Parse(#[from] ParseError),

    #[error("invalid filter: {0}")]
    Validation(#[from] ValidationError),

    #[error("invalid ordering: {0}")]
    Ordering(#[from] OrderingError),

    #[error("invalid cursor: {0}")]
    Cursor(#[from] CursorError),

    #[error("pagination failed: {0}")]
    Pagination(#[from] PaginationError),
}

impl Error {
    /// Stable machine-readable code, suitable for problem responses.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Parse(_) => "FILTER_PARSE_ERROR",
            Error::Validation(_) => "FILTER_INVALID",
            Error::Ordering(_) => "ORDERING_INVALID",
            Error::Cursor(e) => e.code(),
            Error::Pagination(PaginationError::Cursor(e)) => e.code(),
            Error::Pagination(_) => "PAGINATION_FAILED",
        }
    }

    /// Whether the caller sent something wrong, as opposed to an adapter bug.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Error::Pagination(
                PaginationError::Overfetch { .. }
                    | PaginationError::MissingKeyValue(_)
                    | PaginationError::EmptyOrdering
                    | PaginationError::Cursor(CursorError::UnencodableValue { .. })
            )
        )
    }
}

impl CursorError {
    pub fn code(&self) -> &'static str {
        match self {
            CursorError::InvalidBase64 => "CURSOR_INVALID_BASE64",
            CursorError::InvalidJson | CursorError::NotAnObject | CursorError::MissingKeys => {
                "CURSOR_INVALID_JSON"
            }
            CursorError::InvalidDirection(_) => "CURSOR_INVALID_DIRECTION",
            CursorError::FieldSetMismatch { .. } | CursorError::UnreadableValue { .. } => {
                "CURSOR_INVALID_KEYS"
            }
            CursorError::InvalidOrderingToken(_)
            | CursorError::DuplicateField(_)
            | CursorError::EmptyOrdering => "CURSOR_INVALID_FIELDS",
            CursorError::OrderMismatch { .. } => "ORDER_MISMATCH",
            CursorError::FilterMismatch => "FILTER_MISMATCH",
            CursorError::UnencodableValue { .. } => "CURSOR_UNENCODABLE_VALUE",
            CursorError::Empty
            | CursorError::TooLong { .. }
            | CursorError::InvalidShape(_)
            | CursorError::ValueType { .. } => "INVALID_CURSOR",
        }
    }
}
