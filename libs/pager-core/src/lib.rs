//! Filtering, ordering and keyset pagination that do not depend on any
//! particular query backend.
//!
//! The flow for one request:
//!
//! 1. [`compile_filter`] turns filter text into a [`Predicate`] over the
//!    handles of an [`AllowList`].
//! 2. [`parse_ordering`] (or [`OrderSpec::parse`]) validates the sort keys.
//! 3. [`Cursor::decode`] reads the caller's cursor, which must pass
//!    [`Cursor::validate_ordering`] before [`keyset_bound`] uses its values.
//! 4. The adapter fetches `size + 1` rows; [`paginate`] turns them into a
//!    [`PageResult`] with fresh cursors.

pub mod ast;
pub mod compiler;
pub mod cursor;
pub mod error;
pub mod fingerprint;
pub mod keyset;
pub mod order;
pub mod page;
pub mod parser;
pub mod value;

pub use ast::{BinaryOperator, LogicalOperator, SyntaxNode, UnaryOperator};
pub use compiler::{
    compile, compile_filter, compile_filter_with_limits, AllowList, FieldKinds, FieldSet,
    FieldSpec, Function, Predicate, ResolvedField,
};
pub use cursor::{
    base64_url, decode_cursor, encode_cursor, validate_cursor_ordering, Cursor, CursorValues,
    MAX_CURSOR_LEN,
};
pub use error::{CursorError, Error, OrderingError, PaginationError, ParseError, ValidationError};
pub use fingerprint::{normalize_filter_for_hash, short_filter_hash};
pub use keyset::{
    boundary_values, clamp_limit, fetch_order, keyset_bound, paginate, paginate_with, BoundOp,
    BoundTerm, KeysetBound, KeysetRow, LimitCfg, PageDirection, PageOptions,
};
pub use order::{parse_ordering, OrderKey, OrderSpec, SortDir, MAX_ORDER_FIELDS};
pub use page::PageResult;
pub use parser::{parse, parse_with_limits, ParserLimits};
pub use value::{FieldKind, Value};

pub type Result<T, E = Error> = std::result::Result<T, E>;
