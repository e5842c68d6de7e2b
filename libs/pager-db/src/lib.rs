//! Query backends for `pager-core`.
//!
//! A backend turns compiled predicates, orderings and keyset bounds into its
//! own query form and fetches rows. [`paginate_query`] drives one request end
//! to end over any [`KeysetBackend`]:
//!
//! ```ignore
//! use pager_core::{AllowList, FieldKind};
//! use pager_db::{paginate_query, MemoryBackend, MemoryQuery, PageRequest, PagingPolicy};
//!
//! let fields = AllowList::from_kinds([("id", FieldKind::I64), ("name", FieldKind::String)]);
//! let request = PageRequest::new().filter("name.contains('a')").order("name").limit(10);
//! let page = paginate_query(
//!     &MemoryBackend,
//!     MemoryQuery::new(rows),
//!     &fields,
//!     &request,
//!     &PagingPolicy::default(),
//! )
//! .await?;
//! // Continue with: request.cursor(page.next_cursor.unwrap())
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod paging;
#[cfg(feature = "sea-orm")]
pub mod sea;

pub use backend::KeysetBackend;
pub use error::{BackendError, Result};
pub use memory::{record_from_json, MemoryBackend, MemoryQuery, Record};
pub use paging::{paginate_query, PageRequest, PagingPolicy};
#[cfg(feature = "sea-orm")]
pub use sea::{bound_to_condition, predicate_to_condition, SeaOrmBackend};
