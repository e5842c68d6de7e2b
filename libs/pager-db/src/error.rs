use pager_core::{CursorError, OrderingError, PaginationError, ParseError, ValidationError};
use thiserror::Error;

/// Typed error for backends and the request driver.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Filter, ordering, cursor or page-assembly failure raised by pager-core.
    #[error(transparent)]
    Paging(#[from] pager_core::Error),

    #[error("field '{0}' is not mapped by this backend")]
    UnmappedField(String),

    #[error("backend cannot express {0}")]
    Unsupported(&'static str),

    #[error("value for '{field}' cannot be bound: {reason}")]
    Bind { field: String, reason: &'static str },

    #[cfg(feature = "sea-orm")]
    #[error(transparent)]
    Sea(#[from] sea_orm::DbErr),
}

impl BackendError {
    /// Stable code; pager-core codes pass through unchanged.
    pub fn code(&self) -> &'static str {
        match self {
            BackendError::Paging(e) => e.code(),
            BackendError::UnmappedField(_)
            | BackendError::Unsupported(_)
            | BackendError::Bind { .. } => "BACKEND_MAPPING",
            #[cfg(feature = "sea-orm")]
            BackendError::Sea(_) => "DATABASE_ERROR",
        }
    }

    pub fn is_client_error(&self) -> bool {
        match self {
            BackendError::Paging(e) => e.is_client_error(),
            _ => false,
        }
    }
}

macro_rules! paging_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for BackendError {
                fn from(e: $ty) -> Self {
                    BackendError::Paging(e.into())
                }
            }
        )*
    };
}

paging_from!(ParseError, ValidationError, OrderingError, CursorError, PaginationError);

pub type Result<T> = std::result::Result<T, BackendError>;
