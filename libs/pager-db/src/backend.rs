use async_trait::async_trait;
use pager_core::{
    keyset_bound, AllowList, CursorValues, KeysetBound, OrderSpec, PageDirection, Predicate, Value,
};

use crate::error::Result;

/// A query target the request driver can filter, bound, order and fetch.
///
/// Builders take the query by value and hand back the refined one, the way
/// SeaORM selects are chained. Field handles come from the allow-list the
/// caller registered, so a backend never sees a name it did not map.
#[async_trait]
pub trait KeysetBackend: Send + Sync {
    /// Query under construction.
    type Query: Send + Sync;
    /// Backend identifier behind an allowed field name (a column, a map key).
    type Handle: Clone + Send + Sync;
    /// Fetched row.
    type Row: Send;

    /// Restrict `query` to rows satisfying `predicate`.
    fn apply_predicate(
        &self,
        query: Self::Query,
        predicate: &Predicate<Self::Handle>,
    ) -> Result<Self::Query>;

    /// Sort `query` by `order`, first key most significant.
    fn apply_ordering(
        &self,
        query: Self::Query,
        order: &OrderSpec,
        fields: &AllowList<Self::Handle>,
    ) -> Result<Self::Query>;

    /// Restrict `query` to rows strictly past the boundary.
    fn apply_bound(
        &self,
        query: Self::Query,
        bound: &KeysetBound,
        fields: &AllowList<Self::Handle>,
    ) -> Result<Self::Query>;

    /// Restrict `query` to rows strictly after (or before, for
    /// [`PageDirection::Backward`]) the cursor position.
    fn apply_keyset_bound(
        &self,
        query: Self::Query,
        order: &OrderSpec,
        values: &CursorValues,
        direction: PageDirection,
        fields: &AllowList<Self::Handle>,
    ) -> Result<Self::Query> {
        let bound = keyset_bound(order, values, direction)?;
        self.apply_bound(query, &bound, fields)
    }

    /// Value of an ordering field on a fetched row.
    fn key_value(&self, row: &Self::Row, handle: &Self::Handle) -> Option<Value>;

    /// Run `query`, returning at most `limit` rows.
    async fn fetch(&self, query: Self::Query, limit: u64) -> Result<Vec<Self::Row>>;

    /// Rows matching `query`, ignoring any limit.
    async fn count(&self, query: &Self::Query) -> Result<u64>;
}
