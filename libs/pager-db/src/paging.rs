//! One-shot request driver: filter → count → cursor bound → order → overfetch → page.

use pager_core::{
    clamp_limit, compile, fetch_order, parse_ordering, parse_with_limits, short_filter_hash,
    AllowList, Cursor, LimitCfg, OrderKey, OrderSpec, OrderingError, PageDirection, PageOptions,
    PageResult, ParserLimits, SortDir,
};

use crate::backend::KeysetBackend;
use crate::error::Result;

/// What a caller asks for: all inputs are raw, untrusted text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub filter: Option<String>,
    /// Comma-separated signed tokens, e.g. `"-created_at,name"`.
    pub order: Option<String>,
    pub limit: Option<u64>,
    pub cursor: Option<String>,
    /// Overrides the direction recorded in the cursor.
    pub direction: Option<PageDirection>,
    pub include_prev_cursor_on_first_page: bool,
    pub with_total: bool,
}

impl PageRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn direction(mut self, direction: PageDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn include_prev_cursor_on_first_page(mut self, include: bool) -> Self {
        self.include_prev_cursor_on_first_page = include;
        self
    }

    pub fn with_total(mut self, with_total: bool) -> Self {
        self.with_total = with_total;
        self
    }
}

/// Server-side knobs applied to every request.
#[derive(Clone, Debug)]
pub struct PagingPolicy {
    pub limits: LimitCfg,
    /// Unique field appended to every ordering so positions are total.
    pub tiebreaker: String,
    pub tiebreaker_dir: SortDir,
    pub parser_limits: ParserLimits,
}

impl Default for PagingPolicy {
    fn default() -> Self {
        Self {
            limits: LimitCfg::default(),
            tiebreaker: "id".to_string(),
            tiebreaker_dir: SortDir::Asc,
            parser_limits: ParserLimits::default(),
        }
    }
}

fn non_blank(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Run `request` against `query`.
///
/// When the request names no ordering but carries a cursor, the cursor's
/// ordering is used (still checked against `fields`). Otherwise the requested
/// ordering, plus the policy tiebreaker, must equal the cursor's.
pub async fn paginate_query<B: KeysetBackend>(
    backend: &B,
    query: B::Query,
    fields: &AllowList<B::Handle>,
    request: &PageRequest,
    policy: &PagingPolicy,
) -> Result<PageResult<B::Row>> {
    let size = clamp_limit(request.limit, policy.limits);

    let mut query = query;
    let mut filter_hash = None;
    if let Some(text) = non_blank(&request.filter) {
        let tree = parse_with_limits(text, &policy.parser_limits)?;
        let predicate = compile(&tree, fields)?;
        filter_hash = short_filter_hash(Some(&tree));
        query = backend.apply_predicate(query, &predicate)?;
    }

    let total = if request.with_total {
        Some(backend.count(&query).await?)
    } else {
        None
    };

    let cursor = match non_blank(&request.cursor) {
        Some(token) => Some(Cursor::decode(token)?),
        None => None,
    };

    let ordering = match (non_blank(&request.order), &cursor) {
        (Some(order), _) => OrderSpec::parse(order, fields)?,
        (None, Some(c)) => {
            let tokens: Vec<String> = c.ordering.keys().iter().map(OrderKey::signed_token).collect();
            parse_ordering(&tokens, fields)?
        }
        (None, None) => OrderSpec::empty(),
    };
    if !fields.contains(&policy.tiebreaker) {
        return Err(OrderingError::NotAllowed {
            field: policy.tiebreaker.clone(),
            allowed: fields.describe(),
        }
        .into());
    }
    let ordering = ordering.ensure_tiebreaker(&policy.tiebreaker, policy.tiebreaker_dir);

    let mut options = PageOptions::new(size)
        .include_prev_cursor_on_first_page(request.include_prev_cursor_on_first_page)
        .with_filter_hash(filter_hash.clone());

    match cursor {
        Some(cursor) => {
            cursor.validate_ordering(&ordering)?;
            cursor.validate_filter(filter_hash.as_deref())?;
            let cursor = cursor.coerce_values(fields)?;
            let direction = request.direction.unwrap_or(cursor.direction);
            query =
                backend.apply_keyset_bound(query, &ordering, &cursor.values, direction, fields)?;
            options = options.with_cursor(cursor).with_direction(direction);
        }
        None => {
            options = options.with_direction(request.direction.unwrap_or_default());
        }
    }

    query = backend.apply_ordering(query, &fetch_order(&ordering, options.direction), fields)?;

    tracing::debug!(
        order = %ordering,
        size,
        direction = ?options.direction,
        has_cursor = options.cursor.is_some(),
        "fetching page"
    );
    let rows = backend.fetch(query, options.fetch_limit()).await?;

    let page = pager_core::paginate_with(rows, &ordering, &options, |row, field| {
        fields
            .get(field)
            .and_then(|spec| backend.key_value(row, &spec.handle))
    })?;
    Ok(page.with_total_size(total))
}
