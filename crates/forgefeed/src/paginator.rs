//! Dual-mode pagination with fallback.
//!
//! GitHub listings are normally walked by page number. For large result
//! sets GitHub refuses page numbers with a 422 and asks for cursor
//! pagination instead, where each response links to the next page with an
//! opaque token. [`fetch_batch`] starts in whichever mode the checkpoint
//! says is active, switches to cursor mode on that 422, and recovers once
//! from an expired cursor by walking the listing again from the start.
//!
//! Items are always returned in the order the API produced them.

use async_trait::async_trait;

use crate::connector::ConnectorError;
use crate::github::GitHubError;
use crate::rate_limit::{RateLimitSource, RetryBudget};

/// Cursor-mode progress is logged every this many items.
pub const CURSOR_LOG_FREQUENCY: u64 = 50;

/// A paginated listing that can be read by page number or by cursor.
///
/// Implementations are cheap, single-use handles: the paginator asks the
/// factory for a fresh one whenever it restarts a walk.
#[async_trait]
pub trait PagedListing: Send {
    type Item: Clone + Send;

    /// Fetch one page by zero-based page number.
    async fn get_page(&self, page: u32) -> Result<Vec<Self::Item>, GitHubError>;

    /// Fetch the page the next-page token points at and advance the token.
    ///
    /// Returns `None` once there is no next page.
    async fn next_page(&mut self) -> Result<Option<Vec<Self::Item>>, GitHubError>;

    /// Opaque link to the page [`PagedListing::next_page`] will read.
    fn next_page_token(&self) -> Option<String>;

    /// Resume from a previously observed token.
    fn set_next_page_token(&mut self, token: String);

    /// Load any lazily fetched fields of `item`.
    async fn realize(&self, item: Self::Item) -> Result<Self::Item, GitHubError>;
}

/// How a batch was fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationMode {
    Offset,
    Cursor,
}

/// Where a batch starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchRequest {
    /// Zero-based page for offset mode.
    pub page: u32,
    /// Resume link; when set the batch is fetched in cursor mode.
    pub cursor_url: Option<String>,
    /// Items already consumed in an earlier call of this cursor pass.
    pub prev_count: u64,
}

/// The items of one batch and the mode that produced them.
#[derive(Debug)]
pub struct Batch<T> {
    pub items: Vec<T>,
    pub mode: PaginationMode,
}

/// Fetch one batch from a listing.
///
/// * `factory` builds a fresh listing handle.
/// * `on_cursor_advance` receives the current next-page link and the running
///   item count after every item read in cursor mode.
/// * `should_stop` ends the walk early: once an item matches, no further
///   pages are requested and later items on its page are dropped. The
///   matching item itself is returned.
///
/// A rate-limited call backs off and is retried on its own, with its own
/// budget of [`MAX_RATE_LIMIT_RETRIES`](crate::rate_limit::MAX_RATE_LIMIT_RETRIES).
/// Items already read are kept, so a walk longer than one quota window
/// still completes.
pub async fn fetch_batch<L, F, C, S>(
    factory: F,
    request: &BatchRequest,
    mut on_cursor_advance: C,
    should_stop: S,
    rate_limits: &dyn RateLimitSource,
) -> Result<Batch<L::Item>, ConnectorError>
where
    L: PagedListing,
    F: Fn() -> L + Send + Sync,
    C: FnMut(Option<&str>, u64) + Send,
    S: Fn(&L::Item) -> bool + Send + Sync,
{
    match request.cursor_url.as_deref() {
        Some(cursor_url) => paginate_cursor(
            &factory,
            Some(cursor_url),
            request.prev_count,
            &mut on_cursor_advance,
            &should_stop,
            rate_limits,
        )
        .await
        .map(cursor_batch),
        None => {
            fetch_offset(
                &factory,
                request,
                &mut on_cursor_advance,
                &should_stop,
                rate_limits,
            )
            .await
        }
    }
}

fn cursor_batch<T>(items: Vec<T>) -> Batch<T> {
    Batch {
        items,
        mode: PaginationMode::Cursor,
    }
}

async fn fetch_offset<L, F, C, S>(
    factory: &F,
    request: &BatchRequest,
    on_cursor_advance: &mut C,
    should_stop: &S,
    rate_limits: &dyn RateLimitSource,
) -> Result<Batch<L::Item>, ConnectorError>
where
    L: PagedListing,
    F: Fn() -> L + Send + Sync,
    C: FnMut(Option<&str>, u64) + Send,
    S: Fn(&L::Item) -> bool + Send + Sync,
{
    let mut listing = factory();
    let mut budget = RetryBudget::new("page fetch");
    let page = loop {
        match listing.get_page(request.page).await {
            Ok(page) => break page,
            Err(e) if e.is_rate_limited() => budget.backoff(rate_limits).await?,
            Err(e) if e.requires_cursor_pagination() => {
                tracing::info!(
                    "Page-number pagination refused at page {}, falling back to cursor pagination",
                    request.page
                );
                return paginate_cursor(
                    factory,
                    None,
                    request.prev_count,
                    on_cursor_advance,
                    should_stop,
                    rate_limits,
                )
                .await
                .map(cursor_batch);
            }
            Err(e) => return Err(e.into()),
        }
    };

    tracing::debug!("Fetched page {} with {} items", request.page, page.len());

    let mut items = Vec::with_capacity(page.len());
    for item in page {
        let item = realize(&mut listing, item, rate_limits).await?;
        let stop = should_stop(&item);
        items.push(item);
        if stop {
            break;
        }
    }

    Ok(Batch {
        items,
        mode: PaginationMode::Offset,
    })
}

/// Walk a listing by cursor until it is exhausted or `should_stop` fires.
///
/// When the walk fails before yielding anything and the listing still had a
/// next link, the cursor is assumed to have expired. The walk then restarts
/// once from the beginning, skipping the `prev_count` items consumed by
/// earlier calls.
async fn paginate_cursor<L, F, C, S>(
    factory: &F,
    cursor_url: Option<&str>,
    prev_count: u64,
    on_cursor_advance: &mut C,
    should_stop: &S,
    rate_limits: &dyn RateLimitSource,
) -> Result<Vec<L::Item>, ConnectorError>
where
    L: PagedListing,
    F: Fn() -> L + Send + Sync,
    C: FnMut(Option<&str>, u64) + Send,
    S: Fn(&L::Item) -> bool + Send + Sync,
{
    let mut cursor_url = cursor_url.map(str::to_string);
    let mut retrying = false;

    loop {
        let mut listing = factory();
        let mut count = prev_count;
        let mut skip = 0u64;

        if let Some(url) = cursor_url.take() {
            listing.set_next_page_token(url);
        } else if retrying {
            tracing::warn!(
                "Retrying from a previous cursor-based pagination call. This re-reads every \
                 page before the resume point and may consume many API calls."
            );
            skip = prev_count;
            count = 0;
        }

        let walked = walk(
            &mut listing,
            &mut count,
            skip,
            on_cursor_advance,
            should_stop,
            rate_limits,
        )
        .await;

        match walked {
            Ok(items) => return Ok(items),
            // exhausted rate-limit budgets are not a sign of an expired cursor
            Err(ConnectorError::GitHub(e)) => {
                tracing::debug!("Error during cursor-based pagination: {}", e);
                let yielded = count.saturating_sub(prev_count) > 0;
                if yielded || retrying || listing.next_page_token().is_none() {
                    return Err(e.into());
                }
                tracing::info!(
                    "Assuming the cursor expired because no items were retrieved; \
                     retrying from the first page"
                );
                retrying = true;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn walk<L, C, S>(
    listing: &mut L,
    count: &mut u64,
    mut skip: u64,
    on_cursor_advance: &mut C,
    should_stop: &S,
    rate_limits: &dyn RateLimitSource,
) -> Result<Vec<L::Item>, ConnectorError>
where
    L: PagedListing,
    C: FnMut(Option<&str>, u64) + Send,
    S: Fn(&L::Item) -> bool + Send + Sync,
{
    let mut items = Vec::new();

    while let Some(page) = next_page(listing, rate_limits).await? {
        for item in page {
            if skip > 0 {
                skip -= 1;
                continue;
            }

            let item = realize(listing, item, rate_limits).await?;
            *count += 1;
            let next = listing.next_page_token();
            on_cursor_advance(next.as_deref(), *count);

            if *count % CURSOR_LOG_FREQUENCY == 0 {
                tracing::info!(
                    "Retrieved {} items with current cursor url: {}",
                    count,
                    next.as_deref().unwrap_or("<none>")
                );
            }

            let stop = should_stop(&item);
            items.push(item);
            if stop {
                return Ok(items);
            }
        }
    }

    Ok(items)
}

/// Read the next cursor page, backing off while rate limited.
///
/// A failed read leaves the listing's next-page token in place, so the
/// retry asks for the same page.
async fn next_page<L: PagedListing>(
    listing: &mut L,
    rate_limits: &dyn RateLimitSource,
) -> Result<Option<Vec<L::Item>>, ConnectorError> {
    let mut budget = RetryBudget::new("page fetch");
    loop {
        match listing.next_page().await {
            Ok(page) => return Ok(page),
            Err(e) if e.is_rate_limited() => budget.backoff(rate_limits).await?,
            Err(e) => return Err(e.into()),
        }
    }
}

async fn realize<L: PagedListing>(
    listing: &mut L,
    item: L::Item,
    rate_limits: &dyn RateLimitSource,
) -> Result<L::Item, ConnectorError> {
    let mut budget = RetryBudget::new("item fetch");
    loop {
        match listing.realize(item.clone()).await {
            Ok(item) => return Ok(item),
            Err(e) if e.is_rate_limited() => budget.backoff(rate_limits).await?,
            Err(e) => return Err(e.into()),
        }
    }
}
