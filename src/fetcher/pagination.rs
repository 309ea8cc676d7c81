//! Pagination over list endpoints
//!
//! Slack list endpoints continue in one of two ways:
//! - Opaque cursor: `response_metadata.next_cursor`, empty when exhausted
//! - Counted pages: `paging.page` out of `paging.pages`
//!
//! [`CursorPager`] drives the fetch-and-extend loop for any of them; the caller
//! supplies the fetch operation, the item extractor and a [`PaginationPolicy`].
//!
//! Any fetch error aborts the whole pagination. Nothing is cached per page, so a
//! retry starts over from the first page.

use crate::fetcher::{FetcherError, FetcherResult};
use serde_json::Value;
use std::future::Future;
use tracing::debug;

/// Maximum number of pages fetched for one resource before giving up
pub const MAX_PAGES: usize = 10_000;

/// Continuation token for the next page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageToken {
    /// Opaque cursor string
    Cursor(String),
    /// 1-based page number
    Page(u32),
}

/// Decides whether more pages remain and how to ask for the next one
pub trait PaginationPolicy<P> {
    /// Continuation token for the page after `page`, or `None` when exhausted
    fn next_token(&self, page: &P) -> FetcherResult<Option<PageToken>>;
}

/// Opaque-cursor continuation read from a metadata object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPolicy {
    /// Metadata object holding the cursor
    pub metadata_field: &'static str,
    /// Cursor field inside the metadata object
    pub cursor_field: &'static str,
}

impl Default for CursorPolicy {
    fn default() -> Self {
        Self {
            metadata_field: "response_metadata",
            cursor_field: "next_cursor",
        }
    }
}

impl PaginationPolicy<Value> for CursorPolicy {
    fn next_token(&self, page: &Value) -> FetcherResult<Option<PageToken>> {
        let cursor = page
            .get(self.metadata_field)
            .and_then(|meta| meta.get(self.cursor_field))
            .and_then(Value::as_str)
            .unwrap_or_default();

        if cursor.is_empty() {
            Ok(None)
        } else {
            Ok(Some(PageToken::Cursor(cursor.to_string())))
        }
    }
}

/// Counted-page continuation: more pages while `page < pages`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountedPagePolicy {
    /// Object holding `page` and `pages`
    pub paging_field: &'static str,
}

impl Default for CountedPagePolicy {
    fn default() -> Self {
        Self {
            paging_field: "paging",
        }
    }
}

impl PaginationPolicy<Value> for CountedPagePolicy {
    fn next_token(&self, page: &Value) -> FetcherResult<Option<PageToken>> {
        let paging = page.get(self.paging_field).ok_or_else(|| {
            FetcherError::InvalidResponse(format!("missing `{}` object", self.paging_field))
        })?;
        let number = |field: &str| {
            paging.get(field).and_then(Value::as_u64).ok_or_else(|| {
                FetcherError::InvalidResponse(format!(
                    "`{}.{field}` is missing or not a number",
                    self.paging_field
                ))
            })
        };

        let current = number("page")?;
        let total = number("pages")?;

        if current < total {
            let next = u32::try_from(current + 1).map_err(|_| {
                FetcherError::PaginationError(format!("page number {current} out of range"))
            })?;
            Ok(Some(PageToken::Page(next)))
        } else {
            Ok(None)
        }
    }
}

/// Endpoints that answer with everything in one response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinglePagePolicy;

impl<P> PaginationPolicy<P> for SinglePagePolicy {
    fn next_token(&self, _page: &P) -> FetcherResult<Option<PageToken>> {
        Ok(None)
    }
}

/// The continuation styles an endpoint can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagePolicy {
    /// Opaque cursor
    Cursor(CursorPolicy),
    /// Counted pages
    Counted(CountedPagePolicy),
    /// No pagination
    Single,
}

impl PagePolicy {
    /// Slack's standard cursor policy
    pub const fn cursor() -> Self {
        PagePolicy::Cursor(CursorPolicy {
            metadata_field: "response_metadata",
            cursor_field: "next_cursor",
        })
    }

    /// Slack's `paging` object policy
    pub const fn counted() -> Self {
        PagePolicy::Counted(CountedPagePolicy {
            paging_field: "paging",
        })
    }
}

impl PaginationPolicy<Value> for PagePolicy {
    fn next_token(&self, page: &Value) -> FetcherResult<Option<PageToken>> {
        match self {
            PagePolicy::Cursor(policy) => policy.next_token(page),
            PagePolicy::Counted(policy) => policy.next_token(page),
            PagePolicy::Single => SinglePagePolicy.next_token(page),
        }
    }
}

/// Drives a paginated list to completion
#[derive(Debug, Clone)]
pub struct CursorPager {
    max_pages: usize,
}

impl Default for CursorPager {
    fn default() -> Self {
        Self::new()
    }
}

impl CursorPager {
    /// Pager with the default page limit
    pub fn new() -> Self {
        Self {
            max_pages: MAX_PAGES,
        }
    }

    /// Override the page limit
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Fetch every page and concatenate the extracted items in page order
    ///
    /// # Arguments
    /// * `fetch` - Fetches one page, given the continuation token (`None` for the first page)
    /// * `extract` - Maps a raw page to its items
    /// * `policy` - Detects further pages and computes the next token
    ///
    /// # Errors
    /// The first fetch, extraction or policy error aborts pagination; no partial
    /// result is returned. Exceeding the page limit or a repeated continuation
    /// token is reported as [`FetcherError::PaginationError`].
    pub async fn collect<P, T, F, Fut, E, Pol>(
        &self,
        mut fetch: F,
        extract: E,
        policy: &Pol,
    ) -> FetcherResult<Vec<T>>
    where
        F: FnMut(Option<PageToken>) -> Fut,
        Fut: Future<Output = FetcherResult<P>>,
        E: Fn(&P) -> FetcherResult<Vec<T>>,
        Pol: PaginationPolicy<P> + ?Sized,
    {
        let mut all_items = Vec::new();
        let mut token: Option<PageToken> = None;
        let mut pages = 0;

        loop {
            if pages >= self.max_pages {
                return Err(FetcherError::PaginationError(format!(
                    "Max pages ({}) exceeded - possible infinite loop. Last token: {token:?}",
                    self.max_pages
                )));
            }

            debug!(page = pages + 1, token = ?token, "Fetching page");

            let page = fetch(token.clone()).await?;
            let items = extract(&page)?;
            debug!("Received {} items in page {}", items.len(), pages + 1);
            all_items.extend(items);
            pages += 1;

            match policy.next_token(&page)? {
                None => break,
                Some(next) if token.as_ref() == Some(&next) => {
                    return Err(FetcherError::PaginationError(format!(
                        "continuation token {next:?} repeated after page {pages}"
                    )));
                }
                Some(next) => token = Some(next),
            }
        }

        debug!(
            "Pagination completed after {} pages. Total items: {}",
            pages,
            all_items.len()
        );

        Ok(all_items)
    }
}
