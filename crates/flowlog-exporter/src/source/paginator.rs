// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tracing::debug;

use crate::error::ExporterError;
use crate::source::client::FlowSource;
use crate::source::record::RawFlowRecord;
use crate::source::wire::PageCursor;
use crate::watermark::ExtractionWindow;

/// One page as seen by the sync driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<RawFlowRecord>,
    pub next_cursor: PageCursor,
    pub has_more: bool,
    /// Largest timestamp among the exportable records on this page
    pub max_timestamp: Option<f64>,
    pub undecodable: usize,
}

/// A page continues the result set only when it is full AND names a next cursor.
/// Either condition alone is not trusted: some API revisions report counts that
/// disagree with their cursor state.
pub fn has_more(returned: usize, page_size: usize, next_cursor: &PageCursor) -> bool {
    returned == page_size && !next_cursor.is_exhausted()
}

/// Fetch the page at `cursor`. Failures are returned as-is; a page is never retried.
pub async fn fetch_page(
    source: &dyn FlowSource,
    window: &ExtractionWindow,
    page_size: usize,
    cursor: &PageCursor,
) -> Result<Page, ExporterError> {
    let page = source.fetch_page(window, page_size, cursor).await?;
    let returned = page.returned();
    let max_timestamp = page
        .records
        .iter()
        .filter(|record| record.is_complete())
        .map(|record| record.timestamp)
        .reduce(f64::max);
    Ok(Page {
        has_more: has_more(returned, page_size, &page.next_cursor),
        records: page.records,
        next_cursor: page.next_cursor,
        max_timestamp,
        undecodable: page.undecodable,
    })
}

/// Walks a result set page by page, owning the cursor for the duration of one run.
pub struct Paginator<'a> {
    source: &'a dyn FlowSource,
    page_size: usize,
    cursor: PageCursor,
    pages_fetched: usize,
    exhausted: bool,
}

impl<'a> Paginator<'a> {
    pub fn new(source: &'a dyn FlowSource, page_size: usize) -> Self {
        Paginator {
            cursor: source.start_cursor(),
            source,
            page_size,
            pages_fetched: 0,
            exhausted: false,
        }
    }

    /// Fetch the next page within `window`, or `None` once the result set is exhausted.
    pub async fn next_page(
        &mut self,
        window: &ExtractionWindow,
    ) -> Result<Option<Page>, ExporterError> {
        if self.exhausted {
            return Ok(None);
        }

        let page = fetch_page(self.source, window, self.page_size, &self.cursor).await?;
        self.pages_fetched += 1;
        debug!(
            "FLOWS | Page {} returned {} records, has_more={}",
            self.pages_fetched,
            page.records.len() + page.undecodable,
            page.has_more
        );

        if page.has_more {
            self.cursor = page.next_cursor.clone();
        } else {
            self.exhausted = true;
        }
        Ok(Some(page))
    }

    /// Cursor the next request will be made with.
    pub fn cursor(&self) -> &PageCursor {
        &self.cursor
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}
