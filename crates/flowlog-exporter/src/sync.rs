// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The sync driver: resolve the window, then page, map and append until the
//! source is drained.
//!
//! ```text
//!   Resolving ──> Paging ──> BatchAppending ──> Done
//!       │           ^   │          │
//!       │           └───┼──────────┘ (has_more)
//!       v               v          v
//!     Failed <──────────┴──────────┘
//! ```
//!
//! Pages are strictly sequential: page N+1 is requested only after page N's batch
//! was appended, because the next request's window start depends on it.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ExporterConfig, WatermarkFallback};
use crate::destination::Destination;
use crate::error::{ExporterError, RunFailure};
use crate::mapper::{map_record, NormalizedEvent};
use crate::source::client::FlowSource;
use crate::source::paginator::Paginator;
use crate::source::wire::PageCursor;
use crate::watermark::{ExtractionWindow, WatermarkResolver};

/// Phase of an extraction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Resolving,
    Paging,
    BatchAppending,
    Done,
    Failed,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Events appended to the destination
    pub processed: u64,
    /// Records dropped as incomplete or undecodable
    pub skipped: u64,
    pub pages: usize,
    /// Window as it stood when the run finished
    pub window: ExtractionWindow,
    /// Largest timestamp among the records exported during the run
    pub max_observed: Option<f64>,
}

enum Step {
    Resolving,
    Paging(ExtractionWindow),
    BatchAppending {
        window: ExtractionWindow,
        batch: Vec<NormalizedEvent>,
        has_more: bool,
    },
    Done(ExtractionWindow),
    Failed(ExporterError),
}

impl Step {
    fn state(&self) -> SyncState {
        match self {
            Step::Resolving => SyncState::Resolving,
            Step::Paging(_) => SyncState::Paging,
            Step::BatchAppending { .. } => SyncState::BatchAppending,
            Step::Done(_) => SyncState::Done,
            Step::Failed(_) => SyncState::Failed,
        }
    }
}

pub struct SyncDriver<'a> {
    source: &'a dyn FlowSource,
    destination: &'a dyn Destination,
    dataset: &'a str,
    page_size: usize,
    watermark_fallback: WatermarkFallback,
    cancel: CancellationToken,
}

impl<'a> SyncDriver<'a> {
    pub fn new(
        config: &'a ExporterConfig,
        source: &'a dyn FlowSource,
        destination: &'a dyn Destination,
    ) -> Self {
        SyncDriver {
            source,
            destination,
            dataset: &config.dataset,
            page_size: config.page_size,
            watermark_fallback: config.watermark_fallback,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop the run at the next page boundary once `cancel` fires. An append that is
    /// already in flight always completes first.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn run_extraction(&self, lookback_hours: u32) -> Result<RunSummary, RunFailure> {
        let resolver = WatermarkResolver::new(self.destination, self.dataset, self.watermark_fallback);
        let mut paginator = Paginator::new(self.source, self.page_size);

        let mut processed: u64 = 0;
        let mut skipped: u64 = 0;
        let mut max_observed: Option<f64> = None;
        let mut step = Step::Resolving;

        loop {
            debug!("Sync state: {:?}", step.state());
            step = match step {
                Step::Resolving => match resolver.resolve(lookback_hours).await {
                    Ok(window) => Step::Paging(window),
                    Err(e) => Step::Failed(e),
                },

                Step::Paging(window) => {
                    if self.cancel.is_cancelled() {
                        Step::Failed(ExporterError::Cancelled {
                            page: paginator.pages_fetched() + 1,
                        })
                    } else {
                        match paginator.next_page(&window).await {
                            Ok(Some(page)) => {
                                let mut batch = Vec::with_capacity(page.records.len());
                                let mut incomplete = 0;
                                for record in &page.records {
                                    if record.is_complete() {
                                        batch.push(map_record(record));
                                    } else {
                                        incomplete += 1;
                                    }
                                }
                                if incomplete > 0 {
                                    warn!(
                                        "Skipping {incomplete} flows without a device IP on page {}",
                                        paginator.pages_fetched()
                                    );
                                }
                                skipped += incomplete;
                                if let Some(page_max) = page.max_timestamp {
                                    max_observed =
                                        Some(max_observed.map_or(page_max, |m: f64| m.max(page_max)));
                                }
                                skipped += page.undecodable as u64;
                                Step::BatchAppending {
                                    window,
                                    batch,
                                    has_more: page.has_more,
                                }
                            }
                            Ok(None) => Step::Done(window),
                            Err(e) => Step::Failed(e),
                        }
                    }
                }

                Step::BatchAppending {
                    mut window,
                    batch,
                    has_more,
                } => match self.destination.append(self.dataset, &batch).await {
                    Ok(()) => {
                        processed += batch.len() as u64;
                        debug!(
                            "Appended {} events, {processed} so far",
                            batch.len()
                        );
                        if has_more {
                            // an offset counts rows of the window it was issued for, so
                            // offset pagination keeps the start fixed for the whole run
                            if let (Some(max), PageCursor::Token(_)) =
                                (max_observed, paginator.cursor())
                            {
                                window.advance_to(max);
                            }
                            Step::Paging(window)
                        } else {
                            Step::Done(window)
                        }
                    }
                    Err(e) => Step::Failed(e),
                },

                Step::Done(window) => {
                    info!(
                        "Extraction complete: {processed} records processed, {skipped} skipped, {} pages",
                        paginator.pages_fetched()
                    );
                    return Ok(RunSummary {
                        processed,
                        skipped,
                        pages: paginator.pages_fetched(),
                        window,
                        max_observed,
                    });
                }

                Step::Failed(error) => {
                    error!("Extraction failed after {processed} records: {error}");
                    return Err(RunFailure { error, processed });
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::now_seconds;
    use crate::source::record::{Host, RawFlowRecord};
    use crate::config::ApiVersion;
    use crate::source::wire::{decode_page, FlowPage};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    fn config() -> ExporterConfig {
        ExporterConfig {
            dataset: "firewalla".to_string(),
            org_id: "org".to_string(),
            axiom_token: "token".to_string(),
            firewalla_url: "https://example.firewalla.net/v2/".to_string(),
            firewalla_key: "key".to_string(),
            page_size: 3,
            ..Default::default()
        }
    }

    fn record(ts: f64, ip: &str) -> RawFlowRecord {
        RawFlowRecord {
            timestamp: ts,
            device: Host {
                ip: Some(ip.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn page(records: Vec<RawFlowRecord>, cursor: &str) -> FlowPage {
        FlowPage {
            records,
            next_cursor: PageCursor::Token(cursor.to_string()),
            undecodable: 0,
        }
    }

    struct FakeSource {
        pages: Mutex<Vec<Result<FlowPage, ExporterError>>>,
        windows: Mutex<Vec<ExtractionWindow>>,
        cancel_after_first: Option<CancellationToken>,
    }

    impl FakeSource {
        fn new(mut pages: Vec<Result<FlowPage, ExporterError>>) -> Self {
            pages.reverse();
            FakeSource {
                pages: Mutex::new(pages),
                windows: Mutex::new(Vec::new()),
                cancel_after_first: None,
            }
        }

        fn fetches(&self) -> usize {
            self.windows.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl FlowSource for FakeSource {
        async fn fetch_page(
            &self,
            window: &ExtractionWindow,
            _page_size: usize,
            _cursor: &PageCursor,
        ) -> Result<FlowPage, ExporterError> {
            self.windows.lock().unwrap().push(*window);
            if let Some(cancel) = &self.cancel_after_first {
                cancel.cancel();
            }
            self.pages
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(page(vec![], "")))
        }

        fn start_cursor(&self) -> PageCursor {
            PageCursor::Token(String::new())
        }
    }

    struct FakeDestination {
        latest: Result<Option<f64>, ()>,
        fail_append_on: Option<usize>,
        batches: Mutex<Vec<Vec<NormalizedEvent>>>,
    }

    impl FakeDestination {
        fn new(latest: Option<f64>) -> Self {
            FakeDestination {
                latest: Ok(latest),
                fail_append_on: None,
                batches: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Destination for FakeDestination {
        async fn latest_timestamp(&self, _dataset: &str) -> Result<Option<f64>, ExporterError> {
            self.latest
                .map_err(|_| ExporterError::destination("query failed"))
        }

        async fn append(
            &self,
            _dataset: &str,
            events: &[NormalizedEvent],
        ) -> Result<(), ExporterError> {
            let mut batches = self.batches.lock().unwrap();
            if self.fail_append_on == Some(batches.len()) {
                return Err(ExporterError::destination("ingest failed"));
            }
            batches.push(events.to_vec());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_incomplete_records_are_skipped() {
        let now = now_seconds();
        let source = FakeSource::new(vec![Ok(page(
            vec![record(now - 30.0, "10.0.0.1"), record(now - 20.0, ""), record(now - 10.0, "10.0.0.2")],
            "",
        ))]);
        let destination = FakeDestination::new(None);
        let config = config();

        let summary = SyncDriver::new(&config, &source, &destination)
            .run_extraction(12)
            .await
            .unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.skipped, 1);
        let batches = destination.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].iter().all(|e| e.device_ip.is_some()));
        assert!(batches[0].iter().all(|e| e.ingest_timestamp >= now));
    }

    #[tokio::test]
    async fn test_window_start_advances_between_pages() {
        let now = now_seconds();
        let source = FakeSource::new(vec![
            Ok(page(
                vec![
                    record(now - 300.0, "10.0.0.1"),
                    record(now - 200.0, "10.0.0.1"),
                    record(now - 100.0, ""),
                ],
                "next",
            )),
            Ok(page(vec![record(now - 50.0, "10.0.0.1")], "")),
        ]);
        let destination = FakeDestination::new(None);
        let config = config();

        let summary = SyncDriver::new(&config, &source, &destination)
            .run_extraction(1)
            .await
            .unwrap();

        let windows = source.windows.lock().unwrap().clone();
        assert_eq!(windows.len(), 2);
        // the skipped record at now - 100 does not move the start
        assert_eq!(windows[1].start, (now - 200.0).floor() as i64);
        assert_eq!(windows[0].end, windows[1].end);
        assert!(windows[1].start > windows[0].start);
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.pages, 2);
        assert_eq!(summary.max_observed, Some(now - 50.0));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_empty_batch_still_appended() {
        let source = FakeSource::new(vec![Ok(page(vec![record(1.0, "")], ""))]);
        let destination = FakeDestination::new(None);
        let config = config();

        let summary = SyncDriver::new(&config, &source, &destination)
            .run_extraction(12)
            .await
            .unwrap();

        assert_eq!(summary.processed, 0);
        assert_eq!(destination.batches.lock().unwrap().len(), 1);
        assert!(destination.batches.lock().unwrap()[0].is_empty());
        assert!(logs_contain("0 records processed, 1 skipped, 1 pages"));
    }

    #[tokio::test]
    async fn test_resolver_failure_prevents_fetch() {
        let source = FakeSource::new(vec![]);
        let destination = FakeDestination {
            latest: Err(()),
            fail_append_on: None,
            batches: Mutex::new(Vec::new()),
        };
        let config = config();

        let failure = SyncDriver::new(&config, &source, &destination)
            .run_extraction(12)
            .await
            .unwrap_err();

        assert!(matches!(failure.error, ExporterError::Destination { .. }));
        assert_eq!(failure.processed, 0);
        assert_eq!(source.fetches(), 0);
    }

    #[tokio::test]
    async fn test_source_failure_reports_progress() {
        let now = now_seconds();
        let source = FakeSource::new(vec![
            Ok(page(
                vec![
                    record(now - 3.0, "10.0.0.1"),
                    record(now - 2.0, "10.0.0.1"),
                    record(now - 1.0, "10.0.0.1"),
                ],
                "next",
            )),
            Err(ExporterError::source_fetch("502 Bad Gateway")),
        ]);
        let destination = FakeDestination::new(None);
        let config = config();

        let failure = SyncDriver::new(&config, &source, &destination)
            .run_extraction(12)
            .await
            .unwrap_err();

        assert!(matches!(failure.error, ExporterError::SourceFetch { .. }));
        assert_eq!(failure.processed, 3);
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn test_append_failure_stops_paging() {
        let now = now_seconds();
        let source = FakeSource::new(vec![Ok(page(
            vec![
                record(now - 3.0, "10.0.0.1"),
                record(now - 2.0, "10.0.0.1"),
                record(now - 1.0, "10.0.0.1"),
            ],
            "next",
        ))]);
        let destination = FakeDestination {
            latest: Ok(None),
            fail_append_on: Some(0),
            batches: Mutex::new(Vec::new()),
        };
        let config = config();

        let failure = SyncDriver::new(&config, &source, &destination)
            .run_extraction(12)
            .await
            .unwrap_err();

        assert!(matches!(failure.error, ExporterError::Destination { .. }));
        assert_eq!(failure.processed, 0);
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_at_page_boundary() {
        let now = now_seconds();
        let cancel = CancellationToken::new();
        let mut source = FakeSource::new(vec![Ok(page(
            vec![
                record(now - 3.0, "10.0.0.1"),
                record(now - 2.0, "10.0.0.1"),
                record(now - 1.0, "10.0.0.1"),
            ],
            "next",
        ))]);
        source.cancel_after_first = Some(cancel.clone());
        let destination = FakeDestination::new(None);
        let config = config();

        let failure = SyncDriver::new(&config, &source, &destination)
            .with_cancellation(cancel)
            .run_extraction(12)
            .await
            .unwrap_err();

        // the first page was fetched before cancelling, and its batch still landed
        assert!(matches!(failure.error, ExporterError::Cancelled { page: 2 }));
        assert_eq!(failure.processed, 3);
        assert_eq!(destination.batches.lock().unwrap().len(), 1);
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_runs_reingest() {
        let now = now_seconds();
        let records = vec![record(now - 20.0, "10.0.0.1"), record(now - 10.0, "10.0.0.2")];
        let config = config();

        let first_source = FakeSource::new(vec![Ok(page(records.clone(), ""))]);
        let first_destination = FakeDestination::new(None);
        let first = SyncDriver::new(&config, &first_source, &first_destination)
            .run_extraction(12)
            .await
            .unwrap();

        // the second run starts at the last event, so the source returns it again
        let second_source = FakeSource::new(vec![Ok(page(records, ""))]);
        let second_destination = FakeDestination::new(first.max_observed);
        let second = SyncDriver::new(&config, &second_source, &second_destination)
            .run_extraction(12)
            .await
            .unwrap();

        assert_eq!(second.processed, first.processed);
        assert_eq!(
            second_source.windows.lock().unwrap()[0].start,
            (now - 10.0).floor() as i64
        );
    }

    /// Legacy offset endpoint over a fixed set of timestamps: filters by the request
    /// window first, then applies offset and limit.
    struct WindowedOffsetSource {
        timestamps: Vec<f64>,
        requests: Mutex<Vec<(i64, u64)>>,
    }

    #[async_trait]
    impl FlowSource for WindowedOffsetSource {
        async fn fetch_page(
            &self,
            window: &ExtractionWindow,
            page_size: usize,
            cursor: &PageCursor,
        ) -> Result<FlowPage, ExporterError> {
            let offset = match cursor {
                PageCursor::Offset(offset) => *offset,
                PageCursor::Token(_) => 0,
            };
            self.requests.lock().unwrap().push((window.start, offset));
            let entries: Vec<serde_json::Value> = self
                .timestamps
                .iter()
                .filter(|ts| **ts >= window.start as f64 && **ts < window.end as f64)
                .skip(offset as usize)
                .take(page_size)
                .map(|ts| serde_json::json!({"ts": ts, "deviceIP": "10.0.0.1"}))
                .collect();
            let body = serde_json::to_vec(&entries).unwrap();
            decode_page(ApiVersion::V1, &body, cursor)
        }

        fn start_cursor(&self) -> PageCursor {
            PageCursor::start(ApiVersion::V1)
        }
    }

    #[tokio::test]
    async fn test_offset_pagination_keeps_window_start() {
        let base = now_seconds().floor() - 100.0;
        let source = WindowedOffsetSource {
            timestamps: (0..5).map(|i| base + f64::from(i)).collect(),
            requests: Mutex::new(Vec::new()),
        };
        let destination = FakeDestination::new(None);
        let mut config = config();
        config.page_size = 2;

        let summary = SyncDriver::new(&config, &source, &destination)
            .run_extraction(1)
            .await
            .unwrap();

        assert_eq!(summary.processed, 5);
        assert_eq!(summary.pages, 3);
        let exported: Vec<f64> = destination
            .batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|event| event.event_timestamp)
            .collect();
        assert_eq!(exported, (0..5).map(|i| base + f64::from(i)).collect::<Vec<_>>());

        let requests = source.requests.lock().unwrap().clone();
        let offsets: Vec<u64> = requests.iter().map(|(_, offset)| *offset).collect();
        assert_eq!(offsets, vec![0, 2, 4]);
        assert!(requests.iter().all(|(start, _)| *start == requests[0].0));
    }
}
