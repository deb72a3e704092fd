// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::WatermarkFallback;
use crate::destination::Destination;
use crate::error::ExporterError;

const SECONDS_PER_HOUR: i64 = 3600;

/// Half-open interval `[start, end)` of epoch seconds to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionWindow {
    pub start: i64,
    pub end: i64,
}

impl ExtractionWindow {
    /// Move the start forward to `timestamp`, never backwards and never past `end`.
    pub fn advance_to(&mut self, timestamp: f64) {
        let candidate = (timestamp.floor() as i64).min(self.end);
        if candidate > self.start {
            self.start = candidate;
        }
    }

    pub fn duration_secs(&self) -> i64 {
        self.end - self.start
    }
}

/// Window for a run at `now`, given the destination's latest timestamp.
///
/// The start is the later of the watermark and `now - lookback_hours`, clamped to
/// `now` so a watermark from a skewed clock cannot produce an inverted window.
pub fn window_from_watermark(latest: Option<f64>, lookback_hours: u32, now: i64) -> ExtractionWindow {
    let floor = now - i64::from(lookback_hours) * SECONDS_PER_HOUR;
    let start = match latest {
        Some(ts) if ts.is_finite() => (ts.floor() as i64).max(floor),
        _ => floor,
    };
    ExtractionWindow {
        start: start.min(now),
        end: now,
    }
}

/// Derives each run's starting point from what the destination already holds.
pub struct WatermarkResolver<'a> {
    destination: &'a dyn Destination,
    dataset: &'a str,
    fallback: WatermarkFallback,
}

impl<'a> WatermarkResolver<'a> {
    pub fn new(
        destination: &'a dyn Destination,
        dataset: &'a str,
        fallback: WatermarkFallback,
    ) -> Self {
        WatermarkResolver {
            destination,
            dataset,
            fallback,
        }
    }

    pub async fn resolve(&self, lookback_hours: u32) -> Result<ExtractionWindow, ExporterError> {
        self.resolve_at(lookback_hours, Utc::now().timestamp()).await
    }

    pub async fn resolve_at(
        &self,
        lookback_hours: u32,
        now: i64,
    ) -> Result<ExtractionWindow, ExporterError> {
        let latest = match self.destination.latest_timestamp(self.dataset).await {
            Ok(latest) => latest,
            Err(e) => match self.fallback {
                WatermarkFallback::Fail => return Err(e),
                WatermarkFallback::FullLookback => {
                    warn!("Watermark query failed, extracting the full {lookback_hours}h lookback: {e}");
                    None
                }
            },
        };

        if latest.is_none() {
            debug!("No prior events in dataset {}", self.dataset);
        }
        let window = window_from_watermark(latest, lookback_hours, now);
        info!(
            "Extraction window {} - {} ({} seconds)",
            window.start,
            window.end,
            window.duration_secs()
        );
        Ok(window)
    }
}
