// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Incremental export of firewall flow logs into a log-analytics dataset.
//!
//! Each run resolves its starting point from the newest event already in the
//! destination ([`watermark`]), walks the flows API page by page
//! ([`source::paginator`]), flattens every record ([`mapper`]) and appends one
//! batch per page ([`destination`]). [`sync::SyncDriver`] ties the steps together.
//!
//! Runs are stateless: nothing is persisted locally, and a failed run is simply
//! retried by the next scheduled invocation. Delivery is at-least-once; records at
//! the watermark second are re-exported by the following run.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod destination;
pub mod error;
pub mod http_utils;
pub mod mapper;
pub mod source;
pub mod sync;
pub mod watermark;

use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use config::ExporterConfig;
pub use error::{ExporterError, RunFailure};
pub use sync::{RunSummary, SyncDriver};

use destination::AxiomClient;
use source::FirewallaClient;

/// Run one extraction against the configured source and destination.
pub async fn run_extraction(
    config: &ExporterConfig,
    lookback_hours: u32,
) -> Result<RunSummary, RunFailure> {
    run_extraction_until(config, lookback_hours, CancellationToken::new()).await
}

/// Like [`run_extraction`], stopping at the next page boundary once `cancel` fires.
pub async fn run_extraction_until(
    config: &ExporterConfig,
    lookback_hours: u32,
    cancel: CancellationToken,
) -> Result<RunSummary, RunFailure> {
    let not_started = |error| RunFailure {
        error,
        processed: 0,
    };

    config.validate().map_err(not_started)?;
    let client = http_utils::build_client(config.https_proxy.as_deref(), config.request_timeout)
        .map_err(|e| not_started(ExporterError::Configuration(format!("failed to build HTTP client: {e}"))))?;
    debug!("Starting extraction with {config:?}");

    let source = FirewallaClient::new(client.clone(), config).map_err(not_started)?;
    let destination = AxiomClient::new(client, config).map_err(not_started)?;

    SyncDriver::new(config, &source, &destination)
        .with_cancellation(cancel)
        .run_extraction(lookback_hours)
        .await
}
