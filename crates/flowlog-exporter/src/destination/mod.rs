// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log-analytics destination: latest-timestamp query and batch append.

use async_trait::async_trait;

use crate::error::ExporterError;
use crate::mapper::NormalizedEvent;

pub mod axiom;

pub use axiom::AxiomClient;

#[async_trait]
pub trait Destination: Send + Sync {
    /// Timestamp, in epoch seconds, of the most recent event in `dataset`, if any.
    async fn latest_timestamp(&self, dataset: &str) -> Result<Option<f64>, ExporterError>;

    /// Append one batch to `dataset`. The batch is sent in a single request.
    async fn append(&self, dataset: &str, events: &[NormalizedEvent])
        -> Result<(), ExporterError>;
}
