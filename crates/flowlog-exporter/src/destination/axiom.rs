// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use bytes::Bytes;
use chrono::DateTime;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{debug, error};

use crate::config::ExporterConfig;
use crate::destination::Destination;
use crate::error::ExporterError;
use crate::mapper::NormalizedEvent;

const ORG_ID_HEADER: &str = "x-axiom-org-id";
const ERROR_BODY_LIMIT: usize = 256;

#[derive(Deserialize)]
struct QueryResult {
    #[serde(default)]
    matches: Vec<Match>,
}

#[derive(Deserialize)]
struct Match {
    #[serde(rename = "_time", default)]
    time: Option<String>,
    #[serde(default)]
    data: serde_json::Map<String, Value>,
}

impl Match {
    /// Prefers the exporter's own `event_timestamp` field and falls back to the row time.
    fn timestamp(&self) -> Option<f64> {
        let from_data = self.data.get("event_timestamp").and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        });
        from_data.or_else(|| {
            self.time
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|dt| dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_millis()) / 1000.0)
        })
    }
}

#[derive(Deserialize)]
struct IngestStatus {
    #[serde(default)]
    ingested: u64,
    #[serde(default)]
    failed: u64,
    #[serde(default)]
    failures: Vec<IngestFailure>,
}

#[derive(Deserialize)]
struct IngestFailure {
    #[serde(default)]
    error: String,
}

/// Client of the log-analytics service the flows are exported to.
#[derive(Debug, Clone)]
pub struct AxiomClient {
    client: reqwest::Client,
    base_url: Url,
    headers: HeaderMap,
}

impl AxiomClient {
    pub fn new(client: reqwest::Client, config: &ExporterConfig) -> Result<Self, ExporterError> {
        let base_url = Url::parse(config.axiom_url.trim_end_matches('/')).map_err(|e| {
            ExporterError::Configuration(format!("AXIOM_URL is not a valid URL: {e}"))
        })?;

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.axiom_token))
            .map_err(|_| ExporterError::Configuration("AXIOM_TOKEN is not a valid header value".to_string()))?;
        headers.insert(AUTHORIZATION, auth);
        let org_id = HeaderValue::from_str(&config.org_id)
            .map_err(|_| ExporterError::Configuration("AXIOM_ORG_ID is not a valid header value".to_string()))?;
        headers.insert(ORG_ID_HEADER, org_id);

        Ok(AxiomClient {
            client,
            base_url,
            headers,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    /// Ingest endpoint of `dataset`, with the name escaped as a single path segment.
    fn ingest_url(&self, dataset: &str) -> Result<Url, ExporterError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ExporterError::Configuration(format!(
                    "AXIOM_URL cannot take a path: {}",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(["v1", "datasets", dataset, "ingest"]);
        Ok(url)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<Bytes, ExporterError> {
        let time = Instant::now();
        let response = request
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| {
                error!("DESTINATION | {what} request failed: {e}");
                ExporterError::destination(format!("{what} request failed: {e}"))
            })?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| ExporterError::Destination {
            status: Some(status),
            message: format!("failed to read {what} response: {e}"),
        })?;

        if !status.is_success() {
            let excerpt: String = String::from_utf8_lossy(&body)
                .chars()
                .take(ERROR_BODY_LIMIT)
                .collect();
            error!("DESTINATION | {status}: {what} failed: {excerpt}");
            return Err(ExporterError::Destination {
                status: Some(status),
                message: format!("{what} returned {status}: {excerpt}"),
            });
        }
        debug!(
            "DESTINATION | {what} succeeded in {} ms",
            time.elapsed().as_millis()
        );
        Ok(body)
    }
}

#[async_trait]
impl Destination for AxiomClient {
    async fn latest_timestamp(&self, dataset: &str) -> Result<Option<f64>, ExporterError> {
        let apl = format!(
            "['{}'] | order by _time desc | limit 1",
            dataset.replace('\'', "\\'")
        );
        debug!("DESTINATION | Query: {apl}");
        let request = self
            .client
            .post(self.endpoint("/v1/datasets/_apl"))
            .query(&[("format", "legacy")])
            .json(&json!({ "apl": apl }));
        let body = self.send(request, "query").await?;

        let result: QueryResult = serde_json::from_slice(&body).map_err(|e| {
            ExporterError::destination(format!("undecodable query response: {e}"))
        })?;
        Ok(result.matches.first().and_then(Match::timestamp))
    }

    async fn append(
        &self,
        dataset: &str,
        events: &[NormalizedEvent],
    ) -> Result<(), ExporterError> {
        if events.is_empty() {
            debug!("DESTINATION | Nothing to ingest");
            return Ok(());
        }

        let request = self
            .client
            .post(self.ingest_url(dataset)?)
            .json(events);
        let body = self.send(request, "ingest").await?;

        let status: IngestStatus = serde_json::from_slice(&body).map_err(|e| {
            ExporterError::destination(format!("undecodable ingest response: {e}"))
        })?;
        if status.failed > 0 {
            let reason = status
                .failures
                .first()
                .map(|f| f.error.clone())
                .unwrap_or_default();
            return Err(ExporterError::destination(format!(
                "{} of {} events rejected: {reason}",
                status.failed,
                events.len()
            )));
        }
        debug!("DESTINATION | Ingested {} events", status.ingested);
        Ok(())
    }
}
