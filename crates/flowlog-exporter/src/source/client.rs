// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Url;
use serde_json::json;
use std::time::Instant;
use tracing::{debug, error};

use crate::config::{ApiVersion, ExporterConfig};
use crate::error::ExporterError;
use crate::source::wire::{decode_page, FlowPage, PageCursor};
use crate::watermark::ExtractionWindow;

/// Columns the flows endpoint aggregates on; flows identical in all of them are
/// reported once with their `count`.
const GROUP_BY: &str = "ts,status,box,source,sourceIP,sport,device,network,destination,destinationIP,dport,domain,protocol,category,region,direction,blockType,upload,download,total,count";

/// Longest response body excerpt carried in an error message.
const ERROR_BODY_LIMIT: usize = 256;

/// Something that serves flow records one page at a time.
#[async_trait]
pub trait FlowSource: Send + Sync {
    /// Issue exactly one request for the page at `cursor` within `window`.
    async fn fetch_page(
        &self,
        window: &ExtractionWindow,
        page_size: usize,
        cursor: &PageCursor,
    ) -> Result<FlowPage, ExporterError>;

    /// Cursor of the first page of a run.
    fn start_cursor(&self) -> PageCursor;
}

/// Flows API client of the firewall's management service.
#[derive(Debug, Clone)]
pub struct FirewallaClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    api_version: ApiVersion,
}

impl FirewallaClient {
    pub fn new(client: reqwest::Client, config: &ExporterConfig) -> Result<Self, ExporterError> {
        // Url::join drops the last path segment unless it ends with '/'
        let mut base = config.firewalla_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| {
            ExporterError::Configuration(format!("FIREWALLA_URL is not a valid URL: {e}"))
        })?;
        Ok(FirewallaClient {
            client,
            base_url,
            api_key: config.firewalla_key.clone(),
            api_version: config.api_version,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ExporterError> {
        self.base_url
            .join(path)
            .map_err(|e| ExporterError::Configuration(format!("invalid flows endpoint: {e}")))
    }

    fn create_request(
        &self,
        window: &ExtractionWindow,
        page_size: usize,
        cursor: &PageCursor,
    ) -> Result<reqwest::RequestBuilder, ExporterError> {
        let request = match self.api_version {
            ApiVersion::V1 => {
                let offset = match cursor {
                    PageCursor::Offset(offset) => *offset,
                    PageCursor::Token(_) => 0,
                };
                self.client.post(self.endpoint("flows/query")?).json(&json!({
                    "start": window.start as f64,
                    "end": window.end as f64,
                    "limit": page_size,
                    "offset": offset,
                }))
            }
            ApiVersion::V2 => {
                let cursor = match cursor {
                    PageCursor::Token(token) => token.clone(),
                    PageCursor::Offset(_) => String::new(),
                };
                self.client.get(self.endpoint("flows")?).query(&[
                    ("query", format!("ts:{}-{}", window.start, window.end)),
                    ("sortBy", "ts:asc".to_string()),
                    ("limit", page_size.to_string()),
                    ("groupBy", GROUP_BY.to_string()),
                    ("cursor", cursor),
                ])
            }
        };
        Ok(request
            .header(AUTHORIZATION, format!("Token {}", self.api_key))
            .header(ACCEPT, "application/json"))
    }
}

#[async_trait]
impl FlowSource for FirewallaClient {
    async fn fetch_page(
        &self,
        window: &ExtractionWindow,
        page_size: usize,
        cursor: &PageCursor,
    ) -> Result<FlowPage, ExporterError> {
        let request = self.create_request(window, page_size, cursor)?;
        let time = Instant::now();
        let response = request.send().await.map_err(|e| {
            error!("FLOWS | Request failed: {e}");
            ExporterError::source_fetch(format!("request failed: {e}"))
        })?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| ExporterError::SourceFetch {
            status: Some(status),
            message: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            let excerpt: String = String::from_utf8_lossy(&body)
                .chars()
                .take(ERROR_BODY_LIMIT)
                .collect();
            error!("FLOWS | {status}: Failed to fetch page: {excerpt}");
            return Err(ExporterError::SourceFetch {
                status: Some(status),
                message: format!("{status}: {excerpt}"),
            });
        }

        let page = decode_page(self.api_version, &body, cursor)?;
        debug!(
            "FLOWS | Fetched {} records in {} ms",
            page.returned(),
            time.elapsed().as_millis()
        );
        Ok(page)
    }

    fn start_cursor(&self) -> PageCursor {
        PageCursor::start(self.api_version)
    }
}
