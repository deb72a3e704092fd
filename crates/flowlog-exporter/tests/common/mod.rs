// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures for the end-to-end extraction tests

#![allow(dead_code)]

use flowlog_exporter::config::ApiVersion;
use flowlog_exporter::ExporterConfig;
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::{json, Value};

pub const DATASET: &str = "firewalla";
pub const T0: f64 = 1700000000.0;

/// Config pointing both the flows API and the destination at one mock server.
pub fn config(server_url: &str, page_size: usize) -> ExporterConfig {
    ExporterConfig {
        dataset: DATASET.to_string(),
        org_id: "org-1".to_string(),
        axiom_token: "xapt-token".to_string(),
        axiom_url: server_url.to_string(),
        firewalla_url: format!("{server_url}/v2/"),
        firewalla_key: "fw-key".to_string(),
        api_version: ApiVersion::V2,
        page_size,
        ..Default::default()
    }
}

/// One V2 flow entry. An empty `device_ip` yields an unexportable record.
pub fn flow(ts: f64, device_ip: &str) -> Value {
    json!({
        "ts": ts,
        "gid": "00000000-0000-0000-0000-000000000001",
        "protocol": "tcp",
        "direction": "outbound",
        "block": false,
        "upload": 1200,
        "download": 5400,
        "duration": 3.5,
        "count": 1,
        "device": {"id": "aa:bb:cc:dd:ee:ff", "ip": device_ip, "name": "laptop"},
        "remote": {"ip": "93.184.216.34", "domain": "example.com", "port": 443, "country": "US"},
        "network": {"id": "net-1", "name": "LAN"},
        "category": "edu",
        "region": "US"
    })
}

/// `count` flows, one second apart starting at `start`.
pub fn flows(start: f64, count: usize) -> Vec<Value> {
    (0..count).map(|i| flow(start + i as f64, "192.168.1.10")).collect()
}

pub fn page_body(results: Vec<Value>, next_cursor: &str) -> String {
    json!({
        "count": results.len(),
        "results": results,
        "next_cursor": next_cursor,
    })
    .to_string()
}

/// Mock answering the watermark query with `latest` as the newest event.
pub async fn mock_watermark(server: &mut ServerGuard, latest: Option<f64>) -> Mock {
    let matches = match latest {
        Some(ts) => json!([{"_time": "2023-11-14T22:13:20Z", "data": {"event_timestamp": ts}}]),
        None => json!([]),
    };
    server
        .mock("POST", "/v1/datasets/_apl")
        .match_query(Matcher::UrlEncoded("format".into(), "legacy".into()))
        .match_header("Authorization", "Bearer xapt-token")
        .with_status(200)
        .with_body(json!({ "matches": matches }).to_string())
        .create_async()
        .await
}

/// Mock serving `body` for the flows request made with `cursor`.
pub async fn mock_flows_page(
    server: &mut ServerGuard,
    cursor: &str,
    page_size: usize,
    body: String,
) -> Mock {
    server
        .mock("GET", "/v2/flows")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("cursor".into(), cursor.into()),
            Matcher::UrlEncoded("limit".into(), page_size.to_string()),
            Matcher::UrlEncoded("sortBy".into(), "ts:asc".into()),
        ]))
        .match_header("Authorization", "Token fw-key")
        .with_status(200)
        .with_body(body)
        .expect(1)
        .create_async()
        .await
}

/// Mock accepting every ingest request, `expected` times.
pub async fn mock_ingest(server: &mut ServerGuard, expected: usize) -> Mock {
    server
        .mock("POST", "/v1/datasets/firewalla/ingest")
        .match_header("Authorization", "Bearer xapt-token")
        .match_header("X-Axiom-Org-Id", "org-1")
        .with_status(200)
        .with_body(r#"{"ingested": 1, "failed": 0, "failures": []}"#)
        .expect(expected)
        .create_async()
        .await
}
