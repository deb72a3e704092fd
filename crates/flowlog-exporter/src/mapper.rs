// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mapping of raw flow records into the destination's event schema.
//!
//! The output keys are the same for every API version; fields the record does not
//! carry are omitted from the serialized event rather than written as `null`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::source::record::RawFlowRecord;

/// The destination-bound form of one [`RawFlowRecord`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedEvent {
    /// Event time as RFC 3339, used by the destination as the row time
    #[serde(rename = "_time", skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// Seconds since the epoch at which the flow was observed
    pub event_timestamp: f64,
    /// Seconds since the epoch at which the record was mapped
    pub ingest_timestamp: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub count: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_country: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Current wall-clock time as fractional epoch seconds.
pub fn now_seconds() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
}

fn rfc3339(timestamp: f64) -> Option<String> {
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1_000_000_000.0) as u32;
    DateTime::<Utc>::from_timestamp(secs as i64, nanos)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Map `record` with the current time as its ingest timestamp.
pub fn map_record(record: &RawFlowRecord) -> NormalizedEvent {
    map_record_at(record, now_seconds())
}

/// Map `record`, stamping it with `ingested_at`. Never fails.
pub fn map_record_at(record: &RawFlowRecord, ingested_at: f64) -> NormalizedEvent {
    let source = record.source.clone().unwrap_or_default();
    let destination = record.destination.clone().unwrap_or_default();
    let remote = record.remote.clone().unwrap_or_default();
    let network = record.network.clone().unwrap_or_default();

    NormalizedEvent {
        time: rfc3339(record.timestamp),
        event_timestamp: record.timestamp,
        ingest_timestamp: ingested_at,
        gid: record.gid.clone(),
        protocol: record.protocol.clone(),
        direction: record.direction.clone(),
        blocked: record.blocked,
        block_type: record.block_type.clone(),
        upload: record.bytes_uploaded,
        download: record.bytes_downloaded,
        duration: record.duration_seconds,
        count: record.occurrence_count,
        device_id: record.device.id.clone(),
        device_ip: record.device.ip.clone(),
        device_name: record.device.name.clone(),
        source_id: source.id,
        source_ip: source.ip,
        source_name: source.name,
        destination_id: destination.id,
        destination_ip: destination.ip,
        destination_name: destination.name,
        remote_ip: remote.ip,
        remote_domain: remote.domain,
        remote_port: remote.port,
        remote_country: remote.country,
        network_id: network.id,
        network_name: network.name,
        category: record.category.clone(),
        region: record.region.clone(),
    }
}
