// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Version-tagged decoding of flows pages.
//!
//! Every known response shape is decoded into [`RawFlowRecord`] here, so schema
//! drift between API revisions never reaches the mapper or the sync driver.
//!
//! | version | request            | record shape                                   | continuation          |
//! |---------|--------------------|------------------------------------------------|-----------------------|
//! | V1      | `POST flows/query` | flat (`deviceIP`, `host`, `networkName`, ...)  | numeric `next` offset |
//! | V2      | `GET flows`        | nested (`device{}`, `source{}`, `remote{}`...) | `next_cursor` string  |

use crate::config::ApiVersion;
use crate::error::ExporterError;
use crate::source::lenient;
use crate::source::record::{Group, Host, RawFlowRecord, Remote};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Position in a result set. An empty token or a zero offset means "no further page".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    Token(String),
    Offset(u64),
}

impl PageCursor {
    /// Cursor for the first page of a run.
    pub fn start(version: ApiVersion) -> Self {
        match version {
            ApiVersion::V1 => PageCursor::Offset(0),
            ApiVersion::V2 => PageCursor::Token(String::new()),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        match self {
            PageCursor::Token(token) => token.is_empty(),
            PageCursor::Offset(offset) => *offset == 0,
        }
    }
}

/// One decoded page of the flows endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowPage {
    pub records: Vec<RawFlowRecord>,
    pub next_cursor: PageCursor,
    /// Entries the API returned that could not be decoded at all
    pub undecodable: usize,
}

impl FlowPage {
    /// Number of entries the API returned, decodable or not.
    pub fn returned(&self) -> usize {
        self.records.len() + self.undecodable
    }
}

#[derive(Deserialize)]
struct WireHost {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    ip: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    name: Option<String>,
}

impl From<WireHost> for Host {
    fn from(h: WireHost) -> Self {
        Host {
            id: h.id,
            ip: h.ip,
            name: h.name,
        }
    }
}

#[derive(Deserialize)]
struct WireRemote {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    ip: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    domain: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    port: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    country: Option<String>,
}

#[derive(Deserialize)]
struct WireGroup {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NestedFlow {
    #[serde(deserialize_with = "lenient::timestamp")]
    ts: f64,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    gid: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    protocol: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    direction: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_flag")]
    block: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_flag")]
    blocked: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    block_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    upload: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    download: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient::count")]
    count: i64,
    #[serde(default)]
    device: Option<WireHost>,
    #[serde(default)]
    source: Option<WireHost>,
    #[serde(default)]
    destination: Option<WireHost>,
    #[serde(default)]
    remote: Option<WireRemote>,
    #[serde(default)]
    network: Option<WireGroup>,
    #[serde(default)]
    group: Option<WireGroup>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    category: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    region: Option<String>,
}

impl From<NestedFlow> for RawFlowRecord {
    fn from(f: NestedFlow) -> Self {
        RawFlowRecord {
            timestamp: f.ts,
            gid: f.gid,
            protocol: f.protocol,
            direction: f.direction,
            blocked: f.block.or(f.blocked).unwrap_or_default(),
            block_type: f.block_type,
            bytes_uploaded: f.upload,
            bytes_downloaded: f.download,
            duration_seconds: f.duration,
            occurrence_count: f.count,
            device: f.device.map(Host::from).unwrap_or_default(),
            source: f.source.map(Host::from),
            destination: f.destination.map(Host::from),
            remote: f.remote.map(|r| Remote {
                ip: r.ip,
                domain: r.domain,
                port: r.port,
                country: r.country,
            }),
            network: f
                .network
                .or(f.group)
                .map(|g| Group { id: g.id, name: g.name }),
            category: f.category,
            region: f.region,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlatFlow {
    #[serde(deserialize_with = "lenient::timestamp")]
    ts: f64,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    gid: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    protocol: Option<String>,
    /// "in" / "out"
    #[serde(default, deserialize_with = "lenient::opt_string")]
    fd: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    direction: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_flag")]
    blocked: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_flag")]
    block: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    block_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    upload: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    download: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient::count")]
    count: i64,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    device: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    device_name: Option<String>,
    #[serde(default, rename = "deviceIP", deserialize_with = "lenient::opt_string")]
    device_ip: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    ip: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    host: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    port: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    country: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    intf: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    network_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    category: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    region: Option<String>,
}

impl From<FlatFlow> for RawFlowRecord {
    fn from(f: FlatFlow) -> Self {
        let has_remote = f.ip.is_some() || f.host.is_some() || f.port.is_some() || f.country.is_some();
        let has_network = f.intf.is_some() || f.network_name.is_some();
        RawFlowRecord {
            timestamp: f.ts,
            gid: f.gid,
            protocol: f.protocol,
            direction: f.fd.or(f.direction),
            blocked: f.blocked.or(f.block).unwrap_or_default(),
            block_type: f.block_type,
            bytes_uploaded: f.upload,
            bytes_downloaded: f.download,
            duration_seconds: f.duration,
            occurrence_count: f.count,
            device: Host {
                id: f.device,
                ip: f.device_ip,
                name: f.device_name,
            },
            source: None,
            destination: None,
            remote: has_remote.then_some(Remote {
                ip: f.ip,
                domain: f.host,
                port: f.port,
                country: f.country,
            }),
            network: has_network.then_some(Group {
                id: f.intf,
                name: f.network_name,
            }),
            category: f.category,
            region: f.region,
        }
    }
}

/// V1 answered either with a bare array or with an envelope carrying the next offset.
#[derive(Deserialize)]
#[serde(untagged)]
enum OffsetEnvelope {
    Bare(Vec<Value>),
    Paged {
        #[serde(default)]
        results: Vec<Value>,
        #[serde(default)]
        next: Option<u64>,
    },
}

#[derive(Deserialize)]
struct CursorEnvelope {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Decode one page body returned for a request made at `cursor`.
pub fn decode_page(
    version: ApiVersion,
    body: &[u8],
    cursor: &PageCursor,
) -> Result<FlowPage, ExporterError> {
    match version {
        ApiVersion::V1 => {
            let envelope: OffsetEnvelope = serde_json::from_slice(body)
                .map_err(|e| ExporterError::source_fetch(format!("undecodable flows page: {e}")))?;
            let (entries, next) = match envelope {
                OffsetEnvelope::Bare(entries) => {
                    let offset = match cursor {
                        PageCursor::Offset(offset) => *offset,
                        PageCursor::Token(_) => 0,
                    };
                    // without an explicit offset, the next page starts after this one
                    let next = if entries.is_empty() {
                        0
                    } else {
                        offset + entries.len() as u64
                    };
                    (entries, next)
                }
                OffsetEnvelope::Paged { results, next } => (results, next.unwrap_or(0)),
            };
            let (records, undecodable) = decode_entries::<FlatFlow>(entries);
            Ok(FlowPage {
                records,
                next_cursor: PageCursor::Offset(next),
                undecodable,
            })
        }
        ApiVersion::V2 => {
            let envelope: CursorEnvelope = serde_json::from_slice(body)
                .map_err(|e| ExporterError::source_fetch(format!("undecodable flows page: {e}")))?;
            let (records, undecodable) = decode_entries::<NestedFlow>(envelope.results);
            Ok(FlowPage {
                records,
                next_cursor: PageCursor::Token(envelope.next_cursor.unwrap_or_default()),
                undecodable,
            })
        }
    }
}

fn decode_entries<T>(entries: Vec<Value>) -> (Vec<RawFlowRecord>, usize)
where
    T: for<'de> Deserialize<'de> + Into<RawFlowRecord>,
{
    let mut undecodable = 0;
    let records = entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<T>(entry) {
            Ok(flow) => Some(flow.into()),
            Err(e) => {
                warn!("Skipping undecodable flow entry: {e}");
                undecodable += 1;
                None
            }
        })
        .collect();
    (records, undecodable)
}
