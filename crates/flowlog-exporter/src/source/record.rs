// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// A host taking part in a flow: the local device, or a named peer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Host {
    pub id: Option<String>,
    pub ip: Option<String>,
    pub name: Option<String>,
}

/// The internet-side peer, as reported by API versions that resolve it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Remote {
    pub ip: Option<String>,
    pub domain: Option<String>,
    pub port: Option<String>,
    pub country: Option<String>,
}

/// Network segment or device group the flow was seen on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// One flow entry, independent of the API version it was decoded from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFlowRecord {
    /// Seconds since the epoch
    pub timestamp: f64,
    pub gid: Option<String>,
    pub protocol: Option<String>,
    pub direction: Option<String>,
    pub blocked: bool,
    pub block_type: Option<String>,
    pub bytes_uploaded: Option<f64>,
    pub bytes_downloaded: Option<f64>,
    pub duration_seconds: Option<f64>,
    pub occurrence_count: i64,
    pub device: Host,
    pub source: Option<Host>,
    pub destination: Option<Host>,
    pub remote: Option<Remote>,
    pub network: Option<Group>,
    pub category: Option<String>,
    pub region: Option<String>,
}

impl RawFlowRecord {
    /// Partial records without a device IP are never exported.
    pub fn is_complete(&self) -> bool {
        self.device.ip.as_deref().is_some_and(|ip| !ip.trim().is_empty())
    }
}
