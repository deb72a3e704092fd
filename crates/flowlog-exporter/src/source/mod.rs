// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Firewall flows API: wire decoding, HTTP client and pagination.

pub mod client;
mod lenient;
pub mod paginator;
pub mod record;
pub mod wire;

pub use client::{FirewallaClient, FlowSource};
pub use paginator::{Page, Paginator};
pub use record::{Group, Host, RawFlowRecord, Remote};
pub use wire::{FlowPage, PageCursor};
