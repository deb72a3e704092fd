// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::ExporterError;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_AXIOM_URL: &str = "https://api.axiom.co";
const DEFAULT_PAGE_SIZE: usize = 500;
const MAX_PAGE_SIZE: usize = 1000;
const DEFAULT_LOOKBACK_HOURS: u32 = 12;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Every key understood by [`ExporterConfig::from_map`].
pub const CONFIG_KEYS: [&str; 13] = [
    "AXIOM_DATASET",
    "AXIOM_ORG_ID",
    "AXIOM_TOKEN",
    "AXIOM_URL",
    "FIREWALLA_URL",
    "FIREWALLA_KEY",
    "FIREWALLA_API_VERSION",
    "FIREWALLA_PAGE_SIZE",
    "LOOKBACK_HOURS",
    "REQUEST_TIMEOUT_SECS",
    "WATERMARK_ON_QUERY_ERROR",
    "HTTPS_PROXY",
    "LOG_LEVEL",
];

/// Wire shape of the flows endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    /// `POST flows/query`, flat records, numeric offset continuation.
    V1,
    /// `GET flows`, nested records, opaque `next_cursor` continuation.
    V2,
}

impl FromStr for ApiVersion {
    type Err = ExporterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "v1" | "1" => Ok(ApiVersion::V1),
            "v2" | "2" => Ok(ApiVersion::V2),
            other => Err(ExporterError::Configuration(format!(
                "Invalid FIREWALLA_API_VERSION '{other}'. Must be one of: v1, v2"
            ))),
        }
    }
}

/// What the watermark resolver does when the destination query fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatermarkFallback {
    /// Abort the run with a destination error.
    #[default]
    Fail,
    /// Log a warning and extract the whole lookback window.
    FullLookback,
}

impl FromStr for WatermarkFallback {
    type Err = ExporterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail" => Ok(WatermarkFallback::Fail),
            "lookback" => Ok(WatermarkFallback::FullLookback),
            other => Err(ExporterError::Configuration(format!(
                "Invalid WATERMARK_ON_QUERY_ERROR '{other}'. Must be one of: fail, lookback"
            ))),
        }
    }
}

/// Configuration for one extraction run, resolved before the core starts.
#[derive(Clone)]
pub struct ExporterConfig {
    /// Destination dataset name
    pub dataset: String,
    pub org_id: String,
    pub axiom_token: String,
    /// Destination API base URL
    pub axiom_url: String,
    /// Source API base URL, e.g. `https://mydomain.firewalla.net/v2/`
    pub firewalla_url: String,
    pub firewalla_key: String,
    pub api_version: ApiVersion,
    /// Records requested per page
    pub page_size: usize,
    /// Furthest the resolver reaches back when no watermark exists, in hours
    pub lookback_hours: u32,
    /// Timeout applied to every source and destination request
    pub request_timeout: Duration,
    pub watermark_fallback: WatermarkFallback,
    pub https_proxy: Option<String>,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            dataset: String::new(),
            org_id: String::new(),
            axiom_token: String::new(),
            axiom_url: DEFAULT_AXIOM_URL.to_string(),
            firewalla_url: String::new(),
            firewalla_key: String::new(),
            api_version: ApiVersion::V2,
            page_size: DEFAULT_PAGE_SIZE,
            lookback_hours: DEFAULT_LOOKBACK_HOURS,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            watermark_fallback: WatermarkFallback::Fail,
            https_proxy: None,
            log_level: "info".to_string(),
        }
    }
}

impl fmt::Debug for ExporterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExporterConfig")
            .field("dataset", &self.dataset)
            .field("org_id", &self.org_id)
            .field("axiom_token", &"<redacted>")
            .field("axiom_url", &self.axiom_url)
            .field("firewalla_url", &self.firewalla_url)
            .field("firewalla_key", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("page_size", &self.page_size)
            .field("lookback_hours", &self.lookback_hours)
            .field("request_timeout", &self.request_timeout)
            .field("watermark_fallback", &self.watermark_fallback)
            .field("https_proxy", &self.https_proxy)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl ExporterConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ExporterError> {
        let values = CONFIG_KEYS
            .iter()
            .filter_map(|key| env::var(key).ok().map(|val| (key.to_string(), val)))
            .collect::<HashMap<String, String>>();
        Self::from_map(&values)
    }

    /// Create configuration from a JSON object of string values, the format the
    /// exporter's secret is stored in.
    pub fn from_secret_json(secret: &str) -> Result<Self, ExporterError> {
        let raw: HashMap<String, serde_json::Value> = serde_json::from_str(secret)
            .map_err(|e| ExporterError::Configuration(format!("secret is not a JSON object: {e}")))?;
        let values = raw
            .into_iter()
            .filter_map(|(key, val)| match val {
                serde_json::Value::String(s) => Some((key, s)),
                serde_json::Value::Number(n) => Some((key, n.to_string())),
                _ => None,
            })
            .collect::<HashMap<String, String>>();
        Self::from_map(&values)
    }

    /// Create configuration from arbitrary key/value pairs. Unknown keys are ignored.
    pub fn from_map(values: &HashMap<String, String>) -> Result<Self, ExporterError> {
        let defaults = Self::default();
        let get = |key: &str| {
            values
                .get(key)
                .map(|val| val.trim().to_string())
                .filter(|val| !val.is_empty())
        };
        let required = |key: &str| {
            get(key).ok_or_else(|| {
                ExporterError::Configuration(format!("{key} is not set"))
            })
        };

        let api_version = match get("FIREWALLA_API_VERSION") {
            Some(val) => val.parse()?,
            None => defaults.api_version,
        };
        let watermark_fallback = match get("WATERMARK_ON_QUERY_ERROR") {
            Some(val) => val.parse()?,
            None => defaults.watermark_fallback,
        };

        let config = Self {
            dataset: required("AXIOM_DATASET")?,
            org_id: required("AXIOM_ORG_ID")?,
            axiom_token: required("AXIOM_TOKEN")?,
            axiom_url: get("AXIOM_URL").unwrap_or(defaults.axiom_url),
            firewalla_url: required("FIREWALLA_URL")?,
            firewalla_key: required("FIREWALLA_KEY")?,
            api_version,
            page_size: parse_number(get("FIREWALLA_PAGE_SIZE"), "FIREWALLA_PAGE_SIZE")?
                .unwrap_or(defaults.page_size),
            lookback_hours: parse_number(get("LOOKBACK_HOURS"), "LOOKBACK_HOURS")?
                .unwrap_or(defaults.lookback_hours),
            request_timeout: parse_number(get("REQUEST_TIMEOUT_SECS"), "REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            watermark_fallback,
            https_proxy: get("HTTPS_PROXY"),
            log_level: get("LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ExporterError> {
        for (key, val) in [
            ("AXIOM_DATASET", &self.dataset),
            ("AXIOM_ORG_ID", &self.org_id),
            ("AXIOM_TOKEN", &self.axiom_token),
            ("FIREWALLA_URL", &self.firewalla_url),
            ("FIREWALLA_KEY", &self.firewalla_key),
        ] {
            if val.trim().is_empty() {
                return Err(ExporterError::Configuration(format!(
                    "{key} cannot be empty"
                )));
            }
        }

        for (key, url) in [("AXIOM_URL", &self.axiom_url), ("FIREWALLA_URL", &self.firewalla_url)] {
            if reqwest::Url::parse(url).is_err() {
                return Err(ExporterError::Configuration(format!(
                    "{key} is not a valid URL: '{url}'"
                )));
            }
        }

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ExporterError::Configuration(format!(
                "FIREWALLA_PAGE_SIZE must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }

        if self.lookback_hours == 0 {
            return Err(ExporterError::Configuration(
                "LOOKBACK_HOURS must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(ExporterError::Configuration(
                "REQUEST_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ExporterError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}

fn parse_number<T: FromStr>(value: Option<String>, key: &str) -> Result<Option<T>, ExporterError> {
    value
        .map(|val| {
            val.parse::<T>().map_err(|_| {
                ExporterError::Configuration(format!("{key} must be a positive integer, got '{val}'"))
            })
        })
        .transpose()
}
