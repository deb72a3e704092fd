// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Errors that abort an extraction run.
///
/// Records that cannot be exported (no device IP) are not errors: they are
/// skipped and counted, so there is no variant for them.
#[derive(Debug, thiserror::Error)]
pub enum ExporterError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Failed to fetch flows from source: {message}")]
    SourceFetch {
        status: Option<StatusCode>,
        message: String,
    },

    #[error("Destination request failed: {message}")]
    Destination {
        status: Option<StatusCode>,
        message: String,
    },

    #[error("Extraction cancelled before page {page}")]
    Cancelled { page: usize },
}

impl ExporterError {
    pub fn source_fetch(message: impl Into<String>) -> Self {
        ExporterError::SourceFetch {
            status: None,
            message: message.into(),
        }
    }

    pub fn destination(message: impl Into<String>) -> Self {
        ExporterError::Destination {
            status: None,
            message: message.into(),
        }
    }

    /// HTTP status attached to the failure, if the remote side answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ExporterError::SourceFetch { status, .. } | ExporterError::Destination { status, .. } => {
                *status
            }
            _ => None,
        }
    }
}

/// Terminal failure of a run, with the number of records appended before it.
///
/// The count is informational; the next run re-derives its start from the
/// destination rather than from this value.
#[derive(Debug, thiserror::Error)]
#[error("{error} ({processed} records processed before failure)")]
pub struct RunFailure {
    #[source]
    pub error: ExporterError,
    pub processed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ExporterError::Configuration("AXIOM_DATASET is not set".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: AXIOM_DATASET is not set"
        );
    }

    #[test]
    fn test_status_only_for_remote_errors() {
        let error = ExporterError::SourceFetch {
            status: Some(StatusCode::BAD_GATEWAY),
            message: "502".to_string(),
        };
        assert_eq!(error.status(), Some(StatusCode::BAD_GATEWAY));
        assert_eq!(ExporterError::destination("down").status(), None);
        assert_eq!(ExporterError::Cancelled { page: 2 }.status(), None);
    }

    #[test]
    fn test_run_failure_display() {
        let failure = RunFailure {
            error: ExporterError::destination("ingest returned 500"),
            processed: 1000,
        };
        assert_eq!(
            failure.to_string(),
            "Destination request failed: ingest returned 500 (1000 records processed before failure)"
        );
    }
}
