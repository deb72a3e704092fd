// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use flowlog_exporter::{run_extraction, ExporterConfig};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match ExporterConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating config on flow log exporter startup: {e}");
            std::process::exit(1);
        }
    };

    match run_extraction(&config, config.lookback_hours).await {
        Ok(summary) => {
            info!(
                "Exported {} flows from {} to {} ({} skipped)",
                summary.processed, summary.window.start, summary.window.end, summary.skipped
            );
        }
        Err(failure) => {
            error!("Flow log export failed: {failure}");
            std::process::exit(1);
        }
    }
}
