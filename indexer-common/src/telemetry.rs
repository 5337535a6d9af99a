// This file is part of stake-pool-indexer.
// Copyright (C) 2025 Midnight Foundation
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use fastrace::collector::Config as CollectorConfig;
use fastrace_opentelemetry::OpenTelemetryReporter;
use log::info;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use opentelemetry::InstrumentationScope;
use opentelemetry_otlp::{ExporterBuildError, SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use serde::Deserialize;
use std::{borrow::Cow, net::IpAddr};

/// Telemetry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "tracing")]
    pub tracing_config: TracingConfig,

    #[serde(rename = "metrics")]
    pub metrics_config: MetricsConfig,
}

/// Tracing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TracingConfig {
    pub enabled: bool,
    pub service_name: String,
    pub otlp_exporter_endpoint: String,
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: IpAddr,
    pub port: u16,
}

/// Initialize logging, filtered via the `RUST_LOG` environment variable, defaulting to `info`.
pub fn init_logging() {
    logforth::starter_log::stdout().apply();
}

/// Initialize tracing by installing a fastrace reporter exporting spans via OTLP (gRPC), if
/// enabled. Must be called within a Tokio runtime.
pub fn init_tracing(config: TracingConfig) -> Result<(), ExporterBuildError> {
    let TracingConfig {
        enabled,
        service_name,
        otlp_exporter_endpoint,
    } = config;

    if enabled {
        let exporter = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(otlp_exporter_endpoint.as_str())
            .build()?;
        let resource = Resource::builder()
            .with_service_name(service_name.clone())
            .build();
        let scope = InstrumentationScope::builder(service_name.clone())
            .with_version(env!("CARGO_PKG_VERSION"))
            .build();

        let reporter = OpenTelemetryReporter::new(exporter, Cow::Owned(resource), scope);
        fastrace::set_reporter(reporter, CollectorConfig::default());
        info!(service_name:%, otlp_exporter_endpoint:%; "tracing reporter installed");
    }

    Ok(())
}

/// Flush all pending spans; to be called before the process exits.
pub fn flush_tracing() {
    fastrace::flush();
}

/// Initialize metrics by installing a Prometheus recorder with an HTTP listener, if enabled.
pub fn init_metrics(config: MetricsConfig) -> Result<(), BuildError> {
    let MetricsConfig {
        enabled,
        address,
        port,
    } = config;

    if enabled {
        PrometheusBuilder::new()
            .with_http_listener((address, port))
            .install()?;
        info!(address:%, port; "metrics exporter installed");
    }

    Ok(())
}
