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

use anyhow::Context;
use indexer_common::{
    config::ConfigExt,
    infra::{migrations, pool::sqlite::SqlitePool},
    telemetry,
};
use log::{error, info, warn};
use stake_pool_indexer::{
    application,
    config::Config,
    infra::{self, metadata_fetcher::HttpMetadataFetcher, ogmios::OgmiosClient, storage::Storage},
};
use std::panic;
use stream_cancel::Tripwire;
use tokio::{
    select,
    signal::unix::{SignalKind, signal},
    task,
};

#[tokio::main]
async fn main() {
    telemetry::init_logging();
    panic::set_hook(Box::new(|panic| error!(panic:%; "process panicked")));

    let result = run().await;
    telemetry::flush_tracing();

    if let Err(error) = result {
        let backtrace = error.backtrace();
        let error = format!("{error:#}");
        error!(error, backtrace:%; "process exited with ERROR");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("register SIGTERM handler")?;

    let config = Config::load().context("load configuration")?;
    info!(config:?; "starting");
    let Config {
        run_migrations,
        application_config,
        infra_config,
        telemetry_config:
            telemetry::Config {
                tracing_config,
                metrics_config,
            },
    } = config;

    telemetry::init_tracing(tracing_config).context("initialize tracing")?;
    telemetry::init_metrics(metrics_config).context("initialize metrics")?;

    let infra::Config {
        node_config,
        storage_config,
        metadata_fetcher_config,
    } = infra_config;

    let pool = SqlitePool::new(storage_config)
        .await
        .context("create DB pool for SQLite")?;
    if run_migrations {
        migrations::sqlite::run(&pool)
            .await
            .context("run migrations for SQLite")?;
    }
    let storage = Storage::new(pool);

    let network = OgmiosClient::new(node_config);
    let genesis = network
        .genesis_parameters()
        .await
        .context("get genesis parameters")?;
    info!(genesis:?; "genesis parameters received");

    let fetcher =
        HttpMetadataFetcher::new(metadata_fetcher_config).context("create metadata fetcher")?;

    let (trigger, tripwire) = Tripwire::new();

    let mut chain_monitor = task::spawn(application::monitor_stake_pools(
        application_config.clone(),
        genesis,
        network,
        storage.clone(),
        tripwire.clone(),
    ));

    let mut metadata_monitor = task::spawn(application::monitor_metadata(
        application_config,
        genesis,
        fetcher,
        storage,
        tripwire,
    ));

    // Both monitors only complete on failure unless shutdown has been requested.
    select! {
        result = &mut chain_monitor => {
            return result
                .context("chain monitor panicked")
                .and_then(|r| r.context("chain monitor failed"));
        }

        result = &mut metadata_monitor => {
            return result
                .context("metadata monitor panicked")
                .and_then(|r| r.context("metadata monitor failed"));
        }

        _ = sigterm.recv() => {
            warn!("SIGTERM received");
        }
    }

    drop(trigger);

    let (chain_result, metadata_result) = tokio::join!(chain_monitor, metadata_monitor);
    chain_result
        .context("chain monitor panicked")
        .and_then(|r| r.context("chain monitor failed"))?;
    metadata_result
        .context("metadata monitor panicked")
        .and_then(|r| r.context("metadata monitor failed"))?;

    info!("stopped");
    Ok(())
}
