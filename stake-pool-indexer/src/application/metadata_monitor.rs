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

use crate::{
    application::{Config, metrics::MetadataMetrics, shutdown_requested},
    domain::{GenesisParameters, MetadataFetcher, PoolMetadataRef, storage::Storage},
};
use anyhow::Context;
use fastrace::{Span, future::FutureExt as _, prelude::SpanContext, trace};
use log::{debug, info, warn};
use stream_cancel::Tripwire;
use tokio::{select, time::sleep};

/// Fetch off-chain metadata for registered pools until shutdown is requested via the given
/// tripwire. Backs off for the expected block interval whenever a pass makes no progress.
pub async fn monitor_metadata(
    config: Config,
    genesis: GenesisParameters,
    fetcher: impl MetadataFetcher,
    storage: impl Storage,
    tripwire: Tripwire,
) -> anyhow::Result<()> {
    let backoff = genesis.expected_block_interval();
    let metrics = MetadataMetrics::default();
    info!(backoff:?; "monitoring stake pool metadata");

    while !shutdown_requested(&tripwire) {
        let outcome = fetch_metadata(config.metadata_batch_size.get(), &fetcher, &storage, &metrics)
            .in_span(Span::root("fetch-metadata", SpanContext::random()))
            .await?;

        if outcome.needs_backoff() {
            debug!(pending = outcome.pending, fetched = outcome.fetched; "backing off");

            select! {
                _ = sleep(backoff) => {}
                _ = tripwire.clone() => break,
            }
        }
    }

    info!("stopped monitoring stake pool metadata");
    Ok(())
}

/// Result of one metadata fetching pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FetchOutcome {
    pending: usize,
    fetched: usize,
}

impl FetchOutcome {
    /// Nothing pending or nothing fetched means the next pass would not make progress right away.
    fn needs_backoff(&self) -> bool {
        self.pending == 0 || self.fetched == 0
    }
}

/// Fetch and store metadata for at most `limit` unresolved references. Failures to fetch are
/// logged, recorded and retried in a later pass.
#[trace]
async fn fetch_metadata(
    limit: usize,
    fetcher: &impl MetadataFetcher,
    storage: &impl Storage,
    metrics: &MetadataMetrics,
) -> anyhow::Result<FetchOutcome> {
    let refs = storage
        .unfetched_pool_metadata_refs(limit)
        .await
        .context("get unfetched pool metadata references")?;

    let mut fetched = 0;
    for PoolMetadataRef { pool_id, url, hash } in &refs {
        match fetcher.fetch(url, hash).await {
            Ok(metadata) => {
                storage
                    .put_pool_metadata(hash, &metadata)
                    .await
                    .context("put pool metadata")?;
                info!(pool_id:%, ticker:% = metadata.ticker; "stake pool metadata fetched");

                metrics.fetched();
                fetched += 1;
            }

            Err(error) => {
                warn!(pool_id:%, url:%, error:%; "cannot fetch stake pool metadata");
                storage
                    .put_pool_metadata_fetch_failure(hash)
                    .await
                    .context("put pool metadata fetch failure")?;
                metrics.failed();
            }
        }
    }

    Ok(FetchOutcome {
        pending: refs.len(),
        fetched,
    })
}
