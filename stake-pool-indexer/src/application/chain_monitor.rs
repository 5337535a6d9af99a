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
    application::{Config, metrics::ChainMetrics, shutdown_requested},
    domain::{
        Block, BlockHeader, ChainEvent, ChainPoint, FollowAction, FollowExit, GenesisParameters,
        Network,
        storage::{PutPoolProductionError, Storage},
    },
};
use anyhow::{Context, anyhow};
use fastrace::{Span, future::FutureExt as _, prelude::SpanContext, trace};
use futures::StreamExt;
use log::{debug, error, info};
use std::{num::NonZeroUsize, pin::pin};
use stream_cancel::{StreamExt as _, Tripwire};

/// Lower bound for the number of recent blocks offered as intersection candidates.
pub const MIN_CURSOR_LENGTH: usize = 100;

/// Project block production, pool registrations and pool retirements from the chain into the
/// given storage until shutdown is requested via the given tripwire or following fails.
pub async fn monitor_stake_pools(
    config: Config,
    genesis: GenesisParameters,
    network: impl Network,
    storage: impl Storage,
    tripwire: Tripwire,
) -> anyhow::Result<()> {
    let cursor_length = cursor_length(&genesis);

    let production_count = storage
        .get_pool_production_count()
        .await
        .context("get pool production count")?;
    let metrics = ChainMetrics::new(production_count);

    loop {
        let cursor = storage
            .read_pool_production_cursor(cursor_length)
            .await
            .context("read pool production cursor")?;
        let from = cursor.last().map(ChainPoint::from).unwrap_or(ChainPoint::Origin);
        info!(from:%, cursor_length = cursor.len(); "following chain");

        let exit = follow(
            &network,
            &storage,
            &metrics,
            cursor,
            config.blocks_batch_size,
            tripwire.clone(),
        )
        .await;

        match exit {
            FollowExit::Interrupted => {
                info!("stopped following chain");
                return Ok(());
            }

            FollowExit::Failure(error) => {
                let error = anyhow!(error);
                error!(error:%; "following chain failed");
                return Err(error.context("follow chain"));
            }

            FollowExit::Rollback(point) => {
                info!(point:%; "rolling back");
                storage
                    .rollback_to(point)
                    .await
                    .with_context(|| format!("roll back to {point}"))?;
                metrics.rollback();
            }
        }
    }
}

/// The number of recent blocks to offer as intersection candidates; a rollback never reaches
/// further back than the stability window.
fn cursor_length(genesis: &GenesisParameters) -> usize {
    MIN_CURSOR_LENGTH.max(genesis.epoch_stability as usize)
}

/// Follow the chain from the given cursor, applying forward blocks in batches.
async fn follow<N, S>(
    network: &N,
    storage: &S,
    metrics: &ChainMetrics,
    cursor: Vec<BlockHeader>,
    batch_size: NonZeroUsize,
    tripwire: Tripwire,
) -> FollowExit
where
    N: Network,
    S: Storage,
{
    let events = network
        .follow(cursor)
        .take_until_if(tripwire.clone())
        .ready_chunks(batch_size.get());
    let mut events = pin!(events);

    while let Some(events) = events.next().await {
        let mut blocks = Vec::with_capacity(events.len());
        let mut exit = None;

        for event in events {
            match event {
                Ok(ChainEvent::RollForward { block, tip }) => {
                    debug!(slot = block.header.slot, tip:%; "roll forward");
                    blocks.push(block);
                }

                Ok(ChainEvent::RollBackward { point, tip }) => {
                    debug!(point:%, tip:%; "roll backward");
                    exit = Some(FollowExit::Rollback(point));
                    break;
                }

                Err(error) => {
                    exit = Some(FollowExit::Failure(error.into()));
                    break;
                }
            }
        }

        // Blocks received before a rollback or failure are applied nonetheless.
        if !blocks.is_empty() {
            let result = apply_blocks(blocks, storage, metrics, &tripwire)
                .in_span(Span::root("apply-blocks", SpanContext::random()))
                .await;
            match result {
                Ok(FollowAction::Continue) => {}
                Ok(FollowAction::Stop) => return FollowExit::Interrupted,
                Err(error) => return FollowExit::Failure(error.into()),
            }
        }

        if let Some(exit) = exit {
            return exit;
        }
    }

    if shutdown_requested(&tripwire) {
        FollowExit::Interrupted
    } else {
        FollowExit::Failure("chain follower terminated unexpectedly".into())
    }
}

/// Apply the given blocks within a single transaction.
#[trace]
async fn apply_blocks(
    blocks: Vec<Block>,
    storage: &impl Storage,
    metrics: &ChainMetrics,
    tripwire: &Tripwire,
) -> Result<FollowAction, sqlx::Error> {
    let mut tx = storage.create_tx().await?;

    for block in &blocks {
        let Block {
            header,
            producer,
            pool_registrations,
            pool_retirements,
        } = block;

        if let Some(pool_id) = producer {
            match storage.put_pool_production(header, *pool_id, &mut tx).await {
                Ok(()) => {}

                Err(PutPoolProductionError::PointAlreadyExists(slot)) => {
                    error!(slot, pool_id:%; "pool production already exists");
                    metrics.production_conflict();
                }

                Err(PutPoolProductionError::Database(error)) => return Err(error),
            }
        }

        for certificate in pool_registrations {
            info!(
                pool_id:% = certificate.pool_id,
                slot = header.slot;
                "discovered stake pool registration"
            );
            storage
                .put_pool_registration(header.slot, certificate, &mut tx)
                .await?;
        }

        for certificate in pool_retirements {
            info!(
                pool_id:% = certificate.pool_id,
                retirement_epoch = certificate.retirement_epoch,
                slot = header.slot;
                "discovered stake pool retirement"
            );
            storage
                .put_pool_retirement(header.slot, certificate, &mut tx)
                .await?;
        }
    }

    tx.commit().await?;
    metrics.update(&blocks);

    if let Some(Block { header, .. }) = blocks.last() {
        info!(
            slot = header.slot,
            block_height = header.block_height,
            block_count = blocks.len();
            "blocks applied"
        );
    }

    if shutdown_requested(tripwire) {
        Ok(FollowAction::Stop)
    } else {
        Ok(FollowAction::Continue)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        application::{Config, chain_monitor::cursor_length, monitor_stake_pools},
        domain::{
            Block, BlockHeader, ChainEvent, ChainPoint, Coin, GenesisParameters, Network,
            PoolRetirementCertificate, StakeDistribution, storage::Storage as _,
        },
        infra::storage::{
            Storage,
            tests::{create_storage, header, pool_id, registration},
        },
    };
    use futures::{Stream, StreamExt, stream};
    use indexer_common::error::BoxError;
    use std::{
        collections::VecDeque,
        num::NonZeroUsize,
        sync::{Arc, Mutex},
        time::Duration,
    };
    use stream_cancel::Tripwire;
    use thiserror::Error;
    use tokio::time::{sleep, timeout};

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[test]
    fn test_cursor_length() {
        let genesis = |epoch_stability| GenesisParameters {
            active_slot_coefficient: 0.05,
            slot_length: Duration::from_secs(1),
            epoch_stability,
        };

        assert_eq!(cursor_length(&genesis(2160)), 2160);
        assert_eq!(cursor_length(&genesis(100)), 100);
        assert_eq!(cursor_length(&genesis(10)), 100);
    }

    #[tokio::test]
    async fn test_rollback() -> Result<(), BoxError> {
        let (storage, _temp_dir) = create_storage().await?;

        let retirement = PoolRetirementCertificate {
            pool_id: pool_id(1),
            retirement_epoch: 42,
        };
        let network = MockNetwork::new(vec![
            vec![
                forward(block(1, 1).with_registration(1)),
                forward(block(2, 2).with_registration(2)),
                forward(block(3, 1).with_retirement(retirement)),
                backward(ChainPoint::from(&header(1))),
            ],
            vec![forward(block(5, 2))],
        ]);

        let (trigger, tripwire) = Tripwire::new();
        let monitor = tokio::spawn(monitor_stake_pools(
            config(),
            genesis(),
            network.clone(),
            storage.clone(),
            tripwire,
        ));

        wait_for_highest_slot(&storage, 5).await?;
        drop(trigger);
        let result = timeout(TIMEOUT, monitor).await??;
        assert!(result.is_ok());

        let cursors = network.cursors();
        assert_eq!(cursors.len(), 2);
        assert!(cursors[0].is_empty());
        assert_eq!(cursors[1], vec![header(1)]);

        let cursor = storage.read_pool_production_cursor(100).await?;
        assert_eq!(cursor, vec![header(1), header(5)]);
        let registration = storage.read_pool_registration(pool_id(1)).await?;
        assert_eq!(registration.map(|(slot, _)| slot), Some(1));
        assert!(storage.read_pool_registration(pool_id(2)).await?.is_none());
        assert!(storage.read_pool_retirement(pool_id(1)).await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_point_already_exists() -> Result<(), BoxError> {
        let (storage, _temp_dir) = create_storage().await?;

        let existing = BlockHeader {
            slot: 10,
            hash: [42; 32].into(),
            block_height: 5,
        };
        let mut tx = storage.create_tx().await?;
        storage
            .put_pool_production(&existing, pool_id(9), &mut tx)
            .await?;
        tx.commit().await?;

        let network = MockNetwork::new(vec![vec![
            forward(block(10, 1).with_registration(3)),
            forward(block(11, 1)),
        ]]);

        let (trigger, tripwire) = Tripwire::new();
        let monitor = tokio::spawn(monitor_stake_pools(
            config(),
            genesis(),
            network.clone(),
            storage.clone(),
            tripwire,
        ));

        wait_for_highest_slot(&storage, 11).await?;
        drop(trigger);
        let result = timeout(TIMEOUT, monitor).await??;
        assert!(result.is_ok());

        assert_eq!(network.cursors()[0], vec![existing]);
        let cursor = storage.read_pool_production_cursor(100).await?;
        assert_eq!(cursor, vec![existing, header(11)]);
        assert!(storage.read_pool_registration(pool_id(3)).await?.is_some());

        Ok(())
    }

    #[tokio::test]
    async fn test_failure() -> Result<(), BoxError> {
        let (storage, _temp_dir) = create_storage().await?;

        let network = MockNetwork::new(vec![vec![forward(block(1, 1)), Err(MockError)]]);

        let (_trigger, tripwire) = Tripwire::new();
        let result = timeout(
            TIMEOUT,
            monitor_stake_pools(config(), genesis(), network, storage.clone(), tripwire),
        )
        .await?;
        assert!(result.is_err());

        let cursor = storage.read_pool_production_cursor(100).await?;
        assert_eq!(cursor, vec![header(1)]);

        Ok(())
    }

    #[tokio::test]
    async fn test_interrupted() -> Result<(), BoxError> {
        let (storage, _temp_dir) = create_storage().await?;

        let network = MockNetwork::new(vec![]);

        let (trigger, tripwire) = Tripwire::new();
        drop(trigger);
        let result = timeout(
            TIMEOUT,
            monitor_stake_pools(config(), genesis(), network.clone(), storage.clone(), tripwire),
        )
        .await?;
        assert!(result.is_ok());
        assert_eq!(network.cursors().len(), 1);
        assert_eq!(storage.get_pool_production_count().await?, 0);

        Ok(())
    }

    fn config() -> Config {
        Config {
            blocks_batch_size: NonZeroUsize::new(10).expect("10 is not zero"),
            metadata_batch_size: NonZeroUsize::new(100).expect("100 is not zero"),
        }
    }

    fn genesis() -> GenesisParameters {
        GenesisParameters {
            active_slot_coefficient: 0.05,
            slot_length: Duration::from_secs(1),
            epoch_stability: 2160,
        }
    }

    fn block(slot: u64, producer: u8) -> Block {
        Block {
            header: header(slot),
            producer: Some(pool_id(producer)),
            pool_registrations: vec![],
            pool_retirements: vec![],
        }
    }

    trait BlockExt {
        fn with_registration(self, pool: u8) -> Self;
        fn with_retirement(self, retirement: PoolRetirementCertificate) -> Self;
    }

    impl BlockExt for Block {
        fn with_registration(mut self, pool: u8) -> Self {
            self.pool_registrations.push(registration(pool_id(pool), None));
            self
        }

        fn with_retirement(mut self, retirement: PoolRetirementCertificate) -> Self {
            self.pool_retirements.push(retirement);
            self
        }
    }

    fn forward(block: Block) -> Result<ChainEvent, MockError> {
        Ok(ChainEvent::RollForward {
            block,
            tip: ChainPoint::Origin,
        })
    }

    fn backward(point: ChainPoint) -> Result<ChainEvent, MockError> {
        Ok(ChainEvent::RollBackward {
            point,
            tip: ChainPoint::Origin,
        })
    }

    async fn wait_for_highest_slot(storage: &Storage, slot: u64) -> Result<(), BoxError> {
        timeout(TIMEOUT, async {
            loop {
                let cursor = storage.read_pool_production_cursor(1).await?;
                if cursor.last().map(|header| header.slot) == Some(slot) {
                    return Ok::<_, BoxError>(());
                }
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await?
    }

    /// Replays one scripted list of events per call of `follow`, then stays pending.
    #[derive(Clone)]
    struct MockNetwork {
        scripts: Arc<Mutex<VecDeque<Vec<Result<ChainEvent, MockError>>>>>,
        cursors: Arc<Mutex<Vec<Vec<BlockHeader>>>>,
    }

    impl MockNetwork {
        fn new(scripts: Vec<Vec<Result<ChainEvent, MockError>>>) -> Self {
            Self {
                scripts: Arc::new(Mutex::new(scripts.into())),
                cursors: Default::default(),
            }
        }

        fn cursors(&self) -> Vec<Vec<BlockHeader>> {
            self.cursors.lock().expect("lock cursors").clone()
        }
    }

    impl Network for MockNetwork {
        type Error = MockError;

        async fn current_node_tip(&self) -> Result<ChainPoint, Self::Error> {
            Ok(ChainPoint::Origin)
        }

        async fn stake_distribution(
            &self,
            _point: ChainPoint,
            _stake: Coin,
        ) -> Result<StakeDistribution, Self::Error> {
            Err(MockError)
        }

        fn follow(
            &self,
            cursor: Vec<BlockHeader>,
        ) -> impl Stream<Item = Result<ChainEvent, Self::Error>> + Send + 'static {
            self.cursors.lock().expect("lock cursors").push(cursor);
            let events = self
                .scripts
                .lock()
                .expect("lock scripts")
                .pop_front()
                .unwrap_or_default();

            stream::iter(events).chain(stream::pending())
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    #[error("mock network error")]
    struct MockError;
}
