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

use crate::domain::{
    Coin, Network, PoolId, PoolLsqMetrics, Ratio, StakeDistribution, StakePoolMetadata,
    combine_lsq_metrics,
};
use indexer_common::error::BoxError;
use itertools::Itertools;
use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Read-side facade for stake pools, computed on demand from live local state queries.
#[derive(Debug, Clone)]
pub struct StakePoolLayer<N> {
    network: N,
}

impl<N> StakePoolLayer<N>
where
    N: Network,
{
    pub fn new(network: N) -> Self {
        Self { network }
    }

    /// IDs of all pools with stake. If the network is unavailable, no pools are returned.
    pub async fn known_pools(&self) -> Vec<PoolId> {
        match self.lsq_metrics(Coin(0)).await {
            Ok(metrics) => metrics.into_keys().collect(),

            Err(error) => {
                warn!(error:%; "cannot query stake distribution, returning no known pools");
                vec![]
            }
        }
    }

    /// All pools with stake ranked by their non-myopic member rewards for the given intended
    /// delegation, highest first. Pools with equal rewards are ordered by ID.
    pub async fn list_stake_pools(
        &self,
        intended_stake: Coin,
    ) -> Result<Vec<ApiStakePool>, ListStakePoolsError> {
        let metrics = self
            .lsq_metrics(intended_stake)
            .await
            .map_err(|error| ListStakePoolsError::NetworkUnavailable(error.into()))?;

        // Stable sort on the ID-ordered map, hence ties remain ordered by ID.
        let pools = metrics
            .into_iter()
            .sorted_by(|(_, a), (_, b)| {
                b.non_myopic_member_rewards
                    .cmp(&a.non_myopic_member_rewards)
            })
            .map(|(id, metrics)| ApiStakePool {
                id,
                metrics,
                cost: None,
                margin: None,
                metadata: None,
            })
            .collect::<Vec<_>>();
        debug!(intended_stake:%, pool_count = pools.len(); "ranked stake pools");

        Ok(pools)
    }

    async fn lsq_metrics(
        &self,
        stake: Coin,
    ) -> Result<BTreeMap<PoolId, PoolLsqMetrics>, N::Error> {
        let tip = self.network.current_node_tip().await?;

        let StakeDistribution {
            n_opt,
            stake,
            rewards,
        } = self.network.stake_distribution(tip, stake).await?;

        Ok(combine_lsq_metrics(&stake, &rewards, n_opt))
    }
}

/// A ranked stake pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiStakePool {
    pub id: PoolId,

    pub metrics: PoolLsqMetrics,

    /// Not yet sourced, always `None`.
    pub cost: Option<Coin>,

    /// Not yet sourced, always `None`.
    pub margin: Option<Ratio>,

    /// Not yet sourced, always `None`.
    pub metadata: Option<StakePoolMetadata>,
}

/// Error possibly returned by [StakePoolLayer::list_stake_pools].
#[derive(Debug, Error)]
pub enum ListStakePoolsError {
    #[error("network unavailable")]
    NetworkUnavailable(#[source] BoxError),
}

#[cfg(test)]
mod tests {
    use crate::domain::{
        BlockHeader, ChainEvent, ChainPoint, Coin, ListStakePoolsError, Network, PoolId,
        StakeDistribution, StakePoolLayer,
    };
    use assert_matches::assert_matches;
    use futures::{Stream, stream};
    use indexer_common::domain::ByteArray;
    use std::{
        collections::BTreeMap,
        sync::{Arc, Mutex},
    };
    use thiserror::Error;

    const POOL_A: PoolId = PoolId(ByteArray([1; 28]));
    const POOL_B: PoolId = PoolId(ByteArray([2; 28]));
    const POOL_C: PoolId = PoolId(ByteArray([3; 28]));
    const POOL_D: PoolId = PoolId(ByteArray([4; 28]));

    #[tokio::test]
    async fn test_known_pools() {
        let network = MockNetwork::available(StakeDistribution {
            n_opt: 2,
            stake: BTreeMap::from([(POOL_A, 0.5), (POOL_B, 0.25)]),
            rewards: BTreeMap::from([(POOL_A, Coin(1_000)), (POOL_C, Coin(1))]),
        });
        let layer = StakePoolLayer::new(network.clone());

        let pool_ids = layer.known_pools().await;
        assert_eq!(pool_ids, vec![POOL_A, POOL_B]);

        // Known pools are queried with zero delegation.
        let requested = network.requested_stakes.lock().expect("lock").clone();
        assert_eq!(requested, vec![Coin(0)]);
    }

    #[tokio::test]
    async fn test_list_stake_pools() {
        let network = MockNetwork::available(StakeDistribution {
            n_opt: 10,
            stake: BTreeMap::from([
                (POOL_A, 0.1),
                (POOL_B, 0.2),
                (POOL_C, 0.3),
                (POOL_D, 0.05),
            ]),
            rewards: BTreeMap::from([
                (POOL_A, Coin(10)),
                (POOL_B, Coin(30)),
                (POOL_D, Coin(30)),
            ]),
        });
        let layer = StakePoolLayer::new(network.clone());

        let pools = layer.list_stake_pools(Coin(1_000_000)).await;
        let pools = assert_matches!(pools, Ok(pools) => pools);

        let ranking = pools
            .iter()
            .map(|pool| (pool.id, pool.metrics.non_myopic_member_rewards))
            .collect::<Vec<_>>();
        assert_eq!(
            ranking,
            vec![
                (POOL_B, Coin(30)),
                (POOL_D, Coin(30)),
                (POOL_A, Coin(10)),
                (POOL_C, Coin(0))
            ]
        );
        assert_eq!(pools[0].metrics.relative_stake, 0.2);
        assert_eq!(pools[0].metrics.saturation, 2.0);
        assert!(pools.iter().all(|pool| pool.cost.is_none()
            && pool.margin.is_none()
            && pool.metadata.is_none()));

        let requested = network.requested_stakes.lock().expect("lock").clone();
        assert_eq!(requested, vec![Coin(1_000_000)]);
    }

    #[tokio::test]
    async fn test_list_stake_pools_order_independent() {
        let entries = [
            (POOL_A, 0.1, Coin(7)),
            (POOL_B, 0.2, Coin(3)),
            (POOL_C, 0.3, Coin(7)),
            (POOL_D, 0.4, Coin(11)),
        ];

        let mut rankings = vec![];
        for offset in 0..entries.len() {
            let mut rotated = entries.to_vec();
            rotated.rotate_left(offset);

            let mut stake = BTreeMap::new();
            let mut rewards = BTreeMap::new();
            for (pool_id, relative_stake, reward) in rotated.into_iter().rev() {
                stake.insert(pool_id, relative_stake);
                rewards.insert(pool_id, reward);
            }

            let layer = StakePoolLayer::new(MockNetwork::available(StakeDistribution {
                n_opt: 3,
                stake,
                rewards,
            }));
            let pools = layer
                .list_stake_pools(Coin(1))
                .await
                .expect("stake pools can be listed");
            let pool_ids = pools.into_iter().map(|pool| pool.id).collect::<Vec<_>>();
            rankings.push(pool_ids);
        }

        assert_eq!(rankings[0], vec![POOL_D, POOL_A, POOL_C, POOL_B]);
        assert!(rankings.iter().all(|ranking| *ranking == rankings[0]));
    }

    #[tokio::test]
    async fn test_network_unavailable() {
        let layer = StakePoolLayer::new(MockNetwork::unavailable());

        let pool_ids = layer.known_pools().await;
        assert!(pool_ids.is_empty());

        let pools = layer.list_stake_pools(Coin(1_000)).await;
        assert_matches!(pools, Err(ListStakePoolsError::NetworkUnavailable(_)));
    }

    #[derive(Debug, Clone)]
    struct MockNetwork {
        stake_distribution: Option<StakeDistribution>,
        requested_stakes: Arc<Mutex<Vec<Coin>>>,
    }

    impl MockNetwork {
        fn available(stake_distribution: StakeDistribution) -> Self {
            Self {
                stake_distribution: Some(stake_distribution),
                requested_stakes: Default::default(),
            }
        }

        fn unavailable() -> Self {
            Self {
                stake_distribution: None,
                requested_stakes: Default::default(),
            }
        }
    }

    impl Network for MockNetwork {
        type Error = Unavailable;

        async fn current_node_tip(&self) -> Result<ChainPoint, Self::Error> {
            self.stake_distribution
                .as_ref()
                .map(|_| ChainPoint::Block {
                    slot: 42,
                    hash: ByteArray([42; 32]),
                })
                .ok_or(Unavailable)
        }

        async fn stake_distribution(
            &self,
            _point: ChainPoint,
            stake: Coin,
        ) -> Result<StakeDistribution, Self::Error> {
            self.requested_stakes.lock().expect("lock").push(stake);
            self.stake_distribution.clone().ok_or(Unavailable)
        }

        fn follow(
            &self,
            _cursor: Vec<BlockHeader>,
        ) -> impl Stream<Item = Result<ChainEvent, Self::Error>> + Send + 'static {
            stream::empty()
        }
    }

    #[derive(Debug, Error)]
    #[error("node unavailable")]
    struct Unavailable;
}
