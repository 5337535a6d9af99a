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

use crate::domain::{Block, BlockHeader, ChainPoint, Coin, PoolId};
use futures::Stream;
use indexer_common::error::BoxError;
use std::{collections::BTreeMap, error::Error as StdError};

/// Network (node) abstraction.
#[trait_variant::make(Send)]
pub trait Network
where
    Self: Clone + Send + Sync + 'static,
{
    /// Error type for network operations, e.g. if the node is unavailable.
    type Error: StdError + Send + Sync + 'static;

    /// The current tip of the node's chain.
    async fn current_node_tip(&self) -> Result<ChainPoint, Self::Error>;

    /// Query the stake distribution and the non-myopic member reward estimates for the given
    /// delegation amount at the given point.
    async fn stake_distribution(
        &self,
        point: ChainPoint,
        stake: Coin,
    ) -> Result<StakeDistribution, Self::Error>;

    /// Follow the chain starting at the most recent intersection with the given cursor, which is
    /// in ascending slot order; an empty cursor means following from the origin. The stream ends
    /// only with an error.
    fn follow(
        &self,
        cursor: Vec<BlockHeader>,
    ) -> impl Stream<Item = Result<ChainEvent, Self::Error>> + Send + 'static;
}

/// Result of a local state query for the stake distribution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StakeDistribution {
    /// Desired number of pools, `k` in the protocol parameters.
    pub n_opt: u32,

    /// Relative stake per pool.
    pub stake: BTreeMap<PoolId, f64>,

    /// Non-myopic member reward estimates per pool.
    pub rewards: BTreeMap<PoolId, Coin>,
}

/// An event delivered while following the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    RollForward { block: Block, tip: ChainPoint },

    RollBackward { point: ChainPoint, tip: ChainPoint },
}

/// What to do after a batch of blocks has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowAction {
    Continue,

    Stop,
}

/// Why following the chain terminated.
#[derive(Debug)]
pub enum FollowExit {
    /// Orderly shutdown has been requested.
    Interrupted,

    /// Following the chain or applying blocks failed.
    Failure(BoxError),

    /// The chain has been reorganized and projections after the given point must be discarded.
    Rollback(ChainPoint),
}
