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

use crate::domain::{Coin, PoolId};
use serde::Serialize;
use std::collections::BTreeMap;

/// Ranking metrics of a stake pool, computed from local state queries; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolLsqMetrics {
    pub non_myopic_member_rewards: Coin,

    /// Fraction of the total active stake in `[0, 1]`.
    pub relative_stake: f64,

    /// Stake as a multiple of the fair share `1 / n_opt`; values above one mean oversaturation.
    pub saturation: f64,
}

/// Saturation of a pool with the given relative stake, i.e. `stake / (1 / n_opt)`.
pub fn saturation(relative_stake: f64, n_opt: u32) -> f64 {
    relative_stake * n_opt as f64
}

/// Merge the relative stake and the non-myopic member reward estimates per pool into ranking
/// metrics. The result contains exactly the pools of `stake`: pools without a reward estimate get
/// zero rewards, pools with a reward estimate but no stake are dropped.
pub fn combine_lsq_metrics(
    stake: &BTreeMap<PoolId, f64>,
    rewards: &BTreeMap<PoolId, Coin>,
    n_opt: u32,
) -> BTreeMap<PoolId, PoolLsqMetrics> {
    stake
        .iter()
        .map(|(&pool_id, &relative_stake)| {
            let non_myopic_member_rewards = rewards.get(&pool_id).copied().unwrap_or_default();
            let metrics = PoolLsqMetrics {
                non_myopic_member_rewards,
                relative_stake,
                saturation: saturation(relative_stake, n_opt),
            };

            (pool_id, metrics)
        })
        .collect()
}
