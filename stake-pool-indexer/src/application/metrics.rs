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

use crate::domain::Block;
use metrics::{Counter, Gauge, counter, gauge};

/// Metrics of the chain monitor.
pub struct ChainMetrics {
    blocks_projected: Counter,
    highest_projected_slot: Gauge,
    pool_registrations: Counter,
    pool_retirements: Counter,
    production_conflicts: Counter,
    rollbacks: Counter,
}

impl ChainMetrics {
    pub fn new(production_count: u64) -> Self {
        let blocks_projected = counter!("stake_pool_indexer_blocks_projected");
        blocks_projected.absolute(production_count);

        Self {
            blocks_projected,
            highest_projected_slot: gauge!("stake_pool_indexer_highest_projected_slot"),
            pool_registrations: counter!("stake_pool_indexer_pool_registrations"),
            pool_retirements: counter!("stake_pool_indexer_pool_retirements"),
            production_conflicts: counter!("stake_pool_indexer_production_conflicts"),
            rollbacks: counter!("stake_pool_indexer_rollbacks"),
        }
    }

    /// Update after the given blocks have been committed.
    pub fn update(&self, blocks: &[Block]) {
        let projected = blocks.iter().filter(|block| block.producer.is_some()).count();
        self.blocks_projected.increment(projected as u64);

        let registrations = blocks.iter().map(|b| b.pool_registrations.len()).sum::<usize>();
        self.pool_registrations.increment(registrations as u64);

        let retirements = blocks.iter().map(|b| b.pool_retirements.len()).sum::<usize>();
        self.pool_retirements.increment(retirements as u64);

        if let Some(block) = blocks.last() {
            self.highest_projected_slot.set(block.header.slot as f64);
        }
    }

    pub fn production_conflict(&self) {
        self.production_conflicts.increment(1);
    }

    pub fn rollback(&self) {
        self.rollbacks.increment(1);
    }
}

/// Metrics of the metadata monitor.
pub struct MetadataMetrics {
    fetched: Counter,
    failed: Counter,
}

impl Default for MetadataMetrics {
    fn default() -> Self {
        Self {
            fetched: counter!("stake_pool_indexer_metadata_fetched"),
            failed: counter!("stake_pool_indexer_metadata_fetch_failures"),
        }
    }
}

impl MetadataMetrics {
    pub fn fetched(&self) {
        self.fetched.increment(1);
    }

    pub fn failed(&self) {
        self.failed.increment(1);
    }
}
