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

use crate::domain::{PoolId, PoolRegistrationCertificate, PoolRetirementCertificate};
use indexer_common::domain::ByteArray;
use std::{
    fmt::{self, Display},
    time::Duration,
};

/// Absolute slot number.
pub type SlotNo = u64;

pub type BlockHash = ByteArray<32>;

/// Identifies the position of a block in the chain; ordered by slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockHeader {
    pub slot: SlotNo,
    pub hash: BlockHash,
    pub block_height: u64,
}

/// A point on the chain: either the origin (genesis) or a specific block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainPoint {
    Origin,
    Block { slot: SlotNo, hash: BlockHash },
}

impl ChainPoint {
    /// The slot of this point, `None` for the origin.
    pub fn slot(&self) -> Option<SlotNo> {
        match self {
            ChainPoint::Origin => None,
            ChainPoint::Block { slot, .. } => Some(*slot),
        }
    }
}

impl From<&BlockHeader> for ChainPoint {
    fn from(header: &BlockHeader) -> Self {
        ChainPoint::Block {
            slot: header.slot,
            hash: header.hash,
        }
    }
}

impl Display for ChainPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainPoint::Origin => write!(f, "origin"),
            ChainPoint::Block { slot, hash } => write!(f, "{slot}@{hash}"),
        }
    }
}

/// A block as delivered by the chain follower, reduced to what the stake pool projection needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,

    /// The pool which produced this block; `None` for blocks not produced by a stake pool, e.g.
    /// Byron era or epoch boundary blocks.
    pub producer: Option<PoolId>,

    pub pool_registrations: Vec<PoolRegistrationCertificate>,

    pub pool_retirements: Vec<PoolRetirementCertificate>,
}

/// Chain parameters from the (shelley) genesis relevant for following the chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenesisParameters {
    /// Fraction of slots expected to carry a block, `f`.
    pub active_slot_coefficient: f64,

    pub slot_length: Duration,

    /// Number of blocks after which a block can no longer be rolled back, `k`.
    pub epoch_stability: u32,
}

impl GenesisParameters {
    /// Roughly the expected time between two blocks: `ceil(1 / f) * slot_length`.
    pub fn expected_block_interval(&self) -> Duration {
        let slots = (1.0 / self.active_slot_coefficient).ceil();
        let slots = if slots.is_finite() && slots >= 1.0 {
            slots as u32
        } else {
            1
        };

        self.slot_length.saturating_mul(slots)
    }
}
