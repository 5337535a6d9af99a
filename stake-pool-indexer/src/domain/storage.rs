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
    BlockHeader, ChainPoint, MetadataHash, PoolId, PoolMetadataRef, PoolRegistrationCertificate,
    PoolRetirementCertificate, SlotNo, StakePoolMetadata,
};
use thiserror::Error;

/// Sqlx transaction for Sqlite.
pub type SqlxTransaction = sqlx::Transaction<'static, sqlx::Sqlite>;

/// Storage abstraction.
#[trait_variant::make(Send)]
pub trait Storage
where
    Self: Clone + Send + Sync + 'static,
{
    /// Begin a transaction; it is rolled back when dropped without commit.
    async fn create_tx(&self) -> Result<SqlxTransaction, sqlx::Error>;

    /// Get the headers of the at most `n` most recent blocks with recorded production, in
    /// ascending slot order.
    async fn read_pool_production_cursor(&self, n: usize)
    -> Result<Vec<BlockHeader>, sqlx::Error>;

    /// Get the number of blocks with recorded production.
    async fn get_pool_production_count(&self) -> Result<u64, sqlx::Error>;

    /// Record that the block with the given header was produced by the given pool.
    async fn put_pool_production(
        &self,
        header: &BlockHeader,
        pool_id: PoolId,
        tx: &mut SqlxTransaction,
    ) -> Result<(), PutPoolProductionError>;

    /// Record a pool registration certificate observed at the given slot.
    async fn put_pool_registration(
        &self,
        slot: SlotNo,
        certificate: &PoolRegistrationCertificate,
        tx: &mut SqlxTransaction,
    ) -> Result<(), sqlx::Error>;

    /// Record a pool retirement certificate observed at the given slot.
    async fn put_pool_retirement(
        &self,
        slot: SlotNo,
        certificate: &PoolRetirementCertificate,
        tx: &mut SqlxTransaction,
    ) -> Result<(), sqlx::Error>;

    /// Atomically remove all projected data after the given point.
    async fn rollback_to(&self, point: ChainPoint) -> Result<(), sqlx::Error>;

    /// Get at most `limit` metadata references for which no metadata has been stored yet. Never
    /// attempted references come first, most recently registered first, followed by those whose
    /// last failed attempt is the oldest.
    async fn unfetched_pool_metadata_refs(
        &self,
        limit: usize,
    ) -> Result<Vec<PoolMetadataRef>, sqlx::Error>;

    /// Store the given metadata for the given hash, resolving all references to that hash.
    async fn put_pool_metadata(
        &self,
        hash: &MetadataHash,
        metadata: &StakePoolMetadata,
    ) -> Result<(), sqlx::Error>;

    /// Record a failed attempt to fetch the metadata with the given hash, moving its references
    /// behind all others.
    async fn put_pool_metadata_fetch_failure(&self, hash: &MetadataHash)
    -> Result<(), sqlx::Error>;

    /// Get the latest registration of the given pool together with its slot.
    async fn read_pool_registration(
        &self,
        pool_id: PoolId,
    ) -> Result<Option<(SlotNo, PoolRegistrationCertificate)>, sqlx::Error>;

    /// Get the latest retirement of the given pool together with its slot.
    async fn read_pool_retirement(
        &self,
        pool_id: PoolId,
    ) -> Result<Option<(SlotNo, PoolRetirementCertificate)>, sqlx::Error>;

    /// Get the stored metadata for the given hash.
    async fn read_pool_metadata(
        &self,
        hash: &MetadataHash,
    ) -> Result<Option<StakePoolMetadata>, sqlx::Error>;
}

/// Error possibly returned by [Storage::put_pool_production].
#[derive(Debug, Error)]
pub enum PutPoolProductionError {
    #[error("production for slot {0} already exists")]
    PointAlreadyExists(SlotNo),

    #[error("cannot store pool production")]
    Database(#[from] sqlx::Error),
}
