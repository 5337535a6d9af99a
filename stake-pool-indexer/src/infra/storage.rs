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
    self, BlockHash, BlockHeader, ChainPoint, Coin, MetadataHash, PoolId, PoolMetadataRef,
    PoolOwner, PoolRegistrationCertificate, PoolRetirementCertificate, Ratio, SlotNo,
    StakePoolMetadata,
    storage::{PutPoolProductionError, SqlxTransaction},
};
use fastrace::trace;
use indexer_common::infra::pool::sqlite::SqlitePool;
use indoc::indoc;

/// Deletes everything recorded after a given slot, see [domain::storage::Storage::rollback_to].
const ROLLBACK_QUERIES: [&str; 4] = [
    "DELETE FROM pool_production WHERE slot > $1",
    "DELETE FROM pool_registration WHERE slot > $1",
    "DELETE FROM pool_owner WHERE slot > $1",
    "DELETE FROM pool_retirement WHERE slot > $1",
];

/// Sqlite based storage implementation.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl domain::storage::Storage for Storage {
    #[trace]
    async fn create_tx(&self) -> Result<SqlxTransaction, sqlx::Error> {
        self.pool.begin().await
    }

    #[trace]
    async fn read_pool_production_cursor(
        &self,
        n: usize,
    ) -> Result<Vec<BlockHeader>, sqlx::Error> {
        let query = indoc! {"
            SELECT slot, header_hash, block_height
            FROM pool_production
            ORDER BY slot DESC
            LIMIT $1
        "};

        let mut headers = sqlx::query_as::<_, (i64, Vec<u8>, i64)>(query)
            .bind(n as i64)
            .fetch_all(&*self.pool)
            .await?
            .into_iter()
            .map(|(slot, hash, block_height)| -> Result<_, sqlx::Error> {
                let hash = BlockHash::try_from(hash.as_slice())
                    .map_err(|error| sqlx::Error::Decode(error.into()))?;

                Ok(BlockHeader {
                    slot: slot as u64,
                    hash,
                    block_height: block_height as u64,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        headers.reverse();
        Ok(headers)
    }

    #[trace]
    async fn get_pool_production_count(&self) -> Result<u64, sqlx::Error> {
        let (count,) = sqlx::query_as::<_, (i64,)>("SELECT count(*) FROM pool_production")
            .fetch_one(&*self.pool)
            .await?;

        Ok(count as u64)
    }

    #[trace]
    async fn put_pool_production(
        &self,
        header: &BlockHeader,
        pool_id: PoolId,
        tx: &mut SqlxTransaction,
    ) -> Result<(), PutPoolProductionError> {
        let query = indoc! {"
            INSERT INTO pool_production (slot, header_hash, block_height, pool_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
        "};

        let result = sqlx::query(query)
            .bind(header.slot as i64)
            .bind(header.hash.0.as_slice())
            .bind(header.block_height as i64)
            .bind(pool_id.0.0.as_slice())
            .execute(&mut **tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PutPoolProductionError::PointAlreadyExists(header.slot));
        }

        Ok(())
    }

    #[trace(properties = { "slot": "{slot}" })]
    async fn put_pool_registration(
        &self,
        slot: SlotNo,
        certificate: &PoolRegistrationCertificate,
        tx: &mut SqlxTransaction,
    ) -> Result<(), sqlx::Error> {
        let PoolRegistrationCertificate {
            pool_id,
            owners,
            margin,
            cost,
            pledge,
            metadata,
        } = certificate;

        let query = indoc! {"
            INSERT INTO pool_registration (
                pool_id,
                slot,
                margin_numerator,
                margin_denominator,
                cost,
                pledge,
                metadata_url,
                metadata_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (pool_id, slot) DO UPDATE SET
                margin_numerator = excluded.margin_numerator,
                margin_denominator = excluded.margin_denominator,
                cost = excluded.cost,
                pledge = excluded.pledge,
                metadata_url = excluded.metadata_url,
                metadata_hash = excluded.metadata_hash
        "};

        sqlx::query(query)
            .bind(pool_id.0.0.as_slice())
            .bind(slot as i64)
            .bind(margin.numerator as i64)
            .bind(margin.denominator as i64)
            .bind(cost.0 as i64)
            .bind(pledge.0 as i64)
            .bind(metadata.as_ref().map(|(url, _)| url.as_str()))
            .bind(metadata.as_ref().map(|(_, hash)| hash.0.as_slice()))
            .execute(&mut **tx)
            .await?;

        // A re-registration within the same slot replaces the owners.
        sqlx::query("DELETE FROM pool_owner WHERE pool_id = $1 AND slot = $2")
            .bind(pool_id.0.0.as_slice())
            .bind(slot as i64)
            .execute(&mut **tx)
            .await?;

        let query = indoc! {"
            INSERT INTO pool_owner (pool_id, slot, owner_index, owner)
            VALUES ($1, $2, $3, $4)
        "};

        for (index, owner) in owners.iter().enumerate() {
            sqlx::query(query)
                .bind(pool_id.0.0.as_slice())
                .bind(slot as i64)
                .bind(index as i64)
                .bind(owner.0.as_slice())
                .execute(&mut **tx)
                .await?;
        }

        Ok(())
    }

    #[trace(properties = { "slot": "{slot}" })]
    async fn put_pool_retirement(
        &self,
        slot: SlotNo,
        certificate: &PoolRetirementCertificate,
        tx: &mut SqlxTransaction,
    ) -> Result<(), sqlx::Error> {
        let query = indoc! {"
            INSERT INTO pool_retirement (pool_id, slot, retirement_epoch)
            VALUES ($1, $2, $3)
            ON CONFLICT (pool_id, slot) DO UPDATE SET
                retirement_epoch = excluded.retirement_epoch
        "};

        sqlx::query(query)
            .bind(certificate.pool_id.0.0.as_slice())
            .bind(slot as i64)
            .bind(certificate.retirement_epoch as i64)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    #[trace(properties = { "point": "{point}" })]
    async fn rollback_to(&self, point: ChainPoint) -> Result<(), sqlx::Error> {
        // Nothing is recorded at or before slot -1, so the origin removes everything.
        let slot = point.slot().map(|slot| slot as i64).unwrap_or(-1);

        let mut tx = self.pool.begin().await?;
        for query in ROLLBACK_QUERIES {
            sqlx::query(query).bind(slot).execute(&mut *tx).await?;
        }
        tx.commit().await
    }

    #[trace]
    async fn unfetched_pool_metadata_refs(
        &self,
        limit: usize,
    ) -> Result<Vec<PoolMetadataRef>, sqlx::Error> {
        let query = indoc! {"
            SELECT r.pool_id, r.metadata_url, r.metadata_hash
            FROM pool_registration r
            LEFT JOIN pool_metadata_fetch_attempt a ON a.metadata_hash = r.metadata_hash
            WHERE r.slot = (
                SELECT MAX(latest.slot)
                FROM pool_registration latest
                WHERE latest.pool_id = r.pool_id
            )
            AND r.metadata_url IS NOT NULL
            AND r.metadata_hash IS NOT NULL
            AND r.metadata_hash NOT IN (SELECT metadata_hash FROM pool_metadata)
            ORDER BY a.last_attempt NULLS FIRST, r.slot DESC
            LIMIT $1
        "};

        sqlx::query_as::<_, (Vec<u8>, String, Vec<u8>)>(query)
            .bind(limit as i64)
            .fetch_all(&*self.pool)
            .await?
            .into_iter()
            .map(|(pool_id, url, hash)| -> Result<_, sqlx::Error> {
                let pool_id = PoolId::try_from(pool_id.as_slice())
                    .map_err(|error| sqlx::Error::Decode(error.into()))?;
                let hash = MetadataHash::try_from(hash.as_slice())
                    .map_err(|error| sqlx::Error::Decode(error.into()))?;

                Ok(PoolMetadataRef { pool_id, url, hash })
            })
            .collect()
    }

    #[trace]
    async fn put_pool_metadata(
        &self,
        hash: &MetadataHash,
        metadata: &StakePoolMetadata,
    ) -> Result<(), sqlx::Error> {
        let query = indoc! {"
            INSERT INTO pool_metadata (metadata_hash, ticker, name, description, homepage)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (metadata_hash) DO NOTHING
        "};

        sqlx::query(query)
            .bind(hash.0.as_slice())
            .bind(metadata.ticker.as_str())
            .bind(metadata.name.as_str())
            .bind(metadata.description.as_deref())
            .bind(metadata.homepage.as_str())
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    #[trace]
    async fn put_pool_metadata_fetch_failure(
        &self,
        hash: &MetadataHash,
    ) -> Result<(), sqlx::Error> {
        // last_attempt orders failed attempts across all hashes; the timestamp is informational.
        let query = indoc! {"
            INSERT INTO pool_metadata_fetch_attempt (
                metadata_hash,
                attempts,
                last_attempt,
                last_attempt_at
            )
            VALUES (
                $1,
                1,
                (SELECT COALESCE(MAX(last_attempt), 0) + 1 FROM pool_metadata_fetch_attempt),
                CAST(strftime('%s', 'now') AS INTEGER)
            )
            ON CONFLICT (metadata_hash) DO UPDATE SET
                attempts = attempts + 1,
                last_attempt = excluded.last_attempt,
                last_attempt_at = excluded.last_attempt_at
        "};

        sqlx::query(query)
            .bind(hash.0.as_slice())
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    #[trace(properties = { "pool_id": "{pool_id}" })]
    async fn read_pool_registration(
        &self,
        pool_id: PoolId,
    ) -> Result<Option<(SlotNo, PoolRegistrationCertificate)>, sqlx::Error> {
        let query = indoc! {"
            SELECT
                slot,
                margin_numerator,
                margin_denominator,
                cost,
                pledge,
                metadata_url,
                metadata_hash
            FROM pool_registration
            WHERE pool_id = $1
            ORDER BY slot DESC
            LIMIT 1
        "};

        let row = sqlx::query_as::<
            _,
            (i64, i64, i64, i64, i64, Option<String>, Option<Vec<u8>>),
        >(query)
        .bind(pool_id.0.0.as_slice())
        .fetch_optional(&*self.pool)
        .await?;

        let Some((slot, numerator, denominator, cost, pledge, url, hash)) = row else {
            return Ok(None);
        };

        let metadata = url
            .zip(hash)
            .map(|(url, hash)| {
                MetadataHash::try_from(hash.as_slice())
                    .map(|hash| (url, hash))
                    .map_err(|error| sqlx::Error::Decode(error.into()))
            })
            .transpose()?;

        let query = indoc! {"
            SELECT owner
            FROM pool_owner
            WHERE pool_id = $1 AND slot = $2
            ORDER BY owner_index
        "};

        let owners = sqlx::query_as::<_, (Vec<u8>,)>(query)
            .bind(pool_id.0.0.as_slice())
            .bind(slot)
            .fetch_all(&*self.pool)
            .await?
            .into_iter()
            .map(|(owner,)| {
                PoolOwner::try_from(owner.as_slice())
                    .map_err(|error| sqlx::Error::Decode(error.into()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let certificate = PoolRegistrationCertificate {
            pool_id,
            owners,
            margin: Ratio {
                numerator: numerator as u64,
                denominator: denominator as u64,
            },
            cost: Coin(cost as u64),
            pledge: Coin(pledge as u64),
            metadata,
        };

        Ok(Some((slot as u64, certificate)))
    }

    #[trace(properties = { "pool_id": "{pool_id}" })]
    async fn read_pool_retirement(
        &self,
        pool_id: PoolId,
    ) -> Result<Option<(SlotNo, PoolRetirementCertificate)>, sqlx::Error> {
        let query = indoc! {"
            SELECT slot, retirement_epoch
            FROM pool_retirement
            WHERE pool_id = $1
            ORDER BY slot DESC
            LIMIT 1
        "};

        let retirement = sqlx::query_as::<_, (i64, i64)>(query)
            .bind(pool_id.0.0.as_slice())
            .fetch_optional(&*self.pool)
            .await?
            .map(|(slot, retirement_epoch)| {
                let certificate = PoolRetirementCertificate {
                    pool_id,
                    retirement_epoch: retirement_epoch as u64,
                };
                (slot as u64, certificate)
            });

        Ok(retirement)
    }

    #[trace]
    async fn read_pool_metadata(
        &self,
        hash: &MetadataHash,
    ) -> Result<Option<StakePoolMetadata>, sqlx::Error> {
        let query = indoc! {"
            SELECT ticker, name, description, homepage
            FROM pool_metadata
            WHERE metadata_hash = $1
        "};

        let metadata = sqlx::query_as::<_, (String, String, Option<String>, String)>(query)
            .bind(hash.0.as_slice())
            .fetch_optional(&*self.pool)
            .await?
            .map(|(ticker, name, description, homepage)| StakePoolMetadata {
                ticker,
                name,
                description,
                homepage,
            });

        Ok(metadata)
    }
}
