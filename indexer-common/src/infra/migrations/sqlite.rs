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

use crate::infra::pool::sqlite::SqlitePool;
use sqlx::migrate::MigrateError;
use thiserror::Error;

/// Run the database migrations for SQLite.
pub async fn run(pool: &SqlitePool) -> Result<(), Error> {
    sqlx::migrate!("migrations/sqlite").run(&**pool).await?;
    Ok(())
}

/// Error possibly returned by [run].
#[derive(Debug, Error)]
#[error("cannot run migrations for sqlite")]
pub struct Error(#[from] MigrateError);

#[cfg(test)]
mod tests {
    use crate::infra::{
        migrations::sqlite::run,
        pool::sqlite::{Config, SqlitePool},
    };
    use sqlx::Row;
    use std::{collections::HashSet, error::Error as StdError, time::Duration};

    #[tokio::test]
    async fn test_run() -> Result<(), Box<dyn StdError>> {
        let temp_dir = tempfile::tempdir()?;
        let config = Config {
            path: temp_dir.path().join("indexer.sqlite"),
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            max_lifetime: Duration::from_secs(5 * 60),
        };
        let pool = SqlitePool::new(config).await?;

        let result = run(&pool).await;
        assert!(result.is_ok());

        // Migrations are idempotent.
        let result = run(&pool).await;
        assert!(result.is_ok());

        let table_names = sqlx::query(
            "SELECT name
             FROM sqlite_master
             WHERE type = 'table'",
        )
        .fetch_all(&*pool)
        .await?
        .into_iter()
        .map(|row| row.get::<String, _>(0))
        .collect::<HashSet<_>>();

        assert!(table_names.contains("_sqlx_migrations"));
        assert!(table_names.contains("pool_production"));
        assert!(table_names.contains("pool_registration"));
        assert!(table_names.contains("pool_owner"));
        assert!(table_names.contains("pool_retirement"));
        assert!(table_names.contains("pool_metadata"));

        Ok(())
    }
}
