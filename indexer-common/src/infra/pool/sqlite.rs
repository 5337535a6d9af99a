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

use derive_more::Deref;
use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::{path::PathBuf, time::Duration};
use thiserror::Error;

/// Configuration for the SQLite connection pool.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub path: PathBuf,

    pub max_connections: u32,

    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub max_lifetime: Duration,
}

/// New type for the SQLite connection pool, dereferencing to [sqlx::SqlitePool].
#[derive(Debug, Clone, Deref)]
pub struct SqlitePool(sqlx::SqlitePool);

impl SqlitePool {
    /// Try to create a new [SqlitePool] with the given [Config]. The database file is created if
    /// missing and put into WAL mode, so that concurrent readers do not block the single writer.
    pub async fn new(config: Config) -> Result<Self, Error> {
        let Config {
            path,
            max_connections,
            busy_timeout,
            idle_timeout,
            max_lifetime,
        } = config;

        let connect_options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(idle_timeout)
            .max_lifetime(max_lifetime)
            .connect_with(connect_options)
            .await?;

        Ok(Self(pool))
    }
}

/// Error possibly returned by [SqlitePool::new].
#[derive(Debug, Error)]
#[error("cannot create SQLite connection pool")]
pub struct Error(#[from] sqlx::Error);
