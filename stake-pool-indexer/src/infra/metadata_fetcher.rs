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

use crate::domain::{MetadataFetcher, MetadataHash, StakePoolMetadata};
use blake2::{
    Blake2bVar,
    digest::{Update, VariableOutput},
};
use log::debug;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const MAX_NAME_LEN: usize = 50;
const MAX_DESCRIPTION_LEN: usize = 255;
const MAX_HOMEPAGE_LEN: usize = 100;

/// A [MetadataFetcher] implementation based on reqwest.
#[derive(Debug, Clone)]
pub struct HttpMetadataFetcher {
    http: HttpClient,
    max_size: usize,
}

impl HttpMetadataFetcher {
    /// Create a new [HttpMetadataFetcher] with the given [Config].
    pub fn new(config: Config) -> Result<Self, Error> {
        let Config { timeout, max_size } = config;

        let http = HttpClient::builder()
            .user_agent(concat!("stake-pool-indexer/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self { http, max_size })
    }
}

impl MetadataFetcher for HttpMetadataFetcher {
    type Error = FetchMetadataError;

    async fn fetch(
        &self,
        url: &str,
        expected_hash: &MetadataHash,
    ) -> Result<StakePoolMetadata, Self::Error> {
        debug!(url:%; "fetching stake pool metadata");

        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())?;

        if response
            .content_length()
            .is_some_and(|len| len as usize > self.max_size)
        {
            return Err(FetchMetadataError::TooLarge(self.max_size));
        }

        let mut body = Vec::with_capacity(self.max_size);
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_size {
                return Err(FetchMetadataError::TooLarge(self.max_size));
            }
            body.extend_from_slice(&chunk);
        }

        decode_metadata(&body, expected_hash)
    }
}

/// Verify the hash of the given raw metadata document, then parse and validate it.
fn decode_metadata(
    body: &[u8],
    expected_hash: &MetadataHash,
) -> Result<StakePoolMetadata, FetchMetadataError> {
    let hash = metadata_hash(body);
    if hash != *expected_hash {
        return Err(FetchMetadataError::HashMismatch {
            expected: *expected_hash,
            actual: hash,
        });
    }

    let RawMetadata {
        name,
        ticker,
        description,
        homepage,
    } = serde_json::from_slice(body)?;

    let ticker_len = ticker.chars().count();
    if !(3..=5).contains(&ticker_len) {
        return Err(FetchMetadataError::Invalid("ticker", ticker_len));
    }
    check_max_len("name", &name, MAX_NAME_LEN)?;
    if let Some(description) = &description {
        check_max_len("description", description, MAX_DESCRIPTION_LEN)?;
    }
    check_max_len("homepage", &homepage, MAX_HOMEPAGE_LEN)?;

    Ok(StakePoolMetadata {
        ticker,
        name,
        description,
        homepage,
    })
}

fn check_max_len(
    field: &'static str,
    value: &str,
    max_len: usize,
) -> Result<(), FetchMetadataError> {
    let len = value.chars().count();
    if len > max_len {
        return Err(FetchMetadataError::Invalid(field, len));
    }

    Ok(())
}

/// The blake2b-256 hash of the given bytes.
fn metadata_hash(bytes: &[u8]) -> MetadataHash {
    let mut hasher = Blake2bVar::new(32).expect("blake2b output size 32 is valid");
    hasher.update(bytes);

    let mut hash = [0u8; 32];
    hasher
        .finalize_variable(&mut hash)
        .expect("blake2b finalize should succeed with valid buffer");

    hash.into()
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    name: String,
    ticker: String,

    #[serde(default)]
    description: Option<String>,

    homepage: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "max_size_default")]
    pub max_size: usize,
}

fn max_size_default() -> usize {
    512
}

/// Error possibly returned by [HttpMetadataFetcher::new].
#[derive(Debug, Error)]
#[error("cannot create HTTP client")]
pub struct Error(#[from] reqwest::Error);

/// Error possibly returned by [HttpMetadataFetcher::fetch].
#[derive(Debug, Error)]
pub enum FetchMetadataError {
    #[error("cannot GET metadata")]
    Http(#[from] reqwest::Error),

    #[error("metadata exceeds {0} bytes")]
    TooLarge(usize),

    #[error("metadata hash {actual} does not match expected hash {expected}")]
    HashMismatch {
        expected: MetadataHash,
        actual: MetadataHash,
    },

    #[error("cannot deserialize metadata")]
    Json(#[from] serde_json::Error),

    #[error("invalid {0} with {1} characters")]
    Invalid(&'static str, usize),
}
