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

pub mod metadata_fetcher;
pub mod ogmios;
pub mod storage;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "node")]
    pub node_config: ogmios::Config,

    #[serde(rename = "storage")]
    pub storage_config: indexer_common::infra::pool::sqlite::Config,

    #[serde(rename = "metadata_fetcher")]
    pub metadata_fetcher_config: metadata_fetcher::Config,
}
