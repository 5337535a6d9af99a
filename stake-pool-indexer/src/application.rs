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

mod chain_monitor;
mod metadata_monitor;
mod metrics;

pub use chain_monitor::*;
pub use metadata_monitor::*;

use futures::FutureExt;
use serde::Deserialize;
use std::num::NonZeroUsize;
use stream_cancel::Tripwire;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Maximum number of blocks applied within one transaction.
    pub blocks_batch_size: NonZeroUsize,

    /// Maximum number of metadata references fetched per pass.
    #[serde(default = "metadata_batch_size_default")]
    pub metadata_batch_size: NonZeroUsize,
}

const METADATA_BATCH_SIZE_DEFAULT: NonZeroUsize = NonZeroUsize::new(100).unwrap();

fn metadata_batch_size_default() -> NonZeroUsize {
    METADATA_BATCH_SIZE_DEFAULT
}

/// Whether the trigger of the given tripwire has been cancelled, i.e. shutdown requested.
fn shutdown_requested(tripwire: &Tripwire) -> bool {
    tripwire.clone().now_or_never().unwrap_or_default()
}
