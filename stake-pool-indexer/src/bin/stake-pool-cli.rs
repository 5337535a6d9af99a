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

use anyhow::Context;
use clap::{Parser, Subcommand};
use indexer_common::telemetry;
use stake_pool_indexer::{
    domain::{Coin, StakePoolLayer},
    infra::ogmios::{Config, OgmiosClient},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_logging();
    Cli::parse().run().await
}

/// Query stake pools via an Ogmios server and print the results as JSON.
#[derive(Debug, Parser)]
#[command()]
struct Cli {
    /// The Ogmios URL; defaults to "ws://localhost:1337".
    #[arg(long, default_value = "ws://localhost:1337")]
    node: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the IDs of all pools with stake.
    KnownPools,

    /// Rank all pools with stake by their non-myopic member rewards for an intended delegation.
    ListPools {
        /// The intended delegation in lovelace.
        #[arg(long)]
        stake: u64,
    },
}

impl Cli {
    async fn run(self) -> anyhow::Result<()> {
        let network = OgmiosClient::new(Config { url: self.node });
        let stake_pool_layer = StakePoolLayer::new(network);

        let json = match self.command {
            Command::KnownPools => {
                let pools = stake_pool_layer.known_pools().await;
                serde_json::to_string_pretty(&pools)
            }

            Command::ListPools { stake } => {
                let pools = stake_pool_layer
                    .list_stake_pools(Coin(stake))
                    .await
                    .context("list stake pools")?;
                serde_json::to_string_pretty(&pools)
            }
        }
        .context("serialize stake pools as JSON")?;

        println!("{json}");
        Ok(())
    }
}
