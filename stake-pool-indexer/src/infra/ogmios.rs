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

//! [Network] implementation talking JSON-RPC to an Ogmios server over a WebSocket.

use crate::domain::{
    Block, BlockHash, BlockHeader, ChainEvent, ChainPoint, Coin, GenesisParameters,
    InvalidPoolIdError, InvalidRatioError, MetadataHash, Network, PoolId, PoolOwner,
    PoolRegistrationCertificate, PoolRetirementCertificate, Ratio, StakeDistribution,
};
use async_stream::try_stream;
use futures::{SinkExt, Stream, StreamExt};
use indexer_common::domain::{ByteArrayFromHexError, ByteArrayLenError};
use log::debug;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::{collections::BTreeMap, iter, time::Duration};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, Message},
};

/// A [Network] implementation based on Ogmios. Each operation uses its own connection.
#[derive(Debug, Clone)]
pub struct OgmiosClient {
    url: String,
}

impl OgmiosClient {
    pub fn new(config: Config) -> Self {
        Self { url: config.url }
    }

    /// Query the Shelley genesis configuration for the parameters the monitors depend on.
    pub async fn genesis_parameters(&self) -> Result<GenesisParameters, OgmiosError> {
        let mut connection = Connection::open(&self.url).await?;

        let genesis = connection
            .request::<ShelleyGenesis>(
                "queryNetwork/genesisConfiguration",
                Some(json!({ "era": "shelley" })),
            )
            .await?;

        let active_slot_coefficient = genesis
            .active_slots_coefficient
            .parse::<Ratio>()
            .map_err(OgmiosError::Ratio)?
            .to_f64();

        Ok(GenesisParameters {
            active_slot_coefficient,
            slot_length: Duration::from_millis(genesis.slot_length.milliseconds),
            epoch_stability: genesis.security_parameter,
        })
    }
}

impl Network for OgmiosClient {
    type Error = OgmiosError;

    async fn current_node_tip(&self) -> Result<ChainPoint, Self::Error> {
        let mut connection = Connection::open(&self.url).await?;
        let tip = connection.request::<WirePoint>("queryNetwork/tip", None).await?;
        tip.try_into()
    }

    async fn stake_distribution(
        &self,
        point: ChainPoint,
        stake: Coin,
    ) -> Result<StakeDistribution, Self::Error> {
        let mut connection = Connection::open(&self.url).await?;

        connection
            .request::<Value>("acquireLedgerState", Some(json!({ "point": point_json(&point) })))
            .await?;

        let protocol_parameters = connection
            .request::<ProtocolParameters>("queryLedgerState/protocolParameters", None)
            .await?;

        let live_stake = connection
            .request::<BTreeMap<String, LiveStake>>("queryLedgerState/liveStakeDistribution", None)
            .await?;
        let stake_per_pool = live_stake
            .into_iter()
            .map(|(pool_id, live_stake)| -> Result<_, OgmiosError> {
                let pool_id = pool_id.parse::<PoolId>()?;
                let stake = live_stake.stake.parse::<Ratio>()?.to_f64();
                Ok((pool_id, stake))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let params = json!({ "stake": [{ "ada": { "lovelace": stake.0 } }] });
        let projected_rewards = connection
            .request::<BTreeMap<String, BTreeMap<String, Ada>>>(
                "queryLedgerState/projectedRewards",
                Some(params),
            )
            .await?;
        let rewards = projected_rewards
            .into_values()
            .flatten()
            .map(|(pool_id, rewards)| -> Result<_, OgmiosError> {
                let pool_id = pool_id.parse::<PoolId>()?;
                Ok((pool_id, Coin(rewards.ada.lovelace)))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(StakeDistribution {
            n_opt: protocol_parameters.desired_number_of_stake_pools,
            stake: stake_per_pool,
            rewards,
        })
    }

    fn follow(
        &self,
        cursor: Vec<BlockHeader>,
    ) -> impl Stream<Item = Result<ChainEvent, Self::Error>> + Send + 'static {
        let url = self.url.clone();

        try_stream! {
            let cursor_tip = cursor.last().map(ChainPoint::from).unwrap_or(ChainPoint::Origin);
            let mut connection = Connection::open(&url).await?;

            let points = cursor
                .iter()
                .rev()
                .map(|header| point_json(&ChainPoint::from(header)))
                .chain(iter::once(point_json(&ChainPoint::Origin)))
                .collect::<Vec<_>>();
            let intersection = connection
                .request::<Intersection>("findIntersection", Some(json!({ "points": points })))
                .await?;
            let intersection = ChainPoint::try_from(intersection.intersection)?;
            debug!(intersection:%, cursor_tip:%; "found intersection");

            // The first reply to nextBlock rolls back to the intersection. Only if that is behind
            // the tip of the cursor, the rollback must be propagated.
            let mut at_intersection = true;

            loop {
                let next_block = connection.request::<NextBlock>("nextBlock", None).await?;

                match next_block {
                    NextBlock::Forward { block, tip } => {
                        at_intersection = false;
                        let block = Block::try_from(block)?;
                        let tip = ChainPoint::try_from(tip)?;
                        yield ChainEvent::RollForward { block, tip };
                    }

                    NextBlock::Backward { point, tip } => {
                        let point = ChainPoint::try_from(point)?;
                        if at_intersection && point == intersection && point == cursor_tip {
                            at_intersection = false;
                            continue;
                        }
                        at_intersection = false;

                        let tip = ChainPoint::try_from(tip)?;
                        yield ChainEvent::RollBackward { point, tip };
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub url: String,
}

/// Error possibly returned by [OgmiosClient].
#[derive(Debug, Error)]
pub enum OgmiosError {
    #[error("cannot connect to Ogmios")]
    Connect(#[source] Box<tungstenite::Error>),

    #[error("cannot exchange WebSocket messages with Ogmios")]
    WebSocket(#[source] Box<tungstenite::Error>),

    #[error("Ogmios closed the connection")]
    ConnectionClosed,

    #[error("cannot serialize or deserialize JSON")]
    Json(#[from] serde_json::Error),

    #[error("{method} failed with code {code}: {message}")]
    Rpc {
        method: &'static str,
        code: i64,
        message: String,
    },

    #[error("{0} returned no result")]
    MissingResult(&'static str),

    #[error("cannot decode hex encoded bytes")]
    Hex(#[from] ByteArrayFromHexError),

    #[error(transparent)]
    Len(#[from] ByteArrayLenError),

    #[error("invalid pool ID")]
    PoolId(#[from] InvalidPoolIdError),

    #[error("invalid ratio")]
    Ratio(#[from] InvalidRatioError),
}

/// A single WebSocket connection to Ogmios.
struct Connection {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Connection {
    async fn open(url: &str) -> Result<Self, OgmiosError> {
        let (socket, _) = connect_async(url)
            .await
            .map_err(|error| OgmiosError::Connect(error.into()))?;

        Ok(Self { socket })
    }

    /// Send a request and wait for its response; requests on one connection are not pipelined.
    async fn request<T>(
        &mut self,
        method: &'static str,
        params: Option<Value>,
    ) -> Result<T, OgmiosError>
    where
        T: DeserializeOwned,
    {
        let request = Request {
            jsonrpc: "2.0",
            method,
            params,
        };
        let request = serde_json::to_string(&request)?;
        self.socket
            .send(Message::text(request))
            .await
            .map_err(|error| OgmiosError::WebSocket(error.into()))?;

        loop {
            let message = self
                .socket
                .next()
                .await
                .ok_or(OgmiosError::ConnectionClosed)?
                .map_err(|error| OgmiosError::WebSocket(error.into()))?;

            match message {
                Message::Text(text) => {
                    let response = serde_json::from_str::<Response>(text.as_str())?;
                    return response.into_result(method);
                }

                Message::Close(_) => return Err(OgmiosError::ConnectionClosed),

                _ => continue,
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct Request {
    jsonrpc: &'static str,
    method: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    result: Option<Value>,

    #[serde(default)]
    error: Option<RpcError>,
}

impl Response {
    fn into_result<T>(self, method: &'static str) -> Result<T, OgmiosError>
    where
        T: DeserializeOwned,
    {
        if let Some(RpcError { code, message }) = self.error {
            return Err(OgmiosError::Rpc {
                method,
                code,
                message,
            });
        }

        let result = self.result.ok_or(OgmiosError::MissingResult(method))?;
        Ok(serde_json::from_value(result)?)
    }
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

fn point_json(point: &ChainPoint) -> Value {
    match point {
        ChainPoint::Origin => json!("origin"),
        ChainPoint::Block { slot, hash } => json!({ "slot": slot, "id": hash.to_string() }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WirePoint {
    Block { slot: u64, id: String },
    Origin(String),
}

impl TryFrom<WirePoint> for ChainPoint {
    type Error = OgmiosError;

    fn try_from(point: WirePoint) -> Result<Self, Self::Error> {
        match point {
            WirePoint::Origin(_) => Ok(ChainPoint::Origin),
            WirePoint::Block { slot, id } => Ok(ChainPoint::Block {
                slot,
                hash: id.parse::<BlockHash>()?,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Intersection {
    intersection: WirePoint,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "direction", rename_all = "camelCase")]
enum NextBlock {
    Forward { block: WireBlock, tip: WirePoint },
    Backward { point: WirePoint, tip: WirePoint },
}

#[derive(Debug, Deserialize)]
struct WireBlock {
    #[serde(rename = "type")]
    block_type: String,

    id: String,
    height: u64,
    slot: u64,

    #[serde(default)]
    issuer: Option<Issuer>,

    #[serde(default)]
    transactions: Vec<WireTransaction>,
}

impl TryFrom<WireBlock> for Block {
    type Error = OgmiosError;

    fn try_from(block: WireBlock) -> Result<Self, Self::Error> {
        let header = BlockHeader {
            slot: block.slot,
            hash: block.id.parse()?,
            block_height: block.height,
        };

        // Only praos blocks have stake pool issuers; byron blocks are issued by genesis delegates.
        let producer = match (block.block_type.as_str(), block.issuer) {
            ("praos", Some(issuer)) => {
                let verification_key = const_hex::decode(&issuer.verification_key)
                    .map_err(ByteArrayFromHexError::from)?;
                Some(PoolId::from_verification_key(&verification_key))
            }
            _ => None,
        };

        let mut pool_registrations = vec![];
        let mut pool_retirements = vec![];
        for certificate in block.transactions.into_iter().flat_map(|t| t.certificates) {
            match certificate {
                WireCertificate::StakePoolRegistration { stake_pool } => {
                    pool_registrations.push(stake_pool.try_into()?);
                }

                WireCertificate::StakePoolRetirement { stake_pool } => {
                    pool_retirements.push(PoolRetirementCertificate {
                        pool_id: stake_pool.id.parse()?,
                        retirement_epoch: stake_pool.retirement_epoch,
                    });
                }

                WireCertificate::Other => {}
            }
        }

        Ok(Block {
            header,
            producer,
            pool_registrations,
            pool_retirements,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Issuer {
    verification_key: String,
}

#[derive(Debug, Deserialize)]
struct WireTransaction {
    #[serde(default)]
    certificates: Vec<WireCertificate>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum WireCertificate {
    StakePoolRegistration {
        #[serde(rename = "stakePool")]
        stake_pool: WireStakePool,
    },

    StakePoolRetirement {
        #[serde(rename = "stakePool")]
        stake_pool: WireStakePoolRetirement,
    },

    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireStakePool {
    id: String,

    #[serde(default)]
    owners: Vec<String>,

    margin: String,
    cost: Ada,
    pledge: Ada,

    #[serde(default)]
    metadata: Option<WireMetadata>,
}

impl TryFrom<WireStakePool> for PoolRegistrationCertificate {
    type Error = OgmiosError;

    fn try_from(stake_pool: WireStakePool) -> Result<Self, Self::Error> {
        let owners = stake_pool
            .owners
            .iter()
            .map(|owner| owner.parse::<PoolOwner>())
            .collect::<Result<Vec<_>, _>>()?;

        let metadata = stake_pool
            .metadata
            .map(|metadata| {
                let hash = metadata.hash.parse::<MetadataHash>()?;
                Ok::<_, OgmiosError>((metadata.url, hash))
            })
            .transpose()?;

        Ok(PoolRegistrationCertificate {
            pool_id: stake_pool.id.parse()?,
            owners,
            margin: stake_pool.margin.parse()?,
            cost: Coin(stake_pool.cost.ada.lovelace),
            pledge: Coin(stake_pool.pledge.ada.lovelace),
            metadata,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireMetadata {
    url: String,
    hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStakePoolRetirement {
    id: String,
    retirement_epoch: u64,
}

#[derive(Debug, Deserialize)]
struct Ada {
    ada: Lovelace,
}

#[derive(Debug, Deserialize)]
struct Lovelace {
    lovelace: u64,
}

#[derive(Debug, Deserialize)]
struct LiveStake {
    stake: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProtocolParameters {
    desired_number_of_stake_pools: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShelleyGenesis {
    active_slots_coefficient: String,
    slot_length: Milliseconds,
    security_parameter: u32,
}

#[derive(Debug, Deserialize)]
struct Milliseconds {
    milliseconds: u64,
}
