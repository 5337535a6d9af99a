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

use bech32::{Bech32, Hrp};
use blake2::{
    Blake2bVar,
    digest::{Update, VariableOutput},
};
use derive_more::{Display, From};
use indexer_common::domain::{ByteArray, ByteArrayLenError};
use serde::{Deserialize, Serialize, Serializer};
use std::{
    fmt::{self, Debug},
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;

const POOL_ID_HRP: Hrp = Hrp::parse_unchecked("pool");

pub type EpochNo = u64;

/// Blake2b-256 hash of a pool's off-chain metadata document.
pub type MetadataHash = ByteArray<32>;

/// Blake2b-224 hash of a pool owner's staking verification key.
pub type PoolOwner = ByteArray<28>;

/// Identifier of a stake pool: the blake2b-224 hash of the pool's cold verification key. Rendered
/// as bech32 with the `pool` prefix.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolId(pub ByteArray<28>);

impl PoolId {
    /// Derive the pool ID from the given (cold) verification key of a block issuer.
    pub fn from_verification_key(verification_key: &[u8]) -> Self {
        let mut hasher = Blake2bVar::new(28).expect("blake2b output size 28 is valid");
        hasher.update(verification_key);

        let mut buffer = [0u8; 28];
        hasher
            .finalize_variable(&mut buffer)
            .expect("blake2b finalize should succeed with valid buffer");

        Self(ByteArray(buffer))
    }
}

impl TryFrom<&[u8]> for PoolId {
    type Error = ByteArrayLenError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        ByteArray::try_from(bytes).map(Self)
    }
}

impl AsRef<[u8]> for PoolId {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pool_id = bech32::encode::<Bech32>(POOL_ID_HRP, self.as_ref()).map_err(|_| fmt::Error)?;
        write!(f, "{pool_id}")
    }
}

impl Debug for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PoolId({self})")
    }
}

impl FromStr for PoolId {
    type Err = InvalidPoolIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hrp, bytes) = bech32::decode(s)?;
        if hrp != POOL_ID_HRP {
            return Err(InvalidPoolIdError::Prefix(hrp.to_string()));
        }

        let pool_id = Self::try_from(bytes.as_slice())?;
        Ok(pool_id)
    }
}

impl Serialize for PoolId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Error possibly returned when parsing a [PoolId].
#[derive(Debug, Error)]
pub enum InvalidPoolIdError {
    #[error("cannot bech32-decode pool ID")]
    Bech32(#[from] bech32::DecodeError),

    #[error("unexpected pool ID prefix {0}")]
    Prefix(String),

    #[error(transparent)]
    Len(#[from] ByteArrayLenError),
}

/// An amount of lovelace.
#[derive(
    Debug,
    Display,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    From,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct Coin(pub u64);

/// A non-negative rational number, e.g. a pool margin or a relative stake, parsed from `n/d`.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[display("{numerator}/{denominator}")]
pub struct Ratio {
    pub numerator: u64,
    pub denominator: u64,
}

impl Ratio {
    pub fn to_f64(self) -> f64 {
        if self.denominator == 0 {
            0.0
        } else {
            self.numerator as f64 / self.denominator as f64
        }
    }
}

impl FromStr for Ratio {
    type Err = InvalidRatioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (numerator, denominator) = match s.split_once('/') {
            Some((numerator, denominator)) => (numerator.trim(), denominator.trim()),
            None => (s.trim(), "1"),
        };

        let numerator = numerator.parse()?;
        let denominator = denominator.parse()?;
        if denominator == 0 {
            return Err(InvalidRatioError::ZeroDenominator);
        }

        Ok(Self {
            numerator,
            denominator,
        })
    }
}

/// Error possibly returned when parsing a [Ratio].
#[derive(Debug, Error)]
pub enum InvalidRatioError {
    #[error("cannot parse ratio component")]
    Int(#[from] ParseIntError),

    #[error("ratio denominator must not be zero")]
    ZeroDenominator,
}

/// On-chain pool registration (or update), observed at a slot and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolRegistrationCertificate {
    pub pool_id: PoolId,
    pub owners: Vec<PoolOwner>,
    pub margin: Ratio,
    pub cost: Coin,
    pub pledge: Coin,
    pub metadata: Option<(String, MetadataHash)>,
}

/// On-chain announcement of a pool retiring at the given epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolRetirementCertificate {
    pub pool_id: PoolId,
    pub retirement_epoch: EpochNo,
}

/// Reference to off-chain pool metadata which has not been fetched yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolMetadataRef {
    pub pool_id: PoolId,
    pub url: String,
    pub hash: MetadataHash,
}

/// Off-chain pool metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakePoolMetadata {
    pub ticker: String,
    pub name: String,
    pub description: Option<String>,
    pub homepage: String,
}

#[cfg(test)]
mod tests {
    use crate::domain::{InvalidPoolIdError, InvalidRatioError, PoolId, Ratio};
    use assert_matches::assert_matches;
    use fake::{Fake, Faker};
    use indexer_common::domain::ByteArray;

    #[test]
    fn test_pool_id_bech32() {
        let pool_id = PoolId(ByteArray(Faker.fake()));
        let s = pool_id.to_string();
        assert!(s.starts_with("pool1"));
        assert_matches!(s.parse::<PoolId>(), Ok(id) if id == pool_id);

        let pool_id = "pool1pu5jlj4q9w9jlxeu370a3c9myx47md5j5m2str0naunn2q3lkdy"
            .parse::<PoolId>()
            .expect("pool ID can be parsed");
        assert_eq!(
            pool_id.0.to_string(),
            "0f292fcaa02b8b2f9b3c8f9fd8e0bb21abedb692a6d5058df3ef2735"
        );

        let not_a_pool_id = "stake1uyehkck0lajq8gr28t9uxnuvgcqrc6070x3k9r8048z8y5gh6ffgw";
        assert_matches!(
            not_a_pool_id.parse::<PoolId>(),
            Err(InvalidPoolIdError::Prefix(_) | InvalidPoolIdError::Len(_))
        );
    }

    #[test]
    fn test_pool_id_from_verification_key() {
        let pool_id_1 = PoolId::from_verification_key(&[1; 32]);
        let pool_id_2 = PoolId::from_verification_key(&[1; 32]);
        let pool_id_3 = PoolId::from_verification_key(&[2; 32]);
        assert_eq!(pool_id_1, pool_id_2);
        assert_ne!(pool_id_1, pool_id_3);
    }

    #[test]
    fn test_ratio() {
        let ratio = "1/20".parse::<Ratio>();
        assert_matches!(
            ratio,
            Ok(Ratio {
                numerator: 1,
                denominator: 20
            })
        );
        assert_eq!(ratio.map(Ratio::to_f64).ok(), Some(0.05));

        assert_matches!(
            "3".parse::<Ratio>(),
            Ok(Ratio {
                numerator: 3,
                denominator: 1
            })
        );
        assert_matches!("1/0".parse::<Ratio>(), Err(InvalidRatioError::ZeroDenominator));
        assert_matches!("x/2".parse::<Ratio>(), Err(InvalidRatioError::Int(_)));
    }
}
