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

use serde::{Serialize, Serializer};
use std::{
    fmt::{self, Debug, Display},
    str::FromStr,
};
use thiserror::Error;

/// A fixed-size byte array, e.g. a hash, rendered as hex.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteArray<const N: usize>(pub [u8; N]);

impl<const N: usize> Default for ByteArray<N> {
    fn default() -> Self {
        Self([0; N])
    }
}

impl<const N: usize> Debug for ByteArray<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", const_hex::encode(self.0))
    }
}

impl<const N: usize> Display for ByteArray<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", const_hex::encode(self.0))
    }
}

impl<const N: usize> AsRef<[u8]> for ByteArray<N> {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<const N: usize> From<[u8; N]> for ByteArray<N> {
    fn from(bytes: [u8; N]) -> Self {
        Self(bytes)
    }
}

impl<const N: usize> TryFrom<&[u8]> for ByteArray<N> {
    type Error = ByteArrayLenError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes = <[u8; N]>::try_from(bytes).map_err(|_| ByteArrayLenError {
            expected: N,
            actual: bytes.len(),
        })?;
        Ok(Self(bytes))
    }
}

impl<const N: usize> FromStr for ByteArray<N> {
    type Err = ByteArrayFromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = const_hex::decode(s)?;
        let bytes = Self::try_from(bytes.as_slice())?;
        Ok(bytes)
    }
}

impl<const N: usize> Serialize for ByteArray<N> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Error possibly returned when converting a slice into a [ByteArray].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("expected {expected} bytes, but got {actual}")]
pub struct ByteArrayLenError {
    pub expected: usize,
    pub actual: usize,
}

/// Error possibly returned when parsing a [ByteArray] from hex.
#[derive(Debug, Error)]
pub enum ByteArrayFromHexError {
    #[error("cannot hex-decode byte array")]
    Hex(#[from] const_hex::FromHexError),

    #[error(transparent)]
    Len(#[from] ByteArrayLenError),
}
