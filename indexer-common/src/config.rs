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

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::de::DeserializeOwned;
use std::env;

const CONFIG_FILE: &str = "CONFIG_FILE";
const DEFAULT_CONFIG_FILE: &str = "config.yaml";
const ENV_PREFIX: &str = "APP__";

/// Extension methods for configuration types, loading from a YAML file and environment variables.
pub trait ConfigExt
where
    Self: DeserializeOwned,
{
    /// Load the configuration from the YAML file given by the `CONFIG_FILE` environment variable,
    /// defaulting to `config.yaml`, overridden by environment variables prefixed with `APP__`,
    /// e.g. `APP__INFRA__STORAGE__MAX_CONNECTIONS`.
    fn load() -> Result<Self, Box<figment::Error>> {
        let config_file =
            env::var(CONFIG_FILE).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_owned());

        Figment::new()
            .merge(Yaml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)
    }
}

impl<T> ConfigExt for T where T: DeserializeOwned {}

#[cfg(test)]
mod tests {
    use crate::config::ConfigExt;
    use figment::Jail;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Debug, Deserialize)]
    struct Config {
        name: String,
        nested: Nested,
    }

    #[derive(Debug, Deserialize)]
    struct Nested {
        #[serde(with = "humantime_serde")]
        delay: Duration,
        count: u32,
    }

    #[test]
    fn test_load() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                "name: indexer\nnested:\n  delay: 5s\n  count: 1\n",
            )?;
            jail.set_env("APP__NESTED__COUNT", "42");

            let config = Config::load().map_err(|error| *error)?;
            assert_eq!(config.name, "indexer");
            assert_eq!(config.nested.delay, Duration::from_secs(5));
            assert_eq!(config.nested.count, 42);

            Ok(())
        });
    }
}
