// Copyright (C) 2019  Braiins Systems s.r.o.
//
// This file is part of Braiins Open-Source Initiative (BOSI).
//
// BOSI is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//
// Please, keep in mind that we may also license BOSI or any part thereof
// under a proprietary license. For more information on the terms and conditions
// of such proprietary license or if you have any other questions, please
// contact us at opensource@braiins.com.

//! Configuration surface (component C12): the full shape of the original
//! proxy's `Config` struct, deserialized from TOML with `clap` overrides for the
//! handful of options worth setting from the command line. Sections the
//! specification marks as Non-goals (api/redis/unlocker/payouts) keep their
//! shape here so a config file written for the whole daemon still loads, but
//! nothing in this crate reads their fields.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{PoolError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VarDiffConfig {
    pub min_diff: f64,
    #[serde(default)]
    pub max_diff: Option<f64>,
    pub target_time: f64,
    pub retarget_time: f64,
    pub variance_percent: f64,
    #[serde(default)]
    pub x2_mode: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StratumConfig {
    #[serde(default)]
    pub debug: bool,
    pub enabled: bool,
    pub listen: String,
    pub timeout: u64,
    pub max_conn: u32,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub cert_file: Option<String>,
    #[serde(default)]
    pub key_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    #[serde(default)]
    pub enabled: bool,
    pub listen: String,
    #[serde(default)]
    pub behind_reverse_proxy: bool,
    pub block_refresh_interval: u64,
    pub difficulty: f64,
    pub var_diff: VarDiffConfig,
    pub state_update_interval: u64,
    pub hashrate_expiration: u64,
    /// Shape-only: ban-list policy configuration. The specification's
    /// Non-goals exclude ban-list *persistence*, so nothing reads this beyond
    /// validating that it parses.
    #[serde(default)]
    pub policy: toml::value::Table,
    pub max_fails: u32,
    #[serde(default)]
    pub health_check: bool,
    pub stratum: StratumConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    pub name: String,
    pub url: String,
    pub timeout: u64,
}

/// Shape-only sections kept so a full daemon config file still deserializes
/// here; the specification's Non-goals exclude implementing what they control.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RedisConfig {
    pub endpoint: String,
    pub pool_size: u32,
    pub database: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub name: String,
    pub proxy: ProxyConfig,
    pub upstream: Vec<UpstreamConfig>,
    pub upstream_check_interval: u64,
    #[serde(default)]
    pub threads: Option<u32>,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    /// Shape-only: the api/unlocker/payouts sections of a full daemon config.
    /// Retained verbatim (not parsed into typed structs) purely so their
    /// presence in a config file doesn't trip `deny_unknown_fields` elsewhere;
    /// this crate never reads them.
    #[serde(default)]
    pub api: Option<toml::value::Table>,
    #[serde(default)]
    pub unlocker: Option<toml::value::Table>,
    #[serde(default)]
    pub payouts: Option<toml::value::Table>,
}

impl Config {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| PoolError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .map_err(|e| PoolError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// At least one upstream must be configured, and the pool's own listen
    /// address must be non-empty; beyond that, serde's `deny_unknown_fields`
    /// and required fields already reject a malformed file at parse time.
    pub fn validate(&self) -> Result<()> {
        if self.upstream.is_empty() {
            return Err(PoolError::Config("at least one upstream is required".into()));
        }
        if self.proxy.listen.is_empty() {
            return Err(PoolError::Config("proxy.listen must not be empty".into()));
        }
        Ok(())
    }
}

/// Command-line overrides layered on top of a config file, mirroring the small
/// set of flags `bosminer-am1-s9`'s `config.rs` exposes via `clap`.
pub fn build_cli() -> clap::App<'static, 'static> {
    clap::App::new("ii-ethash-pool")
        .about("Work-distribution and share-validation core for an Ethash mining pool proxy")
        .arg(
            clap::Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("path to the pool's TOML configuration file")
                .takes_value(true)
                .required(true),
        )
        .arg(
            clap::Arg::with_name("listen")
                .long("listen")
                .value_name("ADDR")
                .help("override proxy.stratum.listen")
                .takes_value(true),
        )
}

/// Applies `--listen` on top of a loaded config, if present.
pub fn apply_overrides(mut config: Config, matches: &clap::ArgMatches) -> Config {
    if let Some(listen) = matches.value_of("listen") {
        config.proxy.stratum.listen = listen.to_string();
    }
    config
}

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLE: &str = r#"
        name = "main"

        [proxy]
        enabled = true
        listen = "0.0.0.0:8080"
        block_refresh_interval = 120
        difficulty = 2000000000
        state_update_interval = 3000
        hashrate_expiration = 900
        max_fails = 100

        [proxy.var_diff]
        min_diff = 100000000
        target_time = 10
        retarget_time = 90
        variance_percent = 30

        [proxy.stratum]
        enabled = true
        listen = "0.0.0.0:8008"
        timeout = 120
        max_conn = 8192

        [[upstream]]
        name = "main"
        url = "http://127.0.0.1:8545"
        timeout = 10

        upstream_check_interval = 5
    "#;

    #[test]
    fn parses_full_sample_config() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.name, "main");
        assert_eq!(config.upstream.len(), 1);
        assert!(config.proxy.var_diff.x2_mode == false);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_unknown_fields() {
        let bad = SAMPLE.replacen("name = \"main\"", "name = \"main\"\ntypo_field = 1", 1);
        assert!(Config::from_toml_str(&bad).is_err());
    }

    #[test]
    fn validate_rejects_empty_upstream_list() {
        let mut config = Config::from_toml_str(SAMPLE).unwrap();
        config.upstream.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn listen_override_applies() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let app = build_cli();
        let matches = app
            .get_matches_from_safe(vec!["ii-ethash-pool", "-c", "pool.toml", "--listen", "0.0.0.0:9999"])
            .unwrap();
        let config = apply_overrides(config, &matches);
        assert_eq!(config.proxy.stratum.listen, "0.0.0.0:9999");
    }
}
