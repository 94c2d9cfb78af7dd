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

use std::sync::Arc;

use ii_ethash_pool::collaborators::{Backend, EthashVerifier, Policy, Upstream};
use ii_ethash_pool::logging::macros::*;
use ii_ethash_pool::server::Pool;
use ii_ethash_pool::session::SessionRegistry;
use ii_ethash_pool::template::TemplateCache;
use ii_ethash_pool::config;
use ii_ethash_pool::testutil::{sample_work, AllowAllPolicy, FakeEthashVerifier, MemoryBackend, MemoryUpstream};

#[tokio::main]
async fn main() {
    let matches = config::build_cli().get_matches();
    let config_path = matches.value_of("config").expect("required by clap");

    let config = match config::Config::load(config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load config at {}: {}", config_path, err);
            std::process::exit(1);
        }
    };
    let config = config::apply_overrides(config, &matches);

    if let Err(err) = config.validate() {
        error!("invalid configuration"; "error" => %err);
        std::process::exit(1);
    }

    info!("starting ii-ethash-pool"; "name" => &config.name);

    // The daemon RPC client and accounting store are collaborator seams (see
    // `collaborators.rs`); a production deployment substitutes a real
    // JSON-RPC upstream and a Redis-backed backend here. This wiring runs the
    // pool end-to-end against in-memory stand-ins so the binary is runnable
    // out of the box.
    let upstream: Arc<dyn Upstream> =
        Arc::new(MemoryUpstream::new(sample_work("0x00", 0, config.proxy.difficulty)));
    let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
    let policy: Arc<dyn Policy> = Arc::new(AllowAllPolicy);
    let verifier: Arc<dyn EthashVerifier> = Arc::new(FakeEthashVerifier::invalid());

    let sessions = Arc::new(SessionRegistry::new((&config.proxy.var_diff).into()));

    let pool = Arc::new(Pool {
        config,
        templates: Arc::new(TemplateCache::new()),
        sessions,
        upstream,
        backend,
        policy,
        verifier,
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    if let Err(err) = pool.run(shutdown_rx).await {
        error!("pool exited with error"; "error" => %err);
        std::process::exit(1);
    }
}
