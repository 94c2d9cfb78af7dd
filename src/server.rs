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

//! Top-level wiring (component C10): constructs the collaborators, template
//! cache and session registry, then spawns the long-running tasks, the same
//! shape as `bosminer::entry::main`.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::stream::{FuturesUnordered, StreamExt};
use lazy_static::lazy_static;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::codec::Framed;

use crate::collaborators::{Backend, EthashVerifier, Policy, Upstream};
use crate::config::Config;
use crate::logging::macros::*;
use crate::session::SessionRegistry;
use crate::share::{process_share, ShareOutcome, SubmittedShare};
use crate::template::TemplateCache;
use crate::fetcher;
use crate::wire::{JsonLineCodec, Request, Response};

lazy_static! {
    static ref NONCE_RE: regex::Regex =
        regex::Regex::new(r"(?i)^0x[0-9a-f]{16}$").expect("BUG: malformed nonce regex");
    static ref HASH_RE: regex::Regex =
        regex::Regex::new(r"(?i)^0x[0-9a-f]{64}$").expect("BUG: malformed hash regex");
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Everything the running pool needs, grouped so `main` can build it once and
/// hand `Arc` clones to each spawned task.
pub struct Pool {
    pub config: Config,
    pub templates: Arc<TemplateCache>,
    pub sessions: Arc<SessionRegistry>,
    pub upstream: Arc<dyn Upstream>,
    pub backend: Arc<dyn Backend>,
    pub policy: Arc<dyn Policy>,
    pub verifier: Arc<dyn EthashVerifier>,
}

impl Pool {
    /// Runs the fetcher task and the Stratum accept loop until `shutdown` fires.
    /// Both halves observe the same shutdown receiver so a single broadcast
    /// stops the whole process cleanly.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> crate::error::Result<()> {
        let (notify_tx, _notify_rx) = watch::channel(0usize);

        let fetch_interval = Duration::from_secs(self.config.proxy.block_refresh_interval);
        let fetcher_task = tokio::spawn(fetcher::run(
            self.upstream.clone(),
            self.templates.clone(),
            fetch_interval,
            notify_tx,
            shutdown.clone(),
        ));

        let listener = TcpListener::bind(&self.config.proxy.stratum.listen)
            .await
            .map_err(|e| crate::error::PoolError::Config(format!("bind failed: {}", e)))?;
        info!("stratum listening"; "addr" => &self.config.proxy.stratum.listen);

        let mut connections = FuturesUnordered::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((socket, peer)) => {
                            let pool = self.clone();
                            connections.push(tokio::spawn(async move {
                                if let Err(err) = pool.handle_connection(socket, peer.to_string()).await {
                                    warn!("connection error"; "peer" => %peer, "error" => %err);
                                }
                            }));
                        }
                        Err(err) => warn!("accept failed"; "error" => %err),
                    }
                }
                Some(_finished) = connections.next() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("stratum accept loop shutting down");
                        break;
                    }
                }
            }
        }

        let _ = fetcher_task.await;
        Ok(())
    }

    async fn handle_connection(
        &self,
        socket: tokio::net::TcpStream,
        peer: String,
    ) -> crate::error::Result<()> {
        let mut framed = Framed::new(socket, JsonLineCodec);
        let mut session_id = None;

        while let Some(frame) = framed.next().await {
            let request: Request = frame?;
            let (response, close) = self.dispatch(&request, &peer, &mut session_id).await;
            let send_failed = futures::SinkExt::send(&mut framed, response).await.is_err();
            if send_failed || close {
                break;
            }
        }

        if let Some(id) = session_id {
            self.sessions.disconnect(id);
        }
        Ok(())
    }

    /// Dispatches one request, returning the wire response and whether the
    /// connection must be closed afterwards — set only when the invalid-share
    /// policy reports the peer's rate limit has been exhausted (§6/§7, code 23).
    async fn dispatch(
        &self,
        request: &Request,
        peer: &str,
        session_id: &mut Option<crate::session::SessionId>,
    ) -> (Response, bool) {
        let result = self.dispatch_inner(request, peer, session_id).await;
        match result {
            Ok(value) => (Response::ok(request.id, value), false),
            Err(err) => {
                let close = matches!(err, crate::error::PoolError::InvalidShare);
                (Response::err(request.id, &err), close)
            }
        }
    }

    async fn dispatch_inner(
        &self,
        request: &Request,
        peer: &str,
        session_id: &mut Option<crate::session::SessionId>,
    ) -> crate::error::Result<serde_json::Value> {
        match request.method.as_str() {
            "eth_login" => {
                let raw_login = request.params[0].as_str().unwrap_or_default();
                let session = self
                    .sessions
                    .login(raw_login, peer, self.config.proxy.difficulty, &*self.policy)
                    .await?;
                *session_id = Some(session.id);
                Ok(serde_json::json!(true))
            }
            "eth_getWork" => {
                let id = session_id.ok_or(crate::error::PoolError::NotSubscribed)?;
                let session = self
                    .sessions
                    .get(id)
                    .ok_or(crate::error::PoolError::NotSubscribed)?;
                let template = self
                    .templates
                    .current()
                    .ok_or(crate::error::PoolError::WorkNotReady)?;
                let reply = crate::session::handle_get_work(&session, &template)?;
                Ok(serde_json::json!([
                    reply.header,
                    reply.seed,
                    reply.target,
                    reply.height_hex,
                ]))
            }
            "eth_submitWork" => {
                let id = session_id.ok_or(crate::error::PoolError::NotSubscribed)?;
                let session = self
                    .sessions
                    .get(id)
                    .ok_or(crate::error::PoolError::NotSubscribed)?;

                let nonce = request.params[0].as_str().unwrap_or_default();
                let header = request.params[1].as_str().unwrap_or_default();
                let mix_digest = request.params[2].as_str().unwrap_or_default();

                if !NONCE_RE.is_match(nonce) || !HASH_RE.is_match(header) || !HASH_RE.is_match(mix_digest) {
                    self.policy.apply_malformed_policy(peer).await; // step 1
                    return Err(crate::error::PoolError::MalformedShare);
                }

                let share = SubmittedShare {
                    nonce: nonce.to_lowercase(),
                    header: header.to_lowercase(),
                    mix_digest: mix_digest.to_lowercase(),
                };

                let outcome = process_share(
                    &session,
                    &share,
                    &self.templates,
                    &*self.verifier,
                    &*self.backend,
                    &*self.upstream,
                    self.config.proxy.difficulty,
                )
                .await?;

                let was_valid = !matches!(outcome, ShareOutcome::Invalid);
                session.on_share(unix_now());
                if !self.policy.apply_share_policy(peer, was_valid).await {
                    return Err(crate::error::PoolError::InvalidShare); // rate limit exhausted: code 23
                }

                match outcome {
                    ShareOutcome::DuplicateBlock => Err(crate::error::PoolError::DuplicateShare), // code 22
                    ShareOutcome::Invalid => Ok(serde_json::json!(false)),
                    ShareOutcome::Accepted | ShareOutcome::Block { .. } => Ok(serde_json::json!(true)),
                }
            }
            _ => Err(crate::error::PoolError::MethodNotFound),
        }
    }
}
