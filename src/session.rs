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

//! Per-connection session state and the live session registry (component C5).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;

use crate::collaborators::Policy;
use crate::error::{PoolError, Result};
use crate::logging::macros::*;
use crate::numeric;
use crate::template::{BlockTemplate, TemplateCache};
use crate::vardiff::{VarDiffConfig, VarDiffState};

pub type SessionId = u64;

lazy_static! {
    /// Worker name shape: 1-8 alphanumerics, underscore, or dash.
    static ref WORKER_RE: regex::Regex =
        regex::Regex::new(r"^[0-9a-zA-Z_-]{1,8}$").expect("BUG: malformed worker regex");
}

/// Default worker name when the login string carries no `.worker` suffix at all.
const DEFAULT_WORKER: &str = "worker";

/// Fallback worker name when a `.worker` suffix is present but fails the shape
/// check — distinct from `DEFAULT_WORKER`, which only applies when the suffix
/// is altogether absent.
const FALLBACK_WORKER: &str = "0";

/// Splits a combined `login[.worker]` string per §4.5: the address is
/// lowercased, and the optional worker suffix (everything after the first
/// `.`) is validated against [`WORKER_RE`]. A suffix that fails validation
/// falls back to `FALLBACK_WORKER`; no suffix at all defaults to
/// `DEFAULT_WORKER`.
fn parse_login(raw: &str) -> (String, String) {
    match raw.splitn(2, '.').collect::<Vec<_>>().as_slice() {
        [login] => (login.to_lowercase(), DEFAULT_WORKER.to_string()),
        [login, worker] => {
            let worker = if WORKER_RE.is_match(worker) {
                worker.to_string()
            } else {
                FALLBACK_WORKER.to_string()
            };
            (login.to_lowercase(), worker)
        }
        _ => unreachable!("splitn(2, ..) never yields more than 2 parts"),
    }
}

/// One logged-in miner connection: its identity, current difficulty, and
/// retargeting state. Cheap to clone as an `Arc` — handed around the session
/// registry, the share pipeline, and the broadcaster alike.
pub struct Session {
    pub id: SessionId,
    pub login: String,
    pub worker: String,
    pub ip: String,
    diff: RwLock<f64>,
    /// A difficulty computed by VarDiff but not yet handed to the miner; swapped
    /// into `diff` the next time a job is dispatched, not the instant it's computed.
    pending_diff: RwLock<Option<f64>>,
    vardiff_config: VarDiffConfig,
    vardiff: RwLock<VarDiffState>,
}

impl Session {
    pub fn diff(&self) -> f64 {
        *self.diff.read().expect("session diff lock poisoned")
    }

    fn set_diff(&self, diff: f64) {
        *self.diff.write().expect("session diff lock poisoned") = diff;
    }

    /// Feeds a share arrival time into this session's VarDiff state and, if a
    /// retarget is due, stages the new difficulty as pending rather than
    /// applying it immediately.
    pub fn on_share(&self, share_unix_time: i64) -> Option<f64> {
        let current = self.diff();
        let next = self
            .vardiff
            .write()
            .expect("vardiff lock poisoned")
            .update(&self.vardiff_config, current, share_unix_time);
        if next == crate::vardiff::NO_CHANGE {
            None
        } else {
            *self.pending_diff.write().expect("pending diff lock poisoned") = Some(next);
            Some(next)
        }
    }

    /// Commits a pending VarDiff retarget (if any) to the session's live
    /// difficulty. Called when a new job is about to be dispatched, so a
    /// retarget only ever takes effect at the start of the next job rather
    /// than mid-job.
    pub fn apply_pending_diff(&self) -> Option<f64> {
        let pending = self.pending_diff.write().expect("pending diff lock poisoned").take();
        if let Some(next) = pending {
            self.set_diff(next);
        }
        pending
    }

    /// The job target implied by this session's current difficulty, for a
    /// `GetWork` reply.
    pub fn job_target_hex(&self) -> Result<String> {
        numeric::target_hex_for_diff(self.diff())
    }
}

/// The four hex fields returned to a miner in response to `getWork`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkReply {
    pub header: String,
    pub seed: String,
    pub target: String,
    pub height_hex: String,
}

/// Live session set, keyed by session id. Reads (broadcast, lookup) take a read
/// lock; only login/disconnect take the write lock.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    next_id: AtomicU64,
    vardiff_config: VarDiffConfig,
}

impl SessionRegistry {
    pub fn new(vardiff_config: VarDiffConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            vardiff_config,
        }
    }

    /// Validates a login attempt and, on success, registers a new session at the
    /// pool's starting difficulty. Mirrors `handleLoginRPC`: split the combined
    /// `login[.worker]` string, address shape check, then the blacklist policy hook.
    pub async fn login(
        &self,
        raw_login: &str,
        ip: &str,
        start_diff: f64,
        policy: &dyn Policy,
    ) -> Result<Arc<Session>> {
        let (login, worker) = parse_login(raw_login);

        if !numeric::is_valid_hex_address(&login) {
            return Err(PoolError::InvalidLogin);
        }
        if policy.is_blacklisted(&login).await {
            return Err(PoolError::Blacklisted);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Session {
            id,
            login: login.clone(),
            worker: worker.clone(),
            ip: ip.to_string(),
            diff: RwLock::new(start_diff),
            pending_diff: RwLock::new(None),
            vardiff_config: self.vardiff_config.clone(),
            vardiff: RwLock::new(VarDiffState::new(&self.vardiff_config)),
        });

        self.sessions
            .write()
            .expect("session registry lock poisoned")
            .insert(id, session.clone());

        info!("login accepted"; "login" => &login, "worker" => &worker, "ip" => ip);
        Ok(session)
    }

    pub fn disconnect(&self, id: SessionId) {
        self.sessions
            .write()
            .expect("session registry lock poisoned")
            .remove(&id);
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .expect("session registry lock poisoned")
            .get(&id)
            .cloned()
    }

    /// A snapshot of every currently-registered session, for broadcast.
    pub fn all(&self) -> Vec<Arc<Session>> {
        self.sessions
            .read()
            .expect("session registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.read().expect("session registry lock poisoned").len()
    }
}

/// Builds a `getWork` reply for `session` against `template`, per its own current
/// difficulty (the session's job target, not the pool base difficulty). Any
/// difficulty retarget staged since the last job is applied here, so it takes
/// effect starting with this job rather than mid-flight.
pub fn handle_get_work(session: &Session, template: &BlockTemplate) -> Result<WorkReply> {
    session.apply_pending_diff();
    Ok(WorkReply {
        header: template.header.clone(),
        seed: template.seed.clone(),
        target: session.job_target_hex()?,
        height_hex: template.height_hex.clone(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::AllowAllPolicy;

    fn vardiff_config() -> VarDiffConfig {
        VarDiffConfig {
            target_time: 10.0,
            retarget_time: 30.0,
            retarget_variance_percent: 30.0,
            min_diff: 1.0,
            max_diff: 1_000_000.0,
            x2_mode: true,
        }
    }

    #[tokio::test]
    async fn login_rejects_malformed_address() {
        let registry = SessionRegistry::new(vardiff_config());
        let policy = AllowAllPolicy;
        let result = registry.login("not-an-address", "1.2.3.4", 1000.0, &policy).await;
        assert_eq!(result.unwrap_err(), PoolError::InvalidLogin);
    }

    #[tokio::test]
    async fn login_registers_session_at_start_diff() {
        let registry = SessionRegistry::new(vardiff_config());
        let policy = AllowAllPolicy;
        let session = registry
            .login(
                "0x1234567890abcdef1234567890abcdef12345678.rig1",
                "1.2.3.4",
                2048.0,
                &policy,
            )
            .await
            .unwrap();
        assert_eq!(session.diff(), 2048.0);
        assert_eq!(session.worker, "rig1");
        assert_eq!(registry.count(), 1);
        assert!(registry.get(session.id).is_some());
    }

    #[tokio::test]
    async fn login_lowercases_address_and_defaults_worker() {
        let registry = SessionRegistry::new(vardiff_config());
        let policy = AllowAllPolicy;
        let session = registry
            .login(
                "0x1234567890ABCDEF1234567890abcdef12345678",
                "1.2.3.4",
                1.0,
                &policy,
            )
            .await
            .unwrap();
        assert_eq!(session.login, "0x1234567890abcdef1234567890abcdef12345678");
        assert_eq!(session.worker, DEFAULT_WORKER);
    }

    #[tokio::test]
    async fn login_falls_back_to_zero_worker_when_suffix_is_malformed() {
        let registry = SessionRegistry::new(vardiff_config());
        let policy = AllowAllPolicy;
        let session = registry
            .login(
                "0x1234567890abcdef1234567890abcdef12345678.has spaces",
                "1.2.3.4",
                1.0,
                &policy,
            )
            .await
            .unwrap();
        assert_eq!(session.worker, FALLBACK_WORKER);
    }

    #[tokio::test]
    async fn disconnect_removes_session() {
        let registry = SessionRegistry::new(vardiff_config());
        let policy = AllowAllPolicy;
        let session = registry
            .login(
                "0x1234567890abcdef1234567890abcdef12345678.rig1",
                "1.2.3.4",
                2048.0,
                &policy,
            )
            .await
            .unwrap();
        registry.disconnect(session.id);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn parse_login_splits_on_first_dot_only() {
        assert_eq!(
            parse_login("0xabc.rig.extra"),
            ("0xabc".to_string(), "0".to_string()) // "rig.extra" fails the worker shape
        );
        assert_eq!(
            parse_login("0xABC.rig01"),
            ("0xabc".to_string(), "rig01".to_string())
        );
        assert_eq!(
            parse_login("0xabc"),
            ("0xabc".to_string(), DEFAULT_WORKER.to_string())
        );
    }
}
