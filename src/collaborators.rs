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

//! Collaborator seams (component C9): everything the core talks to but does not
//! implement itself — the daemon RPC, the accounting store, and abuse policy.
//!
//! Modelled on [`hal::Backend`](../bosminer) — a `Send + Sync + 'static` trait object
//! the core is generic (or dyn-dispatched) over, so a real daemon/Redis pair can be
//! swapped in without touching share-validation or VarDiff logic.

use async_trait::async_trait;

use crate::error::Result;
use crate::template::Work;

/// Talks to the Ethash daemon: fetches work and submits solved blocks.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Equivalent of `eth_getWork`.
    async fn get_work(&self) -> Result<Work>;

    /// Equivalent of `eth_submitWork`. Returns `true` if the daemon accepted the
    /// block, `false` if it was rejected (stale/orphaned), independent of whether
    /// the pool had already recorded this as a candidate.
    async fn submit_work(&self, nonce: &str, header: &str, mix_digest: &str) -> Result<bool>;
}

/// A submitted share, ready for persistence, as handed to [`Backend::write_share`].
#[derive(Debug, Clone)]
pub struct ShareRecord {
    pub login: String,
    pub worker: String,
    pub ip: String,
    pub diff: u64,
    pub height: u64,
    pub network_diff: u64,
}

/// A block candidate, ready for persistence, as handed to [`Backend::write_block`].
#[derive(Debug, Clone)]
pub struct BlockRecord {
    pub login: String,
    pub worker: String,
    pub ip: String,
    pub diff: u64,
    pub height: u64,
    pub network_diff: u64,
    pub hash: String,
}

/// The accounting store: share/block persistence and duplicate-submission
/// detection. Modelled on the Go proxy's Redis-backed `Backend` (`writeShare`,
/// `writeBlock`, `WriteReply`/exist checks in `miner.go`).
#[async_trait]
pub trait Backend: Send + Sync {
    /// Persist an accepted share. Returns `Ok(())` once durably recorded.
    async fn write_share(&self, share: ShareRecord) -> Result<()>;

    /// Persist a found block candidate.
    async fn write_block(&self, block: BlockRecord) -> Result<()>;

    /// `true` if this exact block hash has already been recorded as a candidate —
    /// the backstop against submitting (and paying out) the same block twice.
    async fn is_known_block(&self, hash: &str) -> Result<bool>;
}

/// Per-login/per-IP abuse policy (blacklist, malformed-request and invalid-share
/// rate limiting). Kept as a seam rather than a concrete implementation: the
/// specification's Non-goals exclude ban-list management and persistence, but
/// the session/share pipeline still needs hooks to call.
#[async_trait]
pub trait Policy: Send + Sync {
    /// `true` if `login` is currently blocked from submitting shares.
    async fn is_blacklisted(&self, login: &str) -> bool;

    /// Called when a client sends a share whose nonce/header/mix-digest fields
    /// don't even match the expected hex shape — a protocol-level offense,
    /// tracked separately from ordinary invalid shares.
    async fn apply_malformed_policy(&self, ip: &str);

    /// Called after every share that passed shape validation, with whether it
    /// was ultimately valid. Returns `true` if the connection may continue;
    /// `false` once `ip`'s invalid-share rate has crossed the policy's limit,
    /// at which point the caller closes the connection.
    async fn apply_share_policy(&self, ip: &str, was_valid: bool) -> bool;
}

/// Ethash proof-of-work verification: `(header, height, nonce) -> (mix_digest,
/// result)`. Kept as a seam because DAG generation/caching is large, stateful,
/// and explicitly out of scope — the core only needs the two digests it
/// returns. Takes the block height (to resolve the DAG epoch), not the seed:
/// mirrors the original's `client.Compute(hash, height, nonce)`.
pub trait EthashVerifier: Send + Sync {
    /// Computes the mix digest and final PoW result for a candidate solution.
    /// Returns `None` if the header/height pair can't be resolved to an epoch DAG.
    fn verify(&self, header: &[u8], height: u64, nonce: u64) -> Option<(Vec<u8>, Vec<u8>)>;
}
