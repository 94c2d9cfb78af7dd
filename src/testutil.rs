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

//! Shared test doubles for the collaborator traits (component C9/C13). Kept as an
//! ordinary (non-`#[cfg(test)]`) module, the same way `ii-cgminer-api` keeps its
//! `test` support module available to both unit tests and integration tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::collaborators::{Backend, BlockRecord, Policy, ShareRecord, Upstream};
use crate::error::Result;
use crate::template::Work;

/// A `Policy` that never blacklists anyone, never rate-limits, and ignores
/// malformed-share reports.
pub struct AllowAllPolicy;

#[async_trait]
impl Policy for AllowAllPolicy {
    async fn is_blacklisted(&self, _login: &str) -> bool {
        false
    }

    async fn apply_malformed_policy(&self, _ip: &str) {}

    async fn apply_share_policy(&self, _ip: &str, _was_valid: bool) -> bool {
        true
    }
}

/// A `Policy` that blacklists one fixed login, for testing the rejection path.
pub struct BlacklistOne(pub String);

#[async_trait]
impl Policy for BlacklistOne {
    async fn is_blacklisted(&self, login: &str) -> bool {
        login == self.0
    }

    async fn apply_malformed_policy(&self, _ip: &str) {}

    async fn apply_share_policy(&self, _ip: &str, _was_valid: bool) -> bool {
        true
    }
}

/// An in-memory `Upstream` that serves a fixed, swappable work tuple and always
/// accepts submissions.
pub struct MemoryUpstream {
    work: Mutex<Work>,
    pub accept_submissions: bool,
}

impl MemoryUpstream {
    pub fn new(work: Work) -> Self {
        Self {
            work: Mutex::new(work),
            accept_submissions: true,
        }
    }

    pub fn set_work(&self, work: Work) {
        *self.work.lock().expect("memory upstream lock poisoned") = work;
    }
}

#[async_trait]
impl Upstream for MemoryUpstream {
    async fn get_work(&self) -> Result<Work> {
        Ok(self.work.lock().expect("memory upstream lock poisoned").clone())
    }

    async fn submit_work(&self, _nonce: &str, _header: &str, _mix_digest: &str) -> Result<bool> {
        Ok(self.accept_submissions)
    }
}

/// An in-memory `Backend`: records shares/blocks in `Vec`s and tracks seen block
/// hashes for duplicate detection, mirroring the Redis-backed original closely
/// enough for unit tests.
#[derive(Default)]
pub struct MemoryBackend {
    pub shares: Mutex<Vec<ShareRecord>>,
    pub blocks: Mutex<Vec<BlockRecord>>,
    known_hashes: Mutex<HashSet<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn write_share(&self, share: ShareRecord) -> Result<()> {
        self.shares.lock().expect("memory backend lock poisoned").push(share);
        Ok(())
    }

    async fn write_block(&self, block: BlockRecord) -> Result<()> {
        self.known_hashes
            .lock()
            .expect("memory backend lock poisoned")
            .insert(block.hash.clone());
        self.blocks.lock().expect("memory backend lock poisoned").push(block);
        Ok(())
    }

    async fn is_known_block(&self, hash: &str) -> Result<bool> {
        Ok(self
            .known_hashes
            .lock()
            .expect("memory backend lock poisoned")
            .contains(hash))
    }
}

/// An `EthashVerifier` double whose verdict is fixed at construction time —
/// either "valid, with this mix digest" or "invalid" — so share-pipeline tests
/// don't need a real DAG.
pub struct FakeEthashVerifier {
    pub mix_digest: Option<Vec<u8>>,
    pub result: Option<Vec<u8>>,
}

impl FakeEthashVerifier {
    pub fn valid(mix_digest: Vec<u8>, result: Vec<u8>) -> Self {
        Self {
            mix_digest: Some(mix_digest),
            result: Some(result),
        }
    }

    pub fn invalid() -> Self {
        Self {
            mix_digest: None,
            result: None,
        }
    }
}

impl crate::collaborators::EthashVerifier for FakeEthashVerifier {
    fn verify(&self, _header: &[u8], _height: u64, _nonce: u64) -> Option<(Vec<u8>, Vec<u8>)> {
        match (&self.mix_digest, &self.result) {
            (Some(mix), Some(result)) => Some((mix.clone(), result.clone())),
            _ => None,
        }
    }
}

pub fn sample_work(header: &str, height: u64, diff: f64) -> Work {
    Work {
        header: header.to_string(),
        seed: "0x".to_string() + &"ab".repeat(32),
        target_hex: crate::numeric::target_hex_for_diff(diff).expect("valid sample diff"),
        height_hex: crate::numeric::format_height_hex(height),
    }
}
