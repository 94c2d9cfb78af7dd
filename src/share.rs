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

//! Share validation (component C7): the core `processShare` pipeline.

use num_bigint::BigUint;

use crate::collaborators::{Backend, BlockRecord, EthashVerifier, ShareRecord, Upstream};
use crate::error::{PoolError, Result};
use crate::logging::macros::*;
use crate::numeric;
use crate::session::Session;
use crate::template::TemplateCache;

/// A share as submitted over the wire, in string form (nonce/header/mix digest
/// are all `0x`-prefixed hex, same as the Stratum request fields).
#[derive(Debug, Clone)]
pub struct SubmittedShare {
    pub header: String,
    pub nonce: String,
    pub mix_digest: String,
}

/// Outcome of a validated share. Unlike a malformed/protocol-level request,
/// a share that simply failed PoW is not an `Err` — it's silently counted
/// (per §7, a plain invalid share gets no error reply).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareOutcome {
    /// Did not pass the pool's own job target, the claimed mix digest didn't
    /// match, or the header was unknown/expired.
    Invalid,
    /// Valid share, did not meet the network target.
    Accepted,
    /// Valid share that also met the network target: a block candidate.
    Block { hash: String },
    /// Valid share that met the network target, but this exact block hash had
    /// already been recorded by another worker — accepted as a share, not
    /// resubmitted as a block.
    DuplicateBlock,
}

/// Validates and persists a submitted share against the pool's job target,
/// per §4.7:
///
/// 1. Look up the header the share was submitted against, including the
///    template cache's backlog — a share against a job the tip has since moved
///    past is still accepted as long as it's within the backlog window.
/// 2. A header not found in the cache at all (expired past the backlog, or
///    never issued) is a silent invalid share, not a protocol error: the
///    miner isn't necessarily at fault, the job may simply have aged out.
/// 3. Decode the nonce as a big-endian (well, hex) integer; malformed hex is a
///    protocol-level error, not an invalid PoW, and is caught by the caller's
///    shape validation before `process_share` is ever invoked.
/// 4. Run the Ethash verifier against the header and the block height the job
///    was issued at (not the seed — the seed is derived from the height).
///    A `None` result (unresolvable DAG epoch) is treated the same as a PoW
///    mismatch: invalid share.
/// 5. The verifier's mix digest must match the one the miner claimed; a
///    mismatch means the miner computed (or fabricated) the wrong mix.
/// 6. The verifier's result digest, read as a big-endian integer, must not
///    exceed the pool's job target — derived from the pool's configured base
///    difficulty, not the session's own (possibly VarDiff-adjusted) current
///    difficulty, since VarDiff here is purely an accounting/display knob.
/// 7. Separately compare the same digest against the header's own network
///    target; falling at or under it makes this a block candidate.
/// 8. A non-block valid share is persisted via the backend for payout
///    accounting.
/// 9. A block candidate is checked against the backend's duplicate-block index
///    before ever touching the upstream, so a race between two workers
///    finding the same block only submits once.
/// 10. A fresh block candidate is submitted upstream; once accepted, a new
///     template is fetched and installed before the block record is written,
///     so the next job dispatched to any miner is never stale. A block
///     candidate is recorded as a block, never also as an ordinary share. A
///     stale submission (rejected by the upstream RPC) falls back to
///     recording it as an ordinary accepted share instead.
pub async fn process_share(
    session: &Session,
    share: &SubmittedShare,
    templates: &TemplateCache,
    verifier: &dyn EthashVerifier,
    backend: &dyn Backend,
    upstream: &dyn Upstream,
    pool_difficulty: f64,
) -> Result<ShareOutcome> {
    let record = match templates.lookup(&share.header) {
        Some(record) => record, // step 1
        None => return Ok(ShareOutcome::Invalid), // step 2
    };

    let header_bytes = numeric::decode_hex(&share.header).map_err(|_| PoolError::MalformedShare)?;
    let nonce_bytes = numeric::decode_hex(&share.nonce).map_err(|_| PoolError::MalformedShare)?;
    let nonce = bytes_to_u64(&nonce_bytes); // step 3

    let (mix_digest, result) = match verifier.verify(&header_bytes, record.height, nonce) {
        Some(pair) => pair,
        None => return Ok(ShareOutcome::Invalid), // step 4
    };

    let claimed_mix = numeric::decode_hex(&share.mix_digest).map_err(|_| PoolError::MalformedShare)?;
    if mix_digest != claimed_mix {
        return Ok(ShareOutcome::Invalid); // step 5
    }

    let result_int = BigUint::from_bytes_be(&result);
    let job_target = numeric::make_target(pool_difficulty)?;
    if result_int > job_target {
        return Ok(ShareOutcome::Invalid); // step 6
    }

    let is_block = result_int <= record.target; // step 7

    let network_diff_value = numeric::network_diff_int(&record.diff);
    let share_weighted = numeric::share_weighted_diff(session.diff());

    if !is_block {
        backend
            .write_share(ShareRecord {
                login: session.login.clone(),
                worker: session.worker.clone(),
                ip: session.ip.clone(),
                diff: share_weighted,
                height: record.height,
                network_diff: network_diff_value,
            })
            .await?; // step 8
        return Ok(ShareOutcome::Accepted);
    }

    let hash = hex::encode(&result);
    if backend.is_known_block(&hash).await? {
        return Ok(ShareOutcome::DuplicateBlock); // step 9
    }

    let accepted =
        crate::submitter::submit_with_retry(upstream, &share.nonce, &share.header, &share.mix_digest)
            .await?;
    if !accepted {
        warn!("upstream rejected block submission"; "header" => &share.header);
        backend
            .write_share(ShareRecord {
                login: session.login.clone(),
                worker: session.worker.clone(),
                ip: session.ip.clone(),
                diff: share_weighted,
                height: record.height,
                network_diff: network_diff_value,
            })
            .await?;
        return Ok(ShareOutcome::Accepted); // step 10: stale, but the share itself stood
    }

    if let Ok(fresh_work) = upstream.get_work().await {
        if let Err(err) = templates.install(fresh_work) {
            warn!("failed to install fresh template after accepted block"; "error" => %err);
        }
    } else {
        warn!("failed to fetch fresh work after accepted block"; "height" => record.height);
    }

    backend
        .write_block(BlockRecord {
            login: session.login.clone(),
            worker: session.worker.clone(),
            ip: session.ip.clone(),
            diff: share_weighted,
            height: record.height,
            network_diff: network_diff_value,
            hash: hash.clone(),
        })
        .await?;

    info!("block found"; "height" => record.height, "hash" => &hash);
    Ok(ShareOutcome::Block { hash })
}

fn bytes_to_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let start = bytes.len().saturating_sub(8);
    let tail = &bytes[start..];
    buf[8 - tail.len()..].copy_from_slice(tail);
    u64::from_be_bytes(buf)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::session::SessionRegistry;
    use crate::template::Work;
    use crate::testutil::{AllowAllPolicy, FakeEthashVerifier, MemoryBackend, MemoryUpstream};
    use crate::vardiff::VarDiffConfig;

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

    async fn setup_session(templates: &TemplateCache) -> (std::sync::Arc<Session>, SessionRegistry) {
        let registry = SessionRegistry::new(vardiff_config());
        let policy = AllowAllPolicy;
        let session = registry
            .login(
                "0x1234567890abcdef1234567890abcdef12345678.rig1",
                "1.2.3.4",
                1.0,
                &policy,
            )
            .await
            .unwrap();
        templates
            .install(Work {
                header: "0xaaaa".to_string(),
                seed: "0x".to_string() + &"00".repeat(32),
                target_hex: numeric::format_target_hex(&numeric::make_target(1.0).unwrap()),
                height_hex: numeric::format_height_hex(1),
            })
            .unwrap();
        (session, registry)
    }

    #[tokio::test]
    async fn share_against_unknown_header_is_silently_invalid() {
        let templates = TemplateCache::new();
        let (session, _registry) = setup_session(&templates).await;
        let backend = MemoryBackend::new();
        let upstream = MemoryUpstream::new(crate::testutil::sample_work("0xaaaa", 1, 1.0));
        let verifier = FakeEthashVerifier::invalid();

        let share = SubmittedShare {
            header: "0xdeadbeef".to_string(),
            nonce: "0x01".to_string(),
            mix_digest: "0x00".to_string(),
        };

        let outcome =
            process_share(&session, &share, &templates, &verifier, &backend, &upstream, 1.0)
                .await
                .unwrap();
        assert_eq!(outcome, ShareOutcome::Invalid);
        assert!(backend.shares.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_pow_is_silently_rejected() {
        let templates = TemplateCache::new();
        let (session, _registry) = setup_session(&templates).await;
        let backend = MemoryBackend::new();
        let upstream = MemoryUpstream::new(crate::testutil::sample_work("0xaaaa", 1, 1.0));
        let verifier = FakeEthashVerifier::invalid();

        let share = SubmittedShare {
            header: "0xaaaa".to_string(),
            nonce: "0x01".to_string(),
            mix_digest: "0x00".to_string(),
        };

        let outcome =
            process_share(&session, &share, &templates, &verifier, &backend, &upstream, 1.0)
                .await
                .unwrap();
        assert_eq!(outcome, ShareOutcome::Invalid);
        assert!(backend.shares.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mismatched_mix_digest_is_silently_rejected() {
        let templates = TemplateCache::new();
        let (session, _registry) = setup_session(&templates).await;
        let backend = MemoryBackend::new();
        let upstream = MemoryUpstream::new(crate::testutil::sample_work("0xaaaa", 1, 1.0));
        let verifier = FakeEthashVerifier::valid(vec![0xAB; 32], vec![0x00; 32]);

        let share = SubmittedShare {
            header: "0xaaaa".to_string(),
            nonce: "0x01".to_string(),
            mix_digest: "0x00".to_string(), // does not match verifier's 0xAB...
        };

        let outcome =
            process_share(&session, &share, &templates, &verifier, &backend, &upstream, 1.0)
                .await
                .unwrap();
        assert_eq!(outcome, ShareOutcome::Invalid);
    }

    #[tokio::test]
    async fn share_above_job_target_is_rejected_below_network_target() {
        let templates = TemplateCache::new();
        let (session, _registry) = setup_session(&templates).await;
        let backend = MemoryBackend::new();
        let upstream = MemoryUpstream::new(crate::testutil::sample_work("0xaaaa", 1, 1.0));
        // A result whose big-endian integer value is the maximum possible
        // (all 0xff bytes) exceeds any finite job target.
        let verifier = FakeEthashVerifier::valid(vec![0x00; 32], vec![0xff; 32]);

        let share = SubmittedShare {
            header: "0xaaaa".to_string(),
            nonce: "0x01".to_string(),
            mix_digest: "0x00".to_string(),
        };

        let outcome =
            process_share(&session, &share, &templates, &verifier, &backend, &upstream, 1.0)
                .await
                .unwrap();
        assert_eq!(outcome, ShareOutcome::Invalid);
    }

    #[tokio::test]
    async fn valid_block_share_is_submitted_and_persisted_as_a_block_only() {
        let templates = TemplateCache::new();
        let (session, _registry) = setup_session(&templates).await;
        let backend = MemoryBackend::new();
        let upstream = MemoryUpstream::new(crate::testutil::sample_work("0xaaaa", 1, 1.0));
        // a result of all-zero bytes (except a low bit) yields a minuscule
        // integer value, comfortably clearing both the pool's job target and
        // the installed template's network target.
        let mut result = vec![0u8; 32];
        result[31] = 1;
        let verifier = FakeEthashVerifier::valid(vec![0x00; 32], result);

        let share = SubmittedShare {
            header: "0xaaaa".to_string(),
            nonce: "0x01".to_string(),
            mix_digest: "0x00".to_string(),
        };

        let outcome = process_share(&session, &share, &templates, &verifier, &backend, &upstream, 1.0)
            .await
            .unwrap();
        assert!(matches!(outcome, ShareOutcome::Block { .. }));
        assert_eq!(backend.blocks.lock().unwrap().len(), 1);
        assert!(backend.shares.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_block_hash_is_not_resubmitted() {
        let templates = TemplateCache::new();
        let (session, _registry) = setup_session(&templates).await;
        let backend = MemoryBackend::new();
        let upstream = MemoryUpstream::new(crate::testutil::sample_work("0xaaaa", 1, 1.0));
        let mut result = vec![0u8; 32];
        result[31] = 1;
        let hash = hex::encode(&result);
        backend
            .write_block(BlockRecord {
                login: "x".into(),
                worker: "x".into(),
                ip: "x".into(),
                diff: 1,
                height: 1,
                network_diff: 1,
                hash: hash.clone(),
            })
            .await
            .unwrap();

        let verifier = FakeEthashVerifier::valid(vec![0x00; 32], result);
        let share = SubmittedShare {
            header: "0xaaaa".to_string(),
            nonce: "0x01".to_string(),
            mix_digest: "0x00".to_string(),
        };

        let outcome = process_share(&session, &share, &templates, &verifier, &backend, &upstream, 1.0)
            .await
            .unwrap();
        assert_eq!(outcome, ShareOutcome::DuplicateBlock);
        assert_eq!(backend.blocks.lock().unwrap().len(), 1); // still just the pre-seeded one
    }
}
