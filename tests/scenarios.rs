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

//! End-to-end scenarios driving the session/template/share pipeline together,
//! without a real socket — each test wires the same collaborators `main.rs`
//! would, but deterministic test doubles in place of a live daemon.

use ii_ethash_pool::error::PoolError;
use ii_ethash_pool::session::SessionRegistry;
use ii_ethash_pool::share::{process_share, ShareOutcome, SubmittedShare};
use ii_ethash_pool::template::{TemplateCache, Work};
use ii_ethash_pool::testutil::{sample_work, AllowAllPolicy, BlacklistOne, FakeEthashVerifier, MemoryBackend, MemoryUpstream};
use ii_ethash_pool::vardiff::{VarDiffConfig, NO_CHANGE};

const ADDRESS: &str = "0x1234567890abcdef1234567890abcdef12345678";

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
async fn login_happy_path_registers_a_session() {
    let registry = SessionRegistry::new(vardiff_config());
    let policy = AllowAllPolicy;

    let session = registry
        .login(&format!("{}.rig1", ADDRESS), "10.0.0.1", 1_000_000.0, &policy)
        .await
        .expect("valid address should be accepted");

    assert_eq!(session.login, ADDRESS);
    assert_eq!(session.worker, "rig1");
    assert_eq!(session.diff(), 1_000_000.0);
    assert_eq!(registry.count(), 1);
}

#[tokio::test]
async fn login_with_invalid_worker_address_is_rejected() {
    let registry = SessionRegistry::new(vardiff_config());
    let policy = AllowAllPolicy;

    let result = registry
        .login("not-a-valid-address.rig1", "10.0.0.1", 1_000_000.0, &policy)
        .await;

    assert_eq!(result.unwrap_err(), PoolError::InvalidLogin);
    assert_eq!(registry.count(), 0);
}

#[tokio::test]
async fn blacklisted_login_is_rejected() {
    let registry = SessionRegistry::new(vardiff_config());
    let policy = BlacklistOne(ADDRESS.to_string());

    let result = registry
        .login(&format!("{}.rig1", ADDRESS), "10.0.0.1", 1_000_000.0, &policy)
        .await;

    assert_eq!(result.unwrap_err(), PoolError::Blacklisted);
}

#[tokio::test]
async fn stale_share_against_an_expired_header_is_rejected() {
    let templates = TemplateCache::new();
    templates.install(sample_work("0xcurrent", 100, 1.0)).unwrap();

    let registry = SessionRegistry::new(vardiff_config());
    let policy = AllowAllPolicy;
    let session = registry
        .login(&format!("{}.rig1", ADDRESS), "10.0.0.1", 1.0, &policy)
        .await
        .unwrap();

    let backend = MemoryBackend::new();
    let upstream = MemoryUpstream::new(sample_work("0xcurrent", 100, 1.0));
    let verifier = FakeEthashVerifier::invalid();

    let stale_share = SubmittedShare {
        header: "0xneverissued".to_string(),
        nonce: "0x01".to_string(),
        mix_digest: "0x00".to_string(),
    };

    let outcome = process_share(&session, &stale_share, &templates, &verifier, &backend, &upstream, 1.0)
        .await
        .unwrap();
    assert_eq!(outcome, ShareOutcome::Invalid);
}

#[tokio::test]
async fn duplicate_block_share_is_recorded_once() {
    let templates = TemplateCache::new();
    templates
        .install(Work {
            header: "0xaaaa".to_string(),
            seed: "0x".to_string() + &"00".repeat(32),
            target_hex: ii_ethash_pool::numeric::format_target_hex(
                &ii_ethash_pool::numeric::make_target(1.0).unwrap(),
            ),
            height_hex: ii_ethash_pool::numeric::format_height_hex(1),
        })
        .unwrap();

    let registry = SessionRegistry::new(vardiff_config());
    let policy = AllowAllPolicy;
    let session = registry
        .login(&format!("{}.rig1", ADDRESS), "10.0.0.1", 1.0, &policy)
        .await
        .unwrap();

    let backend = MemoryBackend::new();
    let upstream = MemoryUpstream::new(sample_work("0xaaaa", 1, 1.0));

    let mut result_bytes = vec![0u8; 32];
    result_bytes[31] = 1;
    let verifier = FakeEthashVerifier::valid(vec![0x00; 32], result_bytes);

    let share = SubmittedShare {
        header: "0xaaaa".to_string(),
        nonce: "0x01".to_string(),
        mix_digest: "0x00".to_string(),
    };

    let first = process_share(&session, &share, &templates, &verifier, &backend, &upstream, 1.0)
        .await
        .unwrap();
    assert!(matches!(first, ShareOutcome::Block { .. }));

    // A second worker submits the identical solution for the same block.
    let second = process_share(&session, &share, &templates, &verifier, &backend, &upstream, 1.0)
        .await
        .unwrap();
    assert_eq!(second, ShareOutcome::DuplicateBlock);
    assert_eq!(backend.blocks.lock().unwrap().len(), 1);
    // a block candidate is recorded only as a block, never also as a share.
    assert!(backend.shares.lock().unwrap().is_empty());
}

#[test]
fn vardiff_upshift_in_x2_mode_doubles_difficulty_once_the_window_elapses() {
    let config = vardiff_config();
    let mut state = ii_ethash_pool::vardiff::VarDiffState::new(&config);

    let mut t = 0i64;
    assert_eq!(state.update(&config, 100.0, t), NO_CHANGE);
    let mut result = NO_CHANGE;
    for _ in 0..20 {
        t += 2; // far faster than the 10s target
        result = state.update(&config, 100.0, t);
    }
    assert_eq!(result, 200.0);
}

#[test]
fn vardiff_downshift_clamps_to_min_diff() {
    let mut config = vardiff_config();
    config.min_diff = 90.0;
    let mut state = ii_ethash_pool::vardiff::VarDiffState::new(&config);

    let mut t = 0i64;
    assert_eq!(state.update(&config, 100.0, t), NO_CHANGE);
    let mut result = NO_CHANGE;
    for _ in 0..5 {
        t += 60; // far slower than the 10s target, and past the retarget window
        result = state.update(&config, 100.0, t);
    }
    assert_eq!(result, 90.0);
}
