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

//! The current job plus a bounded backlog of prior headers (component C3).
//!
//! Holds a single pointer-to-current-template behind `arc-swap`-style atomics: readers
//! take a stable `Arc` snapshot, writers build a whole new template and swap it in.
//! Nothing here ever mutates an installed template in place.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use num_bigint::BigUint;

use crate::error::Result;
use crate::logging::macros::*;
use crate::numeric;

/// Maximum backlog depth: a header is retained only while `height > tip_height - B`.
const MAX_BACKLOG: u64 = 3;

/// One entry per historic job held in the backlog, keyed by header hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    pub diff: BigUint,
    pub height: u64,
    pub target: BigUint,
}

/// The currently-advertised job plus its backlog, as returned by the upstream's
/// `GetWork` and installed into the cache.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub header: String,
    pub seed: String,
    pub target: String,
    pub difficulty: BigUint,
    pub height: u64,
    pub height_hex: String,
    pub headers: HashMap<String, HeaderRecord>,
}

impl BlockTemplate {
    /// Build a fresh template from an upstream work tuple, carrying forward backlog
    /// entries from `previous` that are still within `MAX_BACKLOG` of the new height.
    fn from_work(
        header: String,
        seed: String,
        target_hex: String,
        height_hex: String,
        previous: Option<&BlockTemplate>,
    ) -> Result<Self> {
        let difficulty = numeric::target_hex_to_diff(&target_hex)?;
        let height = numeric::parse_height_hex(&height_hex)?;
        let target_bytes = numeric::decode_hex(&target_hex)?;
        let target = BigUint::from_bytes_be(&target_bytes);

        let mut headers = HashMap::new();
        headers.insert(
            header.clone(),
            HeaderRecord {
                diff: difficulty.clone(),
                height,
                target: target.clone(),
            },
        );

        if let Some(previous) = previous {
            for (k, v) in previous.headers.iter() {
                if v.height + MAX_BACKLOG > height {
                    headers.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
        }

        Ok(Self {
            header,
            seed,
            target: target_hex,
            difficulty,
            height,
            height_hex,
            headers,
        })
    }
}

/// An upstream work reply: four `0x`-prefixed hex strings, as returned by
/// `Upstream::get_work`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Work {
    pub header: String,
    pub seed: String,
    pub target_hex: String,
    pub height_hex: String,
}

/// Holds a single atomically-swappable current template. Readers take a stable `Arc`
/// snapshot and never observe a partially-built template.
#[derive(Debug, Default)]
pub struct TemplateCache {
    current: RwLock<Option<Arc<BlockTemplate>>>,
    /// Bumped on every successful install; lets a broadcaster detect "nothing changed
    /// since I last looked" without re-comparing header strings.
    generation: AtomicUsize,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stable snapshot of the currently-installed template, or `None` before the
    /// first successful fetch.
    pub fn current(&self) -> Option<Arc<BlockTemplate>> {
        self.current.read().expect("template cache lock poisoned").clone()
    }

    pub fn generation(&self) -> usize {
        self.generation.load(Ordering::Acquire)
    }

    /// Install a fresh work tuple. Returns `Ok(Some(template))` if a new template was
    /// installed, `Ok(None)` if the freshness gate suppressed it (same header as the
    /// current tip).
    pub fn install(&self, work: Work) -> Result<Option<Arc<BlockTemplate>>> {
        let previous = self.current();
        if let Some(previous) = &previous {
            if previous.header == work.header {
                // Freshness gate: suppress duplicate announcements.
                return Ok(None);
            }
        }

        let template = BlockTemplate::from_work(
            work.header,
            work.seed,
            work.target_hex,
            work.height_hex,
            previous.as_deref(),
        )?;
        let template = Arc::new(template);

        *self.current.write().expect("template cache lock poisoned") = Some(template.clone());
        self.generation.fetch_add(1, Ordering::AcqRel);

        info!(
            "new block template at height {} / {} / diff {}",
            template.height,
            &template.header[..10.min(template.header.len())],
            template.difficulty
        );

        Ok(Some(template))
    }

    /// Look up a historic header record, honoring the backlog (used by the share
    /// validator to accept shares submitted against a job the tip has since moved
    /// past, but which is still within the backlog window).
    pub fn lookup(&self, header: &str) -> Option<HeaderRecord> {
        self.current()?.headers.get(header).cloned()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn work(header: &str, height: u64) -> Work {
        Work {
            header: header.to_string(),
            seed: "0x".to_string() + &"ab".repeat(32),
            target_hex: numeric::format_target_hex(&numeric::make_target(2.0).unwrap()),
            height_hex: numeric::format_height_hex(height),
        }
    }

    #[test]
    fn self_entry_is_always_present_and_consistent() {
        let cache = TemplateCache::new();
        let w = work("0xaaaa", 10);
        let template = cache.install(w).unwrap().unwrap();

        let self_record = template.headers.get(&template.header).unwrap();
        assert_eq!(self_record.diff, template.difficulty);
        assert_eq!(self_record.height, template.height);
        assert_eq!(self_record.target, BigUint::from_bytes_be(
            &numeric::decode_hex(&template.target).unwrap()
        ));
    }

    #[test]
    fn backlog_entries_older_than_max_backlog_are_evicted() {
        let cache = TemplateCache::new();
        cache.install(work("0xh10", 10)).unwrap();
        cache.install(work("0xh11", 11)).unwrap();
        // height 11 - 3 = 8, so h10 (height 10) should survive (10 > 8).
        let t = cache.install(work("0xh13", 13)).unwrap().unwrap();
        // at height 13: 13 - 3 = 10, h10 (height 10) is NOT > 10, evicted.
        assert!(!t.headers.contains_key("0xh10"));
        // h11 (height 11) IS > 10, survives.
        assert!(t.headers.contains_key("0xh11"));
        assert!(t.headers.contains_key("0xh13"));
    }

    #[test]
    fn installing_same_header_is_a_no_op() {
        let cache = TemplateCache::new();
        cache.install(work("0xaaaa", 10)).unwrap();
        let gen_before = cache.generation();
        let result = cache.install(work("0xaaaa", 10)).unwrap();
        assert!(result.is_none());
        assert_eq!(cache.generation(), gen_before);
    }

    #[test]
    fn lookup_finds_backlog_entries() {
        let cache = TemplateCache::new();
        cache.install(work("0xh10", 10)).unwrap();
        cache.install(work("0xh11", 11)).unwrap();
        assert!(cache.lookup("0xh10").is_some());
        assert!(cache.lookup("0xmissing").is_none());
    }
}
