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

//! Variable difficulty retargeting (component C6).
//!
//! Mirrors `calcNextDiff` from the original proxy: a per-session ring buffer of
//! inter-share intervals is averaged and compared against a target share time,
//! but only once every `retarget_time` seconds — a wall-clock gate, not a
//! sample-count gate. When due, and the average strays outside `[tMin, tMax]`,
//! the session's difficulty is retargeted, optionally constrained to
//! doubling/halving steps (`x2Mode`). The retargeted value is not applied
//! immediately; see `Session::pending_diff`, which the caller swaps in the
//! next time a job is dispatched.

use crate::ringbuffer::RingBuffer;

/// Sentinel returned by [`VarDiffState::update`] meaning "no retarget
/// occurred" — diff 0.0 is never a valid difficulty, so it doubles as the
/// "no change" signal without an `Option` at every call site.
pub const NO_CHANGE: f64 = 0.0;

/// Size of the interval window averaged between retargets. The original
/// keeps accumulating samples between `retargetTime`-spaced decisions rather
/// than sizing the buffer to match any particular count of shares.
const SAMPLE_WINDOW: usize = 30;

#[derive(Debug, Clone)]
pub struct VarDiffConfig {
    /// Target number of seconds between shares.
    pub target_time: f64,
    /// Minimum number of seconds between retarget decisions.
    pub retarget_time: f64,
    /// Fractional tolerance around `target_time`; retarget only once the recent
    /// average falls outside `target_time * (1 +/- variance_percent / 100)`.
    pub retarget_variance_percent: f64,
    pub min_diff: f64,
    pub max_diff: f64,
    /// When set, every retarget doubles or halves the current difficulty instead
    /// of landing exactly on the computed ideal value.
    pub x2_mode: bool,
}

impl VarDiffConfig {
    fn bounds(&self) -> (f64, f64) {
        let variance = self.retarget_variance_percent / 100.0;
        (
            self.target_time * (1.0 - variance),
            self.target_time * (1.0 + variance),
        )
    }
}

impl From<&crate::config::VarDiffConfig> for VarDiffConfig {
    fn from(cfg: &crate::config::VarDiffConfig) -> Self {
        Self {
            target_time: cfg.target_time,
            retarget_time: cfg.retarget_time,
            retarget_variance_percent: cfg.variance_percent,
            min_diff: cfg.min_diff,
            max_diff: cfg.max_diff.unwrap_or(f64::INFINITY),
            x2_mode: cfg.x2_mode,
        }
    }
}

/// Per-session retargeting state: the interval ring buffer, the last share's
/// arrival time, and the wall-clock time of the last retarget decision.
#[derive(Debug, Clone)]
pub struct VarDiffState {
    intervals: RingBuffer,
    last_share_unix: Option<i64>,
    last_retarget_unix: i64,
}

impl VarDiffState {
    pub fn new(_config: &VarDiffConfig) -> Self {
        Self {
            intervals: RingBuffer::new(SAMPLE_WINDOW),
            last_share_unix: None,
            last_retarget_unix: 0,
        }
    }

    /// Records a share's arrival time. Returns a retarget decision: [`NO_CHANGE`]
    /// (`0.0`) if a retarget isn't due yet or the average interval is still
    /// within tolerance, otherwise the new difficulty to install.
    ///
    /// 1. The very first share since session start has no prior timestamp to
    ///    diff against; it seeds `last_retarget_unix` half a retarget window in
    ///    the past (so the first real decision isn't needlessly delayed) and
    ///    returns immediately.
    /// 2. The interval since the last share is appended to the ring buffer.
    /// 3. If less than `retarget_time` seconds have passed since the last
    ///    retarget decision, defer — this is a wall-clock gate, independent of
    ///    how many shares have arrived in the meantime.
    /// 4. The mean of the buffered intervals is computed.
    /// 5. `[tMin, tMax]` bounds are derived from `target_time` and the allowed
    ///    variance percentage.
    /// 6. If the mean falls within bounds, nothing changes, but the retarget
    ///    clock still advances so the next decision waits a full window.
    /// 7. Otherwise the ideal next difficulty is `current_diff * target_time /
    ///    mean_interval` — share frequency scales linearly with difficulty.
    /// 8. In `x2Mode`, the ideal value is snapped to exactly double or half the
    ///    current difficulty (never a fractional step), matching hardware-side
    ///    expectations of round difficulty values.
    /// 9. The result is clamped to `[min_diff, max_diff]`; the retarget clock
    ///    resets and the sample window clears, ready for the next window. The
    ///    computed value is not applied to the session immediately — the
    ///    caller stores it as a pending difficulty and swaps it in the next
    ///    time a job is dispatched.
    /// 10. If clamping produced the same value as `current_diff`, that is still
    ///     reported as [`NO_CHANGE`] — no pointless re-announcement of the same
    ///     difficulty.
    pub fn update(
        &mut self,
        config: &VarDiffConfig,
        current_diff: f64,
        share_unix_time: i64,
    ) -> f64 {
        let last = match self.last_share_unix {
            Some(last) => last,
            None => {
                self.last_share_unix = Some(share_unix_time);
                self.last_retarget_unix = share_unix_time - (config.retarget_time / 2.0) as i64;
                return NO_CHANGE; // step 1
            }
        };

        let interval = (share_unix_time - last).max(0);
        self.intervals.append(interval); // step 2
        self.last_share_unix = Some(share_unix_time);

        if (share_unix_time - self.last_retarget_unix) < config.retarget_time as i64 {
            return NO_CHANGE; // step 3
        }

        if self.intervals.is_empty() {
            return NO_CHANGE;
        }

        let mean = self.intervals.avg(); // step 4
        let (t_min, t_max) = config.bounds(); // step 5

        if mean >= t_min && mean <= t_max {
            self.last_retarget_unix = share_unix_time;
            return NO_CHANGE; // step 6
        }

        let ideal = current_diff * config.target_time / mean; // step 7

        let candidate = if config.x2_mode {
            if ideal > current_diff {
                current_diff * 2.0
            } else {
                current_diff / 2.0
            }
        } else {
            ideal
        }; // step 8

        let clamped = candidate.clamp(config.min_diff, config.max_diff);
        self.last_retarget_unix = share_unix_time;
        self.intervals.clear(); // step 9

        if (clamped - current_diff).abs() < f64::EPSILON {
            NO_CHANGE // step 10
        } else {
            clamped
        }
    }
}
