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

//! Block submission adapter (component C8): retries a `SubmitBlock` call against
//! the upstream a bounded number of times before giving up, so a single dropped
//! RPC connection doesn't cost the pool a found block.

use std::time::Duration;

use crate::collaborators::Upstream;
use crate::error::Result;
use crate::logging::macros::*;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(250);

/// Submits a solved block to `upstream`, retrying transport-level errors up to
/// [`MAX_ATTEMPTS`] times. A clean accept/reject reply from the upstream (as
/// opposed to an `Err`) is never retried — the daemon has spoken.
pub async fn submit_with_retry(
    upstream: &dyn Upstream,
    nonce: &str,
    header: &str,
    mix_digest: &str,
) -> Result<bool> {
    let mut last_err = None;
    for attempt in 1..=MAX_ATTEMPTS {
        match upstream.submit_work(nonce, header, mix_digest).await {
            Ok(accepted) => return Ok(accepted),
            Err(err) => {
                warn!("block submission attempt failed"; "attempt" => attempt, "error" => %err);
                last_err = Some(err);
                if attempt < MAX_ATTEMPTS {
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }
    Err(last_err.expect("BUG: loop always runs at least once"))
}
