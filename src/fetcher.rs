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

//! Periodic upstream polling (component C4). Mirrors the original proxy's
//! `fetchBlockTemplate` ticker: poll at a fixed interval, install whatever comes
//! back, and broadcast only when the install actually changed the tip.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::collaborators::Upstream;
use crate::logging::macros::*;
use crate::template::TemplateCache;

/// Runs until `shutdown` fires. Every `interval`, fetches work from `upstream`
/// and installs it into `templates`; on an actual (non-deduplicated) install,
/// sends the new generation number on `notify` so the broadcaster can push new
/// jobs to every connected session.
pub async fn run(
    upstream: Arc<dyn Upstream>,
    templates: Arc<TemplateCache>,
    interval: Duration,
    notify: watch::Sender<usize>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = poll_once(&*upstream, &templates, &notify).await {
                    warn!("block template fetch failed"; "error" => %err);
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("template fetcher shutting down");
                    return;
                }
            }
        }
    }
}

async fn poll_once(
    upstream: &dyn Upstream,
    templates: &TemplateCache,
    notify: &watch::Sender<usize>,
) -> crate::error::Result<()> {
    let work = upstream.get_work().await?;
    if let Some(template) = templates.install(work)? {
        debug!("installed new template"; "height" => template.height);
        let _ = notify.send(templates.generation());
    }
    Ok(())
}
