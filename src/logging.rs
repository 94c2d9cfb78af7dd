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

//! Process-wide structured logging, built on `slog`. Call sites elsewhere in the
//! crate use `crate::logging::macros::*` and then just `info!(...)`, `warn!(...)` etc,
//! same as `ii_logging::macros` is used throughout the rest of the Braiins stack.

use lazy_static::lazy_static;
use slog::Drain;

lazy_static! {
    static ref ROOT_LOGGER: slog::Logger = build_root_logger();
}

fn build_root_logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_envlogger::new(drain);
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, slog::o!())
}

/// Returns the process-wide root logger. Modules that want structured fields
/// (e.g. per-session `ip`/`login`) can fork a child logger off of this with `.new(o!(...))`.
pub fn root() -> &'static slog::Logger {
    &ROOT_LOGGER
}

pub mod macros {
    macro_rules! trace {
        ($($args:tt)*) => { slog::trace!($crate::logging::root(), $($args)*) };
    }
    macro_rules! debug {
        ($($args:tt)*) => { slog::debug!($crate::logging::root(), $($args)*) };
    }
    macro_rules! info {
        ($($args:tt)*) => { slog::info!($crate::logging::root(), $($args)*) };
    }
    macro_rules! warn {
        ($($args:tt)*) => { slog::warn!($crate::logging::root(), $($args)*) };
    }
    macro_rules! error {
        ($($args:tt)*) => { slog::error!($crate::logging::root(), $($args)*) };
    }

    pub(crate) use debug;
    pub(crate) use error;
    pub(crate) use info;
    pub(crate) use trace;
    pub(crate) use warn;
}
