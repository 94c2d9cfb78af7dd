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

//! Crate-wide error type. Each variant corresponds to a row of the error handling
//! table in the specification: it either maps onto a Stratum `ErrorReply` at the
//! session boundary or is swallowed by its caller and only logged.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PoolError>;

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum PoolError {
    #[error("invalid login")]
    InvalidLogin,
    #[error("you are blacklisted")]
    Blacklisted,
    #[error("not subscribed")]
    NotSubscribed,
    #[error("malformed PoW result")]
    MalformedShare,
    #[error("work not ready")]
    WorkNotReady,
    #[error("duplicate share")]
    DuplicateShare,
    #[error("invalid share")]
    InvalidShare,
    #[error("high rate of invalid shares")]
    HighInvalidRate,
    #[error("method not found")]
    MethodNotFound,
    #[error("invalid numeric value: {0}")]
    Numeric(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// A `{code, message}` pair sent back to a Stratum client, exactly the shape of
/// `ErrorReply` in the specification's data model.
#[derive(Debug, Clone, Eq, PartialEq, serde::Serialize)]
pub struct ErrorReply {
    pub code: i32,
    pub message: String,
}

impl ErrorReply {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&PoolError> for ErrorReply {
    fn from(err: &PoolError) -> Self {
        match err {
            PoolError::InvalidLogin => ErrorReply::new(-1, "Invalid login"),
            PoolError::Blacklisted => ErrorReply::new(-1, "You are blacklisted"),
            PoolError::NotSubscribed => ErrorReply::new(25, "Not subscribed"),
            PoolError::MalformedShare => ErrorReply::new(-1, "Malformed PoW result"),
            PoolError::WorkNotReady => ErrorReply::new(0, "Work not ready"),
            PoolError::DuplicateShare => ErrorReply::new(22, "Duplicate share"),
            PoolError::InvalidShare => ErrorReply::new(23, "Invalid share"),
            PoolError::HighInvalidRate => ErrorReply::new(-1, "High rate of invalid shares"),
            PoolError::MethodNotFound => ErrorReply::new(-3, "Method not found"),
            PoolError::Numeric(msg) => ErrorReply::new(-1, msg.clone()),
            PoolError::Config(msg) => ErrorReply::new(-1, msg.clone()),
        }
    }
}

impl From<PoolError> for ErrorReply {
    fn from(err: PoolError) -> Self {
        ErrorReply::from(&err)
    }
}
