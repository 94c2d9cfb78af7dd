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

//! Line-delimited JSON-RPC framing for Stratum-style requests. Deliberately
//! thin: the wire protocol's full method surface is out of scope, this just
//! gives the session/share pipeline something to be driven from over a real
//! socket, the same shape as `ii-cgminer-api`'s line-based `Codec`.

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::PoolError;

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub id: u64,
    pub result: serde_json::Value,
    pub error: Option<crate::error::ErrorReply>,
}

impl Response {
    pub fn ok(id: u64, result: serde_json::Value) -> Self {
        Self { id, result, error: None }
    }

    pub fn err(id: u64, error: &PoolError) -> Self {
        Self {
            id,
            result: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }
}

/// Decodes/encodes newline-delimited JSON, one [`Request`]/[`Response`] per
/// line, mirroring `LinesCodec` usage in `bosminer`'s CGMiner API server but
/// carrying structured JSON instead of plain text.
#[derive(Debug, Default)]
pub struct JsonLineCodec;

impl Decoder for JsonLineCodec {
    type Item = Request;
    type Error = PoolError;

    fn decode(&mut self, src: &mut BytesMut) -> std::result::Result<Option<Self::Item>, Self::Error> {
        let newline = match src.iter().position(|&b| b == b'\n') {
            Some(pos) => pos,
            None => return Ok(None),
        };
        let line = src.split_to(newline + 1);
        let line = &line[..line.len() - 1];
        if line.is_empty() {
            return Ok(None);
        }
        let request: Request = serde_json::from_slice(line)
            .map_err(|e| PoolError::MalformedShare.context_hint(e))?;
        Ok(Some(request))
    }
}

impl Encoder<Response> for JsonLineCodec {
    type Error = PoolError;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        let mut line =
            serde_json::to_vec(&item).map_err(|e| PoolError::Numeric(format!("encode failure: {}", e)))?;
        line.push(b'\n');
        dst.extend_from_slice(&line);
        Ok(())
    }
}

impl PoolError {
    /// Attaches a parse error's message to a `MalformedShare`-shaped variant,
    /// without needing a dedicated enum case for wire-decode failures.
    fn context_hint(self, source: serde_json::Error) -> Self {
        match self {
            PoolError::MalformedShare => PoolError::Numeric(format!("malformed request: {}", source)),
            other => other,
        }
    }
}
