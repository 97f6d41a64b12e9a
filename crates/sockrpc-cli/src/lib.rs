// Copyright 2025 sockrpc Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # sockrpc CLI
//!
//! Command-line interface for sockrpc.
//!
//! - `sockrpc serve`: serve the demo backend over WebSocket or TCP
//! - `sockrpc describe`: print a server's description
//! - `sockrpc call`: make one call (outputs raw JSON for scripting)
//! - `sockrpc stream`: drive a generator to completion, one value per line
//!
//! The library half holds the demo backend and the argument helpers so they
//! can be tested without spawning the binary.

pub mod demo;

use std::str::FromStr;

use anyhow::Result;
use sockrpc_common::Args;

/// Transport a `serve` command listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeTransport {
    WebSocket,
    Tcp,
}

impl FromStr for ServeTransport {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ws" | "websocket" => Ok(ServeTransport::WebSocket),
            "tcp" => Ok(ServeTransport::Tcp),
            other => Err(format!("unknown transport '{}' (expected ws or tcp)", other)),
        }
    }
}

/// Parses the `--args` option: a JSON array of positional arguments.
///
/// A single non-array value is accepted as a one-element list, so
/// `-a '"world"'` and `-a '["world"]'` mean the same thing.
///
/// # Errors
///
/// Returns an error if the string is not valid JSON.
pub fn parse_args(json: &str) -> Result<Args> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| anyhow::anyhow!("Invalid JSON in args: {}", e))?;
    Ok(match value {
        serde_json::Value::Array(args) => args,
        other => vec![other],
    })
}

/// Validates that a URL names a transport the client can connect to.
pub fn validate_url(url: &str) -> Result<()> {
    if url.starts_with("ws://") || url.starts_with("tcp://") {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "Invalid server address: '{}' must start with ws:// or tcp://",
            url
        ))
    }
}
