// Copyright 2018-2019 Parity Technologies (UK) Ltd.
// This file is part of jobrelay.

// jobrelay is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// jobrelay is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with jobrelay.  If not, see <http://www.gnu.org/licenses/>.

//! Deterministic job fingerprints and path-safe job identifiers.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

static UNSAFE_CHAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9.\-_(),=]").unwrap());
static GEARMAN_HANDLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^H:.+?:\d+$").unwrap());

const PATH_SAFE_MAX_LEN: usize = 256;

/// Render a single argument value the way the joined-args signature does:
/// `null` renders as the literal `undef`, strings render raw, everything
/// else renders as compact JSON.
fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "undef".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render `args` as `k1 = v1, k2 = v2, …` with keys sorted ascending.
fn render_args(args: &serde_json::Map<String, serde_json::Value>) -> String {
    let mut keys: Vec<&String> = args.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|k| format!("{} = {}", k, render_value(&args[k])))
        .collect::<Vec<_>>()
        .join(", ")
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// A deterministic 64-char lowercase hex fingerprint of `name(args)`.
///
/// Identical `(name, args)` pairs (regardless of key insertion order)
/// produce identical fingerprints.
pub fn unique_job_id(name: &str, args: &serde_json::Map<String, serde_json::Value>) -> String {
    let signature = format!("{}({})", name, render_args(args));
    sha256_hex(&signature)
}

/// Mint a path-safe job identifier: a fresh UUIDv4 (hyphens stripped)
/// followed by the fingerprint of `name(args)`, truncated to 256 characters
/// with any character outside `[A-Za-z0-9.\-_(),=]` replaced by `_`.
pub fn path_safe_job_id(name: &str, args: &serde_json::Map<String, serde_json::Value>) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    let fingerprint = unique_job_id(name, args);
    let raw = format!("{}{}", random, fingerprint);
    let sanitized = UNSAFE_CHAR.replace_all(&raw, "_").to_string();
    sanitized.chars().take(PATH_SAFE_MAX_LEN).collect()
}

/// Normalize a broker-specific job handle to a stable job id.
///
/// If the handle contains `"//"`, the substring after the last occurrence
/// is used. Gearman-style handles (`H:host:123`) are validated against
/// `^H:.+?:\d+$`; anything else (e.g. a raw AMQP correlation id) is
/// accepted as-is.
pub fn job_id_from_handle(handle: &str) -> Result<String, crate::Error> {
    let candidate = match handle.rfind("//") {
        Some(idx) => &handle[idx + 2..],
        None => handle,
    };

    if candidate.is_empty() {
        return Err(crate::Error::Protocol(format!("empty job handle in `{}`", handle)));
    }

    if candidate.starts_with("H:") && !GEARMAN_HANDLE.is_match(candidate) {
        return Err(crate::Error::Protocol(format!("invalid Gearman-style handle `{}`", candidate)));
    }

    Ok(candidate.to_string())
}
