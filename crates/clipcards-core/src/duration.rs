// Copyright 2025 Fernando Borretti
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

//! Parsing and formatting of human-entered durations.
//!
//! Three input forms are accepted, tried in order:
//!
//! 1. Timecodes: `H:MM:SS` or `M:SS`, one or two digits per field.
//! 2. Unit suffixes: `1h30m`, `90s`, `5m`, in `h`, `m`, `s` order.
//! 3. Bare digits, taken as seconds.

use crate::error::EngineError;

/// Parse a human-entered duration into whole seconds.
///
/// Input is trimmed and lowercased before matching. Timecode fields are
/// taken literally, so `1:99` is 159 seconds.
pub fn parse_duration(input: &str) -> Result<u32, EngineError> {
    let s = input.trim().to_lowercase();
    if let Some(secs) = parse_timecode(&s) {
        return Ok(secs);
    }
    if let Some(secs) = parse_units(&s) {
        return Ok(secs);
    }
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(secs) = s.parse::<u32>() {
            return Ok(secs);
        }
    }
    Err(EngineError::InvalidDuration(input.trim().to_string()))
}

/// `H:MM:SS` or `M:SS`, each field one or two digits.
fn parse_timecode(s: &str) -> Option<u32> {
    let fields: Vec<&str> = s.split(':').collect();
    if fields.len() != 2 && fields.len() != 3 {
        return None;
    }
    let mut parts: Vec<u32> = Vec::with_capacity(3);
    for field in &fields {
        if field.is_empty() || field.len() > 2 || !field.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        parts.push(field.parse().ok()?);
    }
    match parts.as_slice() {
        [h, m, s] => Some(h * 3600 + m * 60 + s),
        [m, s] => Some(m * 60 + s),
        _ => None,
    }
}

/// Unit-suffix form: optional `<n>h`, `<n>m`, `<n>s` components in that
/// order, at least one present, whitespace between components allowed.
fn parse_units(s: &str) -> Option<u32> {
    let mut rest = s;
    let mut total: u64 = 0;
    let mut any = false;
    for (unit, secs) in [('h', 3600u64), ('m', 60), ('s', 1)] {
        rest = rest.trim_start();
        let digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            continue;
        }
        if let Some(tail) = rest[digits..].trim_start().strip_prefix(unit) {
            let value: u64 = rest[..digits].parse().ok()?;
            total += value * secs;
            rest = tail;
            any = true;
        }
    }
    if !any || !rest.trim_start().is_empty() {
        return None;
    }
    u32::try_from(total).ok()
}

/// Render seconds as `MM:SS`, or `HH:MM:SS` from one hour up.
pub fn format_timecode(total_sec: u32) -> String {
    let h = total_sec / 3600;
    let m = (total_sec % 3600) / 60;
    let s = total_sec % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
