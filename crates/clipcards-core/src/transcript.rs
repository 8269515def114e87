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

//! Timestamped caption segments and the windowing over them.

use serde::Deserialize;
use serde::Serialize;

/// One timestamped caption segment.
///
/// Start and duration are kept fractional, exactly as caption tracks carry
/// them. Windowing truncates to whole seconds at comparison time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Seconds from the start of the video.
    pub start: f64,
    /// How long the segment stays on screen, in seconds.
    pub duration: f64,
    pub text: String,
}

impl TranscriptSegment {
    pub fn new(start: f64, duration: f64, text: impl Into<String>) -> Self {
        TranscriptSegment {
            start,
            duration,
            text: text.into(),
        }
    }
}

/// Collect the text of every segment overlapping `[start_sec, end_sec)`.
///
/// A segment spanning `[s, s+d)` on truncated whole seconds is included
/// iff `s + d > start_sec` and `s < end_sec`; touching a boundary is not
/// overlap. Fragments are trimmed and joined with single spaces. Output
/// longer than `max_chars` characters is cut to `max_chars - 3` and given
/// a `...` marker, so a truncated result is exactly `max_chars` characters.
pub fn slice_window(
    segments: &[TranscriptSegment],
    start_sec: u32,
    end_sec: u32,
    max_chars: usize,
) -> String {
    let mut fragments: Vec<&str> = Vec::new();
    for segment in segments {
        let s = segment.start as i64;
        let e = s + segment.duration as i64;
        if e > i64::from(start_sec) && s < i64::from(end_sec) {
            let text = segment.text.trim();
            if !text.is_empty() {
                fragments.push(text);
            }
        }
    }
    truncate_chars(&fragments.join(" "), max_chars)
}

/// Cut `text` to at most `max_chars` characters, marking cuts with `...`.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= 3 {
        return text.chars().take(max_chars).collect();
    }
    let mut out: String = text.chars().take(max_chars - 3).collect();
    out.push_str("...");
    out
}
