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

//! Flashcard assembly: one card per reviewed window.

use crate::duration::format_timecode;

/// How many characters of transcript text a card's answer may carry.
pub const SUMMARY_MAX_CHARS: usize = 700;

/// Shown as the answer when no transcript text covers the window.
pub const FALLBACK_ANSWER: &str = "Watch the clip, then write down your own summary.";

/// A single flashcard covering one window of a video.
#[derive(Debug, Clone, PartialEq)]
pub struct Flashcard {
    pub title: String,
    pub video_id: String,
    pub start_sec: u32,
    pub end_sec: u32,
    /// Link into the video, anchored at `start_sec`.
    pub link: String,
    /// Human label for the window, e.g. `05:00 - 06:30`.
    pub time_range: String,
    /// The reflection prompt shown above the hidden answer.
    pub prompt: String,
    /// Windowed transcript text, or [`FALLBACK_ANSWER`].
    pub answer: String,
}

/// Link into a video at a second offset.
pub fn segment_link(video_id: &str, start_sec: u32) -> String {
    format!("https://youtu.be/{video_id}?t={start_sec}")
}

/// Assemble the card for the window `[start_sec, end_sec)`.
///
/// `summary` is the windowed transcript text; when it is empty the answer
/// falls back to a placeholder inviting the user to take their own notes.
pub fn compose(
    title: &str,
    video_id: &str,
    start_sec: u32,
    end_sec: u32,
    summary: &str,
) -> Flashcard {
    let time_range = format!(
        "{} - {}",
        format_timecode(start_sec),
        format_timecode(end_sec)
    );
    let prompt = format!(
        "What are the key ideas in {time_range} of \u{201c}{title}\u{201d}? Try to sum them up in three points."
    );
    let answer = if summary.is_empty() {
        FALLBACK_ANSWER.to_string()
    } else {
        summary.to_string()
    };
    Flashcard {
        title: title.to_string(),
        video_id: video_id.to_string(),
        start_sec,
        end_sec,
        link: segment_link(video_id, start_sec),
        time_range,
        prompt,
        answer,
    }
}
