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

//! The per-user study session model.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::error::EngineError;
use crate::transcript::TranscriptSegment;

/// Chat-platform numeric user identifier.
pub type UserId = i64;

/// Default seconds between emitted cards.
pub const DEFAULT_INTERVAL_SEC: u32 = 300;
/// Default width of each reviewed window, in seconds.
pub const DEFAULT_CHUNK_SEC: u32 = 90;
/// Lower bound on the card cadence.
pub const MIN_INTERVAL_SEC: u32 = 30;
/// Bounds on the window width.
pub const MIN_CHUNK_SEC: u32 = 30;
pub const MAX_CHUNK_SEC: u32 = 600;

/// Per-user study state for one video.
///
/// One record per user, created with defaults on first contact and mutated
/// in place from then on; records are deactivated, never deleted. The armed
/// timer itself lives in the scheduler's side table, not here, so the
/// record stays serializable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Identifier of the configured video, or `None` before `/add`.
    pub video_id: Option<String>,
    /// The video link as the user entered it.
    pub video_url: Option<String>,
    pub title: Option<String>,
    /// Total length of the configured video, in seconds.
    pub duration_sec: u32,
    /// Seconds between emitted cards.
    pub interval_sec: u32,
    /// Width of each reviewed window, in seconds.
    pub chunk_sec: u32,
    /// Start of the next window to emit. Non-decreasing while a run is in
    /// progress; reset by `/add` and by restarting a finished run.
    pub cursor_sec: u32,
    /// Caption segments, when a transcript could be fetched.
    pub transcript: Option<Vec<TranscriptSegment>>,
    /// Whether a repeating timer should be armed for this user.
    pub active: bool,
    /// Last mutation time, for offline inspection.
    pub updated_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Session {
            video_id: None,
            video_url: None,
            title: None,
            duration_sec: 0,
            interval_sec: DEFAULT_INTERVAL_SEC,
            chunk_sec: DEFAULT_CHUNK_SEC,
            cursor_sec: 0,
            transcript: None,
            active: false,
            updated_at: Utc::now(),
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the configured video, resetting study progress. Cadence and
    /// chunk settings survive the replacement.
    pub fn assign_video(
        &mut self,
        video_id: String,
        video_url: String,
        title: String,
        duration_sec: u32,
        transcript: Option<Vec<TranscriptSegment>>,
    ) {
        self.video_id = Some(video_id);
        self.video_url = Some(video_url);
        self.title = Some(title);
        self.duration_sec = duration_sec;
        self.cursor_sec = 0;
        self.transcript = transcript;
    }

    /// Set the card cadence. [`MIN_INTERVAL_SEC`] is the floor; there is
    /// no ceiling.
    pub fn set_interval(&mut self, secs: u32) -> Result<(), EngineError> {
        if secs < MIN_INTERVAL_SEC {
            return Err(EngineError::IntervalOutOfRange(secs));
        }
        self.interval_sec = secs;
        Ok(())
    }

    /// Set the window width, bounded by [`MIN_CHUNK_SEC`] and
    /// [`MAX_CHUNK_SEC`].
    pub fn set_chunk(&mut self, secs: u32) -> Result<(), EngineError> {
        if !(MIN_CHUNK_SEC..=MAX_CHUNK_SEC).contains(&secs) {
            return Err(EngineError::ChunkOutOfRange(secs));
        }
        self.chunk_sec = secs;
        Ok(())
    }

    pub fn has_video(&self) -> bool {
        self.video_id.is_some()
    }

    /// End of the next window: one chunk past the cursor, clipped to the
    /// end of the video.
    pub fn window_end(&self) -> u32 {
        self.cursor_sec
            .saturating_add(self.chunk_sec)
            .min(self.duration_sec)
    }

    /// Whether the cursor has reached the end of the video.
    pub fn is_exhausted(&self) -> bool {
        self.cursor_sec >= self.duration_sec
    }

    pub fn remaining_sec(&self) -> u32 {
        self.duration_sec.saturating_sub(self.cursor_sec)
    }

    /// Restarting a finished run rewinds to the beginning of the video.
    pub fn rewind_if_exhausted(&mut self) {
        if self.is_exhausted() {
            self.cursor_sec = 0;
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Read-only view for status displays.
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            title: self.title.clone(),
            video_id: self.video_id.clone(),
            remaining_sec: self.remaining_sec(),
            interval_sec: self.interval_sec,
            chunk_sec: self.chunk_sec,
            active: self.active,
        }
    }
}

/// The fields of a session a user gets to see.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub title: Option<String>,
    pub video_id: Option<String>,
    pub remaining_sec: u32,
    pub interval_sec: u32,
    pub chunk_sec: u32,
    pub active: bool,
}
