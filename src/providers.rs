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

//! Seams to the video platform: metadata lookups and transcript fetches.

use async_trait::async_trait;
use clipcards_core::TranscriptSegment;

use crate::error::Fallible;

/// Video metadata as resolved from the hosting platform.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMeta {
    pub title: String,
    pub duration_sec: u32,
}

#[async_trait]
pub trait VideoMetadataProvider: Send + Sync {
    /// Look up title and duration. `Ok(None)` means the video does not
    /// exist or is not visible; `Err` means the lookup itself failed.
    async fn resolve(&self, video_id: &str) -> Fallible<Option<VideoMeta>>;
}

#[async_trait]
pub trait TranscriptProvider: Send + Sync {
    /// Fetch the caption track, preferring languages in the given order.
    /// `Ok(None)` is the ordinary no-transcript outcome, never an error.
    async fn fetch(
        &self,
        video_id: &str,
        languages: &[String],
    ) -> Fallible<Option<Vec<TranscriptSegment>>>;
}

/// Scripted metadata provider for tests.
#[cfg(test)]
pub struct FakeMetadata {
    pub response: Fallible<Option<VideoMeta>>,
}

#[cfg(test)]
#[async_trait]
impl VideoMetadataProvider for FakeMetadata {
    async fn resolve(&self, _video_id: &str) -> Fallible<Option<VideoMeta>> {
        match &self.response {
            Ok(meta) => Ok(meta.clone()),
            Err(e) => crate::error::fail(e.message()),
        }
    }
}

/// Scripted transcript provider for tests.
#[cfg(test)]
pub struct FakeTranscripts {
    pub response: Fallible<Option<Vec<TranscriptSegment>>>,
}

#[cfg(test)]
#[async_trait]
impl TranscriptProvider for FakeTranscripts {
    async fn fetch(
        &self,
        _video_id: &str,
        _languages: &[String],
    ) -> Fallible<Option<Vec<TranscriptSegment>>> {
        match &self.response {
            Ok(transcript) => Ok(transcript.clone()),
            Err(e) => crate::error::fail(e.message()),
        }
    }
}
