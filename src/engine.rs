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

//! The command surface: everything the chat layer can ask for, one method
//! per command.

use std::sync::Arc;

use clipcards_core::Session;
use clipcards_core::SessionStatus;
use clipcards_core::UserId;
use clipcards_core::parse_duration;

use crate::error::Fallible;
use crate::error::fail;
use crate::providers::TranscriptProvider;
use crate::providers::VideoMetadataProvider;
use crate::scheduler::SessionScheduler;
use crate::scheduler::TickOutcome;
use crate::store::SessionStore;
use crate::youtube::extract_video_id;

/// Reply data for a successful video configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoConfigured {
    pub title: String,
    pub duration_sec: u32,
    pub has_transcript: bool,
}

pub struct Engine {
    store: Arc<SessionStore>,
    scheduler: SessionScheduler,
    metadata: Arc<dyn VideoMetadataProvider>,
    transcripts: Option<Arc<dyn TranscriptProvider>>,
    languages: Vec<String>,
}

impl Engine {
    pub fn new(
        store: Arc<SessionStore>,
        scheduler: SessionScheduler,
        metadata: Arc<dyn VideoMetadataProvider>,
        transcripts: Option<Arc<dyn TranscriptProvider>>,
        languages: Vec<String>,
    ) -> Self {
        Engine {
            store,
            scheduler,
            metadata,
            transcripts,
            languages,
        }
    }

    /// First contact: get-or-create the user's session.
    pub async fn register(&self, uid: UserId) -> Session {
        self.store.ensure(uid).await
    }

    /// Configure the session's video from a pasted link.
    ///
    /// A metadata failure aborts with no state change. A transcript
    /// failure only degrades the card content, so it is logged and
    /// swallowed.
    pub async fn configure_video(&self, uid: UserId, link: &str) -> Fallible<VideoConfigured> {
        let Some(video_id) = extract_video_id(link) else {
            return fail("that does not look like a video link I can read");
        };
        let meta = match self.metadata.resolve(&video_id).await {
            Ok(Some(meta)) => meta,
            Ok(None) => return fail("that video does not exist or is not public"),
            Err(e) => {
                log::warn!("metadata lookup for {video_id} failed: {e}");
                return fail("could not fetch the video details; try again in a minute");
            }
        };
        let transcript = match &self.transcripts {
            Some(provider) => match provider.fetch(&video_id, &self.languages).await {
                Ok(transcript) => transcript,
                Err(e) => {
                    log::warn!("transcript fetch for {video_id} failed: {e}");
                    None
                }
            },
            None => None,
        };
        let has_transcript = transcript.is_some();
        let configured = VideoConfigured {
            title: meta.title.clone(),
            duration_sec: meta.duration_sec,
            has_transcript,
        };
        self.store
            .update(uid, |session| {
                session.assign_video(
                    video_id,
                    link.trim().to_string(),
                    meta.title,
                    meta.duration_sec,
                    transcript,
                );
            })
            .await;
        Ok(configured)
    }

    /// Set the cadence between cards from a human duration string. Takes
    /// effect the next time the session starts.
    pub async fn set_interval(&self, uid: UserId, input: &str) -> Fallible<u32> {
        let secs = parse_duration(input)?;
        self.store
            .update(uid, |session| session.set_interval(secs))
            .await?;
        Ok(secs)
    }

    /// Set the width of the reviewed window from a human duration string.
    pub async fn set_chunk(&self, uid: UserId, input: &str) -> Fallible<u32> {
        let secs = parse_duration(input)?;
        self.store
            .update(uid, |session| session.set_chunk(secs))
            .await?;
        Ok(secs)
    }

    pub async fn start_session(&self, uid: UserId) -> Fallible<()> {
        self.scheduler.start(uid).await
    }

    pub async fn stop_session(&self, uid: UserId) {
        self.scheduler.stop(uid).await;
    }

    pub async fn skip(&self, uid: UserId) -> TickOutcome {
        self.scheduler.skip(uid).await
    }

    /// Read-only snapshot for `/status`; registers the user on the way.
    pub async fn status(&self, uid: UserId) -> SessionStatus {
        self.store.ensure(uid).await.status()
    }

    /// Re-arm timers for sessions that were active when the process last
    /// stopped. Returns how many were brought back.
    pub async fn resume(&self) -> usize {
        let uids: Vec<UserId> = self
            .store
            .with_sessions(|sessions| {
                sessions
                    .iter()
                    .filter(|(_, session)| session.active)
                    .map(|(uid, _)| *uid)
                    .collect()
            })
            .await;
        let mut resumed = 0;
        for uid in &uids {
            match self.scheduler.start(*uid).await {
                Ok(()) => resumed += 1,
                Err(e) => {
                    // An active record without a video can only come from a
                    // hand-edited db; clear the flag so it stays quiet.
                    log::warn!("could not resume session for user {uid}: {e}");
                    self.store.update(*uid, |session| session.active = false).await;
                }
            }
        }
        resumed
    }

    /// Take down every armed timer, for process shutdown.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}
