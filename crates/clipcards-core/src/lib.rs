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

//! clipcards-core: Core library for clipcards, a study bot that turns
//! videos into timed flashcards.
//!
//! This library provides the pure types and algorithms:
//! - The per-user study session model and its bounds
//! - Duration parsing and timecode formatting
//! - Transcript segments and windowing over them
//! - Flashcard assembly

pub mod card;
pub mod duration;
pub mod error;
pub mod session;
pub mod transcript;

// Re-exports for convenience
pub use card::{FALLBACK_ANSWER, Flashcard, SUMMARY_MAX_CHARS, compose, segment_link};
pub use duration::{format_timecode, parse_duration};
pub use error::EngineError;
pub use session::{
    DEFAULT_CHUNK_SEC, DEFAULT_INTERVAL_SEC, MAX_CHUNK_SEC, MIN_CHUNK_SEC, MIN_INTERVAL_SEC,
    Session, SessionStatus, UserId,
};
pub use transcript::{TranscriptSegment, slice_window};
