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

use std::error::Error;
use std::fmt::Display;
use std::fmt::Formatter;

use crate::session::MAX_CHUNK_SEC;
use crate::session::MIN_CHUNK_SEC;
use crate::session::MIN_INTERVAL_SEC;

/// Rejections produced by the session engine.
///
/// Every variant is user-correctable: the session is left unchanged when
/// one of these is returned, and the message tells the user what to fix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A duration string that matches none of the accepted forms.
    InvalidDuration(String),
    /// A card cadence below the minimum.
    IntervalOutOfRange(u32),
    /// A window width outside the permitted bounds.
    ChunkOutOfRange(u32),
    /// A session command that needs a video when none is configured.
    NoVideoConfigured,
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            EngineError::InvalidDuration(input) => {
                write!(
                    f,
                    "could not read '{input}' as a duration; try 5m, 90s, 1h30m, or 00:05:00"
                )
            }
            EngineError::IntervalOutOfRange(got) => {
                write!(
                    f,
                    "the interval must be at least {MIN_INTERVAL_SEC} seconds, got {got}"
                )
            }
            EngineError::ChunkOutOfRange(got) => {
                write!(
                    f,
                    "the chunk must be between {MIN_CHUNK_SEC} and {MAX_CHUNK_SEC} seconds, got {got}"
                )
            }
            EngineError::NoVideoConfigured => {
                write!(f, "no video is configured; add one with /add first")
            }
        }
    }
}

impl Error for EngineError {}
