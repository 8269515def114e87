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

//! The outbound chat channel consumed by the scheduler.

use async_trait::async_trait;
use clipcards_core::Flashcard;
use clipcards_core::UserId;

use crate::error::Fallible;

/// Where cards and notices go.
///
/// Sends happen while the session lock is held, so implementations must be
/// prompt: a transport that blocks indefinitely stalls every session
/// operation in the process.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one flashcard to a user.
    async fn emit(&self, uid: UserId, card: &Flashcard) -> Fallible<()>;

    /// Deliver a plain notice to a user.
    async fn notify(&self, uid: UserId, text: &str) -> Fallible<()>;
}

/// What a test transport saw, in order.
#[cfg(test)]
#[derive(Debug)]
pub enum Delivery {
    Card {
        uid: UserId,
        card: Flashcard,
        at: tokio::time::Instant,
    },
    Notice {
        uid: UserId,
        text: String,
    },
}

/// Test transport: forwards every delivery into a channel, stamped with
/// the (possibly paused) tokio clock.
#[cfg(test)]
pub struct MockTransport {
    tx: tokio::sync::mpsc::UnboundedSender<Delivery>,
    fail_emits: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl MockTransport {
    pub fn new() -> (
        std::sync::Arc<Self>,
        tokio::sync::mpsc::UnboundedReceiver<Delivery>,
    ) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = MockTransport {
            tx,
            fail_emits: std::sync::atomic::AtomicBool::new(false),
        };
        (std::sync::Arc::new(transport), rx)
    }

    pub fn set_fail_emits(&self, fail: bool) {
        self.fail_emits
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
#[async_trait]
impl Transport for MockTransport {
    async fn emit(&self, uid: UserId, card: &Flashcard) -> Fallible<()> {
        if self.fail_emits.load(std::sync::atomic::Ordering::SeqCst) {
            return crate::error::fail("wire down");
        }
        let _ = self.tx.send(Delivery::Card {
            uid,
            card: card.clone(),
            at: tokio::time::Instant::now(),
        });
        Ok(())
    }

    async fn notify(&self, uid: UserId, text: &str) -> Fallible<()> {
        let _ = self.tx.send(Delivery::Notice {
            uid,
            text: text.to_string(),
        });
        Ok(())
    }
}
