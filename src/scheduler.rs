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

//! The per-user repeating card timer and the tick it drives.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clipcards_core::EngineError;
use clipcards_core::UserId;
use clipcards_core::compose;
use clipcards_core::slice_window;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;

use crate::error::Fallible;
use crate::store::SessionStore;
use crate::transport::Transport;

/// Sent when the cursor reaches the end of the video.
pub const COMPLETED_NOTICE: &str =
    "🎉 You reviewed every clip of this video!\n\nWant another pass? Send /startsession to restart.";

/// Sent when a timer fires for a session with no usable video.
pub const NO_VIDEO_NOTICE: &str = "No video is configured. Send /add with a link first.";

/// What a single tick did. Terminal outcomes take the armed timer down
/// with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A card was emitted, or delivery failed and the window will be
    /// retried; the timer keeps running.
    Emitted,
    /// The video is exhausted; the session was deactivated.
    Completed,
    /// The session is not active. A stale timer fires once into this and
    /// terminates.
    Inactive,
    /// No usable video is configured; the session was deactivated.
    NoVideo,
}

impl TickOutcome {
    fn is_terminal(self) -> bool {
        !matches!(self, TickOutcome::Emitted)
    }
}

/// Arms, fires, and disarms the per-user repeating timers.
///
/// The timers map is a side table keyed by user: at most one armed timer
/// per user, and arming replaces (aborts) any predecessor. It is locked
/// only for map edits, never while the store lock is held, and the ticker
/// tasks take the store lock themselves, so the two locks never nest in
/// conflicting order.
#[derive(Clone)]
pub struct SessionScheduler {
    store: Arc<SessionStore>,
    transport: Arc<dyn Transport>,
    timers: Arc<Mutex<HashMap<UserId, JoinHandle<()>>>>,
    summary_max_chars: usize,
}

impl SessionScheduler {
    pub fn new(
        store: Arc<SessionStore>,
        transport: Arc<dyn Transport>,
        summary_max_chars: usize,
    ) -> Self {
        SessionScheduler {
            store,
            transport,
            timers: Arc::new(Mutex::new(HashMap::new())),
            summary_max_chars,
        }
    }

    /// Start (or restart) the repeating card timer for a user.
    ///
    /// Fails when no video is configured, leaving the session inactive. A
    /// finished run rewinds to the start of the video. The first card goes
    /// out immediately rather than one interval in.
    pub async fn start(&self, uid: UserId) -> Fallible<()> {
        let interval_sec = {
            let mut guard = self.store.lock().await;
            let session = guard.ensure(uid);
            if !session.has_video() {
                return Err(EngineError::NoVideoConfigured.into());
            }
            session.rewind_if_exhausted();
            session.active = true;
            session.touch();
            let interval_sec = session.interval_sec;
            guard.flush();
            interval_sec
        };
        self.arm(uid, interval_sec).await;
        Ok(())
    }

    /// Deactivate the session, then take down the timer. Idempotent.
    ///
    /// Deactivation goes first, under the store lock: a tick already past
    /// the timer but not yet holding the lock will then see `active ==
    /// false` and emit nothing.
    pub async fn stop(&self, uid: UserId) {
        {
            let mut guard = self.store.lock().await;
            if let Some(session) = guard.get_mut(uid) {
                if session.active {
                    session.active = false;
                    session.touch();
                    guard.flush();
                }
            }
        }
        self.cancel_timer(uid).await;
    }

    /// Emit one card right now, outside the regular cadence.
    ///
    /// The armed timer is untouched: the next scheduled tick still fires
    /// at its originally scheduled time.
    pub async fn skip(&self, uid: UserId) -> TickOutcome {
        self.tick(uid).await
    }

    /// One emission cycle for a user.
    pub async fn tick(&self, uid: UserId) -> TickOutcome {
        let outcome = self.run_tick(uid).await;
        if outcome.is_terminal() {
            self.cancel_timer(uid).await;
        }
        outcome
    }

    /// Take down every armed timer, for process shutdown.
    pub async fn shutdown(&self) {
        let mut timers = self.timers.lock().await;
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }

    /// Whether a timer is currently armed for this user.
    pub async fn is_armed(&self, uid: UserId) -> bool {
        self.timers.lock().await.contains_key(&uid)
    }

    /// Arm the repeating timer, replacing any predecessor.
    async fn arm(&self, uid: UserId, interval_sec: u32) {
        let mut timers = self.timers.lock().await;
        if let Some(old) = timers.remove(&uid) {
            old.abort();
        }
        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            // A zero period would panic tokio's interval; the engine
            // enforces the real floor.
            let period = Duration::from_secs(u64::from(interval_sec.max(1)));
            let mut ticker = time::interval(period);
            loop {
                ticker.tick().await;
                let outcome = scheduler.tick(uid).await;
                log::debug!("tick for user {uid}: {outcome:?}");
                if outcome.is_terminal() {
                    break;
                }
            }
        });
        timers.insert(uid, handle);
    }

    async fn cancel_timer(&self, uid: UserId) {
        if let Some(handle) = self.timers.lock().await.remove(&uid) {
            handle.abort();
        }
    }

    /// The whole cycle runs under the store lock, delivery included, so a
    /// concurrent stop resolves in lock-acquisition order.
    async fn run_tick(&self, uid: UserId) -> TickOutcome {
        let mut guard = self.store.lock().await;
        let Some(session) = guard.get_mut(uid) else {
            return TickOutcome::Inactive;
        };
        if !session.active {
            return TickOutcome::Inactive;
        }
        let video_id = match &session.video_id {
            Some(id) if session.duration_sec > 0 => id.clone(),
            _ => {
                session.active = false;
                session.touch();
                guard.flush();
                self.notify(uid, NO_VIDEO_NOTICE).await;
                return TickOutcome::NoVideo;
            }
        };
        if session.is_exhausted() {
            session.active = false;
            session.touch();
            guard.flush();
            self.notify(uid, COMPLETED_NOTICE).await;
            return TickOutcome::Completed;
        }
        let start_sec = session.cursor_sec;
        let end_sec = session.window_end();
        let segments = session.transcript.as_deref().unwrap_or_default();
        let summary = slice_window(segments, start_sec, end_sec, self.summary_max_chars);
        let title = session.title.clone().unwrap_or_default();
        let card = compose(&title, &video_id, start_sec, end_sec, &summary);
        match self.transport.emit(uid, &card).await {
            Ok(()) => {
                session.cursor_sec = end_sec;
                session.touch();
                guard.flush();
                TickOutcome::Emitted
            }
            Err(e) => {
                // Leave the cursor alone so the next tick retries the
                // same window.
                log::error!("card delivery to user {uid} failed: {e}");
                TickOutcome::Emitted
            }
        }
    }

    async fn notify(&self, uid: UserId, text: &str) {
        if let Err(e) = self.transport.notify(uid, text).await {
            log::warn!("notice to user {uid} failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use clipcards_core::Session;
    use clipcards_core::TranscriptSegment;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio::time::Instant;

    use super::*;
    use crate::persist::MemoryStore;
    use crate::persist::Sessions;
    use crate::transport::Delivery;
    use crate::transport::MockTransport;

    const UID: UserId = 42;

    /// A 200-second video reviewed in 90-second chunks every 300 seconds.
    fn seeded_session() -> Session {
        let mut session = Session::new();
        session.assign_video(
            "vid123".into(),
            "https://youtu.be/vid123".into(),
            "Test Video".into(),
            200,
            Some(vec![
                TranscriptSegment::new(0.0, 90.0, "part one"),
                TranscriptSegment::new(90.0, 90.0, "part two"),
                TranscriptSegment::new(180.0, 20.0, "part three"),
            ]),
        );
        session
    }

    fn fixture(
        session: Session,
    ) -> (
        SessionScheduler,
        Arc<SessionStore>,
        Arc<MockTransport>,
        UnboundedReceiver<Delivery>,
    ) {
        let mut sessions = Sessions::new();
        sessions.insert(UID, session);
        let store =
            Arc::new(SessionStore::open(Box::new(MemoryStore::seeded(sessions))).unwrap());
        let (transport, rx) = MockTransport::new();
        let scheduler = SessionScheduler::new(store.clone(), transport.clone(), 700);
        (scheduler, store, transport, rx)
    }

    async fn next_card(rx: &mut UnboundedReceiver<Delivery>) -> (clipcards_core::Flashcard, Instant) {
        match rx.recv().await {
            Some(Delivery::Card { card, at, .. }) => (card, at),
            other => panic!("expected a card, got {other:?}"),
        }
    }

    async fn next_notice(rx: &mut UnboundedReceiver<Delivery>) -> (UserId, String) {
        match rx.recv().await {
            Some(Delivery::Notice { uid, text }) => (uid, text),
            other => panic!("expected a notice, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_start_requires_video() {
        let (scheduler, store, _transport, mut rx) = fixture(Session::new());
        let err = scheduler.start(UID).await.unwrap_err();
        assert!(err.message().contains("no video is configured"));
        assert!(!store.get(UID).await.unwrap().active);
        assert!(!scheduler.is_armed(UID).await);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    /// The first card goes out immediately, not one interval in.
    #[tokio::test(start_paused = true)]
    async fn test_first_card_is_immediate() {
        let (scheduler, _store, _transport, mut rx) = fixture(seeded_session());
        let armed_at = Instant::now();
        scheduler.start(UID).await.unwrap();
        let (card, at) = next_card(&mut rx).await;
        assert_eq!(at, armed_at);
        assert_eq!((card.start_sec, card.end_sec), (0, 90));
        assert_eq!(card.answer, "part one");
        assert_eq!(card.link, "https://youtu.be/vid123?t=0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cards_follow_the_interval() {
        let (scheduler, _store, _transport, mut rx) = fixture(seeded_session());
        scheduler.start(UID).await.unwrap();
        let (first, t1) = next_card(&mut rx).await;
        let (second, t2) = next_card(&mut rx).await;
        assert_eq!(t2 - t1, Duration::from_secs(300));
        assert_eq!((first.start_sec, first.end_sec), (0, 90));
        assert_eq!((second.start_sec, second.end_sec), (90, 180));
    }

    /// Ticks walk the video in chunk-sized windows, clip the last one, and
    /// finish with a completion notice instead of a card.
    #[tokio::test]
    async fn test_ticks_walk_windows_and_complete() {
        let (scheduler, store, _transport, mut rx) = fixture(seeded_session());
        store.update(UID, |s| s.active = true).await;

        assert_eq!(scheduler.tick(UID).await, TickOutcome::Emitted);
        assert_eq!(scheduler.tick(UID).await, TickOutcome::Emitted);
        assert_eq!(scheduler.tick(UID).await, TickOutcome::Emitted);
        assert_eq!(scheduler.tick(UID).await, TickOutcome::Completed);

        let (c1, _) = next_card(&mut rx).await;
        let (c2, _) = next_card(&mut rx).await;
        let (c3, _) = next_card(&mut rx).await;
        assert_eq!((c1.start_sec, c1.end_sec), (0, 90));
        assert_eq!((c2.start_sec, c2.end_sec), (90, 180));
        assert_eq!((c3.start_sec, c3.end_sec), (180, 200));
        assert_eq!(c3.answer, "part three");
        let (uid, notice) = next_notice(&mut rx).await;
        assert_eq!(uid, UID);
        assert!(notice.contains("/startsession"));

        let session = store.get(UID).await.unwrap();
        assert!(!session.active);
        assert_eq!(session.cursor_sec, 200);
    }

    /// A tick against an inactive session emits nothing and says nothing.
    #[tokio::test]
    async fn test_tick_inactive_is_silent() {
        let (scheduler, _store, _transport, mut rx) = fixture(seeded_session());
        assert_eq!(scheduler.tick(UID).await, TickOutcome::Inactive);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_tick_unknown_user() {
        let (scheduler, _store, _transport, mut rx) = fixture(seeded_session());
        assert_eq!(scheduler.tick(7).await, TickOutcome::Inactive);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    /// An active session with no video gets a corrective notice and is
    /// deactivated.
    #[tokio::test]
    async fn test_tick_without_video() {
        let (scheduler, store, _transport, mut rx) = fixture(Session::new());
        store.update(UID, |s| s.active = true).await;
        assert_eq!(scheduler.tick(UID).await, TickOutcome::NoVideo);
        let (uid, notice) = next_notice(&mut rx).await;
        assert_eq!(uid, UID);
        assert!(notice.contains("/add"));
        assert!(!store.get(UID).await.unwrap().active);
    }

    /// A video that resolved with zero duration is treated as unusable.
    #[tokio::test]
    async fn test_tick_with_zero_duration_video() {
        let mut session = seeded_session();
        session.duration_sec = 0;
        let (scheduler, store, _transport, _rx) = fixture(session);
        store.update(UID, |s| s.active = true).await;
        assert_eq!(scheduler.tick(UID).await, TickOutcome::NoVideo);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_disarms() {
        let (scheduler, store, _transport, mut rx) = fixture(seeded_session());
        scheduler.start(UID).await.unwrap();
        let _ = next_card(&mut rx).await;
        assert!(scheduler.is_armed(UID).await);

        scheduler.stop(UID).await;
        scheduler.stop(UID).await;
        assert!(!scheduler.is_armed(UID).await);
        assert!(!store.get(UID).await.unwrap().active);

        // No further cards, however long we wait.
        time::advance(Duration::from_secs(3600)).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    /// Stop before a tick acquires the lock suppresses the card.
    #[tokio::test]
    async fn test_stop_then_tick_emits_nothing() {
        let (scheduler, store, _transport, mut rx) = fixture(seeded_session());
        store.update(UID, |s| s.active = true).await;
        scheduler.stop(UID).await;
        assert_eq!(scheduler.tick(UID).await, TickOutcome::Inactive);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    /// Skipping emits out of band without resetting the cadence: the next
    /// scheduled card still fires at its original time.
    #[tokio::test(start_paused = true)]
    async fn test_skip_preserves_cadence() {
        let (scheduler, _store, _transport, mut rx) = fixture(seeded_session());
        scheduler.start(UID).await.unwrap();
        let (_c1, t1) = next_card(&mut rx).await;

        time::advance(Duration::from_secs(100)).await;
        assert_eq!(scheduler.skip(UID).await, TickOutcome::Emitted);
        let (c2, t2) = next_card(&mut rx).await;
        assert_eq!(t2 - t1, Duration::from_secs(100));
        assert_eq!((c2.start_sec, c2.end_sec), (90, 180));

        let (c3, t3) = next_card(&mut rx).await;
        assert_eq!(t3 - t1, Duration::from_secs(300));
        assert_eq!((c3.start_sec, c3.end_sec), (180, 200));
    }

    /// A failed delivery leaves the cursor where it was, so the window is
    /// retried on the next tick.
    #[tokio::test]
    async fn test_emit_failure_retries_window() {
        let (scheduler, store, transport, mut rx) = fixture(seeded_session());
        store.update(UID, |s| s.active = true).await;
        transport.set_fail_emits(true);
        assert_eq!(scheduler.tick(UID).await, TickOutcome::Emitted);
        let session = store.get(UID).await.unwrap();
        assert_eq!(session.cursor_sec, 0);
        assert!(session.active);

        transport.set_fail_emits(false);
        assert_eq!(scheduler.tick(UID).await, TickOutcome::Emitted);
        let (card, _) = next_card(&mut rx).await;
        assert_eq!((card.start_sec, card.end_sec), (0, 90));
    }

    /// Restarting a finished run rewinds to the start of the video.
    #[tokio::test(start_paused = true)]
    async fn test_restart_rewinds_after_completion() {
        let (scheduler, store, _transport, mut rx) = fixture(seeded_session());
        store.update(UID, |s| s.active = true).await;
        while scheduler.tick(UID).await == TickOutcome::Emitted {}
        assert_eq!(store.get(UID).await.unwrap().cursor_sec, 200);

        scheduler.start(UID).await.unwrap();
        // Drain the three cards and the completion notice from the first
        // pass, then the fresh first card.
        let mut firsts = Vec::new();
        for _ in 0..5 {
            if let Some(Delivery::Card { card, .. }) = rx.recv().await {
                firsts.push((card.start_sec, card.end_sec));
            }
        }
        assert_eq!(firsts.last(), Some(&(0, 90)));
    }

    /// Starting twice replaces the timer instead of doubling the cards:
    /// the windows keep advancing one at a time.
    #[tokio::test(start_paused = true)]
    async fn test_start_twice_rearms() {
        let (scheduler, _store, _transport, mut rx) = fixture(seeded_session());
        scheduler.start(UID).await.unwrap();
        let (c1, t1) = next_card(&mut rx).await;
        assert_eq!((c1.start_sec, c1.end_sec), (0, 90));

        scheduler.start(UID).await.unwrap();
        assert!(scheduler.is_armed(UID).await);
        // The replacement timer emits immediately, from the cursor.
        let (c2, t2) = next_card(&mut rx).await;
        assert_eq!(t2, t1);
        assert_eq!((c2.start_sec, c2.end_sec), (90, 180));

        // Exactly one card one interval later.
        let (c3, t3) = next_card(&mut rx).await;
        assert_eq!(t3 - t1, Duration::from_secs(300));
        assert_eq!((c3.start_sec, c3.end_sec), (180, 200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_timers() {
        let (scheduler, _store, _transport, mut rx) = fixture(seeded_session());
        scheduler.start(UID).await.unwrap();
        let _ = next_card(&mut rx).await;
        scheduler.shutdown().await;
        assert!(!scheduler.is_armed(UID).await);
        time::advance(Duration::from_secs(3600)).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }
}
