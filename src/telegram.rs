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

//! The Telegram front end: a thin Bot API client, the [`Transport`]
//! implementation that delivers cards as chat messages, and the command
//! loop that long-polls for updates.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use maud::html;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;

use clipcards_core::Flashcard;
use clipcards_core::SessionStatus;
use clipcards_core::UserId;
use clipcards_core::format_timecode;

use crate::engine::Engine;
use crate::engine::VideoConfigured;
use crate::error::Fallible;
use crate::error::fail;
use crate::scheduler::TickOutcome;
use crate::transport::Transport;

/// How long each `getUpdates` call holds the connection open.
const POLL_TIMEOUT_SEC: u64 = 30;

/// Pause before retrying after a failed poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(2);

const WELCOME: &str = "👋 Welcome!\n\nSend me a YouTube link and I will quiz you through the \
                       video, one short clip at a time.\n\n/add <link>: choose a \
                       video\n/startsession: start the cards\n/help: everything else";

const HELP: &str = "Here is what I understand:\n\n/add <link>: choose the video to \
                    study\n/setinterval <duration>: time between cards, at least 30s\n/setchunk \
                    <duration>: clip length per card, 30s to 10m\n/startsession: start (or \
                    restart) the cards\n/stop: pause the cards\n/status: show the current \
                    session\n\nDurations read like 5m, 90s, 1h30m, or 00:05:00.\n\nYou can also \
                    just paste a YouTube link.";

const STOPPED: &str = "⏹ Session stopped. /startsession picks up where you left off.";

const NOT_RUNNING: &str = "No session is running. /startsession starts the cards again.";

/// One entry from `getUpdates`.
#[derive(Debug, Deserialize)]
pub struct Update {
    update_id: i64,
    message: Option<Message>,
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: User,
    data: Option<String>,
    message: Option<Message>,
}

/// Every Bot API reply wraps the payload in this envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    description: Option<String>,
    result: Option<T>,
}

#[derive(Serialize)]
struct GetUpdates<'a> {
    offset: i64,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: UserId,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    link_preview_options: Option<LinkPreviewOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup>,
}

#[derive(Serialize)]
struct LinkPreviewOptions {
    is_disabled: bool,
}

#[derive(Serialize)]
struct AnswerCallbackQuery<'a> {
    callback_query_id: &'a str,
}

#[derive(Serialize)]
struct EditMessageReplyMarkup {
    chat_id: UserId,
    message_id: i64,
    reply_markup: InlineKeyboardMarkup,
}

#[derive(Debug, Serialize)]
pub struct InlineKeyboardMarkup {
    inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardButton {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_data: Option<String>,
}

impl InlineKeyboardButton {
    fn link(text: &str, url: &str) -> Self {
        Self {
            text: text.to_string(),
            url: Some(url.to_string()),
            callback_data: None,
        }
    }

    fn callback(text: &str, data: &str) -> Self {
        Self {
            text: text.to_string(),
            url: None,
            callback_data: Some(data.to_string()),
        }
    }
}

/// A minimal Bot API client covering the handful of methods the bot uses.
pub struct TelegramClient {
    http: reqwest::Client,
    base: String,
}

impl TelegramClient {
    pub fn new(http: reqwest::Client, token: &str) -> Self {
        Self {
            http,
            base: format!("https://api.telegram.org/bot{token}"),
        }
    }

    async fn call<T, P>(&self, method: &str, payload: &P) -> Fallible<T>
    where
        T: DeserializeOwned,
        P: Serialize,
    {
        let response = self
            .http
            .post(format!("{}/{}", self.base, method))
            .json(payload)
            .send()
            .await?;
        read_response(response).await
    }

    /// Long-poll for updates starting at `offset`.
    pub async fn get_updates(&self, offset: i64) -> Fallible<Vec<Update>> {
        let payload = GetUpdates {
            offset,
            timeout: POLL_TIMEOUT_SEC,
            allowed_updates: &["message", "callback_query"],
        };
        // The long poll holds the connection open for the full window,
        // longer than the client-wide timeout allows.
        let response = self
            .http
            .post(format!("{}/getUpdates", self.base))
            .timeout(Duration::from_secs(POLL_TIMEOUT_SEC + 10))
            .json(&payload)
            .send()
            .await?;
        read_response(response).await
    }

    pub async fn send_text(&self, chat_id: UserId, text: &str) -> Fallible<()> {
        let payload = SendMessage {
            chat_id,
            text,
            parse_mode: None,
            link_preview_options: None,
            reply_markup: None,
        };
        let _: serde_json::Value = self.call("sendMessage", &payload).await?;
        Ok(())
    }

    pub async fn send_html(
        &self,
        chat_id: UserId,
        text: &str,
        reply_markup: Option<InlineKeyboardMarkup>,
    ) -> Fallible<()> {
        let payload = SendMessage {
            chat_id,
            text,
            parse_mode: Some("HTML"),
            link_preview_options: Some(LinkPreviewOptions { is_disabled: true }),
            reply_markup,
        };
        let _: serde_json::Value = self.call("sendMessage", &payload).await?;
        Ok(())
    }

    pub async fn answer_callback(&self, callback_id: &str) -> Fallible<()> {
        let payload = AnswerCallbackQuery {
            callback_query_id: callback_id,
        };
        let _: serde_json::Value = self.call("answerCallbackQuery", &payload).await?;
        Ok(())
    }

    /// Replace a message's inline keyboard with an empty one.
    pub async fn clear_reply_markup(&self, chat_id: UserId, message_id: i64) -> Fallible<()> {
        let payload = EditMessageReplyMarkup {
            chat_id,
            message_id,
            reply_markup: InlineKeyboardMarkup {
                inline_keyboard: Vec::new(),
            },
        };
        let _: serde_json::Value = self.call("editMessageReplyMarkup", &payload).await?;
        Ok(())
    }
}

async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> Fallible<T> {
    let status = response.status();
    let body: ApiResponse<T> = response.json().await?;
    if !body.ok {
        let reason = body.description.unwrap_or_else(|| format!("HTTP {status}"));
        return fail(format!("telegram: {reason}"));
    }
    match body.result {
        Some(result) => Ok(result),
        None => fail("telegram: ok reply carried no result"),
    }
}

/// Delivers cards and notices as Telegram messages.
pub struct TelegramTransport {
    client: Arc<TelegramClient>,
}

impl TelegramTransport {
    pub fn new(client: Arc<TelegramClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn emit(&self, uid: UserId, card: &Flashcard) -> Fallible<()> {
        let text = render_card(card);
        self.client
            .send_html(uid, &text, Some(card_keyboard(card)))
            .await
    }

    async fn notify(&self, uid: UserId, text: &str) -> Fallible<()> {
        self.client.send_text(uid, text).await
    }
}

/// Render a card as Telegram HTML. The summary sits behind a spoiler so
/// the reader answers before peeking.
fn render_card(card: &Flashcard) -> String {
    html! {
        "🎬 " b { (card.title) } "\n"
        "⏱ " (card.time_range) "\n\n"
        (card.prompt) "\n\n"
        "📝 " b { "Summary" } "\n"
        span class="tg-spoiler" { (card.answer) } "\n\n"
        i { "Tap the summary to reveal it after you answer." }
    }
    .into_string()
}

fn card_keyboard(card: &Flashcard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![
            vec![InlineKeyboardButton::link("▶️ Open the clip", &card.link)],
            vec![
                InlineKeyboardButton::callback("⏭ Skip to the next clip", "skip"),
                InlineKeyboardButton::callback("⏹ Stop the session", "stop"),
            ],
        ],
    }
}

fn render_video_added(configured: &VideoConfigured) -> String {
    let transcript_line = if configured.has_transcript {
        "📝 Transcript found: cards will carry a summary."
    } else {
        "📝 No transcript: cards will ask for your own summary."
    };
    html! {
        "🎬 " b { (configured.title) } "\n"
        "⏱ Length: " (format_timecode(configured.duration_sec)) "\n"
        (transcript_line) "\n\n"
        "Start with /startsession."
    }
    .into_string()
}

fn render_status(status: &SessionStatus) -> String {
    let video = match (&status.title, &status.video_id) {
        (Some(title), _) => title.clone(),
        (None, Some(id)) => id.clone(),
        (None, None) => return "No video yet. Send /add with a link to begin.".to_string(),
    };
    let state = if status.active { "running" } else { "stopped" };
    format!(
        "🎬 {video}\n⏳ Left to review: {}\n⏱ Interval: {}\n✂️ Chunk: {}\n▶️ Session: {state}",
        format_timecode(status.remaining_sec),
        format_timecode(status.interval_sec),
        format_timecode(status.chunk_sec),
    )
}

/// Split a message into its leading command and the argument tail.
/// Group chats suffix commands with the bot's name, as in `/status@somebot`.
fn split_command(text: &str) -> (&str, &str) {
    let (head, rest) = match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (text, ""),
    };
    let head = match head.split_once('@') {
        Some((command, _)) if command.starts_with('/') => command,
        _ => head,
    };
    (head, rest)
}

fn looks_like_video_link(text: &str) -> bool {
    !text.starts_with('/') && (text.contains("youtube.com/") || text.contains("youtu.be/"))
}

/// The command loop. Polls for updates and dispatches them to the engine.
pub struct Bot {
    client: Arc<TelegramClient>,
    engine: Arc<Engine>,
}

impl Bot {
    pub fn new(client: Arc<TelegramClient>, engine: Arc<Engine>) -> Self {
        Self { client, engine }
    }

    /// Poll forever. Failed polls are logged and retried; a failure while
    /// handling one update never takes the loop down.
    pub async fn run(&self) {
        let mut offset: i64 = 0;
        log::info!("polling for updates");
        loop {
            let updates = match self.client.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    log::warn!("update poll failed: {e}");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };
            for update in updates {
                offset = offset.max(update.update_id + 1);
                if let Err(e) = self.handle_update(update).await {
                    log::error!("update handling failed: {e}");
                }
            }
        }
    }

    async fn handle_update(&self, update: Update) -> Fallible<()> {
        if let Some(message) = update.message {
            return self.handle_message(message).await;
        }
        if let Some(callback) = update.callback_query {
            return self.handle_callback(callback).await;
        }
        Ok(())
    }

    async fn handle_message(&self, message: Message) -> Fallible<()> {
        let uid = message.chat.id;
        let Some(text) = message.text else {
            return Ok(());
        };
        let text = text.trim();
        let (command, args) = split_command(text);
        log::debug!("message from {uid}: {command}");
        match command {
            "/start" => {
                self.engine.register(uid).await;
                self.reply(uid, WELCOME).await
            }
            "/help" => self.reply(uid, HELP).await,
            "/add" => self.add(uid, args).await,
            "/setinterval" => self.set_interval(uid, args).await,
            "/setchunk" => self.set_chunk(uid, args).await,
            "/startsession" => self.start_session(uid).await,
            "/stop" => self.stop_session(uid).await,
            "/status" => self.status(uid).await,
            _ if looks_like_video_link(text) => self.add(uid, text).await,
            _ => Ok(()),
        }
    }

    async fn handle_callback(&self, callback: CallbackQuery) -> Fallible<()> {
        // Stop the client-side spinner before doing any work.
        self.client.answer_callback(&callback.id).await?;
        let uid = callback.from.id;
        // Retire the buttons on the card that was tapped.
        if let Some(message) = &callback.message {
            if let Err(e) = self
                .client
                .clear_reply_markup(message.chat.id, message.message_id)
                .await
            {
                log::debug!("could not clear reply markup: {e}");
            }
        }
        match callback.data.as_deref() {
            Some("skip") => match self.engine.skip(uid).await {
                // The skipped-to card is its own confirmation, and the
                // terminal outcomes send their notice through the
                // transport. Only a skip that did nothing needs a reply.
                TickOutcome::Inactive => self.reply(uid, NOT_RUNNING).await,
                _ => Ok(()),
            },
            Some("stop") => {
                self.engine.stop_session(uid).await;
                self.reply(uid, STOPPED).await
            }
            _ => Ok(()),
        }
    }

    async fn add(&self, uid: UserId, args: &str) -> Fallible<()> {
        let link = args.trim();
        if link.is_empty() {
            return self.reply(uid, "Usage: /add <video link>").await;
        }
        match self.engine.configure_video(uid, link).await {
            Ok(configured) => {
                let text = render_video_added(&configured);
                self.client.send_html(uid, &text, None).await
            }
            Err(e) => self.reply(uid, e.message()).await,
        }
    }

    async fn set_interval(&self, uid: UserId, args: &str) -> Fallible<()> {
        if args.is_empty() {
            return self
                .reply(uid, "Usage: /setinterval <duration>, e.g. /setinterval 5m")
                .await;
        }
        match self.engine.set_interval(uid, args).await {
            Ok(secs) => {
                let text = format!(
                    "⏱ Interval set to {}. It applies when the session starts.",
                    format_timecode(secs)
                );
                self.reply(uid, &text).await
            }
            Err(e) => self.reply(uid, e.message()).await,
        }
    }

    async fn set_chunk(&self, uid: UserId, args: &str) -> Fallible<()> {
        if args.is_empty() {
            return self
                .reply(uid, "Usage: /setchunk <duration>, e.g. /setchunk 90s")
                .await;
        }
        match self.engine.set_chunk(uid, args).await {
            Ok(secs) => {
                let text = format!(
                    "✂️ Chunk set to {}. The next card uses it.",
                    format_timecode(secs)
                );
                self.reply(uid, &text).await
            }
            Err(e) => self.reply(uid, e.message()).await,
        }
    }

    async fn start_session(&self, uid: UserId) -> Fallible<()> {
        if let Err(e) = self.engine.start_session(uid).await {
            return self.reply(uid, e.message()).await;
        }
        let status = self.engine.status(uid).await;
        let text = format!(
            "▶️ Session started: a card every {}, clips of {}.\nStop anytime with /stop.",
            format_timecode(status.interval_sec),
            format_timecode(status.chunk_sec)
        );
        self.reply(uid, &text).await
    }

    async fn stop_session(&self, uid: UserId) -> Fallible<()> {
        self.engine.stop_session(uid).await;
        self.reply(uid, STOPPED).await
    }

    async fn status(&self, uid: UserId) -> Fallible<()> {
        let status = self.engine.status(uid).await;
        self.reply(uid, &render_status(&status)).await
    }

    async fn reply(&self, uid: UserId, text: &str) -> Fallible<()> {
        self.client.send_text(uid, text).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::Json;
    use axum::Router;
    use axum::extract::Path;
    use axum::extract::State;
    use axum::routing::post;
    use serde_json::Value;
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    use clipcards_core::Session;
    use clipcards_core::compose;

    use super::*;
    use crate::persist::MemoryStore;
    use crate::persist::Sessions;
    use crate::providers::FakeMetadata;
    use crate::providers::FakeTranscripts;
    use crate::providers::VideoMeta;
    use crate::scheduler::SessionScheduler;
    use crate::store::SessionStore;
    use crate::transport::Delivery;
    use crate::transport::MockTransport;

    const UID: UserId = 42;

    type CallLog = Arc<Mutex<Vec<(String, Value)>>>;

    async fn api_handler(
        State(calls): State<CallLog>,
        Path(method): Path<String>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        calls.lock().unwrap().push((method.clone(), body));
        let result = match method.as_str() {
            "getUpdates" => json!([{
                "update_id": 7,
                "message": {"message_id": 1, "chat": {"id": 42}, "text": "/status"},
            }]),
            _ => json!({}),
        };
        Json(json!({"ok": true, "result": result}))
    }

    /// Serve a fake Bot API on a local port and point a client at it.
    async fn api_fixture() -> (Arc<TelegramClient>, CallLog) {
        let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/bot/{method}", post(api_handler))
            .with_state(calls.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/bot", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let client = Arc::new(TelegramClient {
            http: reqwest::Client::new(),
            base,
        });
        (client, calls)
    }

    fn test_engine(
        sessions: Sessions,
    ) -> (Arc<Engine>, Arc<SessionStore>, UnboundedReceiver<Delivery>) {
        let store =
            Arc::new(SessionStore::open(Box::new(MemoryStore::seeded(sessions))).unwrap());
        let (transport, rx) = MockTransport::new();
        let scheduler = SessionScheduler::new(store.clone(), transport, 700);
        let metadata = Arc::new(FakeMetadata {
            response: Ok(Some(VideoMeta {
                title: "A Lecture".to_string(),
                duration_sec: 600,
            })),
        });
        let transcripts = Arc::new(FakeTranscripts { response: Ok(None) });
        let engine = Arc::new(Engine::new(
            store.clone(),
            scheduler,
            metadata,
            Some(transcripts),
            vec!["en".to_string()],
        ));
        (engine, store, rx)
    }

    fn methods(calls: &CallLog) -> Vec<String> {
        calls
            .lock()
            .unwrap()
            .iter()
            .map(|(method, _)| method.clone())
            .collect()
    }

    fn sent_bodies(calls: &CallLog, method: &str) -> Vec<Value> {
        calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, body)| body.clone())
            .collect()
    }

    #[test]
    fn test_render_card_escapes_html() {
        let card = compose("Rust <Traits> & You", "vid123", 0, 90, "a < b && c > d");
        let text = render_card(&card);
        assert!(text.contains("<b>Rust &lt;Traits&gt; &amp; You</b>"));
        assert!(text.contains("<span class=\"tg-spoiler\">a &lt; b &amp;&amp; c &gt; d</span>"));
        assert!(text.contains("00:00 - 01:30"));
    }

    #[test]
    fn test_card_keyboard_shape() {
        let card = compose("A Lecture", "vid123", 0, 90, "summary");
        let keyboard = serde_json::to_value(card_keyboard(&card)).unwrap();
        assert_eq!(
            keyboard,
            json!({
                "inline_keyboard": [
                    [{"text": "▶️ Open the clip", "url": "https://youtu.be/vid123?t=0"}],
                    [
                        {"text": "⏭ Skip to the next clip", "callback_data": "skip"},
                        {"text": "⏹ Stop the session", "callback_data": "stop"},
                    ],
                ],
            })
        );
    }

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("/add https://x"), ("/add", "https://x"));
        assert_eq!(split_command("/status"), ("/status", ""));
        assert_eq!(split_command("/status@somebot"), ("/status", ""));
        assert_eq!(split_command("/setinterval   5m"), ("/setinterval", "5m"));
        assert_eq!(split_command("hello there"), ("hello", "there"));
    }

    #[test]
    fn test_looks_like_video_link() {
        assert!(looks_like_video_link("https://youtu.be/vid123"));
        assert!(looks_like_video_link(
            "check this https://www.youtube.com/watch?v=vid123"
        ));
        assert!(!looks_like_video_link("/add https://youtu.be/vid123"));
        assert!(!looks_like_video_link("hello"));
    }

    #[test]
    fn test_render_status_without_video() {
        let status = SessionStatus {
            title: None,
            video_id: None,
            remaining_sec: 0,
            interval_sec: 300,
            chunk_sec: 90,
            active: false,
        };
        assert!(render_status(&status).contains("/add"));
    }

    #[tokio::test]
    async fn test_get_updates_against_fixture_server() {
        let (client, _calls) = api_fixture().await;
        let updates = client.get_updates(0).await.unwrap();
        assert_eq!(updates.len(), 1);
        let update = &updates[0];
        assert_eq!(update.update_id, 7);
        let message = update.message.as_ref().unwrap();
        assert_eq!(message.chat.id, 42);
        assert_eq!(message.text.as_deref(), Some("/status"));
    }

    #[tokio::test]
    async fn test_status_command_replies_in_plain_text() {
        let (client, calls) = api_fixture().await;
        let (engine, _store, _rx) = test_engine(Sessions::new());
        let bot = Bot::new(client, engine);

        bot.handle_message(Message {
            message_id: 1,
            chat: Chat { id: UID },
            text: Some("/status".to_string()),
        })
        .await
        .unwrap();

        let bodies = sent_bodies(&calls, "sendMessage");
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["chat_id"], UID);
        assert!(bodies[0]["text"].as_str().unwrap().contains("/add"));
        assert!(bodies[0].get("parse_mode").is_none());
    }

    #[tokio::test]
    async fn test_setinterval_command_updates_the_session() {
        let (client, calls) = api_fixture().await;
        let (engine, store, _rx) = test_engine(Sessions::new());
        let bot = Bot::new(client, engine);

        bot.handle_message(Message {
            message_id: 1,
            chat: Chat { id: UID },
            text: Some("/setinterval 2m".to_string()),
        })
        .await
        .unwrap();

        let session = store.get(UID).await.unwrap();
        assert_eq!(session.interval_sec, 120);
        let bodies = sent_bodies(&calls, "sendMessage");
        assert!(bodies[0]["text"].as_str().unwrap().contains("02:00"));
    }

    #[tokio::test]
    async fn test_rejected_duration_is_reported() {
        let (client, calls) = api_fixture().await;
        let (engine, store, _rx) = test_engine(Sessions::new());
        let bot = Bot::new(client, engine);

        bot.handle_message(Message {
            message_id: 1,
            chat: Chat { id: UID },
            text: Some("/setinterval 5s".to_string()),
        })
        .await
        .unwrap();

        let session = store.get(UID).await.unwrap();
        assert_eq!(session.interval_sec, 300);
        let bodies = sent_bodies(&calls, "sendMessage");
        assert!(bodies[0]["text"].as_str().unwrap().contains("at least 30"));
    }

    #[tokio::test]
    async fn test_add_command_configures_the_video() {
        let (client, calls) = api_fixture().await;
        let (engine, store, _rx) = test_engine(Sessions::new());
        let bot = Bot::new(client, engine);

        bot.handle_message(Message {
            message_id: 1,
            chat: Chat { id: UID },
            text: Some("/add https://youtu.be/vid123".to_string()),
        })
        .await
        .unwrap();

        let session = store.get(UID).await.unwrap();
        assert_eq!(session.video_id.as_deref(), Some("vid123"));
        assert_eq!(session.duration_sec, 600);

        let bodies = sent_bodies(&calls, "sendMessage");
        assert_eq!(bodies[0]["parse_mode"], "HTML");
        assert_eq!(bodies[0]["link_preview_options"]["is_disabled"], true);
        let text = bodies[0]["text"].as_str().unwrap();
        assert!(text.contains("A Lecture"));
        assert!(text.contains("10:00"));
        assert!(text.contains("No transcript"));
    }

    /// A pasted link works without the /add prefix.
    #[tokio::test]
    async fn test_plain_link_is_treated_as_add() {
        let (client, _calls) = api_fixture().await;
        let (engine, store, _rx) = test_engine(Sessions::new());
        let bot = Bot::new(client, engine);

        bot.handle_message(Message {
            message_id: 1,
            chat: Chat { id: UID },
            text: Some("https://www.youtube.com/watch?v=vid123".to_string()),
        })
        .await
        .unwrap();

        let session = store.get(UID).await.unwrap();
        assert_eq!(session.video_id.as_deref(), Some("vid123"));
    }

    #[tokio::test]
    async fn test_unknown_text_is_ignored() {
        let (client, calls) = api_fixture().await;
        let (engine, _store, _rx) = test_engine(Sessions::new());
        let bot = Bot::new(client, engine);

        bot.handle_message(Message {
            message_id: 1,
            chat: Chat { id: UID },
            text: Some("hello".to_string()),
        })
        .await
        .unwrap();

        assert!(sent_bodies(&calls, "sendMessage").is_empty());
    }

    #[tokio::test]
    async fn test_callback_stop_halts_the_session() {
        let (client, calls) = api_fixture().await;
        let mut sessions = Sessions::new();
        let mut session = Session::new();
        session.video_id = Some("vid123".to_string());
        session.video_url = Some("https://youtu.be/vid123".to_string());
        session.duration_sec = 600;
        session.active = true;
        sessions.insert(UID, session);
        let (engine, store, _rx) = test_engine(sessions);
        let bot = Bot::new(client, engine);

        bot.handle_callback(CallbackQuery {
            id: "cb1".to_string(),
            from: User { id: UID },
            data: Some("stop".to_string()),
            message: Some(Message {
                message_id: 9,
                chat: Chat { id: UID },
                text: None,
            }),
        })
        .await
        .unwrap();

        assert!(!store.get(UID).await.unwrap().active);
        assert_eq!(
            methods(&calls),
            vec!["answerCallbackQuery", "editMessageReplyMarkup", "sendMessage"]
        );
        let edits = sent_bodies(&calls, "editMessageReplyMarkup");
        assert_eq!(edits[0]["chat_id"], UID);
        assert_eq!(edits[0]["message_id"], 9);
        assert_eq!(edits[0]["reply_markup"]["inline_keyboard"], json!([]));
        let replies = sent_bodies(&calls, "sendMessage");
        assert!(replies[0]["text"].as_str().unwrap().contains("stopped"));
    }

    #[tokio::test]
    async fn test_callback_skip_advances_the_session() {
        let (client, calls) = api_fixture().await;
        let mut sessions = Sessions::new();
        let mut session = Session::new();
        session.video_id = Some("vid123".to_string());
        session.video_url = Some("https://youtu.be/vid123".to_string());
        session.duration_sec = 600;
        session.active = true;
        sessions.insert(UID, session);
        let (engine, store, mut rx) = test_engine(sessions);
        let bot = Bot::new(client, engine);

        bot.handle_callback(CallbackQuery {
            id: "cb1".to_string(),
            from: User { id: UID },
            data: Some("skip".to_string()),
            message: None,
        })
        .await
        .unwrap();

        // The skipped-to card went out through the transport.
        match rx.recv().await.unwrap() {
            Delivery::Card { uid, card, .. } => {
                assert_eq!(uid, UID);
                assert_eq!(card.start_sec, 0);
            }
            other => panic!("expected a card, got {other:?}"),
        }
        assert_eq!(store.get(UID).await.unwrap().cursor_sec, 90);
        // The card is the confirmation; no extra chat reply.
        assert!(sent_bodies(&calls, "sendMessage").is_empty());
    }

    /// A skip tapped on a stale card of a stopped session says so instead
    /// of confirming a skip that did nothing.
    #[tokio::test]
    async fn test_callback_skip_on_stopped_session() {
        let (client, calls) = api_fixture().await;
        let mut sessions = Sessions::new();
        let mut session = Session::new();
        session.video_id = Some("vid123".to_string());
        session.video_url = Some("https://youtu.be/vid123".to_string());
        session.duration_sec = 600;
        sessions.insert(UID, session);
        let (engine, store, mut rx) = test_engine(sessions);
        let bot = Bot::new(client, engine);

        bot.handle_callback(CallbackQuery {
            id: "cb1".to_string(),
            from: User { id: UID },
            data: Some("skip".to_string()),
            message: None,
        })
        .await
        .unwrap();

        assert!(rx.try_recv().is_err());
        assert_eq!(store.get(UID).await.unwrap().cursor_sec, 0);
        let replies = sent_bodies(&calls, "sendMessage");
        assert_eq!(replies.len(), 1);
        assert!(replies[0]["text"].as_str().unwrap().contains("/startsession"));
    }
}
