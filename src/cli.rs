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

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use clipcards_core::format_timecode;
use tokio::select;
use tokio::signal;

use crate::config::Config;
use crate::config::DEFAULT_CONFIG_PATH;
use crate::engine::Engine;
use crate::error::Fallible;
use crate::persist::JsonStore;
use crate::persist::PersistenceStore;
use crate::providers::TranscriptProvider;
use crate::scheduler::SessionScheduler;
use crate::store::SessionStore;
use crate::telegram::Bot;
use crate::telegram::TelegramClient;
use crate::telegram::TelegramTransport;
use crate::youtube::YouTubeClient;

#[derive(Parser)]
#[command(version, about, long_about = None)]
enum Command {
    /// Run the bot.
    Run {
        /// Path to the configuration file.
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Print a summary of every stored session.
    Sessions {
        /// Path to the configuration file.
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

pub async fn entrypoint() -> Fallible<()> {
    let cli: Command = Command::parse();
    match cli {
        Command::Run { config } => {
            let config = Config::load(&config)?;
            run_bot(config).await
        }
        Command::Sessions { config } => {
            let config = Config::load(&config)?;
            print_sessions(config)
        }
    }
}

async fn run_bot(config: Config) -> Fallible<()> {
    let token = config.telegram_token()?;
    let api_key = config.youtube_api_key()?;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(20))
        .build()?;

    let store = Arc::new(SessionStore::open(Box::new(JsonStore::new(
        &config.storage.db_path,
    )))?);
    let youtube = Arc::new(YouTubeClient::new(http.clone(), api_key));
    let client = Arc::new(TelegramClient::new(http, token));
    let transport = Arc::new(TelegramTransport::new(client.clone()));
    let scheduler = SessionScheduler::new(store.clone(), transport, config.cards.summary_max_chars);
    let transcripts: Option<Arc<dyn TranscriptProvider>> = if config.youtube.transcripts_enabled {
        Some(youtube.clone())
    } else {
        log::info!("transcript fetching is disabled; cards will use the fallback prompt");
        None
    };
    let engine = Arc::new(Engine::new(
        store,
        scheduler,
        youtube,
        transcripts,
        config.youtube.languages.clone(),
    ));

    let resumed = engine.resume().await;
    if resumed > 0 {
        log::info!("resumed {resumed} active session(s)");
    }

    let bot = Bot::new(client, engine.clone());
    select! {
        _ = bot.run() => {}
        _ = shutdown_signal() => {
            log::info!("shutting down");
        }
    }
    engine.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    log::debug!("Received Ctrl+C, shutting down gracefully");
}

/// Offline inspection of the session database: one line per user.
fn print_sessions(config: Config) -> Fallible<()> {
    let store = JsonStore::new(&config.storage.db_path);
    let sessions = store.load_all()?;
    if sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }
    for (uid, session) in &sessions {
        let title = session.title.as_deref().unwrap_or("(no video)");
        let state = if session.active { "active" } else { "stopped" };
        println!(
            "{uid}: {title} [{} / {}] interval={} chunk={} {state}",
            format_timecode(session.cursor_sec),
            format_timecode(session.duration_sec),
            format_timecode(session.interval_sec),
            format_timecode(session.chunk_sec),
        );
    }
    Ok(())
}
