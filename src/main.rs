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

//! clipcards: a Telegram bot that chops a YouTube video into timed windows
//! and quizzes you through them, one flashcard at a time.

mod cli;
mod config;
mod engine;
mod error;
mod persist;
mod providers;
mod scheduler;
mod store;
mod telegram;
mod transport;
mod youtube;

use std::process::exit;

use crate::cli::entrypoint;

#[tokio::main]
async fn main() {
    // A missing .env file is fine; secrets may come from the real
    // environment or the config file.
    let _ = dotenvy::dotenv();
    env_logger::init();
    if let Err(e) = entrypoint().await {
        eprintln!("{e}");
        exit(1);
    }
}
