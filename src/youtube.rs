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

//! The YouTube side: link parsing, the Data API metadata lookup, and the
//! caption-track transcript fetch.

use async_trait::async_trait;
use clipcards_core::TranscriptSegment;
use serde::Deserialize;
use url::Url;

use crate::error::Fallible;
use crate::error::fail;
use crate::providers::TranscriptProvider;
use crate::providers::VideoMeta;
use crate::providers::VideoMetadataProvider;

/// Pull a video id out of a pasted link.
///
/// Accepts `youtu.be/<id>`, `youtube.com/watch?v=<id>`, and the `shorts`,
/// `live`, and `embed` path forms, with or without a leading `www.` or
/// `m.` host label. Anything else is `None`.
pub fn extract_video_id(input: &str) -> Option<String> {
    let url = Url::parse(input.trim()).ok()?;
    let host = url.host_str()?;
    if host == "youtu.be" {
        let id = url.path_segments()?.next()?;
        return nonempty(id);
    }
    if host == "youtube.com" || host.ends_with(".youtube.com") {
        if url.path() == "/watch" {
            let (_, id) = url.query_pairs().find(|(k, _)| k == "v")?;
            return nonempty(&id);
        }
        let mut segments = url.path_segments()?;
        if let (Some(kind), Some(id)) = (segments.next(), segments.next()) {
            if matches!(kind, "shorts" | "live" | "embed") {
                return nonempty(id);
            }
        }
    }
    None
}

fn nonempty(id: &str) -> Option<String> {
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Decode a Data API `PT#H#M#S` duration. Anything unrecognized reads as
/// zero seconds, which downstream treats as an unusable video.
pub fn iso8601_to_seconds(duration: &str) -> u32 {
    let Some(mut rest) = duration.strip_prefix("PT") else {
        return 0;
    };
    let mut total: u64 = 0;
    for (unit, secs) in [(b'H', 3600u64), (b'M', 60), (b'S', 1)] {
        let digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            continue;
        }
        if rest.as_bytes().get(digits) == Some(&unit) {
            if let Ok(value) = rest[..digits].parse::<u64>() {
                total += value * secs;
                rest = &rest[digits + 1..];
            }
        }
    }
    u32::try_from(total).unwrap_or(u32::MAX)
}

#[derive(Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    snippet: VideoSnippet,
    content_details: ContentDetails,
}

#[derive(Deserialize)]
struct VideoSnippet {
    title: String,
}

#[derive(Deserialize)]
struct ContentDetails {
    duration: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionTrack {
    base_url: String,
    language_code: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    is_translatable: bool,
}

impl CaptionTrack {
    /// Auto-generated tracks carry `"kind": "asr"`.
    fn is_asr(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }

    fn matches(&self, lang: &str) -> bool {
        self.language_code == lang || self.language_code.starts_with(&format!("{lang}-"))
    }
}

/// Find the `captionTracks` array in a watch-page document.
///
/// The page embeds player data as one enormous JSON object; rather than
/// parse all of it, scan for the key and bracket-match its array, skipping
/// over string contents.
fn extract_caption_tracks(html: &str) -> Option<Vec<CaptionTrack>> {
    let key = "\"captionTracks\":";
    let start = html.find(key)? + key.len();
    let rest = html[start..].trim_start();
    if !rest.starts_with('[') {
        return None;
    }
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in rest.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return serde_json::from_str(&rest[..=i]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

/// First track matching the language preference order, with manually
/// created tracks beating auto-generated ones within a language.
fn pick_track<'a>(tracks: &'a [CaptionTrack], languages: &[String]) -> Option<&'a CaptionTrack> {
    for lang in languages {
        if let Some(track) = tracks.iter().find(|t| t.matches(lang) && !t.is_asr()) {
            return Some(track);
        }
        if let Some(track) = tracks.iter().find(|t| t.matches(lang)) {
            return Some(track);
        }
    }
    None
}

/// The track to fetch and the language to translate it into, if any.
///
/// A track in one of the preferred languages is fetched as-is. Failing
/// that, the first translatable track is fetched translated into the most
/// preferred language, so a video captioned only in another language still
/// yields summaries.
fn choose_track<'a>(
    tracks: &'a [CaptionTrack],
    languages: &'a [String],
) -> Option<(&'a CaptionTrack, Option<&'a str>)> {
    if let Some(track) = pick_track(tracks, languages) {
        return Some((track, None));
    }
    let track = tracks.iter().find(|t| t.is_translatable)?;
    let lang = languages.first()?;
    Some((track, Some(lang.as_str())))
}

#[derive(Deserialize)]
struct Json3Response {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Json3Event {
    #[serde(default)]
    t_start_ms: u64,
    #[serde(default)]
    d_duration_ms: u64,
    #[serde(default)]
    segs: Vec<Json3Seg>,
}

#[derive(Deserialize)]
struct Json3Seg {
    #[serde(default)]
    utf8: String,
}

fn segments_from_json3(response: Json3Response) -> Vec<TranscriptSegment> {
    let mut segments = Vec::new();
    for event in response.events {
        let text: String = event.segs.iter().map(|s| s.utf8.as_str()).collect();
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        segments.push(TranscriptSegment::new(
            event.t_start_ms as f64 / 1000.0,
            event.d_duration_ms as f64 / 1000.0,
            text,
        ));
    }
    segments
}

/// Client for both provider seams, backed by the Data API for metadata and
/// the watch-page caption tracks for transcripts.
pub struct YouTubeClient {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
    watch_base: String,
}

impl YouTubeClient {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>) -> Self {
        YouTubeClient {
            http,
            api_key: api_key.into(),
            api_base: "https://www.googleapis.com/youtube/v3".to_string(),
            watch_base: "https://www.youtube.com".to_string(),
        }
    }
}

#[async_trait]
impl VideoMetadataProvider for YouTubeClient {
    async fn resolve(&self, video_id: &str) -> Fallible<Option<VideoMeta>> {
        let url = format!("{}/videos", self.api_base);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("id", video_id),
                ("part", "snippet,contentDetails"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return fail(format!(
                "metadata lookup failed with HTTP {}",
                response.status()
            ));
        }
        let body: VideoListResponse = response.json().await?;
        let Some(item) = body.items.into_iter().next() else {
            return Ok(None);
        };
        Ok(Some(VideoMeta {
            title: item.snippet.title,
            duration_sec: iso8601_to_seconds(&item.content_details.duration),
        }))
    }
}

#[async_trait]
impl TranscriptProvider for YouTubeClient {
    async fn fetch(
        &self,
        video_id: &str,
        languages: &[String],
    ) -> Fallible<Option<Vec<TranscriptSegment>>> {
        let url = format!("{}/watch", self.watch_base);
        let response = self.http.get(&url).query(&[("v", video_id)]).send().await?;
        if !response.status().is_success() {
            log::debug!(
                "watch page for {video_id} returned HTTP {}",
                response.status()
            );
            return Ok(None);
        }
        let html = response.text().await?;
        let Some(tracks) = extract_caption_tracks(&html) else {
            return Ok(None);
        };
        let Some((track, tlang)) = choose_track(&tracks, languages) else {
            log::debug!(
                "no caption track for {video_id} matches {languages:?} (of {})",
                tracks.len()
            );
            return Ok(None);
        };
        let mut track_url = format!("{}&fmt=json3", track.base_url);
        if let Some(lang) = tlang {
            log::debug!("translating {} captions for {video_id} into {lang}", track.language_code);
            track_url.push_str(&format!("&tlang={lang}"));
        }
        let response = self.http.get(&track_url).send().await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let body: Json3Response = response.json().await?;
        let segments = segments_from_json3(body);
        if segments.is_empty() {
            return Ok(None);
        }
        Ok(Some(segments))
    }
}
