//! Synthesis through the public Google Translate speech endpoint (the one gTTS uses).

use std::time::Duration;

use reqwest::Client;

use crate::config::SpeechConfig;
use crate::speech::error::{SpeechError, SpeechResult};
use crate::speech::{SpeechFuture, SpeechSynthesizer};

/// Longest text the endpoint accepts per request.
pub const MAX_CHUNK_CHARS: usize = 100;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Split `text` into whitespace-aligned chunks of at most `max_chars` characters.
///
/// Words longer than `max_chars` are cut.
#[must_use]
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0_usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            chunks.extend(chars.chunks(max_chars).map(|piece| piece.iter().collect::<String>()));
            continue;
        }

        let needed = if current.is_empty() {
            word_len
        } else {
            current_len + 1 + word_len
        };
        if needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current.push_str(word);
            current_len = word_len;
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            current_len = needed;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// MP3 synthesizer backed by `translate_tts`.
pub struct GoogleTranslateTts {
    client: Client,
    endpoint: String,
    lang: String,
}

impl GoogleTranslateTts {
    /// Create a synthesizer from configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &SpeechConfig) -> SpeechResult<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(CLIENT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint(),
            lang: config.lang.clone(),
        })
    }

    async fn fetch_all(&self, text: &str) -> SpeechResult<Vec<u8>> {
        let chunks = chunk_text(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(SpeechError::EmptyText);
        }

        let total = chunks.len().to_string();
        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let query = [
                ("ie", "UTF-8".to_string()),
                ("q", chunk.clone()),
                ("tl", self.lang.clone()),
                ("client", "tw-ob".to_string()),
                ("total", total.clone()),
                ("idx", idx.to_string()),
                ("textlen", chunk.chars().count().to_string()),
            ];
            let response = self.client.get(&self.endpoint).query(&query).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(SpeechError::HttpStatusNotOk(status.as_u16()));
            }
            audio.extend_from_slice(&response.bytes().await?);
        }

        tracing::debug!(chunks = chunks.len(), bytes = audio.len(), "Synthesized speech");
        Ok(audio)
    }
}

impl SpeechSynthesizer for GoogleTranslateTts {
    fn synthesize<'a>(&'a self, text: &'a str) -> SpeechFuture<'a> {
        Box::pin(self.fetch_all(text))
    }
}
