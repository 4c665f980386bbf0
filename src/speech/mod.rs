//! Text-to-speech rendering of assistant replies.
//!
//! Text is cleaned of emoji, synthesized to MP3 and written to the audio
//! directory under a unique name. The HTTP layer serves that directory.

pub mod clean;
pub mod error;
pub mod google;

pub use clean::EmojiFilter;
pub use error::{SpeechError, SpeechResult};
pub use google::{GoogleTranslateTts, chunk_text};

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

/// Boxed future type for synthesis.
pub type SpeechFuture<'a> = Pin<Box<dyn Future<Output = SpeechResult<Vec<u8>>> + Send + 'a>>;

/// Converts text into MP3 bytes.
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text`.
    fn synthesize<'a>(&'a self, text: &'a str) -> SpeechFuture<'a>;
}

/// Cleans, synthesizes and stores audio files.
#[derive(Clone)]
pub struct SpeechRenderer {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    filter: EmojiFilter,
    audio_dir: PathBuf,
}

impl SpeechRenderer {
    /// Create a renderer, making sure the audio directory exists.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or the filter fails to compile.
    pub async fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        audio_dir: impl Into<PathBuf>,
    ) -> SpeechResult<Self> {
        let audio_dir = audio_dir.into();
        tokio::fs::create_dir_all(&audio_dir).await?;
        Ok(Self {
            synthesizer,
            filter: EmojiFilter::new()?,
            audio_dir,
        })
    }

    /// Render `text` to a new MP3 file and return its file name.
    ///
    /// # Errors
    /// Returns [`SpeechError::EmptyText`] if nothing remains after cleaning, or
    /// a provider/IO error.
    pub async fn render(&self, text: &str) -> SpeechResult<String> {
        let cleaned = self.filter.clean(text);
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return Err(SpeechError::EmptyText);
        }

        let audio = self.synthesizer.synthesize(cleaned).await?;
        let file_name = format!("{}.mp3", Uuid::new_v4().simple());
        tokio::fs::write(self.audio_dir.join(&file_name), &audio).await?;
        info!(bytes = audio.len(), "Rendered speech to {file_name}");
        Ok(file_name)
    }

    /// Directory holding rendered files.
    #[must_use]
    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingSynth {
        seen: Mutex<Vec<String>>,
    }

    impl SpeechSynthesizer for RecordingSynth {
        fn synthesize<'a>(&'a self, text: &'a str) -> SpeechFuture<'a> {
            self.seen.lock().unwrap().push(text.to_string());
            Box::pin(async { Ok(b"ID3fake".to_vec()) })
        }
    }

    #[tokio::test]
    async fn test_render_writes_unique_files() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Arc::new(RecordingSynth::default());
        let audio_dir = dir.path().join("audio");
        let renderer = SpeechRenderer::new(synth.clone(), &audio_dir).await.unwrap();

        let first = renderer.render("Hola 😀 mundo").await.unwrap();
        let second = renderer.render("Hola 😀 mundo").await.unwrap();
        assert_ne!(first, second);
        assert!(first.ends_with(".mp3"));

        let bytes = std::fs::read(audio_dir.join(&first)).unwrap();
        assert_eq!(bytes, b"ID3fake");
        assert_eq!(synth.seen.lock().unwrap()[0], "Hola  mundo");
    }

    #[tokio::test]
    async fn test_render_rejects_emoji_only_text() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Arc::new(RecordingSynth::default());
        let renderer = SpeechRenderer::new(synth.clone(), dir.path()).await.unwrap();

        assert!(matches!(
            renderer.render(" 🤖🚀 ").await,
            Err(SpeechError::EmptyText)
        ));
        assert!(synth.seen.lock().unwrap().is_empty());
    }
}
