//! Language detection and machine translation collaborators.
//!
//! The dispatcher only sees the [`LanguageDetector`] and [`TranslationEngine`]
//! traits. [`WhatlangDetector`] and [`GoogleTranslator`] are the
//! implementations wired up by the binary.

use crate::languages;
use crate::types::TranslationError;
use std::time::Duration;
use tracing::trace;

/// Detects the natural language of a piece of text
pub trait LanguageDetector: Send + Sync {
    /// Language code comparable with the configured source language, or
    /// `None` when detection is ambiguous
    fn detect(&self, text: &str) -> Option<String>;
}

/// Translates text between two languages
#[async_trait::async_trait]
pub trait TranslationEngine: Send + Sync {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, TranslationError>;
}

/// Texts in a shared script with fewer letters than this are ambiguous
const MIN_LETTERS: usize = 4;

/// Trigram/script based detector
///
/// Candidates are limited to the catalogue languages plus English, so
/// background UI text is attributed to one of the languages the pipeline
/// knows how to compare. The top candidate is accepted when its confidence
/// reaches `min_confidence`. Very short Latin or Cyrillic strings carry too
/// few features and are reported as ambiguous.
#[derive(Debug, Clone)]
pub struct WhatlangDetector {
    detector: whatlang::Detector,
    min_confidence: f64,
}

impl WhatlangDetector {
    pub fn new(min_confidence: f64) -> Self {
        let allowlist: Vec<whatlang::Lang> = languages::LANGUAGES
            .iter()
            .filter_map(|l| whatlang::Lang::from_code(l.detect_code))
            .chain(std::iter::once(whatlang::Lang::Eng))
            .collect();

        Self {
            detector: whatlang::Detector::with_allowlist(allowlist),
            min_confidence,
        }
    }

    /// Decide whether a raw detection result is usable
    fn accept(&self, info: &whatlang::Info, text: &str) -> Option<String> {
        let shared_script = matches!(
            info.script(),
            whatlang::Script::Latin | whatlang::Script::Cyrillic
        );
        if shared_script && text.chars().filter(|c| c.is_alphabetic()).count() < MIN_LETTERS {
            trace!("Too short to detect: {:?}", text);
            return None;
        }

        if info.confidence() < self.min_confidence {
            trace!(
                "Low confidence detection {:?} ({:.2}) for {:?}",
                info.lang(),
                info.confidence(),
                text
            );
            return None;
        }

        let iso639_3 = info.lang().code();
        Some(
            languages::by_detect_code(iso639_3)
                .map(|l| l.code.to_string())
                .unwrap_or_else(|| iso639_3.to_string()),
        )
    }
}

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Option<String> {
        let info = self.detector.detect(text)?;
        self.accept(&info, text)
    }
}

/// Client for the public Google Translate `gtx` endpoint
pub struct GoogleTranslator {
    client: reqwest::Client,
    endpoint: String,
}

impl GoogleTranslator {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TranslationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait::async_trait]
impl TranslationEngine for GoogleTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, TranslationError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", source),
                ("tl", target),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranslationError::Status(status.as_u16()));
        }

        let body: serde_json::Value = response.json().await?;
        parse_gtx_response(&body)
    }
}

/// Join the translated segments of a `gtx` response
///
/// The payload is a nested array whose first element lists
/// `[translated, original, ...]` segments.
pub fn parse_gtx_response(body: &serde_json::Value) -> Result<String, TranslationError> {
    let segments = body
        .get(0)
        .and_then(|v| v.as_array())
        .ok_or_else(|| TranslationError::Malformed(truncate(&body.to_string(), 200)))?;

    let translated: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(|t| t.as_str()))
        .collect();

    if translated.trim().is_empty() {
        return Err(TranslationError::Empty);
    }

    Ok(translated)
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
