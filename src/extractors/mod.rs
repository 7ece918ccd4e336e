//! Text extraction from captured frames.
//!
//! A [`RecognitionEngine`] reports raw word records. [`TextBlockExtractor`]
//! filters them by confidence and merges the survivors into line-level
//! [`TextBlock`]s keyed by the engine's (block, paragraph, line) numbering.

pub mod ocr;

use crate::types::{LineKey, RecognitionError, TextBlock, WordRecord};
use image::DynamicImage;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Trait for recognition engines
#[async_trait::async_trait]
pub trait RecognitionEngine: Send + Sync {
    /// Recognize words in `image` using the engine's `language` hint
    async fn recognize(
        &self,
        image: &DynamicImage,
        language: &str,
    ) -> Result<Vec<WordRecord>, RecognitionError>;

    /// Check if the engine can be used
    fn is_available(&self) -> bool {
        true
    }
}

/// Runs a recognition engine and consolidates its words into lines
#[derive(Clone)]
pub struct TextBlockExtractor {
    engine: Arc<dyn RecognitionEngine>,
    /// Words at or below this confidence are discarded
    min_confidence: f32,
}

impl TextBlockExtractor {
    pub fn new(engine: Arc<dyn RecognitionEngine>, min_confidence: f32) -> Self {
        Self {
            engine,
            min_confidence,
        }
    }

    /// Extract line-level text blocks from a frame
    pub async fn extract(
        &self,
        image: &DynamicImage,
        language: &str,
    ) -> Result<Vec<TextBlock>, RecognitionError> {
        let words = self.engine.recognize(image, language).await?;
        let word_count = words.len();
        let blocks = merge_words(words, self.min_confidence);
        debug!("Merged {} word records into {} blocks", word_count, blocks.len());
        Ok(blocks)
    }

    pub fn engine(&self) -> &Arc<dyn RecognitionEngine> {
        &self.engine
    }
}

/// Group words by line key, in the order each key first appears
///
/// Text inside a line is concatenated in engine order with no separator and
/// the line rectangle is the union of its word rectangles.
pub fn merge_words(words: Vec<WordRecord>, min_confidence: f32) -> Vec<TextBlock> {
    let mut index: HashMap<LineKey, usize> = HashMap::new();
    let mut lines: Vec<TextBlock> = Vec::new();

    for word in words {
        if word.confidence <= min_confidence {
            continue;
        }
        let text = word.text.trim();
        if text.is_empty() {
            continue;
        }

        match index.get(&word.key) {
            Some(&i) => {
                let line = &mut lines[i];
                line.text.push_str(text);
                line.rect = line.rect.union(&word.rect);
            }
            None => {
                index.insert(word.key, lines.len());
                lines.push(TextBlock::new(text, word.rect));
            }
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScreenRect;

    fn word(text: &str, confidence: f32, rect: (i32, i32, u32, u32), key: (u32, u32, u32)) -> WordRecord {
        WordRecord {
            text: text.to_string(),
            confidence,
            rect: ScreenRect::new(rect.0, rect.1, rect.2, rect.3),
            key: LineKey::new(key.0, key.1, key.2),
        }
    }

    #[test]
    fn test_merge_concatenates_line_words() {
        let words = vec![
            word("今日", 90.0, (10, 10, 20, 12), (1, 1, 1)),
            word("は", 80.0, (32, 9, 10, 14), (1, 1, 1)),
            word("晴れ", 95.0, (44, 11, 20, 12), (1, 1, 1)),
        ];
        let blocks = merge_words(words, 50.0);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "今日は晴れ");
        assert_eq!(blocks[0].rect, ScreenRect::from_edges(10, 9, 64, 23));
        assert!(blocks[0].detected_language.is_none());
    }

    #[test]
    fn test_merge_drops_low_confidence_and_blank_words() {
        let words = vec![
            word("keep", 51.0, (0, 0, 10, 10), (1, 1, 1)),
            word("edge", 50.0, (100, 0, 10, 10), (1, 1, 1)),
            word("   ", 99.0, (200, 0, 10, 10), (1, 1, 1)),
            word("", -1.0, (0, 0, 300, 300), (1, 1, 0)),
            word("noise", 10.0, (0, 50, 10, 10), (1, 1, 2)),
        ];
        let blocks = merge_words(words, 50.0);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "keep");
        assert_eq!(blocks[0].rect, ScreenRect::new(0, 0, 10, 10));
    }

    #[test]
    fn test_merge_trims_word_text() {
        let blocks = merge_words(vec![word("  ab ", 90.0, (0, 0, 5, 5), (1, 1, 1))], 50.0);
        assert_eq!(blocks[0].text, "ab");
    }

    #[test]
    fn test_merge_preserves_first_seen_order_and_unique_keys() {
        let words = vec![
            word("b1", 90.0, (0, 20, 10, 10), (2, 1, 1)),
            word("a1", 90.0, (0, 0, 10, 10), (1, 1, 1)),
            word("b2", 90.0, (12, 20, 10, 10), (2, 1, 1)),
            word("c1", 90.0, (0, 40, 10, 10), (1, 2, 1)),
            word("a2", 90.0, (12, 0, 10, 10), (1, 1, 1)),
        ];
        let blocks = merge_words(words, 50.0);
        let texts: Vec<_> = blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["b1b2", "a1a2", "c1"]);
        assert!(blocks.iter().all(|b| !b.text.is_empty()));
    }

    #[test]
    fn test_merge_empty_input() {
        assert!(merge_words(Vec::new(), 50.0).is_empty());
    }

    struct FixedEngine(Vec<WordRecord>);

    #[async_trait::async_trait]
    impl RecognitionEngine for FixedEngine {
        async fn recognize(
            &self,
            _image: &DynamicImage,
            language: &str,
        ) -> Result<Vec<WordRecord>, RecognitionError> {
            assert_eq!(language, "jpn");
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_extractor_runs_engine_and_merges() {
        let engine = Arc::new(FixedEngine(vec![
            word("こん", 70.0, (0, 0, 10, 10), (1, 1, 1)),
            word("にちは", 70.0, (10, 0, 20, 10), (1, 1, 1)),
        ]));
        let extractor = TextBlockExtractor::new(engine, 50.0);
        assert!(extractor.engine().is_available());
        let image = DynamicImage::new_rgb8(50, 20);
        let blocks = extractor.extract(&image, "jpn").await.unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "こんにちは");
        assert_eq!(blocks[0].rect, ScreenRect::new(0, 0, 30, 10));
    }
}
