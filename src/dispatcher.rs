//! Parallel per-block translation.
//!
//! Every text block is handled by its own task on a bounded pool: detect the
//! language, drop the block unless it matches the source language, translate
//! it, and drop it on any failure. Results keep frame-local rectangles; the
//! isolation boundary moves them to screen space once per cycle.

use crate::translator::{LanguageDetector, TranslationEngine};
use crate::types::{TextBlock, TranslatedBlock, TranslationError};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// What happened to one block
#[derive(Debug)]
pub enum BlockOutcome {
    Translated(TranslatedBlock),
    /// Detector could not decide
    Ambiguous,
    /// Detected language differs from the source language
    LanguageMismatch { detected: String },
    /// Translation engine failed or returned nothing
    Failed(TranslationError),
}

/// Per-cycle counts of block outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub total: usize,
    pub translated: usize,
    pub ambiguous: usize,
    pub mismatched: usize,
    pub failed: usize,
    /// Worker tasks that panicked
    pub crashed: usize,
}

/// Fans text blocks out to a fixed-size worker pool
#[derive(Clone)]
pub struct TranslationDispatcher {
    detector: Arc<dyn LanguageDetector>,
    translator: Arc<dyn TranslationEngine>,
    source_language: String,
    target_language: String,
    workers: usize,
}

impl TranslationDispatcher {
    pub fn new(
        detector: Arc<dyn LanguageDetector>,
        translator: Arc<dyn TranslationEngine>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
        workers: usize,
    ) -> Self {
        Self {
            detector,
            translator,
            source_language: source_language.into(),
            target_language: target_language.into(),
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Translate every block whose language matches the source language
    ///
    /// Output order follows completion order, not input order.
    pub async fn dispatch(&self, blocks: Vec<TextBlock>) -> Vec<TranslatedBlock> {
        self.dispatch_with_summary(blocks).await.0
    }

    pub async fn dispatch_with_summary(&self, blocks: Vec<TextBlock>) -> (Vec<TranslatedBlock>, DispatchSummary) {
        let mut summary = DispatchSummary {
            total: blocks.len(),
            ..Default::default()
        };
        if blocks.is_empty() {
            return (Vec::new(), summary);
        }

        info!(
            "Found {} blocks, translating with {} workers...",
            blocks.len(),
            self.workers
        );

        let permits = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        for block in blocks {
            let permits = permits.clone();
            let detector = self.detector.clone();
            let translator = self.translator.clone();
            let source = self.source_language.clone();
            let target = self.target_language.clone();

            tasks.spawn(async move {
                // The semaphore is never closed while tasks are alive.
                let _permit = permits.acquire_owned().await.ok();
                translate_block(block, detector.as_ref(), translator.as_ref(), &source, &target).await
            });
        }

        let mut translated = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(BlockOutcome::Translated(block)) => {
                    summary.translated += 1;
                    translated.push(block);
                }
                Ok(BlockOutcome::Ambiguous) => summary.ambiguous += 1,
                Ok(BlockOutcome::LanguageMismatch { .. }) => summary.mismatched += 1,
                Ok(BlockOutcome::Failed(_)) => summary.failed += 1,
                Err(e) => {
                    warn!("Translation worker crashed: {}", e);
                    summary.crashed += 1;
                }
            }
        }

        debug!("Dispatch summary: {:?}", summary);
        (translated, summary)
    }
}

/// Detect, filter and translate a single block
pub async fn translate_block(
    mut block: TextBlock,
    detector: &dyn LanguageDetector,
    translator: &dyn TranslationEngine,
    source: &str,
    target: &str,
) -> BlockOutcome {
    let detected = match detector.detect(&block.text) {
        Some(lang) => lang,
        None => {
            debug!("   - Skipping ambiguous block: '{}'", preview(&block.text));
            return BlockOutcome::Ambiguous;
        }
    };
    block.detected_language = Some(detected.clone());

    if detected != source {
        debug!(
            "   - Skipping block: '{}' (detected: {}, needed: {})",
            preview(&block.text),
            detected,
            source
        );
        return BlockOutcome::LanguageMismatch { detected };
    }

    match translator.translate(&block.text, source, target).await {
        Ok(text) if !text.trim().is_empty() => {
            debug!("   + Translating '{}' (detected: {})", preview(&block.text), detected);
            BlockOutcome::Translated(TranslatedBlock {
                text,
                rect: block.rect,
            })
        }
        Ok(_) => BlockOutcome::Failed(TranslationError::Empty),
        Err(e) => {
            debug!("   - Translation failed for '{}': {}", preview(&block.text), e);
            BlockOutcome::Failed(e)
        }
    }
}

fn preview(text: &str) -> String {
    let mut short: String = text.chars().take(20).collect();
    if short.len() < text.len() {
        short.push_str("...");
    }
    short
}
