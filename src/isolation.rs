//! Isolated execution of the heavy part of a cycle.
//!
//! Recognition and translation run on their own task, away from the
//! orchestrator's control path. The result comes back over a oneshot
//! channel; the orchestrator can abort the task at any time. A cancelled,
//! panicked or failed run is indistinguishable from one that produced
//! nothing.

use crate::dispatcher::TranslationDispatcher;
use crate::extractors::TextBlockExtractor;
use crate::types::{CaptureFrame, RecognitionError, TranslatedBlock};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Extraction followed by dispatch, with the final move to screen space
#[derive(Clone)]
pub struct CyclePipeline {
    extractor: TextBlockExtractor,
    dispatcher: TranslationDispatcher,
    /// Language hint for the recognition engine
    ocr_language: String,
}

impl CyclePipeline {
    pub fn new(extractor: TextBlockExtractor, dispatcher: TranslationDispatcher, ocr_language: impl Into<String>) -> Self {
        Self {
            extractor,
            dispatcher,
            ocr_language: ocr_language.into(),
        }
    }

    /// Run one cycle's heavy work for `frame`
    ///
    /// Returned rectangles are absolute screen coordinates.
    pub async fn run(&self, frame: &CaptureFrame) -> Result<Vec<TranslatedBlock>, RecognitionError> {
        debug!("[cycle] Running OCR...");
        let blocks = self.extractor.extract(&frame.image, &self.ocr_language).await?;

        let translated = self.dispatcher.dispatch(blocks).await;

        let origin = frame.origin();
        let translated: Vec<_> = translated
            .into_iter()
            .map(|block| block.into_screen_space(origin))
            .collect();

        info!("[cycle] Done. {} blocks translated.", translated.len());
        Ok(translated)
    }
}

/// Handle to one in-flight isolated execution
pub struct CycleHandle {
    task: JoinHandle<()>,
    result_rx: oneshot::Receiver<Vec<TranslatedBlock>>,
}

impl CycleHandle {
    /// Start `pipeline` on `frame` in a separate task
    pub fn spawn(pipeline: Arc<CyclePipeline>, frame: Arc<CaptureFrame>) -> Self {
        let (result_tx, result_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            match pipeline.run(&frame).await {
                Ok(blocks) => {
                    // The receiver is gone only if the orchestrator gave up on us.
                    let _ = result_tx.send(blocks);
                }
                Err(e) => warn!("[cycle] Recognition failed: {}", e),
            }
        });

        Self { task, result_rx }
    }

    /// Whether the execution is still running
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Abort the execution immediately
    ///
    /// Safe to call when it already finished.
    pub fn terminate(&self) {
        self.task.abort();
    }

    /// Wait for the result
    ///
    /// Cancel safe: dropping this future leaves the handle usable. Must not
    /// be awaited again after it returned.
    pub async fn wait(&mut self) -> Option<Vec<TranslatedBlock>> {
        (&mut self.result_rx).await.ok()
    }

    /// Wait for the task to exit after `terminate` or completion
    pub async fn reap(self) {
        match self.task.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => debug!("[cycle] Execution terminated"),
            Err(e) => warn!("[cycle] Execution ended abnormally: {}", e),
        }
    }

    /// Terminate and reap in one step
    pub async fn shutdown(self) {
        self.terminate();
        self.reap().await;
    }
}
