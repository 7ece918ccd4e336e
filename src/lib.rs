//! Screen Translator - live translation of a screen region
//!
//! This crate watches a region of the screen and republishes the foreign
//! language text it finds there, translated and positioned for an overlay:
//!
//! - **Change detection**: luminance diff between consecutive frames
//! - **Extraction**: OCR word records merged into line-level text blocks
//! - **Dispatch**: per-block language filtering and parallel translation
//! - **Isolation**: heavy work runs in a task that can be aborted at any time
//!
//! # Architecture
//!
//! A single [`CycleOrchestrator`] polls the capture source, runs a cycle
//! whenever the frame changed (or a retranslation was forced), and publishes
//! [`OverlayEvent`]s. It is controlled through a [`ControlHandle`].

pub mod capture;
pub mod change_detector;
pub mod config;
pub mod dispatcher;
pub mod extractors;
pub mod isolation;
pub mod languages;
pub mod orchestrator;
pub mod translator;
pub mod types;

// Re-export commonly used types
pub use capture::{CaptureSource, ImageFileCapture, RegionCapture};
pub use change_detector::{diff_percentage, ChangeDecision, ChangeDetector};
pub use config::{Config, CycleSettings};
pub use dispatcher::{DispatchSummary, TranslationDispatcher};
pub use extractors::{ocr::TesseractEngine, RecognitionEngine, TextBlockExtractor};
pub use isolation::{CycleHandle, CyclePipeline};
pub use languages::{Language, LANGUAGES};
pub use orchestrator::{ControlHandle, CycleOrchestrator, OrchestratorStatus, Phase, TickOutcome};
pub use translator::{GoogleTranslator, LanguageDetector, TranslationEngine, WhatlangDetector};
pub use types::{
    CaptureFrame, ConfigError, CycleError, CycleSignal, LineKey, OverlayEvent, RecognitionError,
    ScreenRect, TextBlock, TranslatedBlock, TranslationError, WordRecord,
};
