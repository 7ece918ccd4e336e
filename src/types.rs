//! Core types used throughout the screen translator.
//!
//! This module defines the frame, text block and translation data structures
//! that flow through one cycle, the control signals accepted by the
//! orchestrator, and the error enums of each stage.

use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Rectangle on screen or inside a frame (x, y, width, height)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScreenRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ScreenRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Build a rectangle from its edges. Inverted edges give an empty rectangle.
    pub fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            x: left,
            y: top,
            width: right.saturating_sub(left).max(0) as u32,
            height: bottom.saturating_sub(top).max(0) as u32,
        }
    }

    pub fn right(&self) -> i32 {
        self.x
            .saturating_add(i32::try_from(self.width).unwrap_or(i32::MAX))
    }

    pub fn bottom(&self) -> i32 {
        self.y
            .saturating_add(i32::try_from(self.height).unwrap_or(i32::MAX))
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &ScreenRect) -> ScreenRect {
        ScreenRect::from_edges(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    /// Same rectangle moved by (dx, dy)
    pub fn offset(&self, dx: i32, dy: i32) -> ScreenRect {
        ScreenRect {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
            ..*self
        }
    }
}

/// One captured image of the monitored region
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    /// Captured pixels
    pub image: DynamicImage,
    /// Absolute screen rectangle the image was taken from
    pub bounds: ScreenRect,
    /// Capture timestamp
    pub captured_at: DateTime<Utc>,
}

impl CaptureFrame {
    pub fn new(image: DynamicImage, bounds: ScreenRect) -> Self {
        Self {
            image,
            bounds,
            captured_at: Utc::now(),
        }
    }

    /// Absolute screen origin of the frame's top-left pixel
    pub fn origin(&self) -> (i32, i32) {
        (self.bounds.x, self.bounds.y)
    }
}

/// Recognition grouping key: (block, paragraph, line) as numbered by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineKey {
    pub block: u32,
    pub paragraph: u32,
    pub line: u32,
}

impl LineKey {
    pub fn new(block: u32, paragraph: u32, line: u32) -> Self {
        Self {
            block,
            paragraph,
            line,
        }
    }
}

/// A single word as reported by the recognition engine
#[derive(Debug, Clone, PartialEq)]
pub struct WordRecord {
    pub text: String,
    /// Engine confidence, 0-100 (negative for non-word rows)
    pub confidence: f32,
    /// Frame-local position
    pub rect: ScreenRect,
    pub key: LineKey,
}

/// A merged line of recognized text
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub text: String,
    /// Frame-local bounding rectangle
    pub rect: ScreenRect,
    /// Language detected for `text`, filled in by the dispatcher
    pub detected_language: Option<String>,
}

impl TextBlock {
    pub fn new(text: impl Into<String>, rect: ScreenRect) -> Self {
        Self {
            text: text.into(),
            rect,
            detected_language: None,
        }
    }
}

/// A translated line ready for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatedBlock {
    pub text: String,
    /// Frame-local inside the isolated execution, absolute screen
    /// coordinates once published
    pub rect: ScreenRect,
}

impl TranslatedBlock {
    /// Move the block from frame-local into absolute screen coordinates
    pub fn into_screen_space(self, origin: (i32, i32)) -> Self {
        Self {
            rect: self.rect.offset(origin.0, origin.1),
            text: self.text,
        }
    }
}

/// Commands delivered to the orchestrator from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleSignal {
    /// Run a cycle on the next tick regardless of pixel change
    ForceRetranslate,
    /// Flip the paused flag
    TogglePause,
    /// Terminate any in-flight cycle and leave the loop
    Stop,
}

/// Everything the orchestrator publishes towards the display side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OverlayEvent {
    /// Full replacement list of translations, absolute coordinates
    Translations(Vec<TranslatedBlock>),
    /// Recoverable status text (capture failure, internal error)
    Status(String),
    /// Paused flag changed
    PausedChanged(bool),
}

/// Errors from the recognition engine
#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("Recognition engine not found at {0}")]
    Unavailable(PathBuf),

    #[error("Recognition engine failed: {0}")]
    EngineFailed(String),

    #[error("Recognition timed out after {0}s")]
    Timeout(u64),

    #[error("Failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Frame encoding task failed: {0}")]
    EncodeTask(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the translation engine
#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    #[error("Translation request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Translation service returned status {0}")]
    Status(u16),

    #[error("Translation service returned an unexpected payload: {0}")]
    Malformed(String),

    #[error("Translation result was empty")]
    Empty,
}

/// Errors while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown language: {0}")]
    UnknownLanguage(String),
}

/// Unexpected failures inside an orchestrator tick
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("Capture task failed: {0}")]
    CaptureTask(#[from] tokio::task::JoinError),

    #[error("Internal error: {0}")]
    Internal(String),
}
