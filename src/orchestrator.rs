//! Supervising cycle loop.
//!
//! The orchestrator polls the capture source, decides whether the frame
//! changed, runs recognition and translation behind the isolation boundary,
//! and publishes the results. Control signals arrive over a channel and are
//! handled at tick boundaries, while waiting, and while a cycle is in flight.

use crate::capture::CaptureSource;
use crate::change_detector::{ChangeDecision, ChangeDetector};
use crate::config::CycleSettings;
use crate::isolation::{CycleHandle, CyclePipeline};
use crate::types::{CaptureFrame, CycleError, CycleSignal, OverlayEvent, TranslatedBlock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Where the orchestrator currently is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Capturing,
    Diffing,
    Processing,
    Waiting,
    Paused,
    Stopping,
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Capture source returned nothing
    CaptureFailed,
    /// Frame differed by less than the threshold
    Unchanged { percent: f64 },
    /// Cycle finished and its translations were published
    Published { blocks: usize },
    /// Cycle ended without a result (recognition failure or crash)
    NoResult,
    /// Cycle was terminated by ForceRetranslate
    Superseded,
    /// Cycle (if any) was terminated by Stop
    Stopped,
}

/// Counters and flags for diagnostics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorStatus {
    pub phase: Phase,
    pub paused: bool,
    pub cycles_started: u64,
    pub cycles_published: u64,
    pub cycles_cancelled: u64,
    pub last_change_percent: Option<f64>,
}

/// The orchestrator's own mutable state
struct CycleState {
    running: bool,
    paused: bool,
    pending_force: bool,
    /// Frame that triggered the most recent cycle
    last_frame: Option<Arc<CaptureFrame>>,
    active: Option<CycleHandle>,
    phase: Phase,
    cycles_started: u64,
    cycles_published: u64,
    cycles_cancelled: u64,
    last_change_percent: Option<f64>,
}

impl Default for CycleState {
    fn default() -> Self {
        Self {
            running: true,
            paused: false,
            pending_force: false,
            last_frame: None,
            active: None,
            phase: Phase::Idle,
            cycles_started: 0,
            cycles_published: 0,
            cycles_cancelled: 0,
            last_change_percent: None,
        }
    }
}

/// Cloneable sender for control signals
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::UnboundedSender<CycleSignal>,
}

impl ControlHandle {
    /// Deliver a signal; returns false once the orchestrator is gone
    pub fn send(&self, signal: CycleSignal) -> bool {
        self.tx.send(signal).is_ok()
    }

    pub fn force_retranslate(&self) -> bool {
        self.send(CycleSignal::ForceRetranslate)
    }

    pub fn toggle_pause(&self) -> bool {
        self.send(CycleSignal::TogglePause)
    }

    pub fn stop(&self) -> bool {
        self.send(CycleSignal::Stop)
    }
}

/// What woke the orchestrator while a cycle was in flight
enum Wake {
    Finished(Option<Vec<TranslatedBlock>>),
    Signal(CycleSignal),
}

/// Supervising state machine driving capture, diff and isolated execution
pub struct CycleOrchestrator {
    settings: CycleSettings,
    detector: ChangeDetector,
    capture: Arc<dyn CaptureSource>,
    pipeline: Arc<CyclePipeline>,
    events_tx: mpsc::Sender<OverlayEvent>,
    signals_rx: mpsc::UnboundedReceiver<CycleSignal>,
    state: CycleState,
}

impl CycleOrchestrator {
    /// Create an orchestrator and the handle used to control it
    ///
    /// Dropping every [`ControlHandle`] counts as Stop.
    pub fn new(
        settings: CycleSettings,
        capture: Arc<dyn CaptureSource>,
        pipeline: Arc<CyclePipeline>,
        events_tx: mpsc::Sender<OverlayEvent>,
    ) -> (Self, ControlHandle) {
        let (tx, signals_rx) = mpsc::unbounded_channel();
        let orchestrator = Self {
            detector: ChangeDetector::new(settings.threshold_percent),
            settings,
            capture,
            pipeline,
            events_tx,
            signals_rx,
            state: CycleState::default(),
        };
        (orchestrator, ControlHandle { tx })
    }

    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            phase: self.state.phase,
            paused: self.state.paused,
            cycles_started: self.state.cycles_started,
            cycles_published: self.state.cycles_published,
            cycles_cancelled: self.state.cycles_cancelled,
            last_change_percent: self.state.last_change_percent,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    /// Run until Stop
    pub async fn run(mut self) -> OrchestratorStatus {
        info!(
            "🚀 Monitoring {} (threshold {}%)",
            self.capture.describe(),
            self.detector.threshold_percent()
        );

        while self.state.running {
            self.process_signals().await;
            if !self.state.running {
                break;
            }
            self.state.phase = Phase::Idle;

            if self.state.paused {
                self.state.phase = Phase::Paused;
                self.wait(self.settings.pause_poll).await;
                continue;
            }

            let delay = match self.tick().await {
                Ok(outcome) => self.cooldown(&outcome),
                Err(e) => {
                    error!("Cycle error: {}", e);
                    self.publish(OverlayEvent::Status(format!("Error: {}", e))).await;
                    self.settings.error_backoff
                }
            };

            if !self.state.running {
                break;
            }
            self.state.phase = Phase::Waiting;
            self.wait(delay).await;
        }

        if let Some(handle) = self.state.active.take() {
            handle.shutdown().await;
        }
        self.state.phase = Phase::Stopping;
        info!("🛑 Orchestrator stopped");
        self.status()
    }

    /// Apply every signal queued so far
    pub async fn process_signals(&mut self) {
        loop {
            match self.signals_rx.try_recv() {
                Ok(signal) => self.apply_signal(signal).await,
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.apply_signal(CycleSignal::Stop).await;
                    break;
                }
            }
        }
    }

    /// One pass: capture, diff, and when triggered run a cycle to completion
    pub async fn tick(&mut self) -> Result<TickOutcome, CycleError> {
        let forced = self.state.pending_force;
        self.state.phase = Phase::Capturing;

        let capture = self.capture.clone();
        let detector = self.detector.clone();
        let previous = self.state.last_frame.clone();
        let sampled = tokio::task::spawn_blocking(move || {
            let frame = capture.capture()?;
            let decision = if forced {
                ChangeDecision {
                    changed: true,
                    percent: 100.0,
                }
            } else {
                detector.evaluate(&frame.image, previous.as_deref().map(|f| &f.image))
            };
            Some((frame, decision))
        })
        .await?;

        self.state.phase = Phase::Diffing;
        let (frame, decision) = match sampled {
            Some(sampled) => sampled,
            None => {
                warn!("Capture target unavailable: {}", self.capture.describe());
                self.publish(OverlayEvent::Status("Capture target unavailable".to_string()))
                    .await;
                return Ok(TickOutcome::CaptureFailed);
            }
        };

        if !forced {
            self.state.last_change_percent = Some(decision.percent);
        }
        if !decision.changed {
            return Ok(TickOutcome::Unchanged {
                percent: decision.percent,
            });
        }

        if forced {
            info!("🔁 Forced retranslation");
        } else {
            info!("📸 Change detected ({:.3}%), processing...", decision.percent);
        }

        self.state.pending_force = false;
        let frame = Arc::new(frame);
        self.state.last_frame = Some(frame.clone());
        self.start_cycle(frame).await;

        self.await_cycle().await
    }

    /// Wait to apply after `outcome`
    pub fn cooldown(&self, outcome: &TickOutcome) -> Duration {
        match outcome {
            TickOutcome::Unchanged { .. } => self.settings.unchanged_interval,
            TickOutcome::Published { .. } | TickOutcome::NoResult => self.settings.changed_interval,
            TickOutcome::CaptureFailed => self.settings.capture_retry,
            TickOutcome::Superseded | TickOutcome::Stopped => Duration::ZERO,
        }
    }

    async fn start_cycle(&mut self, frame: Arc<CaptureFrame>) {
        if let Some(previous) = self.state.active.take() {
            debug!("Terminating previous execution before starting a new one");
            self.state.cycles_cancelled += 1;
            previous.shutdown().await;
        }

        self.state.phase = Phase::Processing;
        self.state.cycles_started += 1;
        self.state.active = Some(CycleHandle::spawn(self.pipeline.clone(), frame));
    }

    /// Wait for the in-flight execution while staying responsive to signals
    async fn await_cycle(&mut self) -> Result<TickOutcome, CycleError> {
        loop {
            let wake = {
                let handle = self
                    .state
                    .active
                    .as_mut()
                    .ok_or_else(|| CycleError::Internal("no active execution".to_string()))?;

                tokio::select! {
                    result = handle.wait() => Wake::Finished(result),
                    signal = self.signals_rx.recv() => Wake::Signal(signal.unwrap_or(CycleSignal::Stop)),
                }
            };

            match wake {
                Wake::Finished(result) => {
                    if let Some(handle) = self.state.active.take() {
                        handle.reap().await;
                    }
                    return Ok(match result {
                        Some(blocks) => {
                            let count = blocks.len();
                            self.state.cycles_published += 1;
                            self.publish(OverlayEvent::Translations(blocks)).await;
                            TickOutcome::Published { blocks: count }
                        }
                        None => {
                            debug!("Cycle produced no result");
                            TickOutcome::NoResult
                        }
                    });
                }
                Wake::Signal(signal) => {
                    self.apply_signal(signal).await;
                    match signal {
                        CycleSignal::TogglePause => continue,
                        CycleSignal::ForceRetranslate => {
                            self.cancel_active().await;
                            return Ok(TickOutcome::Superseded);
                        }
                        CycleSignal::Stop => {
                            self.cancel_active().await;
                            return Ok(TickOutcome::Stopped);
                        }
                    }
                }
            }
        }
    }

    async fn cancel_active(&mut self) {
        if let Some(handle) = self.state.active.take() {
            info!("✋ Terminating in-flight cycle");
            self.state.cycles_cancelled += 1;
            handle.shutdown().await;
        }
    }

    async fn apply_signal(&mut self, signal: CycleSignal) {
        debug!("Signal: {:?}", signal);
        match signal {
            CycleSignal::ForceRetranslate => {
                if self.state.paused {
                    self.state.paused = false;
                    self.publish(OverlayEvent::PausedChanged(false)).await;
                }
                self.state.pending_force = true;
            }
            CycleSignal::TogglePause => {
                self.state.paused = !self.state.paused;
                info!(
                    "{}",
                    if self.state.paused { "⏸️  Paused" } else { "▶️  Resumed" }
                );
                self.publish(OverlayEvent::PausedChanged(self.state.paused)).await;
            }
            CycleSignal::Stop => {
                self.state.running = false;
                self.state.phase = Phase::Stopping;
            }
        }
    }

    /// Sleep for `duration`, ending early on ForceRetranslate or Stop
    async fn wait(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            let signal = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return,
                signal = self.signals_rx.recv() => signal.unwrap_or(CycleSignal::Stop),
            };
            self.apply_signal(signal).await;
            if signal != CycleSignal::TogglePause {
                return;
            }
        }
    }

    async fn publish(&self, event: OverlayEvent) {
        if self.events_tx.send(event).await.is_err() {
            warn!("Display receiver dropped, event discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::TranslationDispatcher;
    use crate::extractors::{RecognitionEngine, TextBlockExtractor};
    use crate::translator::{LanguageDetector, TranslationEngine};
    use crate::types::{RecognitionError, ScreenRect, TranslationError, WordRecord};
    use image::DynamicImage;

    struct StillCapture;

    impl CaptureSource for StillCapture {
        fn capture(&self) -> Option<CaptureFrame> {
            Some(CaptureFrame::new(
                DynamicImage::new_rgb8(16, 16),
                ScreenRect::new(0, 0, 16, 16),
            ))
        }

        fn describe(&self) -> String {
            "still".to_string()
        }
    }

    struct NoWords;

    #[async_trait::async_trait]
    impl RecognitionEngine for NoWords {
        async fn recognize(&self, _image: &DynamicImage, _language: &str) -> Result<Vec<WordRecord>, RecognitionError> {
            Ok(Vec::new())
        }
    }

    struct Never;

    impl LanguageDetector for Never {
        fn detect(&self, _text: &str) -> Option<String> {
            None
        }
    }

    #[async_trait::async_trait]
    impl TranslationEngine for Never {
        async fn translate(&self, _text: &str, _source: &str, _target: &str) -> Result<String, TranslationError> {
            Err(TranslationError::Empty)
        }
    }

    fn orchestrator() -> (CycleOrchestrator, ControlHandle, mpsc::Receiver<OverlayEvent>) {
        let extractor = TextBlockExtractor::new(Arc::new(NoWords), 50.0);
        let dispatcher = TranslationDispatcher::new(Arc::new(Never), Arc::new(Never), "ja", "en", 1);
        let pipeline = Arc::new(CyclePipeline::new(extractor, dispatcher, "jpn"));
        let (events_tx, events_rx) = mpsc::channel(16);
        let (orchestrator, control) =
            CycleOrchestrator::new(CycleSettings::default(), Arc::new(StillCapture), pipeline, events_tx);
        (orchestrator, control, events_rx)
    }

    #[tokio::test]
    async fn test_toggle_pause_twice_is_idempotent() {
        let (mut orch, control, mut events) = orchestrator();

        assert_eq!(orch.tick().await.unwrap(), TickOutcome::Published { blocks: 0 });
        assert_eq!(events.recv().await, Some(OverlayEvent::Translations(Vec::new())));
        let frame = orch.state.last_frame.clone().unwrap();

        control.toggle_pause();
        control.toggle_pause();
        orch.process_signals().await;

        assert!(!orch.is_paused());
        assert!(Arc::ptr_eq(orch.state.last_frame.as_ref().unwrap(), &frame));
        assert!(!orch.state.pending_force);
        assert_eq!(events.recv().await, Some(OverlayEvent::PausedChanged(true)));
        assert_eq!(events.recv().await, Some(OverlayEvent::PausedChanged(false)));
    }

    #[tokio::test]
    async fn test_unchanged_frame_does_not_run_cycle() {
        let (mut orch, _control, _events) = orchestrator();

        orch.tick().await.unwrap();
        let outcome = orch.tick().await.unwrap();
        assert_eq!(outcome, TickOutcome::Unchanged { percent: 0.0 });
        assert_eq!(orch.status().cycles_started, 1);
        assert_eq!(orch.cooldown(&outcome), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_force_bypasses_diff_and_unpauses() {
        let (mut orch, control, _events) = orchestrator();
        orch.tick().await.unwrap();

        control.toggle_pause();
        control.force_retranslate();
        orch.process_signals().await;
        assert!(!orch.is_paused());
        assert!(orch.state.pending_force);

        assert_eq!(orch.tick().await.unwrap(), TickOutcome::Published { blocks: 0 });
        assert!(!orch.state.pending_force);
        assert_eq!(orch.status().cycles_started, 2);
    }

    #[tokio::test]
    async fn test_dropped_control_handle_stops() {
        let (mut orch, control, _events) = orchestrator();
        drop(control);
        orch.process_signals().await;
        assert!(!orch.is_running());
        assert_eq!(orch.status().phase, Phase::Stopping);
    }

    #[test]
    fn test_cooldown_by_outcome() {
        let (orch, _control, _events) = orchestrator();
        let settings = CycleSettings::default();
        assert_eq!(orch.cooldown(&TickOutcome::Published { blocks: 3 }), settings.changed_interval);
        assert_eq!(orch.cooldown(&TickOutcome::NoResult), settings.changed_interval);
        assert_eq!(orch.cooldown(&TickOutcome::CaptureFailed), settings.capture_retry);
        assert_eq!(orch.cooldown(&TickOutcome::Superseded), Duration::ZERO);
        assert!(settings.changed_interval > settings.unchanged_interval);
    }
}
