//! Screen Translator - Main entry point
//!
//! Runs the cycle orchestrator against a screen region (or an image file)
//! and writes every overlay event to stdout as one JSON line. Logs go to
//! stderr. Commands on stdin: `f` force, `p` pause/resume, `q` quit.

use clap::Parser;
use screen_translator::{
    languages, CaptureSource, Config, ControlHandle, CycleOrchestrator, CyclePipeline,
    CycleSettings, GoogleTranslator, ImageFileCapture, OverlayEvent, RecognitionEngine,
    RegionCapture, ScreenRect, TesseractEngine, TextBlockExtractor, TranslationDispatcher,
    WhatlangDetector, LANGUAGES,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "screen-translator")]
#[command(about = "Translate foreign text in a screen region and publish it for an overlay")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Source language (name or code, see --list-languages)
    #[arg(short, long)]
    language: Option<String>,

    /// Target language code
    #[arg(short, long)]
    target: Option<String>,

    /// Monitored region as X,Y,WIDTH,HEIGHT
    #[arg(long, value_parser = parse_region)]
    region: Option<ScreenRect>,

    /// Read frames from an image file instead of the screen
    #[arg(long)]
    image: Option<PathBuf>,

    /// Change threshold in percent
    #[arg(long)]
    threshold: Option<f64>,

    /// Translation worker count
    #[arg(short, long)]
    workers: Option<usize>,

    /// Print the supported source languages and exit
    #[arg(long)]
    list_languages: bool,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    write_default_config: bool,
}

fn parse_region(value: &str) -> Result<ScreenRect, String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(format!("expected X,Y,WIDTH,HEIGHT, got '{}'", value));
    }

    let x = parts[0].parse::<i32>().map_err(|e| format!("bad X: {}", e))?;
    let y = parts[1].parse::<i32>().map_err(|e| format!("bad Y: {}", e))?;
    let width = parts[2].parse::<u32>().map_err(|e| format!("bad WIDTH: {}", e))?;
    let height = parts[3].parse::<u32>().map_err(|e| format!("bad HEIGHT: {}", e))?;
    Ok(ScreenRect::new(x, y, width, height))
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(language) = &args.language {
        // Accept display names as well as codes
        config.translation.source_language = languages::find(language)
            .map(|l| l.code.to_string())
            .unwrap_or_else(|| language.clone());
    }
    if let Some(target) = &args.target {
        config.translation.target_language = target.clone();
    }
    if let Some(region) = args.region {
        config.capture.x = region.x;
        config.capture.y = region.y;
        config.capture.width = region.width;
        config.capture.height = region.height;
    }
    if let Some(image) = &args.image {
        config.capture.image_path = Some(image.clone());
    }
    if let Some(threshold) = args.threshold {
        config.change_detection.threshold_percent = threshold;
    }
    if let Some(workers) = args.workers {
        config.translation.workers = workers;
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.list_languages {
        for language in LANGUAGES {
            println!("{:<22} {:<6} {}", language.name, language.code, language.ocr_code);
        }
        return Ok(());
    }

    let config_path = args.config.clone().unwrap_or_else(Config::default_config_path);
    let mut config = Config::load_from_path(config_path.clone());
    apply_overrides(&mut config, &args);

    init_logging(&config);
    info!("Starting Screen Translator");

    if args.write_default_config {
        config.save_to_path(config_path)?;
        return Ok(());
    }

    config.validate()?;

    // Recognition engine
    let engine = match &config.ocr.binary_path {
        Some(path) => TesseractEngine::with_path(path.clone()),
        None => TesseractEngine::new(),
    }
    .with_timeout(Duration::from_secs(config.ocr.timeout_seconds));

    let binary_path = engine.binary_path().to_path_buf();

    let translator = GoogleTranslator::new(
        config.translation.endpoint.clone(),
        Duration::from_secs(config.translation.request_timeout_seconds),
    )?;

    let extractor = TextBlockExtractor::new(Arc::new(engine), config.ocr.min_confidence);
    if extractor.engine().is_available() {
        info!("✅ Tesseract found at {}", binary_path.display());
    } else {
        warn!(
            "⚠️  Tesseract not found at {} - install it or set ocr.binary_path",
            binary_path.display()
        );
    }

    let dispatcher = TranslationDispatcher::new(
        Arc::new(WhatlangDetector::new(config.translation.min_detection_confidence)),
        Arc::new(translator),
        config.translation.source_language.clone(),
        config.translation.target_language.clone(),
        config.translation.workers,
    );
    info!(
        "Translating {} -> {} with {} workers",
        config.translation.source_language,
        config.translation.target_language,
        dispatcher.workers()
    );

    let pipeline = Arc::new(CyclePipeline::new(
        extractor,
        dispatcher,
        config.translation.resolved_ocr_language()?,
    ));

    let capture: Arc<dyn CaptureSource> = match &config.capture.image_path {
        Some(path) => Arc::new(ImageFileCapture::new(
            path.clone(),
            (config.capture.x, config.capture.y),
        )),
        None => Arc::new(RegionCapture::new(config.capture.region())),
    };

    let (events_tx, events_rx) = mpsc::channel::<OverlayEvent>(100);
    let (orchestrator, control) = CycleOrchestrator::new(
        CycleSettings::from(&config),
        capture,
        pipeline,
        events_tx.clone(),
    );

    let display = tokio::spawn(run_display(events_rx));

    let ctrlc_control = control.clone();
    ctrlc::set_handler(move || {
        ctrlc_control.stop();
    })?;

    spawn_command_reader(control.clone(), events_tx.downgrade());
    drop(events_tx);

    let status = orchestrator.run().await;
    info!(
        "Cycles: {} started, {} published, {} cancelled",
        status.cycles_started, status.cycles_published, status.cycles_cancelled
    );

    if let Err(e) = display.await {
        error!("Display task failed: {}", e);
    }
    drop(control);

    Ok(())
}

/// Write overlay events to stdout, one JSON object per line
async fn run_display(mut events_rx: mpsc::Receiver<OverlayEvent>) {
    let mut stdout = tokio::io::stdout();

    while let Some(event) = events_rx.recv().await {
        match &event {
            OverlayEvent::Translations(blocks) => info!("📝 Publishing {} translations", blocks.len()),
            OverlayEvent::Status(text) => warn!("Status: {}", text),
            OverlayEvent::PausedChanged(_) => {}
        }

        write_event(&mut stdout, &event).await;

        // Nothing stays on screen while paused
        if event == OverlayEvent::PausedChanged(true) {
            write_event(&mut stdout, &OverlayEvent::Translations(Vec::new())).await;
        }
    }
}

async fn write_event(stdout: &mut tokio::io::Stdout, event: &OverlayEvent) {
    let mut line = match serde_json::to_string(event) {
        Ok(line) => line,
        Err(e) => {
            error!("Failed to serialize event: {}", e);
            return;
        }
    };
    line.push('\n');

    if let Err(e) = stdout.write_all(line.as_bytes()).await {
        error!("Failed to write event: {}", e);
        return;
    }
    let _ = stdout.flush().await;
}

/// Read control commands from stdin on a plain thread
///
/// A blocking stdin read inside the runtime would hold up its shutdown.
fn spawn_command_reader(control: ControlHandle, events_tx: mpsc::WeakSender<OverlayEvent>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };

            match line.trim().to_lowercase().as_str() {
                "f" | "force" => {
                    // Clear stale translations before the forced cycle publishes
                    if let Some(tx) = events_tx.upgrade() {
                        let _ = tx.try_send(OverlayEvent::Translations(Vec::new()));
                    }
                    control.force_retranslate();
                }
                "p" | "pause" => {
                    control.toggle_pause();
                }
                "q" | "quit" => {
                    control.stop();
                    break;
                }
                "" => {}
                other => warn!("Unknown command '{}' (use f, p or q)", other),
            }
        }
    });
}
