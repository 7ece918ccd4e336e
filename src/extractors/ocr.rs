//! Tesseract recognition engine.
//!
//! Runs the `tesseract` command line tool on a grayscale PNG piped through
//! stdin and parses its TSV output into word records.

use super::RecognitionEngine;
use crate::types::{LineKey, RecognitionError, ScreenRect, WordRecord};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, trace};

#[cfg(windows)]
const BINARY_NAME: &str = "tesseract.exe";
#[cfg(not(windows))]
const BINARY_NAME: &str = "tesseract";

/// TSV columns: level page_num block_num par_num line_num word_num left top width height conf text
const TSV_COLUMNS: usize = 12;

/// Tesseract CLI client
pub struct TesseractEngine {
    /// Path to the tesseract binary
    binary_path: PathBuf,
    /// Timeout for one recognition run
    timeout: Duration,
}

impl TesseractEngine {
    /// Create an engine, locating the binary automatically
    pub fn new() -> Self {
        Self {
            binary_path: Self::default_binary_path(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Create with a custom binary path
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            binary_path: path,
            timeout: Duration::from_secs(30),
        }
    }

    /// Set the recognition timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Get the default binary path
    fn default_binary_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        let mut candidates = vec![
            // Same directory as the running binary
            exe_dir.join(BINARY_NAME),
            // Common install locations
            PathBuf::from("/usr/local/bin").join(BINARY_NAME),
            PathBuf::from("/opt/homebrew/bin").join(BINARY_NAME),
            PathBuf::from("/usr/bin").join(BINARY_NAME),
            PathBuf::from(r"C:\Program Files\Tesseract-OCR").join(BINARY_NAME),
        ];

        if let Some(path_var) = std::env::var_os("PATH") {
            candidates.extend(std::env::split_paths(&path_var).map(|dir| dir.join(BINARY_NAME)));
        }

        candidates
            .into_iter()
            .find(|path| path.is_file())
            // Default fallback - will fail gracefully
            .unwrap_or_else(|| PathBuf::from(BINARY_NAME))
    }

    /// Run tesseract on an encoded PNG and return its TSV output
    async fn run(&self, png: Vec<u8>, language: &str) -> Result<String, RecognitionError> {
        let mut child = Command::new(&self.binary_path)
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .arg("tsv")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Terminating the cycle drops this future; the engine must die with it.
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&png).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("Tesseract failed: {}", stderr.trim());
            return Err(RecognitionError::EngineFailed(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RecognitionEngine for TesseractEngine {
    async fn recognize(
        &self,
        image: &DynamicImage,
        language: &str,
    ) -> Result<Vec<WordRecord>, RecognitionError> {
        if !self.is_available() {
            return Err(RecognitionError::Unavailable(self.binary_path.clone()));
        }

        let frame = image.clone();
        let png = tokio::task::spawn_blocking(move || encode_grayscale_png(&frame)).await??;

        debug!(
            "🔍 OCR: Running tesseract ({}) on {}x{} frame",
            language,
            image.width(),
            image.height()
        );

        let tsv = tokio::time::timeout(self.timeout, self.run(png, language))
            .await
            .map_err(|_| RecognitionError::Timeout(self.timeout.as_secs()))??;

        let words = parse_tsv(&tsv);
        debug!("🔍 OCR: {} word records", words.len());
        Ok(words)
    }

    fn is_available(&self) -> bool {
        let exists = self.binary_path.is_file();
        if !exists {
            trace!("Tesseract binary not found at: {}", self.binary_path.display());
        }
        exists
    }
}

/// Grayscale PNG bytes of a frame, the input tesseract reads from stdin
pub fn encode_grayscale_png(image: &DynamicImage) -> Result<Vec<u8>, RecognitionError> {
    let gray = DynamicImage::ImageLuma8(image.to_luma8());
    let mut png = Cursor::new(Vec::new());
    gray.write_to(&mut png, ImageFormat::Png)?;
    Ok(png.into_inner())
}

/// Parse tesseract TSV output into word records
///
/// The header row and malformed rows are skipped. Rows for pages, blocks,
/// paragraphs and lines are kept as-is; they carry confidence -1 and no text,
/// so confidence filtering removes them.
pub fn parse_tsv(tsv: &str) -> Vec<WordRecord> {
    tsv.lines()
        .filter(|line| !line.starts_with("level"))
        .filter_map(parse_tsv_row)
        .collect()
}

fn parse_tsv_row(line: &str) -> Option<WordRecord> {
    let fields: Vec<&str> = line.splitn(TSV_COLUMNS, '\t').collect();
    if fields.len() < TSV_COLUMNS - 1 {
        return None;
    }

    let int = |i: usize| fields[i].trim().parse::<i64>().ok();

    let key = LineKey::new(
        int(2)?.try_into().ok()?,
        int(3)?.try_into().ok()?,
        int(4)?.try_into().ok()?,
    );
    let rect = ScreenRect::new(
        int(6)?.try_into().ok()?,
        int(7)?.try_into().ok()?,
        int(8)?.try_into().ok()?,
        int(9)?.try_into().ok()?,
    );
    let confidence = fields[10].trim().parse::<f32>().ok()?;
    let text = fields.get(11).copied().unwrap_or("").to_string();

    Some(WordRecord {
        text,
        confidence,
        rect,
        key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::merge_words;

    const SAMPLE_TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t
2\t1\t1\t0\t0\t0\t36\t92\t582\t68\t-1\t
3\t1\t1\t1\t0\t0\t36\t92\t582\t68\t-1\t
4\t1\t1\t1\t1\t0\t36\t92\t400\t30\t-1\t
5\t1\t1\t1\t1\t1\t36\t92\t120\t30\t96.063751\tGuten
5\t1\t1\t1\t1\t2\t170\t94\t80\t28\t91.2\tTag
4\t1\t1\t1\t2\t0\t36\t130\t300\t30\t-1\t
5\t1\t1\t1\t2\t1\t36\t130\t140\t30\t42.5\tzzq
5\t1\t1\t1\t2\t2\t190\t131\t146\t29\t88\tWelt
";

    #[test]
    fn test_parse_tsv_reads_word_rows() {
        let words = parse_tsv(SAMPLE_TSV);
        assert_eq!(words.len(), 9);

        let guten = &words[4];
        assert_eq!(guten.text, "Guten");
        assert_eq!(guten.key, LineKey::new(1, 1, 1));
        assert_eq!(guten.rect, ScreenRect::new(36, 92, 120, 30));
        assert!((guten.confidence - 96.063751).abs() < 1e-4);

        assert_eq!(words[0].confidence, -1.0);
        assert_eq!(words[0].text, "");
    }

    #[test]
    fn test_parse_tsv_then_merge() {
        let blocks = merge_words(parse_tsv(SAMPLE_TSV), 50.0);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, "GutenTag");
        assert_eq!(blocks[0].rect, ScreenRect::from_edges(36, 92, 250, 122));
        assert_eq!(blocks[1].text, "Welt");
    }

    #[test]
    fn test_parse_tsv_skips_malformed_rows() {
        let tsv = "garbage\n5\t1\tx\t1\t1\t1\t0\t0\t1\t1\t90\tbad\n5\t1\t1\t1\t1\t1\t0\t0\t1\t1\t90\tok\n";
        let words = parse_tsv(tsv);
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].text, "ok");
    }

    #[test]
    fn test_parse_tsv_keeps_tabs_inside_text_column() {
        let tsv = "5\t1\t1\t1\t1\t1\t0\t0\t1\t1\t90\ta\tb\n";
        assert_eq!(parse_tsv(tsv)[0].text, "a\tb");
    }

    #[test]
    fn test_encode_grayscale_png() {
        let mut img = image::RgbImage::new(7, 3);
        img.put_pixel(2, 1, image::Rgb([255, 255, 255]));
        let png = encode_grayscale_png(&DynamicImage::ImageRgb8(img)).unwrap();

        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png).unwrap();
        assert_eq!(decoded.color(), image::ColorType::L8);
        assert_eq!((decoded.width(), decoded.height()), (7, 3));
        let luma = decoded.to_luma8();
        assert_eq!(luma.get_pixel(2, 1).0, [255]);
        assert_eq!(luma.get_pixel(0, 0).0, [0]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let engine = TesseractEngine::with_path(PathBuf::from("/nonexistent/tesseract"));
        assert!(!engine.is_available());
        let image = DynamicImage::new_rgb8(4, 4);
        let result = engine.recognize(&image, "eng").await;
        assert!(matches!(result, Err(RecognitionError::Unavailable(_))));
    }
}
