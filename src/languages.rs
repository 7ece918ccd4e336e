//! Catalogue of supported source languages.
//!
//! Each entry ties a display name to the three codes used along the
//! pipeline: the translation service code, the recognition engine's
//! trained-data code, and the ISO 639-3 code reported by the detector.

/// A source language the translator knows how to handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    /// Display name
    pub name: &'static str,
    /// Code used by the translation service (and as the configured source language)
    pub code: &'static str,
    /// Trained-data code for the recognition engine
    pub ocr_code: &'static str,
    /// ISO 639-3 code reported by the language detector
    pub detect_code: &'static str,
}

pub const LANGUAGES: &[Language] = &[
    Language {
        name: "Japanese",
        code: "ja",
        ocr_code: "jpn",
        detect_code: "jpn",
    },
    Language {
        name: "Korean",
        code: "ko",
        ocr_code: "kor",
        detect_code: "kor",
    },
    Language {
        name: "Chinese (Simplified)",
        code: "zh-CN",
        ocr_code: "chi_sim",
        detect_code: "cmn",
    },
    Language {
        name: "Russian",
        code: "ru",
        ocr_code: "rus",
        detect_code: "rus",
    },
    Language {
        name: "German",
        code: "de",
        ocr_code: "deu",
        detect_code: "deu",
    },
];

/// Find a language by display name or translation code (case-insensitive)
pub fn find(query: &str) -> Option<&'static Language> {
    let query = query.trim();
    LANGUAGES
        .iter()
        .find(|l| l.code.eq_ignore_ascii_case(query) || l.name.eq_ignore_ascii_case(query))
}

/// Find a language by the detector's ISO 639-3 code
pub fn by_detect_code(code: &str) -> Option<&'static Language> {
    LANGUAGES.iter().find(|l| l.detect_code == code)
}
