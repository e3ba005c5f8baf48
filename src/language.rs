//! Script detection and the watermark text language gate
//!
//! The gate runs before any rendering work so that rejected text never costs a
//! document load.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Languages the gate can be configured with.
///
/// Classification is by Unicode script, so `Chinese` covers Han ideographs
/// regardless of the actual language written with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Language {
    English,
    Chinese,
    Japanese,
    Korean,
    Cyrillic,
    Arabic,
    Other,
}

/// Optional restrictions on the watermark text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityOptions {
    /// Reject any text containing Han ideographs
    pub block_chinese_characters: bool,
    /// When present, every detected language must be in this list
    pub allowed_languages: Option<Vec<Language>>,
}

/// True for code points in the CJK ideograph blocks the PDF path cares about.
pub fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF   // CJK Unified Ideographs
        | 0x3400..=0x4DBF // Extension A
        | 0xF900..=0xFAFF // Compatibility Ideographs
    )
}

/// True if the text contains at least one CJK ideograph.
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// Wide characters for width estimation: ideographs, kana, hangul and
/// full-width forms.
pub fn is_wide(c: char) -> bool {
    is_cjk(c)
        || matches!(c as u32,
            0x3000..=0x30FF   // CJK punctuation, hiragana, katakana
            | 0xAC00..=0xD7AF // Hangul syllables
            | 0xFF00..=0xFFEF // Half/full-width forms
        )
}

/// Classify a single character, or `None` for script-neutral characters
/// (digits, punctuation, whitespace).
pub fn classify(c: char) -> Option<Language> {
    let cp = c as u32;
    if c.is_ascii_alphabetic() || matches!(cp, 0x00C0..=0x024F) {
        return Some(Language::English);
    }
    if is_cjk(c) {
        return Some(Language::Chinese);
    }
    match cp {
        0x3040..=0x30FF => Some(Language::Japanese),
        0x1100..=0x11FF | 0x3130..=0x318F | 0xAC00..=0xD7AF => Some(Language::Korean),
        0x0400..=0x04FF => Some(Language::Cyrillic),
        0x0600..=0x06FF | 0x0750..=0x077F => Some(Language::Arabic),
        _ if c.is_alphabetic() => Some(Language::Other),
        _ => None,
    }
}

/// Distinct languages present in the text, in first-seen order.
pub fn detect_languages(text: &str) -> Vec<Language> {
    let mut found = Vec::new();
    for lang in text.chars().filter_map(classify) {
        if !found.contains(&lang) {
            found.push(lang);
        }
    }
    found
}

/// Check watermark text against the security options.
pub fn check_text(text: &str, security: &SecurityOptions) -> Result<()> {
    if security.block_chinese_characters && contains_cjk(text) {
        return Err(Error::LanguageBlocked(
            "Chinese characters are not allowed in watermark text".to_string(),
        ));
    }

    if let Some(allowed) = &security.allowed_languages {
        if let Some(lang) = detect_languages(text)
            .into_iter()
            .find(|lang| !allowed.contains(lang))
        {
            return Err(Error::LanguageBlocked(format!(
                "language {:?} is not in the allowed list",
                lang
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cjk_ranges() {
        assert!(is_cjk('水'));
        assert!(is_cjk('\u{3400}'));
        assert!(is_cjk('\u{F900}'));
        assert!(!is_cjk('A'));
        assert!(!is_cjk('あ'));
    }

    #[test]
    fn test_block_chinese() {
        let security = SecurityOptions {
            block_chinese_characters: true,
            allowed_languages: None,
        };
        assert!(matches!(
            check_text("水印测试", &security),
            Err(Error::LanguageBlocked(_))
        ));
        assert!(check_text("CONFIDENTIAL 2024", &security).is_ok());
    }

    #[test]
    fn test_gate_disabled_allows_everything() {
        assert!(check_text("水印测试", &SecurityOptions::default()).is_ok());
    }

    #[test]
    fn test_allowed_languages() {
        let security = SecurityOptions {
            block_chinese_characters: false,
            allowed_languages: Some(vec![Language::English]),
        };
        assert!(check_text("Draft - v2", &security).is_ok());
        assert!(check_text("Черновик", &security).is_err());
        assert!(check_text("秘密", &security).is_err());
    }

    #[test]
    fn test_detect_languages_order() {
        assert_eq!(
            detect_languages("Top 机密 secret"),
            vec![Language::English, Language::Chinese]
        );
        assert!(detect_languages("2024-01-01 !!").is_empty());
    }
}
