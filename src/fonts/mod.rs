//! Font data collaborator
//!
//! Fonts are fetched through [`FontSource`] implementations and kept in an
//! explicit, append-only [`FontCache`] shared between invocations. A
//! [`FontChain`] tries its candidates in order and returns the first font that
//! covers the requested text.

pub mod metrics;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// DejaVu Sans, shipped with the crate. Covers Latin, Greek and Cyrillic but
/// no CJK ideographs.
pub const BUNDLED_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

/// Identifier of the bundled font in [`LoadedFont::id`]
pub const BUNDLED_FONT_ID: &str = "bundled:DejaVuSans";

/// Remote CJK-capable fonts tried in order when the text needs them
pub const DEFAULT_CJK_FONT_URLS: &[&str] = &[
    "https://cdn.jsdelivr.net/gh/notofonts/noto-cjk@main/Sans/SubsetOTF/SC/NotoSansSC-Regular.otf",
    "https://cdn.jsdelivr.net/gh/googlefonts/noto-cjk@main/Sans/SubsetOTF/SC/NotoSansSC-Regular.otf",
    "https://cdn.jsdelivr.net/gh/notofonts/noto-cjk@main/Sans/OTF/SimplifiedChinese/NotoSansCJKsc-Regular.otf",
];

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetch bytes for a font identifier, or fail
pub trait FontSource: Send + Sync {
    /// Short label used in logs and cache keys
    fn kind(&self) -> &'static str;

    fn fetch(&self, id: &str) -> Result<Vec<u8>>;
}

/// Fetches fonts over HTTP(S); the identifier is the URL
pub struct HttpFontSource {
    client: reqwest::blocking::Client,
}

impl HttpFontSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| Error::FontUnavailable(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl FontSource for HttpFontSource {
    fn kind(&self) -> &'static str {
        "http"
    }

    fn fetch(&self, id: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(id)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::FontUnavailable(format!("{}: {}", id, e)))?;
        let bytes = response
            .bytes()
            .map_err(|e| Error::FontUnavailable(format!("{}: {}", id, e)))?;
        Ok(bytes.to_vec())
    }
}

/// Reads fonts from the local filesystem; the identifier is a path
pub struct FileFontSource;

impl FontSource for FileFontSource {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn fetch(&self, id: &str) -> Result<Vec<u8>> {
        std::fs::read(PathBuf::from(id))
            .map_err(|e| Error::FontUnavailable(format!("{}: {}", id, e)))
    }
}

/// Append-only font data cache keyed by font identity.
///
/// Concurrent fetches of the same font are tolerated; the last insert wins.
#[derive(Default)]
pub struct FontCache {
    entries: RwLock<HashMap<String, Arc<Vec<u8>>>>,
}

impl FontCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        self.entries.read().get(key).cloned()
    }

    pub fn insert(&self, key: String, data: Vec<u8>) -> Arc<Vec<u8>> {
        let data = Arc::new(data);
        self.entries.write().insert(key, Arc::clone(&data));
        data
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Font bytes together with where they came from
#[derive(Debug, Clone)]
pub struct LoadedFont {
    pub id: String,
    pub data: Arc<Vec<u8>>,
}

impl LoadedFont {
    pub fn bundled() -> Self {
        Self {
            id: BUNDLED_FONT_ID.to_string(),
            data: Arc::new(BUNDLED_FONT.to_vec()),
        }
    }

    pub fn is_bundled(&self) -> bool {
        self.id == BUNDLED_FONT_ID
    }

    /// True if the font has a glyph for every visible character of `text`
    pub fn covers(&self, text: &str) -> bool {
        font_covers(&self.data, text)
    }
}

/// True if the font parses and maps every non-whitespace character of `text`
pub fn font_covers(data: &[u8], text: &str) -> bool {
    match rustybuzz::Face::from_slice(data, 0) {
        Some(face) => text
            .chars()
            .filter(|c| !c.is_whitespace())
            .all(|c| face.glyph_index(c).is_some()),
        None => false,
    }
}

struct Candidate {
    source: Arc<dyn FontSource>,
    id: String,
}

/// Ordered font strategies: the bundled font, then each configured candidate
pub struct FontChain {
    candidates: Vec<Candidate>,
    cache: Arc<FontCache>,
}

impl FontChain {
    /// A chain with only the bundled font
    pub fn new(cache: Arc<FontCache>) -> Self {
        Self {
            candidates: Vec::new(),
            cache,
        }
    }

    /// Bundled font, then the default remote CJK fonts
    pub fn with_defaults(cache: Arc<FontCache>) -> Result<Self> {
        let http: Arc<dyn FontSource> = Arc::new(HttpFontSource::new()?);
        let mut chain = Self::new(cache);
        for url in DEFAULT_CJK_FONT_URLS {
            chain.push(Arc::clone(&http), *url);
        }
        Ok(chain)
    }

    pub fn push(&mut self, source: Arc<dyn FontSource>, id: impl Into<String>) -> &mut Self {
        self.candidates.push(Candidate {
            source,
            id: id.into(),
        });
        self
    }

    pub fn cache(&self) -> &Arc<FontCache> {
        &self.cache
    }

    /// First font able to render `text`.
    ///
    /// Fails with [`Error::FontUnavailable`] when no candidate can be fetched
    /// or none covers the text.
    pub fn resolve(&self, text: &str) -> Result<LoadedFont> {
        if font_covers(BUNDLED_FONT, text) {
            return Ok(LoadedFont::bundled());
        }

        let mut failures = Vec::new();
        for candidate in &self.candidates {
            let key = format!("{}:{}", candidate.source.kind(), candidate.id);
            let data = match self.cache.get(&key) {
                Some(data) => data,
                None => match candidate.source.fetch(&candidate.id) {
                    Ok(bytes) => {
                        debug!(font = %key, bytes = bytes.len(), "fetched font");
                        self.cache.insert(key.clone(), bytes)
                    }
                    Err(e) => {
                        warn!(font = %key, error = %e, "font fetch failed");
                        failures.push(key);
                        continue;
                    }
                },
            };

            if font_covers(&data, text) {
                return Ok(LoadedFont { id: key, data });
            }
            debug!(font = %key, "font does not cover watermark text");
            failures.push(key);
        }

        Err(Error::FontUnavailable(if failures.is_empty() {
            "no font candidates configured".to_string()
        } else {
            format!("no usable font among {}", failures.join(", "))
        }))
    }

    /// Like [`resolve`](Self::resolve), falling back to the bundled font
    pub fn resolve_or_bundled(&self, text: &str) -> LoadedFont {
        self.resolve(text).unwrap_or_else(|e| {
            warn!(error = %e, "using bundled font; some glyphs may be missing");
            LoadedFont::bundled()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        result: Option<Vec<u8>>,
    }

    impl FontSource for Counting {
        fn kind(&self) -> &'static str {
            "test"
        }

        fn fetch(&self, id: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .clone()
                .ok_or_else(|| Error::FontUnavailable(id.to_string()))
        }
    }

    #[test]
    fn test_bundled_font_covers_latin_and_cyrillic() {
        assert!(font_covers(BUNDLED_FONT, "WATERMARK"));
        assert!(font_covers(BUNDLED_FONT, "Черновик"));
        assert!(!font_covers(BUNDLED_FONT, "机密"));
    }

    #[test]
    fn test_latin_text_never_fetches() {
        let source = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            result: None,
        });
        let mut chain = FontChain::new(Arc::new(FontCache::new()));
        chain.push(source.clone(), "remote");
        let font = chain.resolve("CONFIDENTIAL").unwrap();
        assert!(font.is_bundled());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failing_sources_yield_font_unavailable() {
        let source = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            result: None,
        });
        let mut chain = FontChain::new(Arc::new(FontCache::new()));
        chain.push(source.clone(), "a").push(source.clone(), "b");
        let err = chain.resolve("机密文档").unwrap_err();
        assert!(matches!(err, Error::FontUnavailable(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(chain.resolve_or_bundled("机密文档").is_bundled());
    }

    #[test]
    fn test_fetched_fonts_are_cached() {
        // The bundled font stands in for a remote one; it is rejected for
        // CJK text but must still land in the cache
        let source = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            result: Some(BUNDLED_FONT.to_vec()),
        });
        let cache = Arc::new(FontCache::new());
        let mut chain = FontChain::new(Arc::clone(&cache));
        chain.push(source.clone(), "remote");

        assert!(chain.resolve("机密").is_err());
        assert!(chain.resolve("机密").is_err());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(cache.get("test:remote").is_some());
    }
}
