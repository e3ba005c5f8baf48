//! Word package (zip) reading and writing

use std::io::{Cursor, Read, Write};

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};

/// Main document part of a WordprocessingML package
pub const DOCUMENT_PART: &str = "word/document.xml";

/// Deflate level used when re-zipping
const DEFLATE_LEVEL: i64 = 6;

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    data: Vec<u8>,
    is_dir: bool,
}

/// All parts of a Word package, in archive order
#[derive(Debug, Clone)]
pub struct WordPackage {
    entries: Vec<Entry>,
    document: usize,
}

/// True if `bytes` is a zip archive containing a main document part
pub fn is_word_package(bytes: &[u8]) -> bool {
    let Ok(mut archive) = ZipArchive::new(Cursor::new(bytes)) else {
        return false;
    };
    let found = archive.by_name(DOCUMENT_PART).is_ok();
    found
}

impl WordPackage {
    /// Read every part of the package into memory
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| Error::InvalidInput(format!("not a zip package: {}", e)))?;

        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let mut data = Vec::new();
            if !file.is_dir() {
                file.read_to_end(&mut data)?;
            }
            entries.push(Entry {
                name: file.name().to_string(),
                data,
                is_dir: file.is_dir(),
            });
        }

        let document = entries
            .iter()
            .position(|e| e.name == DOCUMENT_PART)
            .ok_or_else(|| Error::PackageMalformed(format!("missing {}", DOCUMENT_PART)))?;
        debug!(parts = entries.len(), "read Word package");
        Ok(Self { entries, document })
    }

    pub fn document_xml(&self) -> &[u8] {
        &self.entries[self.document].data
    }

    pub fn set_document_xml(&mut self, xml: Vec<u8>) {
        self.entries[self.document].data = xml;
    }

    /// Write the package back out, every part Deflate-compressed
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(DEFLATE_LEVEL));

        for entry in &self.entries {
            if entry.is_dir {
                zip.add_directory(entry.name.as_str(), options)?;
            } else {
                zip.start_file(entry.name.as_str(), options)?;
                zip.write_all(&entry.data)?;
            }
        }
        Ok(zip.finish()?.into_inner())
    }
}
