//! Plain-text extraction from the main document part

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Error, Result};
use crate::ooxml::package::WordPackage;

/// Text of every paragraph, one per line. Tabs and breaks inside runs are
/// kept as `\t` and `\n`.
pub fn extract_text(xml: &[u8]) -> Result<String> {
    let mut reader = Reader::from_reader(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        let event = reader.read_event().map_err(|e| Error::Xml(e.to_string()))?;
        match event {
            Event::Eof => break,
            Event::Start(e) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"p" => current.clear(),
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                b"p" => paragraphs.push(String::new()),
                _ => {}
            },
            Event::Text(e) if in_text => {
                let text = e.unescape().map_err(|e| Error::Xml(e.to_string()))?;
                current.push_str(&text);
            }
            Event::CData(e) if in_text => {
                current.push_str(&String::from_utf8_lossy(&e));
            }
            _ => {}
        }
    }

    Ok(paragraphs.join("\n"))
}

/// Plain text of a Word package
pub fn docx_text(bytes: &[u8]) -> Result<String> {
    let package = WordPackage::from_bytes(bytes)?;
    extract_text(package.document_xml())
}
