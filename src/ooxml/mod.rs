//! Word (WordprocessingML) packages

pub mod mutate;
pub mod package;
pub mod text;

pub use mutate::{watermark_docx, watermark_document_xml, PATTERN_PARAGRAPHS};
pub use package::{is_word_package, WordPackage, DOCUMENT_PART};
pub use text::{docx_text, extract_text};
