//! PDF watermarking and creation

pub mod create;
pub mod fonts;
pub mod mutate;
pub mod page;
pub mod resources;

// Re-export commonly used items
pub use create::{image_to_pdf, text_pages_to_pdf, BodyFont};
pub use mutate::{load_pdf, save_pdf, watermark_document, watermark_pdf};
pub use page::{count_pages_from_catalog, page_boxes, PageBox};
