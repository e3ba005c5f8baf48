//! Page enumeration and inherited page attributes

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::{Error, Result};

/// Page-tree depth beyond which inheritance lookups stop
const MAX_TREE_DEPTH: usize = 32;

/// US Letter, used when no MediaBox can be found
const DEFAULT_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Geometry of one page in default user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub id: ObjectId,
    /// Lower-left corner of the visible box
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Count pages by reading the Count field from the Pages dictionary
pub fn count_pages_from_catalog(doc: &Document) -> Result<usize> {
    let catalog = doc
        .catalog()
        .map_err(|_| Error::InvalidInput("PDF has no document catalog".to_string()))?;
    let pages_id = catalog
        .get(b"Pages")
        .and_then(Object::as_reference)
        .map_err(|_| Error::InvalidInput("catalog has no Pages reference".to_string()))?;
    let pages = doc.get_dictionary(pages_id)?;

    match pages.get(b"Count") {
        Ok(Object::Integer(n)) if *n >= 0 => Ok(*n as usize),
        _ => Err(Error::InvalidInput("Pages has no valid Count".to_string())),
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Look up `key` on the page, then up the Parent chain
pub fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut dict = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = dict.get(key) {
            return Some(resolve(doc, value));
        }
        let parent = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
        dict = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Resolved Resources dictionary for the page, including inherited ones
pub fn inherited_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    match inherited(doc, page_id, b"Resources") {
        Some(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    }
}

fn rect(doc: &Document, obj: &Object) -> Option<[f32; 4]> {
    let arr = obj.as_array().ok()?;
    if arr.len() < 4 {
        return None;
    }
    let mut v = [0.0f32; 4];
    for (slot, item) in v.iter_mut().zip(arr) {
        *slot = number(resolve(doc, item))?;
    }
    // Normalize so that [x0 y0] is the lower-left corner
    Some([v[0].min(v[2]), v[1].min(v[3]), v[0].max(v[2]), v[1].max(v[3])])
}

/// Visible box of a page: the CropBox when present, else the MediaBox
pub fn page_box(doc: &Document, page_id: ObjectId) -> PageBox {
    let r = inherited(doc, page_id, b"CropBox")
        .and_then(|o| rect(doc, o))
        .or_else(|| inherited(doc, page_id, b"MediaBox").and_then(|o| rect(doc, o)))
        .unwrap_or(DEFAULT_BOX);
    PageBox {
        id: page_id,
        x: r[0],
        y: r[1],
        width: r[2] - r[0],
        height: r[3] - r[1],
    }
}

/// All pages in document order
pub fn page_boxes(doc: &Document) -> Vec<PageBox> {
    doc.get_pages()
        .into_values()
        .map(|id| page_box(doc, id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    /// Two pages: one inheriting its MediaBox, one with its own CropBox
    fn document() -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let first = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        let second = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "CropBox" => vec![10.into(), 20.into(), 310.into(), 420.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![first.into(), second.into()],
                "Count" => 2,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                "Resources" => dictionary! { "Font" => dictionary! {} },
            }),
        );
        let catalog = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog);
        doc
    }

    #[test]
    fn test_count_pages_from_catalog() {
        assert_eq!(count_pages_from_catalog(&document()).unwrap(), 2);
        assert!(count_pages_from_catalog(&Document::with_version("1.5")).is_err());
    }

    #[test]
    fn test_inherited_media_box_and_crop_box() {
        let doc = document();
        let boxes = page_boxes(&doc);
        assert_eq!(boxes.len(), 2);
        assert_eq!((boxes[0].width, boxes[0].height), (595.0, 842.0));
        assert_eq!((boxes[1].x, boxes[1].y), (10.0, 20.0));
        assert_eq!((boxes[1].width, boxes[1].height), (300.0, 400.0));
    }

    #[test]
    fn test_inherited_resources() {
        let doc = document();
        let first = page_boxes(&doc)[0].id;
        assert!(inherited_resources(&doc, first).has(b"Font"));
    }
}
