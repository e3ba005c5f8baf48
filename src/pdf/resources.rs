//! Page resource and content-stream plumbing

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::Result;
use crate::pdf::page::inherited_resources;

/// Give the page its own resolved Resources dictionary (inherited or
/// referenced resources are copied onto the page) and return it for editing.
fn own_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut resources = inherited_resources(doc, page_id);

    // Resolve referenced category dictionaries so new entries can be added
    let categories: [&[u8]; 3] = [b"Font", b"XObject", b"ExtGState"];
    for category in categories {
        if let Ok(Object::Reference(id)) = resources.get(category) {
            let resolved = match doc.get_object(*id) {
                Ok(Object::Dictionary(dict)) => dict.clone(),
                _ => Dictionary::new(),
            };
            resources.set(category.to_vec(), Object::Dictionary(resolved));
        }
    }
    resources
}

/// First `prefix<N>` not already used in the dictionary
fn unused_name(dict: &Dictionary, prefix: &str) -> String {
    (1..)
        .map(|n| format!("{}{}", prefix, n))
        .find(|name| !dict.has(name.as_bytes()))
        .unwrap_or_else(|| prefix.to_string())
}

/// Register `object_id` in the page's `category` resources under a name that
/// does not collide with existing entries. Returns the chosen name.
pub fn add_page_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &str,
    prefix: &str,
    object_id: ObjectId,
) -> Result<String> {
    let mut resources = own_resources(doc, page_id);

    let mut entries = match resources.get(category.as_bytes()) {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };
    let name = unused_name(&entries, prefix);
    entries.set(name.clone(), Object::Reference(object_id));
    resources.set(category, Object::Dictionary(entries));

    let page = doc.get_dictionary_mut(page_id)?;
    page.set("Resources", Object::Dictionary(resources));
    Ok(name)
}

/// Page content streams in order. A Contents reference to an array object
/// is flattened into the array's stream references.
fn contents(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>> {
    let page = doc.get_dictionary(page_id)?;
    Ok(match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    })
}

/// Prepend a content stream to a page's Contents
pub fn prepend_content_to_page(
    doc: &mut Document,
    page_id: ObjectId,
    new_content_id: ObjectId,
) -> Result<()> {
    let mut items = contents(doc, page_id)?;
    items.insert(0, Object::Reference(new_content_id));
    let page = doc.get_dictionary_mut(page_id)?;
    page.set("Contents", Object::Array(items));
    Ok(())
}

/// Append a content stream to a page's Contents
///
/// Appended content is drawn on top of everything already on the page.
pub fn append_content_to_page(
    doc: &mut Document,
    page_id: ObjectId,
    new_content_id: ObjectId,
) -> Result<()> {
    let mut items = contents(doc, page_id)?;
    items.push(Object::Reference(new_content_id));
    let page = doc.get_dictionary_mut(page_id)?;
    page.set("Contents", Object::Array(items));
    Ok(())
}

/// Add a content stream object, Flate-compressed
pub fn add_content_stream(doc: &mut Document, content: Vec<u8>) -> Result<ObjectId> {
    let mut stream = Stream::new(Dictionary::new(), content);
    stream.compress()?;
    Ok(doc.add_object(stream))
}

/// Isolate the page's original content in its own graphics state so that
/// anything appended afterwards starts from the default state.
///
/// The original streams are referenced unchanged between a `q` and a `Q`
/// stream.
pub fn isolate_page_content(doc: &mut Document, page_id: ObjectId) -> Result<()> {
    if contents(doc, page_id)?.is_empty() {
        return Ok(());
    }
    let open = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let close = doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));
    prepend_content_to_page(doc, page_id, open)?;
    append_content_to_page(doc, page_id, close)?;
    Ok(())
}
