//! Integration tests for the document watermark library

use std::io::{Cursor, Write};
use std::sync::Arc;

use doc_watermark::color::ColorSpec;
use doc_watermark::fonts::{FontCache, FontChain, FontSource};
use doc_watermark::geometry::{compute_anchors, Frame, VerticalOrigin};
use doc_watermark::language::SecurityOptions;
use doc_watermark::ooxml::{docx_text, WordPackage};
use doc_watermark::pdf::page_boxes;
use doc_watermark::spec::{Corner, OutputFormat, PatternOptions, Placement, Spacing};
use doc_watermark::{Error, InputFile, OutputKind, Processor, ProcessorConfig, WatermarkSpec};
use lopdf::content::Content;
use lopdf::{dictionary, Document, Object, Stream};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const BODY: &[u8] = b"BT /F1 24 Tf 72 700 Td (Original body text) Tj ET";

/// Font source that is always offline
struct Unreachable;

impl FontSource for Unreachable {
    fn kind(&self) -> &'static str {
        "unreachable"
    }

    fn fetch(&self, id: &str) -> doc_watermark::Result<Vec<u8>> {
        Err(Error::FontUnavailable(format!("{}: network unreachable", id)))
    }
}

fn offline_processor() -> Processor {
    let mut fonts = FontChain::new(Arc::new(FontCache::new()));
    fonts.push(Arc::new(Unreachable), "https://fonts.invalid/NotoSansSC.otf");
    Processor::new(ProcessorConfig { margin: None, fonts })
}

/// Single-page PDF with one line of Helvetica text
fn single_page_pdf(width: i64, height: i64) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let content_id = doc.add_object(Stream::new(dictionary! {}, BODY.to_vec()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// Word package with one paragraph per entry
fn docx(paragraphs: &[String]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    docx_with_body(&body)
}

/// Word package whose body holds `body` followed by section properties
fn docx_with_body(body: &str) -> Vec<u8> {
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}<w:sectPr/></w:body></w:document>"#,
        body
    );

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(b"<Types/>").unwrap();
    zip.start_file("word/document.xml", options).unwrap();
    zip.write_all(xml.as_bytes()).unwrap();
    zip.finish().unwrap().into_inner()
}

/// Operators of the last content stream of every page
fn watermark_operators(pdf: &[u8]) -> Vec<Vec<String>> {
    let doc = Document::load_mem(pdf).unwrap();
    page_boxes(&doc)
        .iter()
        .map(|page| {
            let contents = doc.get_dictionary(page.id).unwrap().get(b"Contents").unwrap();
            let last = contents.as_array().unwrap().last().unwrap().as_reference().unwrap();
            let stream = doc.get_object(last).unwrap().as_stream().unwrap();
            let content = Content::decode(&stream.get_plain_content().unwrap()).unwrap();
            content.operations.into_iter().map(|op| op.operator).collect()
        })
        .collect()
}

fn all_stream_contents(pdf: &[u8]) -> Vec<Vec<u8>> {
    let doc = Document::load_mem(pdf).unwrap();
    doc.objects
        .values()
        .filter_map(|o| o.as_stream().ok())
        .map(|s| s.content.clone())
        .collect()
}

#[test]
fn test_a4_default_pattern_has_fifteen_anchors() {
    let placement = Placement::Pattern(PatternOptions {
        spacing: Spacing { x: 200.0, y: 150.0 },
        stagger: false,
        ..Default::default()
    });
    let frame = Frame::new(595.0, 842.0, 50.0, 0.0, VerticalOrigin::Top);
    let anchors = compute_anchors(&frame, &placement);

    assert_eq!(anchors.len(), 15);
    for a in &anchors {
        assert!(a.x >= 50.0 && a.x <= 545.0);
        assert!(a.y >= 50.0 && a.y <= 792.0);
    }
}

#[test]
fn test_bottom_right_corner_pdf_uses_native_text() {
    let spec = WatermarkSpec {
        content: "WATERMARK".to_string(),
        placement: Placement::Corner { corner: Corner::BottomRight },
        ..Default::default()
    };
    let input = InputFile::new("letter.pdf", single_page_pdf(612, 792));
    let output = offline_processor().process(&input, &spec).unwrap();

    assert_eq!(output.format, OutputKind::Pdf);
    assert_eq!(output.metadata.page_count, 1);

    let ops = &watermark_operators(&output.bytes)[0];
    assert_eq!(ops.iter().filter(|op| *op == "Tj").count(), 1);
    assert!(!ops.iter().any(|op| op == "Do"));

    let doc = Document::load_mem(&output.bytes).unwrap();
    let text = doc.extract_text(&[1]).unwrap();
    assert!(text.contains("Original body text"));
    assert!(text.contains("WATERMARK"));
}

#[test]
fn test_cjk_pdf_without_font_uses_image_and_preserves_content() {
    let spec = WatermarkSpec {
        content: "机密文档".to_string(),
        placement: Placement::Center,
        ..Default::default()
    };
    let original = single_page_pdf(595, 842);
    let input = InputFile::new("contract.pdf", original.clone());
    let output = offline_processor().process(&input, &spec).unwrap();

    let ops = &watermark_operators(&output.bytes)[0];
    assert!(ops.iter().any(|op| op == "Do"));
    assert!(!ops.iter().any(|op| op == "Tj"));

    // The original page stream is carried over unchanged
    assert!(all_stream_contents(&output.bytes).iter().any(|c| c.as_slice() == BODY));
    let doc = Document::load_mem(&output.bytes).unwrap();
    assert!(doc.extract_text(&[1]).unwrap().contains("Original body text"));
}

#[test]
fn test_docx_pattern_inserts_six_paragraphs_first() {
    let paragraphs: Vec<String> = (1..=10).map(|i| format!("Paragraph {}", i)).collect();
    let spec = WatermarkSpec {
        content: "DRAFT".to_string(),
        placement: Placement::default(),
        ..Default::default()
    };
    let input = InputFile::new("minutes.docx", docx(&paragraphs));
    let output = offline_processor().process(&input, &spec).unwrap();
    assert_eq!(output.format, OutputKind::Docx);

    let text = docx_text(&output.bytes).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 16);
    assert!(lines[..6].iter().all(|l| *l == "DRAFT"));
    let originals: Vec<String> = lines[6..].iter().map(|l| l.to_string()).collect();
    assert_eq!(originals, paragraphs);

    let package = WordPackage::from_bytes(&output.bytes).unwrap();
    let xml = String::from_utf8(package.document_xml().to_vec()).unwrap();
    let alignments: Vec<&str> = xml
        .match_indices(r#"<w:jc w:val=""#)
        .map(|(i, m)| {
            let rest = &xml[i + m.len()..];
            &rest[..rest.find('"').unwrap()]
        })
        .collect();
    assert_eq!(alignments, vec!["left", "center", "right", "left", "center", "right"]);
}

#[test]
fn test_docx_original_runs_are_byte_identical() {
    let body = concat!(
        r#"<w:p><w:pPr><w:jc w:val="both"/></w:pPr>"#,
        r#"<w:r><w:rPr><w:b/></w:rPr><w:t>Terms &amp; conditions</w:t></w:r>"#,
        r#"<w:r><w:t xml:space="preserve"> apply </w:t></w:r></w:p>"#,
        r#"<w:p/>"#,
        r#"<w:p><w:r><w:t>Ünïcödé “quoted”</w:t></w:r>"#,
        r#"<w:r><w:tab/><w:t>tail</w:t></w:r></w:p>"#,
    );
    let spec = WatermarkSpec {
        content: "DRAFT".to_string(),
        ..Default::default()
    };
    let input = InputFile::new("terms.docx", docx_with_body(body));
    let output = offline_processor().process(&input, &spec).unwrap();

    let package = WordPackage::from_bytes(&output.bytes).unwrap();
    let xml = String::from_utf8(package.document_xml().to_vec()).unwrap();
    let at = xml.find(body).expect("original paragraphs copied byte for byte");
    assert!(xml[at + body.len()..].starts_with("<w:sectPr/></w:body>"));

    // All six watermark paragraphs come before the original ones
    assert_eq!(xml[..at].matches("DRAFT</w:t>").count(), 6);
    assert_eq!(xml[at..].matches("DRAFT").count(), 0);
}

#[test]
fn test_language_gate() {
    let blocked = WatermarkSpec {
        content: "水印测试".to_string(),
        security: SecurityOptions {
            block_chinese_characters: true,
            allowed_languages: None,
        },
        ..Default::default()
    };
    let input = InputFile::new("doc.pdf", single_page_pdf(612, 792));
    let processor = offline_processor();

    let err = processor.process(&input, &blocked).unwrap_err();
    assert!(matches!(err.root(), Error::LanguageBlocked(_)));

    let allowed = WatermarkSpec {
        security: SecurityOptions::default(),
        ..blocked
    };
    assert!(processor.process(&input, &allowed).is_ok());
}

#[test]
fn test_word_to_pdf_watermarks_every_page() {
    let paragraphs: Vec<String> = (1..=120).map(|i| format!("Line number {}", i)).collect();
    let spec = WatermarkSpec {
        output_format: OutputFormat::WordToPdf,
        ..Default::default()
    };
    let input = InputFile::new("long.docx", docx(&paragraphs));
    let output = offline_processor().process(&input, &spec).unwrap();

    assert_eq!(output.format, OutputKind::Pdf);
    assert!(output.metadata.page_count >= 3);
    let pages = watermark_operators(&output.bytes);
    assert_eq!(pages.len(), output.metadata.page_count);
    for ops in &pages {
        assert!(ops.iter().any(|op| op == "Tj"));
    }
}

#[test]
fn test_word_to_pdf_with_embedded_font() {
    let paragraphs: Vec<String> = (1..=80)
        .map(|i| format!("Абзац номер {} \u{2014} черновик", i))
        .collect();
    let spec = WatermarkSpec {
        content: "Черновик".to_string(),
        output_format: OutputFormat::WordToPdf,
        ..Default::default()
    };
    let input = InputFile::new("report.docx", docx(&paragraphs));
    let output = offline_processor().process(&input, &spec).unwrap();

    assert_eq!(output.format, OutputKind::Pdf);
    assert!(output.metadata.page_count >= 2);

    let doc = Document::load_mem(&output.bytes).unwrap();
    let first = doc.extract_text(&[1]).unwrap();
    assert!(first.contains("Абзац номер 1 "));
    let last = doc.extract_text(&[output.metadata.page_count as u32]).unwrap();
    assert!(last.contains("Абзац номер 80"));

    // Body text and watermark are native text on every page
    for ops in watermark_operators(&output.bytes) {
        assert!(ops.iter().any(|op| op == "Tj"));
        assert!(!ops.iter().any(|op| op == "Do"));
    }
}

#[test]
fn test_extreme_pattern_offsets_complete() {
    let input = InputFile::new("doc.pdf", single_page_pdf(595, 842));
    let processor = offline_processor();
    for json in [
        r#"{ "placement": { "type": "pattern", "offset": { "x": 0, "y": -1e30 } } }"#,
        r#"{ "placement": { "type": "pattern", "offset": { "x": -1e30, "y": 1e30 } } }"#,
    ] {
        let spec = WatermarkSpec::from_json(json).unwrap();
        assert!(processor.process(&input, &spec).is_ok());
    }
}

#[test]
fn test_multi_color_is_picked_per_instance() {
    let spec = WatermarkSpec {
        color: ColorSpec::Multi {
            palette: vec!["#FF0000".to_string(), "#00FF00".to_string(), "#0000FF".to_string()],
        },
        ..Default::default()
    };
    let input = InputFile::new("doc.pdf", single_page_pdf(612, 792));
    let mut rng = StdRng::seed_from_u64(11);
    let output = offline_processor().process_with_rng(&input, &spec, &mut rng).unwrap();

    let doc = Document::load_mem(&output.bytes).unwrap();
    let page = page_boxes(&doc)[0].id;
    let contents = doc.get_dictionary(page).unwrap().get(b"Contents").unwrap();
    let last = contents.as_array().unwrap().last().unwrap().as_reference().unwrap();
    let stream = doc.get_object(last).unwrap().as_stream().unwrap();
    let content = Content::decode(&stream.get_plain_content().unwrap()).unwrap();

    let mut fills: Vec<String> = content
        .operations
        .iter()
        .filter(|op| op.operator == "rg")
        .map(|op| format!("{:?}", op.operands))
        .collect();
    assert!(fills.len() > 3);
    fills.sort();
    fills.dedup();
    assert!(fills.len() > 1);
}

#[test]
fn test_outputs_written_to_disk() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let processor = offline_processor();
    let spec = WatermarkSpec::default();

    let input = InputFile::new("doc.pdf", single_page_pdf(612, 792));
    let output = processor.process(&input, &spec).unwrap();
    let path = temp_dir.path().join(format!("doc-watermarked.{}", output.format.extension()));
    std::fs::write(&path, &output.bytes).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let doc = Document::load_mem(&bytes).unwrap();
    assert_eq!(doc.get_pages().len(), 1);
    assert!(output.data_url().starts_with("data:application/pdf;base64,JVBER"));
}

#[test]
fn test_corrupt_inputs_fail_with_file_name() {
    let processor = offline_processor();
    let spec = WatermarkSpec::default();

    let err = processor
        .process(&InputFile::new("broken.pdf", b"%PDF-1.7 garbage".to_vec()), &spec)
        .unwrap_err();
    assert!(matches!(err.root(), Error::InvalidInput(_)));
    assert!(err.to_string().starts_with("broken.pdf:"));

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("word/styles.xml", SimpleFileOptions::default()).unwrap();
    zip.write_all(b"<w:styles/>").unwrap();
    let not_word = zip.finish().unwrap().into_inner();
    let err = processor
        .process(&InputFile::new("empty.docx", not_word), &spec)
        .unwrap_err();
    assert!(matches!(err.root(), Error::PackageMalformed(_)));
}
