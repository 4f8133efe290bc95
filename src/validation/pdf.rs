// src/validation/pdf.rs
//! Page counting and text sampling on top of lopdf.
use crate::utils::error::ValidationError;
use lopdf::Document;
use std::path::Path;

/// Number of pages in an in-memory PDF.
pub fn page_count_from_bytes(bytes: &[u8]) -> Result<usize, ValidationError> {
    let document = Document::load_mem(bytes).map_err(|e| ValidationError::Pdf(e.to_string()))?;
    Ok(document.get_pages().len())
}

/// Page count plus the text of the first `max_pages` pages.
///
/// The text is `Err` when the document opens but its text cannot be
/// extracted; callers report that as an issue rather than a hard failure.
pub fn inspect_pdf(
    path: &Path,
    max_pages: usize,
) -> Result<(usize, Result<String, ValidationError>), ValidationError> {
    if !path.exists() {
        return Err(ValidationError::FileNotFound(path.display().to_string()));
    }
    let document = Document::load(path)
        .map_err(|e| ValidationError::Pdf(format!("{}: {}", path.display(), e)))?;
    let pages = document.get_pages();
    let page_count = pages.len();

    let page_numbers: Vec<u32> = pages.keys().copied().take(max_pages).collect();
    let text = if page_numbers.is_empty() {
        Ok(String::new())
    } else {
        document
            .extract_text(&page_numbers)
            .map_err(|e| ValidationError::Text(e.to_string()))
    };
    Ok((page_count, text))
}

/// Builds a PDF with `pages` pages; the first page carries `first_page_text`.
#[cfg(test)]
pub(crate) fn sample_pdf(pages: usize, first_page_text: &str) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for i in 0..pages {
        let text = if i == 0 { first_page_text.to_string() } else { format!("Page {}", i + 1) };
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content should encode"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("sample PDF should serialize");
    bytes
}
