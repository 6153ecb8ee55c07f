//! Page-oriented text extraction for uploaded course documents.
//!
//! The ingestion pipeline hands over raw bytes plus a file name; this module
//! picks an extractor from the extension and returns one [`PageText`] per page
//! (PDF), slide (PPTX) or whole document (DOCX, plain text). Failures are
//! returned as [`ExtractError`] so the pipeline can skip the file.

use std::io::Read;
use std::path::Path;

use thiserror::Error;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// The kinds of document the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Pptx,
    PlainText,
}

impl DocumentKind {
    /// Guess the document kind from a file name's extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "docx" => Some(DocumentKind::Docx),
            "pptx" => Some(DocumentKind::Pptx),
            "txt" | "md" => Some(DocumentKind::PlainText),
            _ => None,
        }
    }
}

/// Text of one page (or slide) of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    /// 1-based.
    pub page: u32,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document type: {0}")]
    Unsupported(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("text is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Extract per-page text from `bytes`, choosing the extractor by `file_name`.
///
/// Pages whose text is empty after trimming are dropped; an `Ok` with no
/// pages means the document parsed but contains no text.
pub fn extract_pages(file_name: &str, bytes: &[u8]) -> Result<Vec<PageText>, ExtractError> {
    let kind = DocumentKind::from_file_name(file_name)
        .ok_or_else(|| ExtractError::Unsupported(file_name.to_string()))?;

    let raw: Vec<String> = match kind {
        DocumentKind::Pdf => extract_pdf(bytes)?,
        DocumentKind::Docx => vec![extract_docx(bytes)?],
        DocumentKind::Pptx => extract_pptx(bytes)?,
        DocumentKind::PlainText => vec![String::from_utf8(bytes.to_vec())?],
    };

    Ok(raw
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| PageText {
            page: i as u32 + 1,
            text,
        })
        .collect())
}

fn extract_pdf(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    // pdf-extract can panic on malformed input; treat that like any other parse failure.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes)) {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("parser panicked on malformed input".to_string())),
    }
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    collect_text_runs(&xml, b"p")
}

fn extract_pptx(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    slide_names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    let mut slides = Vec::with_capacity(slide_names.len());
    for name in slide_names {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        slides.push(collect_text_runs(&xml, b"p")?);
    }
    Ok(slides)
}

/// Concatenate the text of every `<*:t>` element, breaking lines at the end
/// of each `paragraph` element.
fn collect_text_runs(xml: &[u8], paragraph: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"t" {
                    in_text = false;
                } else if name.as_ref() == paragraph && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with(entries: &[(&str, String)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            for (name, body) in entries {
                zip.start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    fn minimal_pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        let n = pages.len();
        let font_id = 3 + 2 * n;
        let mut objects: Vec<String> = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            format!(
                "<< /Type /Pages /Kids [{}] /Count {} >>",
                (0..n)
                    .map(|i| format!("{} 0 R", 3 + 2 * i))
                    .collect::<Vec<_>>()
                    .join(" "),
                n
            ),
        ];
        for (i, text) in pages.iter().enumerate() {
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 {} 0 R >> >> >>",
                4 + 2 * i,
                font_id
            ));
            let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", text);
            objects.push(format!(
                "<< /Length {} >> stream\n{}\nendstream",
                content.len(),
                content
            ));
        }
        objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string());

        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj {} endobj\n", i + 1, body).as_bytes());
        }
        let xref_start = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
        out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
        for offset in offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                xref_start
            )
            .as_bytes(),
        );
        out
    }

    #[test]
    fn pdf_pages_are_numbered_from_one() {
        let pdf = minimal_pdf_with_pages(&["alpha page one", "beta page two"]);
        let pages = extract_pages("lecture.pdf", &pdf).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page, 1);
        assert!(pages[0].text.contains("alpha page one"), "{:?}", pages[0]);
        assert_eq!(pages[1].page, 2);
        assert!(pages[1].text.contains("beta page two"), "{:?}", pages[1]);
    }

    #[test]
    fn kind_from_extension() {
        assert_eq!(DocumentKind::from_file_name("notes.PDF"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_file_name("w1.md"), Some(DocumentKind::PlainText));
        assert_eq!(DocumentKind::from_file_name("archive.tar"), None);
        assert_eq!(DocumentKind::from_file_name("README"), None);
    }

    #[test]
    fn unsupported_type_returns_error() {
        let err = extract_pages("data.bin", b"foo").unwrap_err();
        assert!(matches!(err, ExtractError::Unsupported(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_pages("lecture.pdf", b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_pages("syllabus.docx", b"not a zip").unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn plain_text_is_single_page() {
        let pages = extract_pages("week1.txt", b"Photosynthesis converts light.").unwrap();
        assert_eq!(
            pages,
            vec![PageText {
                page: 1,
                text: "Photosynthesis converts light.".to_string()
            }]
        );
    }

    #[test]
    fn blank_text_yields_no_pages() {
        assert!(extract_pages("empty.txt", b"  \n\n ").unwrap().is_empty());
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let xml = "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>\
            <w:p><w:r><w:t>Newton's first law</w:t></w:r></w:p>\
            <w:p><w:r><w:t>An object at rest</w:t></w:r><w:r><w:t xml:space=\"preserve\"> stays at rest.</w:t></w:r></w:p>\
            </w:body></w:document>"
            .to_string();
        let docx = zip_with(&[("word/document.xml", xml)]);
        let pages = extract_pages("physics.docx", &docx).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(
            pages[0].text,
            "Newton's first law\nAn object at rest stays at rest."
        );
    }

    #[test]
    fn pptx_slides_are_pages_in_numeric_order() {
        let slide = |text: &str| {
            format!(
                "<p:sld xmlns:p=\"p\" xmlns:a=\"a\"><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:sld>",
                text
            )
        };
        let pptx = zip_with(&[
            ("ppt/slides/slide10.xml", slide("ten")),
            ("ppt/slides/slide2.xml", slide("two")),
            ("ppt/slides/slide1.xml", slide("one")),
        ]);
        let pages = extract_pages("deck.pptx", &pptx).unwrap();
        let texts: Vec<&str> = pages.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "ten"]);
        assert_eq!(pages[2].page, 3);
    }
}
