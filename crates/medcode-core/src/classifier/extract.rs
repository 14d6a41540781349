//! Text extraction for non-image artifacts.
//!
//! PDF and DOCX support sit behind the `pdf` and `docx` cargo features; with a feature
//! disabled the matching extractor reports [`ExtractionError::FeatureDisabled`].

use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("DOCX extraction failed: {0}")]
    Docx(String),

    #[error("feature `{0}` is not enabled")]
    FeatureDisabled(&'static str),
}

/// How the artifact's text is obtained, chosen from the filename extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    WordProcessor,
    PlainText,
}

impl DocumentKind {
    pub fn from_filename(filename: &str) -> Self {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("pdf") => Self::Pdf,
            Some("doc" | "docx") => Self::WordProcessor,
            _ => Self::PlainText,
        }
    }
}

/// Extract the full text of `data`; `Ok(None)` when nothing readable was found.
pub fn extract_preview(kind: DocumentKind, data: &[u8]) -> Result<Option<String>, ExtractionError> {
    let text = match kind {
        DocumentKind::Pdf => extract_pdf(data)?,
        DocumentKind::WordProcessor => extract_docx(data)?,
        DocumentKind::PlainText => decode_lossy(data),
    };
    Ok(Some(text).filter(|t| !t.trim().is_empty()))
}

/// Decode as UTF-8, dropping invalid byte sequences.
pub fn decode_lossy(data: &[u8]) -> String {
    data.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

/// Non-empty page texts joined by blank lines.
#[cfg(feature = "pdf")]
pub fn extract_pdf(data: &[u8]) -> Result<String, ExtractionError> {
    let text = pdf_extract::extract_text_from_mem(data)
        .map_err(|err| ExtractionError::Pdf(err.to_string()))?;
    Ok(text
        .split('\x0C')
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n"))
}

#[cfg(not(feature = "pdf"))]
pub fn extract_pdf(_data: &[u8]) -> Result<String, ExtractionError> {
    Err(ExtractionError::FeatureDisabled("pdf"))
}

/// Non-empty paragraph texts joined by newlines.
#[cfg(feature = "docx")]
pub fn extract_docx(data: &[u8]) -> Result<String, ExtractionError> {
    use docx_rs::{read_docx, DocumentChild, ParagraphChild, RunChild};

    let docx = read_docx(data).map_err(|err| ExtractionError::Docx(err.to_string()))?;
    let paragraphs = docx
        .document
        .children
        .iter()
        .filter_map(|child| match child {
            DocumentChild::Paragraph(para) => Some(
                para.children
                    .iter()
                    .filter_map(|pc| match pc {
                        ParagraphChild::Run(run) => Some(
                            run.children
                                .iter()
                                .filter_map(|rc| match rc {
                                    RunChild::Text(t) => Some(t.text.as_str()),
                                    _ => None,
                                })
                                .collect::<String>(),
                        ),
                        _ => None,
                    })
                    .collect::<String>(),
            ),
            _ => None,
        })
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>();
    Ok(paragraphs.join("\n"))
}

#[cfg(not(feature = "docx"))]
pub fn extract_docx(_data: &[u8]) -> Result<String, ExtractionError> {
    Err(ExtractionError::FeatureDisabled("docx"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_extension() {
        assert_eq!(DocumentKind::from_filename("Report.PDF"), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_filename("notes.docx"), DocumentKind::WordProcessor);
        assert_eq!(DocumentKind::from_filename("notes.doc"), DocumentKind::WordProcessor);
        assert_eq!(DocumentKind::from_filename("cbc.txt"), DocumentKind::PlainText);
        assert_eq!(DocumentKind::from_filename("README"), DocumentKind::PlainText);
    }

    #[test]
    fn plain_text_drops_invalid_bytes() {
        let bytes = b"Hemo\xFFglobin 13.5";
        assert_eq!(decode_lossy(bytes), "Hemoglobin 13.5");
    }

    #[test]
    fn blank_text_has_no_preview() {
        let preview = extract_preview(DocumentKind::PlainText, b"  \n\t").unwrap();
        assert!(preview.is_none());
    }

    #[test]
    fn garbage_pdf_is_an_error() {
        let result = extract_preview(DocumentKind::Pdf, b"not a pdf");
        #[cfg(feature = "pdf")]
        assert!(matches!(result, Err(ExtractionError::Pdf(_))));
        #[cfg(not(feature = "pdf"))]
        assert!(matches!(result, Err(ExtractionError::FeatureDisabled("pdf"))));
    }

    #[test]
    fn garbage_docx_is_an_error() {
        let result = extract_preview(DocumentKind::WordProcessor, b"not a zip");
        #[cfg(feature = "docx")]
        assert!(matches!(result, Err(ExtractionError::Docx(_))));
        #[cfg(not(feature = "docx"))]
        assert!(matches!(result, Err(ExtractionError::FeatureDisabled("docx"))));
    }

    #[cfg(feature = "docx")]
    #[test]
    fn docx_paragraphs_are_joined() {
        use docx_rs::{Docx, Paragraph, Run};

        let mut buf = std::io::Cursor::new(Vec::new());
        Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Discharge summary")))
            .add_paragraph(Paragraph::new())
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Post-op day 2")))
            .build()
            .pack(&mut buf)
            .unwrap();
        let text = extract_docx(buf.get_ref()).unwrap();
        assert_eq!(text, "Discharge summary\nPost-op day 2");
    }
}
