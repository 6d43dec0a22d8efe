//! Text extraction strategies, one per [`DocumentFormat`].
//!
//! Extractors are blocking; callers run them on the blocking pool.

use std::io::{Cursor, Read, Write};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use regex::Regex;

use super::format::DocumentFormat;
use crate::core::errors::PipelineError;

pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String, PipelineError>;
}

pub fn default_extractor(format: DocumentFormat) -> Box<dyn TextExtractor> {
    match format {
        DocumentFormat::Pdf => Box::new(PdfExtractor),
        DocumentFormat::Docx => Box::new(DocxExtractor),
        DocumentFormat::PlainText => Box::new(PlainTextExtractor),
        DocumentFormat::Image => Box::new(TesseractExtractor),
    }
}

pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, PipelineError> {
        pdf_extract::extract_text_from_mem(bytes)
            .map_err(|err| PipelineError::ExtractionFailure(format!("PDF: {}", err)))
    }
}

/// Reads `word/document.xml` out of the archive, one line per paragraph.
pub struct DocxExtractor;

impl TextExtractor for DocxExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, PipelineError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|err| {
            PipelineError::ExtractionFailure(format!("failed to read DOCX as ZIP: {}", err))
        })?;

        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .map_err(|err| {
                PipelineError::ExtractionFailure(format!("missing word/document.xml: {}", err))
            })?
            .read_to_string(&mut xml)
            .map_err(|err| {
                PipelineError::ExtractionFailure(format!("failed to read document.xml: {}", err))
            })?;

        Ok(paragraphs_from_xml(&xml))
    }
}

fn text_run_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>").expect("text run pattern is valid")
    })
}

fn paragraphs_from_xml(xml: &str) -> String {
    let mut text = String::new();
    for paragraph in xml.split("</w:p>") {
        for run in text_run_pattern().captures_iter(paragraph) {
            text.push_str(&unescape_xml(&run[1]));
        }
        text.push('\n');
    }
    text.trim_end().to_string()
}

fn unescape_xml(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// UTF-8 text; invalid sequences are replaced rather than rejected.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, PipelineError> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// OCR through the `tesseract` command line tool, when installed.
pub struct TesseractExtractor;

impl TextExtractor for TesseractExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, PipelineError> {
        let binary = which::which("tesseract").map_err(|_| {
            PipelineError::ExtractionFailure("tesseract not found on PATH".to_string())
        })?;

        let mut child = Command::new(binary)
            .args(["stdin", "stdout"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| PipelineError::ExtractionFailure(format!("tesseract: {}", err)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(bytes)
                .map_err(|err| PipelineError::ExtractionFailure(format!("tesseract: {}", err)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|err| PipelineError::ExtractionFailure(format!("tesseract: {}", err)))?;
        if !output.status.success() {
            return Err(PipelineError::ExtractionFailure(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zip::write::SimpleFileOptions;

    fn docx_with(document_xml: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(document_xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let xml = r#"<w:document><w:body>
            <w:p><w:r><w:t>Cats are</w:t></w:r><w:r><w:t xml:space="preserve"> mammals</w:t></w:r></w:p>
            <w:p><w:r><w:t>Fish &amp; chips</w:t></w:r></w:p>
        </w:body></w:document>"#;

        let text = DocxExtractor.extract(&docx_with(xml)).unwrap();
        assert_eq!(text.trim(), "Cats are mammals\nFish & chips");
    }

    #[test]
    fn docx_without_document_xml_fails() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("other.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"hello").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let err = DocxExtractor.extract(&bytes).unwrap_err();
        assert_eq!(err.error_type(), "ExtractionFailure");
    }

    #[test]
    fn non_zip_bytes_are_not_a_docx() {
        assert!(DocxExtractor.extract(b"plain words").is_err());
    }

    #[test]
    fn plain_text_is_decoded_lossily() {
        let text = PlainTextExtractor.extract(b"caf\xff ok").unwrap();
        assert!(text.starts_with("caf"));
        assert!(text.ends_with(" ok"));
    }

    #[test]
    fn garbage_pdf_is_an_extraction_failure() {
        let err = PdfExtractor.extract(b"not a pdf").unwrap_err();
        assert_eq!(err.error_type(), "ExtractionFailure");
    }
}
