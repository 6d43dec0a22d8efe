use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::core::errors::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    PlainText,
    Image,
}

impl DocumentFormat {
    /// Resolve the format from a file name's extension, case-insensitively.
    pub fn from_name(name: &str) -> Result<Self, PipelineError> {
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "docx" | "doc" => Ok(DocumentFormat::Docx),
            "txt" | "md" | "csv" => Ok(DocumentFormat::PlainText),
            "png" | "jpg" | "jpeg" | "tiff" | "bmp" => Ok(DocumentFormat::Image),
            "" => Err(PipelineError::UnsupportedFormat(format!(
                "'{}' has no file extension",
                name
            ))),
            other => Err(PipelineError::UnsupportedFormat(format!(".{}", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::PlainText => "plain_text",
            DocumentFormat::Image => "image",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
