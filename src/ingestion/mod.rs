//! Document ingestion: format detection, text extraction and chunking.

mod extractors;
mod format;
mod splitter;
mod stage;

pub use extractors::{
    default_extractor, DocxExtractor, PdfExtractor, PlainTextExtractor, TesseractExtractor,
    TextExtractor,
};
pub use format::DocumentFormat;
pub use splitter::RecursiveSplitter;
pub use stage::{Extraction, IngestReport, IngestionStage};
