//! PDF document parser using pdf-extract
//!
//! Extracts the text layer of PDF uploads. Scanned PDFs without a text
//! layer come back blank and are rejected later as empty documents.

use crate::{DocumentParser, FileType, ParsedDocument, ParserError, Result};

/// PDF document parser
pub struct PdfParser {
    /// Replace form feeds (page breaks) with newlines
    pub normalize_page_breaks: bool,
}

impl PdfParser {
    /// Create a new PDF parser with default settings
    pub fn new() -> Self {
        Self {
            normalize_page_breaks: true,
        }
    }

    /// Extract text from PDF bytes
    fn extract_text(&self, bytes: &[u8]) -> Result<(String, Option<u32>)> {
        if !bytes.starts_with(b"%PDF") {
            return Err(ParserError::CorruptedFile(
                "missing %PDF header".to_string(),
            ));
        }

        let text = pdf_extract::extract_text_from_mem(bytes).map_err(classify_error)?;

        // Rough page count from form feed characters
        let page_breaks = text.matches('\x0C').count() as u32;
        let page_count = if page_breaks > 0 {
            Some(page_breaks + 1)
        } else {
            None
        };

        let text = if self.normalize_page_breaks {
            text.replace('\x0C', "\n")
        } else {
            text
        };

        Ok((text, page_count))
    }
}

/// Map pdf-extract failures onto parser errors
fn classify_error(err: pdf_extract::OutputError) -> ParserError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("encrypt") || lower.contains("password") {
        ParserError::EncryptedFile(message)
    } else if lower.contains("parse") || lower.contains("invalid") || lower.contains("xref") {
        ParserError::CorruptedFile(message)
    } else {
        ParserError::PdfError(message)
    }
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser for PdfParser {
    fn parse_bytes(&self, bytes: &[u8], file_name: &str) -> Result<ParsedDocument> {
        let (text, page_count) = self.extract_text(bytes)?;

        let mut doc = ParsedDocument::new(file_name, FileType::Pdf).with_content(text);
        doc.page_count = page_count;

        Ok(doc)
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Pdf]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_parser_creation() {
        let parser = PdfParser::new();
        assert!(parser.normalize_page_breaks);
    }

    #[test]
    fn test_rejects_non_pdf_bytes() {
        let err = PdfParser::new()
            .parse_bytes(b"just some text", "fake.pdf")
            .unwrap_err();
        assert!(matches!(err, ParserError::CorruptedFile(_)));
    }

    #[test]
    fn test_supported_types() {
        let parser = PdfParser::new();
        assert!(parser.can_parse(FileType::Pdf));
        assert!(!parser.can_parse(FileType::PlainText));
    }
}
