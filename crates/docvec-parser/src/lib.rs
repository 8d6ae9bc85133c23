//! docvec Parser - Text extraction and chunking
//!
//! Supports extracting text from:
//! - PDF documents
//! - Plain text files (and Markdown, treated as plain text)
//!
//! Each parser implements the `DocumentParser` trait and produces a
//! `ParsedDocument` whose content is then split into overlapping
//! fragments by the chunking engine in [`chunk`].

use std::path::Path;
use thiserror::Error;

pub mod chunk;
pub mod pdf;

pub use chunk::{chunk_text, chunks, ChunkConfig, Chunks, TextChunk};
pub use pdf::PdfParser;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during text extraction and chunking
#[derive(Error, Debug)]
pub enum ParserError {
    /// File format is not supported
    #[error("Unsupported content type: {0}")]
    UnsupportedFormat(String),

    /// No text left after extraction
    #[error("Document is empty: {0}")]
    EmptyDocument(String),

    /// Chunk size / overlap combination cannot make progress
    #[error("Invalid chunk configuration: {0}")]
    InvalidChunkConfig(String),

    /// IO error while reading the file
    #[error("IO error reading file: {path}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// PDF parsing error
    #[error("PDF parsing error: {0}")]
    PdfError(String),

    /// File is encrypted and cannot be parsed
    #[error("File is encrypted and requires a password: {0}")]
    EncryptedFile(String),

    /// File is corrupted or malformed
    #[error("File is corrupted or malformed: {0}")]
    CorruptedFile(String),

    /// Encoding error
    #[error("Text encoding error: {0}")]
    EncodingError(String),
}

impl ParserError {
    /// Whether the error stems from caller input rather than a broken file
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat(_) | Self::EmptyDocument(_) | Self::InvalidChunkConfig(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ParserError>;

// ============================================================================
// Parsed Document Types
// ============================================================================

/// A parsed document with extracted content
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// Original file name
    pub file_name: String,

    /// Detected file type
    pub file_type: FileType,

    /// Extracted text content
    pub content: String,

    /// Number of pages (if known)
    pub page_count: Option<u32>,
}

impl ParsedDocument {
    /// Create a new parsed document
    pub fn new(file_name: impl Into<String>, file_type: FileType) -> Self {
        Self {
            file_name: file_name.into(),
            file_type,
            content: String::new(),
            page_count: None,
        }
    }

    /// Set content
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Get total character count
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }

    /// Whether nothing but whitespace was extracted
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Supported file types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Pdf,
    Markdown,
    PlainText,
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "md" | "markdown" => Self::Markdown,
            "txt" | "text" => Self::PlainText,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from path
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }

    /// Detect file type from a MIME type, ignoring parameters like `charset`
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime.split(';').next().unwrap_or("").trim().to_lowercase();
        match essence.as_str() {
            "application/pdf" => Self::Pdf,
            "text/markdown" | "text/x-markdown" => Self::Markdown,
            "text/plain" => Self::PlainText,
            _ => Self::Unknown,
        }
    }

    /// Get MIME type
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Markdown => "text/markdown",
            Self::PlainText => "text/plain",
            Self::Unknown => "application/octet-stream",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pdf => write!(f, "pdf"),
            Self::Markdown => write!(f, "markdown"),
            Self::PlainText => write!(f, "text"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ============================================================================
// Parser Trait
// ============================================================================

/// Trait for document parsers
pub trait DocumentParser: Send + Sync {
    /// Parse a document from its raw bytes
    fn parse_bytes(&self, bytes: &[u8], file_name: &str) -> Result<ParsedDocument>;

    /// Parse a document from a file path
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let bytes = std::fs::read(path).map_err(|e| ParserError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.parse_bytes(&bytes, &file_name)
    }

    /// Get supported file types
    fn supported_types(&self) -> &[FileType];

    /// Check if this parser can handle a file type
    fn can_parse(&self, file_type: FileType) -> bool {
        self.supported_types().contains(&file_type)
    }
}

// ============================================================================
// Parser Registry
// ============================================================================

/// Registry of available parsers
pub struct ParserRegistry {
    parsers: Vec<Box<dyn DocumentParser>>,
}

impl ParserRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Registry with the PDF and plain-text parsers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PdfParser::new());
        registry.register(PlainTextParser);
        registry
    }

    /// Register a parser
    pub fn register<P: DocumentParser + 'static>(&mut self, parser: P) {
        self.parsers.push(Box::new(parser));
    }

    /// Find a parser for a file type
    pub fn find_parser(&self, file_type: FileType) -> Option<&dyn DocumentParser> {
        self.parsers
            .iter()
            .find(|p| p.can_parse(file_type))
            .map(|p| p.as_ref())
    }

    /// Extract text from uploaded bytes given their MIME type
    pub fn parse_upload(
        &self,
        bytes: &[u8],
        file_name: &str,
        mime_type: &str,
    ) -> Result<ParsedDocument> {
        let file_type = FileType::from_mime(mime_type);
        if file_type == FileType::Unknown {
            return Err(ParserError::UnsupportedFormat(mime_type.to_string()));
        }

        let parser = self
            .find_parser(file_type)
            .ok_or_else(|| ParserError::UnsupportedFormat(mime_type.to_string()))?;

        parser.parse_bytes(bytes, file_name)
    }

    /// Parse a file using the appropriate parser
    pub fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let file_type = FileType::from_path(path);

        if file_type == FileType::Unknown {
            return Err(ParserError::UnsupportedFormat(
                path.extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("none")
                    .to_string(),
            ));
        }

        let parser = self
            .find_parser(file_type)
            .ok_or_else(|| ParserError::UnsupportedFormat(file_type.to_string()))?;

        parser.parse(path)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ============================================================================
// Plain Text
// ============================================================================

/// Plain text parser
pub struct PlainTextParser;

impl PlainTextParser {
    /// Decode bytes as UTF-8, dropping a byte-order mark.
    ///
    /// Falls back to lossy decoding so a stray invalid byte does not reject
    /// an otherwise readable upload; input that is mostly undecodable is an
    /// encoding error.
    pub fn decode(bytes: &[u8]) -> Result<String> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

        match std::str::from_utf8(bytes) {
            Ok(text) => Ok(text.to_string()),
            Err(_) => {
                let text = String::from_utf8_lossy(bytes);
                let replaced = text.chars().filter(|c| *c == '\u{FFFD}').count();
                if replaced * 4 > text.chars().count() {
                    return Err(ParserError::EncodingError(
                        "content is not UTF-8 text".to_string(),
                    ));
                }
                Ok(text.into_owned())
            }
        }
    }
}

impl DocumentParser for PlainTextParser {
    fn parse_bytes(&self, bytes: &[u8], file_name: &str) -> Result<ParsedDocument> {
        let content = Self::decode(bytes)?;

        Ok(ParsedDocument::new(file_name, FileType::PlainText).with_content(content))
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::PlainText, FileType::Markdown]
    }
}

// ============================================================================
// Tests
// ============================================================================
