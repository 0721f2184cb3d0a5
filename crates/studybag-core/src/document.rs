//! Document Source Adapter
//!
//! Turns an opened catalog material or an uploaded file into the single
//! [`DocumentPayload`] a chat session talks about.
//!
//! Catalog materials carry no file content, so their text comes from a
//! [`TextExtractor`]. The default [`SampleTextExtractor`] renders a fixed
//! preview from the material's metadata; a real extractor can be plugged in
//! without touching the rest of the chat flow.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

use crate::catalog::{Material, MaterialKind};

pub const PDF_MEDIA_TYPE: &str = "application/pdf";

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Invalid file type {declared:?}: please upload a valid PDF file")]
    InvalidInputKind { declared: String },
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentPayload {
    Text { content: String },
    /// `data` is standard base64 of the full file.
    EncodedFile { media_type: String, data: String },
}

impl DocumentPayload {
    pub fn text(content: impl Into<String>) -> Self {
        DocumentPayload::Text {
            content: content.into(),
        }
    }

    pub fn encode_file(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        DocumentPayload::EncodedFile {
            media_type: media_type.into(),
            data: STANDARD.encode(bytes),
        }
    }

    /// `data:<media_type>;base64,<data>` for encoded files.
    pub fn data_uri(&self) -> Option<String> {
        match self {
            DocumentPayload::Text { .. } => None,
            DocumentPayload::EncodedFile { media_type, data } => {
                Some(format!("data:{};base64,{}", media_type, data))
            }
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            DocumentPayload::Text { .. } => "text",
            DocumentPayload::EncodedFile { .. } => "file",
        }
    }
}

/// Produces the text a catalog material is discussed as.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, material: &Material) -> String;
}

/// Deterministic preview text built from the material's metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleTextExtractor;

impl TextExtractor for SampleTextExtractor {
    fn extract(&self, material: &Material) -> String {
        let subject = &material.subject;
        let semester = material.semester;

        let text = match material.kind {
            MaterialKind::QuestionPaper => format!(
                "University: TechVille University\n\
                 Examination: End of Semester Examination, {year}\n\
                 Course: {subject}\n\
                 Semester: {semester}\n\
                 \n\
                 Instructions: Answer any FIVE full questions.\n\
                 \n\
                 1. a) Explain the core concepts of {subject}. (10 Marks)\n   \
                    b) What are the main challenges in this field? (10 Marks)\n\
                 \n\
                 2. a) Describe the architecture of a system related to {subject}. (12 Marks)\n   \
                    b) Write a short note on a relevant algorithm or protocol. (8 Marks)\n\
                 \n\
                 3. ...",
                year = material.year,
            ),
            MaterialKind::Notes => format!(
                "Chapter 1: Introduction to {subject}\n\
                 \n\
                 1.1: What is {subject}?\n\
                 {subject} is a fundamental area of computer science that deals with...\n\
                 \n\
                 1.2: Key Terminologies\n\
                 - TKO (The Key Object): Represents the primary data structure.\n\
                 - PQR (Process Query Rule): A method for accessing TKO.\n\
                 \n\
                 This document provides a comprehensive overview of {title}.\n\
                 Description: {description}",
                title = material.title,
                description = material.description,
            ),
            MaterialKind::Syllabus => format!(
                "Course Code: CS{semester}01\n\
                 Course Title: {subject}\n\
                 Semester: {semester}\n\
                 \n\
                 Module 1: Introduction\n\
                 - Overview of the subject\n\
                 - Historical context and evolution\n\
                 \n\
                 Module 2: Core Concepts\n\
                 - Fundamental principles and theories\n\
                 - Key algorithms and data structures\n\
                 \n\
                 Module 3: Advanced Topics\n\
                 - In-depth study of specialized areas\n\
                 - Practical applications and case studies"
            ),
        };

        text.trim().to_string()
    }
}

pub struct DocumentSource {
    extractor: Box<dyn TextExtractor>,
}

impl Default for DocumentSource {
    fn default() -> Self {
        Self::new(Box::new(SampleTextExtractor))
    }
}

impl DocumentSource {
    pub fn new(extractor: Box<dyn TextExtractor>) -> Self {
        Self { extractor }
    }

    pub fn from_material(&self, material: &Material) -> DocumentPayload {
        DocumentPayload::text(self.extractor.extract(material))
    }

    /// Only PDFs are accepted. The bytes are not inspected.
    pub fn from_upload(
        &self,
        name: &str,
        declared_media_type: &str,
        bytes: &[u8],
    ) -> Result<DocumentPayload, DocumentError> {
        if declared_media_type != PDF_MEDIA_TYPE {
            tracing::debug!(name, declared_media_type, "rejected upload");
            return Err(DocumentError::InvalidInputKind {
                declared: declared_media_type.to_string(),
            });
        }

        tracing::debug!(name, size = bytes.len(), "encoded upload");
        Ok(DocumentPayload::encode_file(declared_media_type, bytes))
    }

    /// The media type is declared by the file extension, as a browser would.
    /// Rejection happens before the file is read.
    pub fn from_path(&self, path: &Path) -> Result<DocumentPayload, DocumentError> {
        let declared = media_type_for_path(path);
        if declared != PDF_MEDIA_TYPE {
            return Err(DocumentError::InvalidInputKind {
                declared: declared.to_string(),
            });
        }

        let bytes = std::fs::read(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.from_upload(&name, declared, &bytes)
    }
}

pub fn media_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => PDF_MEDIA_TYPE,
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        _ => "application/octet-stream",
    }
}
