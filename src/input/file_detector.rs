//! File type detection

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Pdf,
    Docx,
    Text,
    Markdown,
    Unknown,
}

impl FileType {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => FileType::Pdf,
            "docx" => FileType::Docx,
            "txt" => FileType::Text,
            "md" | "markdown" => FileType::Markdown,
            _ => FileType::Unknown,
        }
    }

    pub fn from_filename(filename: &str) -> Self {
        Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(FileType::Unknown, Self::from_extension)
    }

    pub fn is_supported(&self) -> bool {
        *self != FileType::Unknown
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            FileType::Pdf => "application/pdf",
            FileType::Docx => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            FileType::Text => "text/plain",
            FileType::Markdown => "text/markdown",
            FileType::Unknown => "application/octet-stream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_by_extension() {
        assert_eq!(FileType::from_filename("cv.PDF"), FileType::Pdf);
        assert_eq!(FileType::from_filename("/tmp/resume.md"), FileType::Markdown);
        assert_eq!(FileType::from_filename("notes.txt"), FileType::Text);
        assert_eq!(FileType::from_filename("resume.DOCX"), FileType::Docx);
        assert_eq!(FileType::from_filename("resume.doc"), FileType::Unknown);
        assert_eq!(FileType::from_filename("README"), FileType::Unknown);
        assert!(!FileType::Unknown.is_supported());
    }
}
