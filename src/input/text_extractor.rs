//! Text extraction from uploaded resume bytes

use crate::error::{KeenEyeError, Result};
use crate::input::file_detector::FileType;
use pulldown_cmark::{html, Parser};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::io::{Cursor, Read};

pub trait TextExtractor {
    fn extract(&self, bytes: &[u8], filename: &str) -> Result<String>;
}

pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract(&self, bytes: &[u8], filename: &str) -> Result<String> {
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
            KeenEyeError::PdfExtraction(format!("Failed to extract text from PDF '{}': {}", filename, e))
        })
    }
}

/// Word documents: the text runs of `word/document.xml`, one line per paragraph
pub struct DocxExtractor;

impl TextExtractor for DocxExtractor {
    fn extract(&self, bytes: &[u8], filename: &str) -> Result<String> {
        let docx_error = |e: &dyn std::fmt::Display| {
            KeenEyeError::DocxExtraction(format!("Failed to extract text from DOCX '{}': {}", filename, e))
        };

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| docx_error(&e))?;
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .map_err(|e| docx_error(&e))?
            .read_to_string(&mut xml)?;

        document_text(&xml).map_err(|e| docx_error(&e))
    }
}

fn document_text(xml: &str) -> std::result::Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_run_text = true,
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_run_text = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => text.push('\t'),
                b"br" | b"cr" => text.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_run_text => text.push_str(&t.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(text.trim_end().to_string())
}

pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8], _filename: &str) -> Result<String> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

pub struct MarkdownExtractor;

impl TextExtractor for MarkdownExtractor {
    fn extract(&self, bytes: &[u8], _filename: &str) -> Result<String> {
        let markdown_content = String::from_utf8_lossy(bytes);

        let parser = Parser::new(&markdown_content);
        let mut html_output = String::new();
        html::push_html(&mut html_output, parser);

        self.html_to_text(&html_output)
    }
}

impl MarkdownExtractor {
    fn html_to_text(&self, html: &str) -> Result<String> {
        let text = html
            .replace("<br>", "\n")
            .replace("<br />", "\n")
            .replace("</p>", "\n\n")
            .replace("</li>", "\n");

        let tags = Regex::new(r"<[^>]*>")
            .map_err(|e| KeenEyeError::Processing(format!("Invalid tag pattern: {}", e)))?;
        let clean_text = tags.replace_all(&text, "");
        // Entities last so escaped angle brackets survive tag stripping
        let clean_text = clean_text
            .replace("&nbsp;", " ")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&amp;", "&");

        let lines: Vec<&str> = clean_text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        Ok(lines.join("\n"))
    }
}

/// Route `bytes` to the extractor for `file_type`
pub fn extract_text(file_type: FileType, bytes: &[u8], filename: &str) -> Result<String> {
    match file_type {
        FileType::Pdf => PdfExtractor.extract(bytes, filename),
        FileType::Docx => DocxExtractor.extract(bytes, filename),
        FileType::Text => PlainTextExtractor.extract(bytes, filename),
        FileType::Markdown => MarkdownExtractor.extract(bytes, filename),
        FileType::Unknown => Err(KeenEyeError::UnsupportedFormat(format!(
            "Unsupported file type for: {} (expected pdf, docx, txt or md)",
            filename
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_is_flattened_to_text() {
        let md = b"# Jane Doe\n\n* Python &amp; SQL\n* 5 years of experience\n\nContact: a &lt;b&gt;";
        let text = extract_text(FileType::Markdown, md, "cv.md").unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Jane Doe");
        assert!(text.contains("5 years of experience"));
        assert!(!text.contains("<li>"));
    }

    #[test]
    fn test_plain_text_tolerates_invalid_utf8() {
        let text = extract_text(FileType::Text, b"Python \xff dev", "cv.txt").unwrap();
        assert!(text.starts_with("Python"));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = extract_text(FileType::Unknown, b"data", "cv.odt").unwrap_err();
        assert!(matches!(err, KeenEyeError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_garbage_pdf_is_an_extraction_error() {
        let err = extract_text(FileType::Pdf, b"not a pdf", "cv.pdf").unwrap_err();
        assert!(matches!(err, KeenEyeError::PdfExtraction(_)));
    }

    fn docx_bytes(document_xml: &str) -> Vec<u8> {
        use std::io::Write;
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.start_file("word/document.xml", options).unwrap();
        writer.write_all(document_xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_docx_paragraphs_become_lines() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:r><w:t>Jane Doe</w:t></w:r></w:p>
<w:p><w:r><w:t xml:space="preserve">5 years of experience in </w:t></w:r><w:r><w:t>Python &amp; SQL</w:t></w:r></w:p>
<w:p><w:r><w:t>Skills</w:t><w:tab/><w:t>Docker</w:t></w:r></w:p>
</w:body></w:document>"#;
        let text = extract_text(FileType::Docx, &docx_bytes(xml), "cv.docx").unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["Jane Doe", "5 years of experience in Python & SQL", "Skills\tDocker"]);
    }

    #[test]
    fn test_invalid_docx_is_an_extraction_error() {
        let err = extract_text(FileType::Docx, b"not a zip archive", "cv.docx").unwrap_err();
        assert!(matches!(err, KeenEyeError::DocxExtraction(_)));
    }
}
