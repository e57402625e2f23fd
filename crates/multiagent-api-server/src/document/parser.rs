use anyhow::{anyhow, Context, Result};
use encoding_rs::WINDOWS_1252;
use lopdf::Document as PdfDocument;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub content: String,
    /// PDF only
    pub pages: Option<usize>,
}

pub struct DocumentParser;

impl DocumentParser {
    /// Parse an uploaded document held in memory. The extension picks the format.
    pub fn parse_bytes(file_name: &str, bytes: &[u8]) -> Result<ParsedDocument> {
        let extension = Self::extension(file_name)
            .ok_or_else(|| anyhow!("No file extension on '{}'", file_name))?;

        debug!("Parsing upload: {} (type: {})", file_name, extension);

        let (content, pages) = match extension.as_str() {
            "pdf" => {
                let (text, pages) = Self::parse_pdf(bytes)?;
                (text, Some(pages))
            }
            "docx" => (Self::parse_docx(bytes)?, None),
            "csv" => (Self::parse_csv(bytes), None),
            "txt" => (Self::decode_text(bytes), None),
            other => anyhow::bail!("Unsupported document format: .{}", other),
        };

        debug!("Parsed {} characters from {}", content.chars().count(), file_name);

        Ok(ParsedDocument { content, pages })
    }

    /// Lowercased extension without the dot.
    pub fn extension(file_name: &str) -> Option<String> {
        Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }

    fn parse_pdf(bytes: &[u8]) -> Result<(String, usize)> {
        let doc = PdfDocument::load_mem(bytes).context("Failed to load PDF file")?;
        let pages = doc.get_pages();

        let mut content = String::new();
        for page_num in pages.keys() {
            match doc.extract_text(&[*page_num]) {
                Ok(text) => {
                    content.push_str(&text);
                    content.push('\n');
                }
                Err(e) => warn!("Failed to extract text from page {}: {}", page_num, e),
            }
        }

        Ok((content, pages.len()))
    }

    /// DOCX is a zip container; the body text lives in word/document.xml.
    fn parse_docx(bytes: &[u8]) -> Result<String> {
        let mut archive =
            zip::ZipArchive::new(Cursor::new(bytes)).context("DOCX is not a valid zip archive")?;
        let mut xml_file = archive
            .by_name("word/document.xml")
            .context("DOCX has no word/document.xml")?;

        let mut xml = String::new();
        xml_file.read_to_string(&mut xml)?;

        // paragraph ends become newlines so chunks keep some structure
        Ok(Self::strip_xml_tags(&xml.replace("</w:p>", "</w:p>\n")))
    }

    fn parse_csv(bytes: &[u8]) -> String {
        Self::decode_text(bytes)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| split_csv_line(line).join(" | "))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// UTF-8 first, Windows-1252 as the lossy fallback for legacy exports.
    fn decode_text(bytes: &[u8]) -> String {
        match std::str::from_utf8(bytes) {
            Ok(text) => text.trim_start_matches('\u{feff}').to_string(),
            Err(_) => {
                warn!("Upload is not valid UTF-8, decoding as windows-1252");
                let (text, _, _) = WINDOWS_1252.decode(bytes);
                text.into_owned()
            }
        }
    }

    fn strip_xml_tags(xml: &str) -> String {
        let mut text = String::new();
        let mut inside_tag = false;

        for c in xml.chars() {
            match c {
                '<' => inside_tag = true,
                '>' => inside_tag = false,
                _ if !inside_tag => text.push(c),
                _ => {}
            }
        }

        text.lines()
            .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Quote-aware split of one CSV record ("" is an escaped quote).
fn split_csv_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => cells.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    cells.push(current.trim().to_string());
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_txt_utf8_and_fallback() {
        let parsed = DocumentParser::parse_bytes("note.TXT", "perché sì".as_bytes()).unwrap();
        assert_eq!(parsed.content, "perché sì");
        assert!(parsed.pages.is_none());

        // 0xE8 is 'è' in windows-1252
        let parsed = DocumentParser::parse_bytes("legacy.txt", &[b'c', 0xE8]).unwrap();
        assert_eq!(parsed.content, "cè");
    }

    #[test]
    fn test_csv_rows() {
        let csv = "nome,prezzo\n\"Vite, M4\",0.10\n\n\"Dado \"\"esagonale\"\"\",0.05\n";
        let parsed = DocumentParser::parse_bytes("listino.csv", csv.as_bytes()).unwrap();
        assert_eq!(
            parsed.content,
            "nome | prezzo\nVite, M4 | 0.10\nDado \"esagonale\" | 0.05"
        );
    }

    #[test]
    fn test_docx_text_extraction() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            writer
                .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            writer
                .write_all(
                    b"<w:document><w:body><w:p><w:r><w:t>Primo paragrafo</w:t></w:r></w:p>\
                      <w:p><w:r><w:t>Secondo</w:t></w:r></w:p></w:body></w:document>",
                )
                .unwrap();
            writer.finish().unwrap();
        }

        let parsed = DocumentParser::parse_bytes("manuale.docx", buffer.get_ref()).unwrap();
        assert_eq!(parsed.content, "Primo paragrafo\nSecondo");
    }

    #[test]
    fn test_rejects_unknown_and_broken_input() {
        assert!(DocumentParser::parse_bytes("archive.rar", b"x").is_err());
        assert!(DocumentParser::parse_bytes("noextension", b"x").is_err());
        assert!(DocumentParser::parse_bytes("broken.pdf", b"not a pdf").is_err());
        assert!(DocumentParser::parse_bytes("broken.docx", b"not a zip").is_err());
    }

    #[test]
    fn test_extension_lowercased() {
        assert_eq!(DocumentParser::extension("Foto.JPG").as_deref(), Some("jpg"));
        assert_eq!(DocumentParser::extension("README"), None);
    }
}
