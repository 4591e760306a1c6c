// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text extraction from uploaded documents, dispatched on declared MIME type.
//!
//! All functions here are synchronous and CPU-bound; async callers run
//! them on a blocking worker.

use std::io::{Cursor, Read};

use parley_core::ParleyError;
use quick_xml::Reader as XmlReader;
use quick_xml::events::Event;
use zip::ZipArchive;

/// Returned for a CSV file with no readable records.
pub const EMPTY_CSV_MARKER: &str = "[empty CSV file]";

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const PPTX_MIME: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";

/// Document families the dispatcher can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Pptx,
    Csv,
    PlainText,
}

impl DocumentKind {
    /// Classifies a declared MIME type. Parameters such as `charset` are ignored.
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => Some(Self::Pdf),
            DOCX_MIME => Some(Self::Docx),
            PPTX_MIME => Some(Self::Pptx),
            "text/csv" | "application/csv" => Some(Self::Csv),
            m if m.starts_with("text/") => Some(Self::PlainText),
            _ => None,
        }
    }
}

/// Extracts readable text from `bytes` according to `mime_type`.
///
/// Images and unknown types fail with [`ParleyError::Extraction`] naming the
/// type. Library failures are wrapped the same way.
pub fn extract_text(mime_type: &str, bytes: &[u8]) -> Result<String, ParleyError> {
    let fail = |reason: String| ParleyError::Extraction {
        mime_type: mime_type.to_string(),
        reason,
    };
    if mime_type.trim().to_ascii_lowercase().starts_with("image/") {
        return Err(fail("images are not documents; send them as a photo".into()));
    }
    let kind = DocumentKind::from_mime(mime_type)
        .ok_or_else(|| fail("unsupported file type".into()))?;
    match kind {
        DocumentKind::Pdf => pdf_extract::extract_text_from_mem(bytes)
            .map(|text| text.trim().to_string())
            .map_err(|e| fail(format!("unreadable PDF: {e}"))),
        DocumentKind::Docx => docx_text(bytes).map_err(fail),
        DocumentKind::Pptx => pptx_text(bytes).map_err(fail),
        DocumentKind::Csv => Ok(csv_text(bytes)),
        DocumentKind::PlainText => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

fn open_archive(bytes: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>, String> {
    ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("not an OOXML container: {e}"))
}

fn read_entry(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<String, String> {
    let mut entry = archive
        .by_name(name)
        .map_err(|_| format!("missing {name}"))?;
    let mut buffer = Vec::new();
    entry
        .read_to_end(&mut buffer)
        .map_err(|e| format!("cannot read {name}: {e}"))?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn docx_text(bytes: &[u8]) -> Result<String, String> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry(&mut archive, "word/document.xml")?;
    ooxml_paragraphs(&xml)
}

fn pptx_text(bytes: &[u8]) -> Result<String, String> {
    let mut archive = open_archive(bytes)?;
    let mut slides = Vec::new();
    for i in 0..archive.len() {
        let name = match archive.by_index(i) {
            Ok(file) => file.name().to_string(),
            Err(e) => return Err(format!("corrupt archive entry: {e}")),
        };
        let Some(index) = name
            .strip_prefix("ppt/slides/slide")
            .and_then(|rest| rest.strip_suffix(".xml"))
            .and_then(|n| n.parse::<usize>().ok())
        else {
            continue;
        };
        let xml = read_entry(&mut archive, &name)?;
        slides.push((index, xml));
    }
    slides.sort_by_key(|(index, _)| *index);

    let mut out = Vec::with_capacity(slides.len());
    for (index, xml) in slides {
        let text = ooxml_paragraphs(&xml)?;
        if !text.is_empty() {
            out.push(format!("Slide {index}:\n{text}"));
        }
    }
    Ok(out.join("\n\n"))
}

/// Plain text of WordprocessingML or DrawingML markup: one line per `p`,
/// runs from `t`, with `br` and `tab` honored.
fn ooxml_paragraphs(xml: &str) -> Result<String, String> {
    let mut reader = XmlReader::from_str(xml);
    reader.trim_text(false);
    let mut buf = Vec::new();
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match local_name(e.name().as_ref()) {
                b"t" => in_text = true,
                b"br" => current.push('\n'),
                b"tab" => current.push('\t'),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match local_name(e.name().as_ref()) {
                b"br" => current.push('\n'),
                b"tab" => current.push('\t'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().map_err(|e| format!("bad XML text: {e}"))?;
                current.push_str(&text);
            }
            Ok(Event::End(ref e)) => match local_name(e.name().as_ref()) {
                b"t" => in_text = false,
                b"p" => {
                    let line = current.trim_end().to_string();
                    if !line.is_empty() {
                        lines.push(line);
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("malformed XML at {}: {e}", reader.buffer_position())),
            _ => {}
        }
        buf.clear();
    }
    if !current.trim().is_empty() {
        lines.push(current.trim_end().to_string());
    }
    Ok(lines.join("\n"))
}

fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|b| *b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Renders each record as `header: value` lines under a `Row N:` label.
fn csv_text(bytes: &[u8]) -> String {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);
    let headers = match reader.headers() {
        Ok(h) if !h.is_empty() => h.clone(),
        _ => return EMPTY_CSV_MARKER.to_string(),
    };

    let mut rows = Vec::new();
    for (n, record) in reader.records().enumerate() {
        let Ok(record) = record else {
            return EMPTY_CSV_MARKER.to_string();
        };
        let mut row = format!("Row {}:", n + 1);
        for (i, value) in record.iter().enumerate() {
            let key = headers
                .get(i)
                .filter(|h| !h.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("column {}", i + 1));
            row.push_str(&format!("\n{key}: {value}"));
        }
        rows.push(row);
    }
    if rows.is_empty() {
        return EMPTY_CSV_MARKER.to_string();
    }
    rows.join("\n\n")
}
