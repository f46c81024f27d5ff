//! Multi-format document loading.
//!
//! Dispatches on file extension to a loader strategy: plain text (`.txt`,
//! `.md`), PDF (`.pdf`), JSON (`.json`), and spreadsheets (`.xlsx`). Each
//! strategy returns an ordered sequence of [`Document`]s whose metadata
//! carries the originating file path under `source`.
//!
//! Unrecognized extensions fail with [`Error::UnsupportedFormat`]; parse
//! failures of a recognized format surface as [`Error::Load`].

use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::Document;

/// Extensions this loader understands.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "pdf", "json", "xlsx"];

/// Maximum worksheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Load a file into an ordered sequence of documents.
///
/// Returns an empty sequence only when the file is legitimately empty.
pub fn load_document(path: &Path) -> Result<Vec<Document>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" | "md" => load_text(path),
        "pdf" => load_pdf(path),
        "json" => load_json(path),
        "xlsx" => load_xlsx(path),
        _ => Err(Error::UnsupportedFormat(format!(
            ".{} ({})",
            ext,
            path.display()
        ))),
    }
}

fn source_of(path: &Path) -> String {
    path.display().to_string()
}

fn load_text(path: &Path) -> Result<Vec<Document>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Load(format!("{}: {}", path.display(), e)))?;

    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    Ok(vec![Document::new(content, source_of(path))])
}

fn load_pdf(path: &Path) -> Result<Vec<Document>> {
    let bytes =
        std::fs::read(path).map_err(|e| Error::Load(format!("{}: {}", path.display(), e)))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| Error::Load(format!("{}: {}", path.display(), e)))?;

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    Ok(vec![Document::new(text, source_of(path))])
}

/// Render the parsed JSON as pretty text so the chunker sees stable,
/// human-readable content.
fn load_json(path: &Path) -> Result<Vec<Document>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Load(format!("{}: {}", path.display(), e)))?;

    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| Error::Load(format!("{}: invalid JSON: {}", path.display(), e)))?;

    let content = serde_json::to_string_pretty(&value)
        .map_err(|e| Error::Load(format!("{}: {}", path.display(), e)))?;

    Ok(vec![Document::new(content, source_of(path))])
}

/// One document per worksheet, cells joined with spaces.
fn load_xlsx(path: &Path) -> Result<Vec<Document>> {
    let bytes =
        std::fs::read(path).map_err(|e| Error::Load(format!("{}: {}", path.display(), e)))?;

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.as_slice()))
        .map_err(|e| Error::Load(format!("{}: {}", path.display(), e)))?;

    let shared_strings = read_shared_strings(&mut archive)
        .map_err(|e| Error::Load(format!("{}: {}", path.display(), e)))?;
    let sheet_names = list_worksheet_names(&mut archive);

    let mut docs = Vec::new();
    for name in sheet_names.into_iter().take(XLSX_MAX_SHEETS) {
        let sheet_xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)
            .map_err(|e| Error::Load(format!("{}: {}", path.display(), e)))?;
        let cells = extract_sheet_cells(&sheet_xml, &shared_strings)
            .map_err(|e| Error::Load(format!("{}: {}", path.display(), e)))?;

        if cells.trim().is_empty() {
            continue;
        }

        let mut doc = Document::new(cells, source_of(path));
        doc.metadata.insert("sheet".to_string(), name);
        docs.push(doc);
    }

    Ok(docs)
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> std::result::Result<Vec<u8>, String> {
    let entry = archive.by_name(name).map_err(|e| e.to_string())?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| e.to_string())?;
    if out.len() as u64 >= max_bytes {
        return Err(format!("ZIP entry {} exceeds size limit", name));
    }
    Ok(out)
}

fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> std::result::Result<Vec<String>, String> {
    // Workbooks with only inline/numeric cells have no sharedStrings part.
    if archive.by_name("xl/sharedStrings.xml").is_err() {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;

    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = true;
                } else if in_si && e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        strings.push(te.unescape().unwrap_or_default().into_owned());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn list_worksheet_names(archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn extract_sheet_cells(
    xml: &[u8],
    shared_strings: &[String],
) -> std::result::Result<String, String> {
    let mut cells: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_v = false;
    let mut cell_is_shared_str = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"c" {
                    cell_is_shared_str = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                } else if e.local_name().as_ref() == b"v" {
                    in_v = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_v => {
                let v = te.unescape().unwrap_or_default();
                let s = v.trim();
                if !s.is_empty() {
                    if cell_is_shared_str {
                        if let Ok(i) = s.parse::<usize>() {
                            if i < shared_strings.len() {
                                cells.push(shared_strings[i].clone());
                            }
                        }
                    } else {
                        cells.push(s.to_string());
                    }
                }
                in_v = false;
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"v" {
                    in_v = false;
                } else if e.local_name().as_ref() == b"c" {
                    cell_is_shared_str = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(cells.join(" "))
}
