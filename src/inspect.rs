//! Read a produced package back: part list, body text, table grids and core
//! properties.

use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Inspection {
    /// Part names in archive order.
    pub parts: Vec<String>,
    /// Text of body-level paragraphs (outside tables).
    pub paragraphs: Vec<String>,
    /// Every table in document order, as rows of cell text. Cells covered by a
    /// vertical merge read as empty.
    pub tables: Vec<Vec<Vec<String>>>,
    /// Core properties keyed by element name (`title`, `creator`, ...).
    pub core: BTreeMap<String, String>,
}

fn read_part(archive: &mut zip::ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<String> {
    let mut file = archive
        .by_name(name)
        .with_context(|| format!("package has no part `{name}`"))?;
    let mut out = String::new();
    file.read_to_string(&mut out)
        .with_context(|| format!("read {name}"))?;
    Ok(out)
}

pub fn inspect(bytes: &[u8]) -> Result<Inspection> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).context("open docx archive")?;
    let mut out = Inspection::default();
    for i in 0..archive.len() {
        out.parts.push(archive.by_index(i)?.name().to_string());
    }

    let document = read_part(&mut archive, "word/document.xml")?;
    read_document(&document, &mut out).context("parse word/document.xml")?;

    if out.parts.iter().any(|p| p == "docProps/core.xml") {
        let core = read_part(&mut archive, "docProps/core.xml")?;
        out.core = read_core(&core).context("parse docProps/core.xml")?;
    }
    Ok(out)
}

/// Where text is currently going.
fn sink<'o>(
    out: &'o mut Inspection,
    tables: &[usize],
    para: &'o mut Option<String>,
) -> Option<&'o mut String> {
    match tables.last() {
        Some(&t) => out.tables[t].last_mut()?.last_mut(),
        None => para.as_mut(),
    }
}

fn read_document(xml: &str, out: &mut Inspection) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    // Indices into `out.tables` of the tables being read, innermost last.
    let mut tables: Vec<usize> = Vec::new();
    let mut para: Option<String> = None;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:tbl" => {
                    out.tables.push(Vec::new());
                    tables.push(out.tables.len() - 1);
                }
                b"w:tr" => {
                    if let Some(&t) = tables.last() {
                        out.tables[t].push(Vec::new());
                    }
                }
                b"w:tc" => {
                    if let Some(row) = tables.last().and_then(|&t| out.tables[t].last_mut()) {
                        row.push(String::new());
                    }
                }
                b"w:p" => {
                    if tables.is_empty() {
                        para = Some(String::new());
                    } else if let Some(cell) = sink(out, &tables, &mut para) {
                        if !cell.is_empty() {
                            cell.push('\n');
                        }
                    }
                }
                b"w:t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:br" => {
                    if let Some(s) = sink(out, &tables, &mut para) {
                        s.push('\n');
                    }
                }
                b"w:tab" => {
                    if let Some(s) = sink(out, &tables, &mut para) {
                        s.push('\t');
                    }
                }
                b"w:p" if tables.is_empty() => out.paragraphs.push(String::new()),
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = t.unescape()?;
                if let Some(s) = sink(out, &tables, &mut para) {
                    s.push_str(&text);
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"w:tbl" => {
                    tables.pop();
                }
                b"w:p" if tables.is_empty() => {
                    if let Some(p) = para.take() {
                        out.paragraphs.push(p);
                    }
                }
                b"w:t" => in_text = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

fn read_core(xml: &str) -> Result<BTreeMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut props = BTreeMap::new();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name != "coreProperties" {
                    props.insert(name.clone(), String::new());
                    current = Some(name);
                }
            }
            Event::Text(t) => {
                if let Some(key) = &current {
                    let text = t.unescape()?;
                    if let Some(v) = props.get_mut(key) {
                        v.push_str(&text);
                    }
                }
            }
            Event::End(_) => current = None,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_nested_tables_and_breaks() {
        let xml = r#"<w:document xmlns:w="w"><w:body>
<w:p><w:r><w:t xml:space="preserve">one </w:t></w:r><w:r><w:br/><w:t>two</w:t></w:r></w:p>
<w:tbl><w:tr><w:tc><w:p><w:r><w:t>A</w:t></w:r></w:p>
<w:tbl><w:tr><w:tc><w:p><w:r><w:t>inner</w:t></w:r></w:p></w:tc></w:tr></w:tbl><w:p/></w:tc>
<w:tc><w:p><w:r><w:t>B &amp; C</w:t></w:r></w:p></w:tc></w:tr></w:tbl>
<w:p/>
</w:body></w:document>"#;
        let mut out = Inspection::default();
        read_document(xml, &mut out).unwrap();
        assert_eq!(out.paragraphs, vec!["one \ntwo".to_string(), String::new()]);
        assert_eq!(out.tables.len(), 2);
        assert_eq!(out.tables[0], vec![vec!["A".to_string(), "B & C".to_string()]]);
        assert_eq!(out.tables[1], vec![vec!["inner".to_string()]]);
    }

    #[test]
    fn reads_core_properties() {
        let xml = r#"<cp:coreProperties xmlns:cp="c" xmlns:dc="d"><dc:title>T &amp; U</dc:title><dc:creator>unknown</dc:creator><dc:description></dc:description></cp:coreProperties>"#;
        let core = read_core(xml).unwrap();
        assert_eq!(core["title"], "T & U");
        assert_eq!(core["creator"], "unknown");
        assert_eq!(core["description"], "");
    }

    #[test]
    fn rejects_non_zip_input() {
        assert!(inspect(b"not a zip").is_err());
    }
}
