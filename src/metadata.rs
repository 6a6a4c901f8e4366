//! Core document properties (`docProps/core.xml`) and the extended
//! application properties part.

use crate::writer::xml_escape;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Creator recorded when the caller supplies none.
pub const DEFAULT_CREATOR: &str = "unknown";

/// Caller-supplied document metadata. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub creator: Option<String>,
    pub description: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

/// Fully resolved core properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoreProperties {
    pub title: String,
    pub creator: String,
    pub description: String,
    pub last_modified_by: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

/// Resolve `metadata` against the defaults. `now` is captured once per
/// conversion by the caller.
pub fn inject(metadata: Option<&DocumentMetadata>, now: DateTime<Utc>) -> CoreProperties {
    let empty = DocumentMetadata::default();
    let m = metadata.unwrap_or(&empty);

    let creator = m
        .creator
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_CREATOR)
        .to_string();
    let created = m.created.unwrap_or(now);
    let modified = match m.modified {
        Some(modified) => modified.max(created),
        None if m.created.is_some() => now.max(created),
        None => created,
    };

    CoreProperties {
        title: m.title.clone().unwrap_or_default(),
        last_modified_by: creator.clone(),
        creator,
        description: m.description.clone().unwrap_or_default(),
        created,
        modified,
    }
}

fn w3cdtf(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub fn core_xml(props: &CoreProperties) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" "#,
            r#"xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" "#,
            r#"xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
            "<dc:title>{}</dc:title>",
            "<dc:creator>{}</dc:creator>",
            "<dc:description>{}</dc:description>",
            "<cp:lastModifiedBy>{}</cp:lastModifiedBy>",
            r#"<dcterms:created xsi:type="dcterms:W3CDTF">{}</dcterms:created>"#,
            r#"<dcterms:modified xsi:type="dcterms:W3CDTF">{}</dcterms:modified>"#,
            "</cp:coreProperties>"
        ),
        xml_escape(&props.title),
        xml_escape(&props.creator),
        xml_escape(&props.description),
        xml_escape(&props.last_modified_by),
        w3cdtf(&props.created),
        w3cdtf(&props.modified),
    )
}

pub fn app_xml() -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties" "#,
            r#"xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">"#,
            "<Application>{}</Application>",
            "<AppVersion>{}</AppVersion>",
            "</Properties>"
        ),
        env!("CARGO_PKG_NAME"),
        app_version(),
    )
}

/// `AppVersion` must look like `XX.YYYY`.
fn app_version() -> String {
    let major: u32 = env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0);
    let minor: u32 = env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0);
    format!("{major:02}.{minor:04}")
}
