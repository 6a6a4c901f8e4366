//! OPC container: parts, content types, relationship graph and ZIP output.

use crate::error::{ConversionError, Result};
use crate::image::ImageSet;
use crate::metadata::{app_xml, core_xml, CoreProperties};
use crate::model::{for_each_run, list_instances, ContentNode, RunContent};
use crate::writer::{
    numbering_xml, settings_xml, styles_xml, xml_escape, DocumentWriter, PageSetup, PartLinks,
};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const MAIN_DOCUMENT_PART: &str = "word/document.xml";

pub mod rel_types {
    pub const OFFICE_DOCUMENT: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
    pub const CORE_PROPERTIES: &str =
        "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";
    pub const EXTENDED_PROPERTIES: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties";
    pub const STYLES: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
    pub const SETTINGS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/settings";
    pub const NUMBERING: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering";
    pub const IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
    pub const HYPERLINK: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";
}

pub mod content_types {
    pub const RELATIONSHIPS: &str = "application/vnd.openxmlformats-package.relationships+xml";
    pub const XML: &str = "application/xml";
    pub const MAIN_DOCUMENT: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";
    pub const STYLES: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml";
    pub const SETTINGS: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.settings+xml";
    pub const NUMBERING: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml";
    pub const CORE_PROPERTIES: &str = "application/vnd.openxmlformats-package.core-properties+xml";
    pub const EXTENDED_PROPERTIES: &str =
        "application/vnd.openxmlformats-officedocument.extended-properties+xml";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    Internal,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub target_mode: TargetMode,
}

/// Relationships of one source part, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Relationships {
    items: Vec<Relationship>,
}

impl Relationships {
    /// Add a relationship and return its id (`rId1`, `rId2`, ...).
    pub fn add(&mut self, rel_type: &str, target: &str, target_mode: TargetMode) -> String {
        let id = format!("rId{}", self.items.len() + 1);
        self.items.push(Relationship {
            id: id.clone(),
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            target_mode,
        });
        id
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.items.iter()
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        out.push('\n');
        out.push_str(r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#);
        out.push('\n');
        for r in &self.items {
            let mode = match r.target_mode {
                TargetMode::Internal => "",
                TargetMode::External => r#" TargetMode="External""#,
            };
            out.push_str(&format!(
                r#"  <Relationship Id="{}" Type="{}" Target="{}"{mode}/>"#,
                r.id,
                r.rel_type,
                xml_escape(&r.target),
            ));
            out.push('\n');
        }
        out.push_str("</Relationships>");
        out
    }
}

/// `[Content_Types].xml`: defaults by extension plus per-part overrides.
#[derive(Debug, Clone, Default)]
pub struct ContentTypes {
    defaults: BTreeMap<String, String>,
    overrides: BTreeMap<String, String>,
}

fn extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

impl ContentTypes {
    pub fn add_default(&mut self, ext: &str, content_type: &str) {
        self.defaults
            .insert(ext.to_ascii_lowercase(), content_type.to_string());
    }

    pub fn add_override(&mut self, part: &str, content_type: &str) {
        self.overrides
            .insert(format!("/{}", part.trim_start_matches('/')), content_type.to_string());
    }

    /// Content type of `part`, override first.
    pub fn resolve(&self, part: &str) -> Option<&str> {
        let key = format!("/{}", part.trim_start_matches('/'));
        if let Some(ct) = self.overrides.get(&key) {
            return Some(ct);
        }
        extension(part).and_then(|ext| self.defaults.get(&ext).map(String::as_str))
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        out.push('\n');
        out.push_str(r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#);
        out.push('\n');
        for (ext, ct) in &self.defaults {
            out.push_str(&format!(r#"  <Default Extension="{ext}" ContentType="{ct}"/>"#));
            out.push('\n');
        }
        for (part, ct) in &self.overrides {
            out.push_str(&format!(r#"  <Override PartName="{part}" ContentType="{ct}"/>"#));
            out.push('\n');
        }
        out.push_str("</Types>");
        out
    }
}

/// Relationship part holding the relationships of `source` (`""` is the package root).
pub fn rels_part_for(source: &str) -> String {
    match source.rsplit_once('/') {
        Some((dir, name)) => format!("{dir}/_rels/{name}.rels"),
        None if source.is_empty() => "_rels/.rels".to_string(),
        None => format!("_rels/{source}.rels"),
    }
}

/// Resolve an internal relationship target against its source part.
pub fn resolve_target(source: &str, target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        return abs.to_string();
    }
    let mut segments: Vec<&str> = match source.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// An OPC package under construction.
#[derive(Debug, Clone, Default)]
pub struct OpcPackage {
    parts: BTreeMap<String, Vec<u8>>,
    content_types: ContentTypes,
    relationships: BTreeMap<String, Relationships>,
}

impl OpcPackage {
    pub fn new() -> Self {
        let mut pkg = Self::default();
        pkg.content_types.add_default("rels", content_types::RELATIONSHIPS);
        pkg.content_types.add_default("xml", content_types::XML);
        pkg
    }

    /// Add a part. A content type that the extension default does not already
    /// give becomes an override.
    pub fn add_part(&mut self, path: &str, content_type: &str, data: Vec<u8>) {
        if self.content_types.resolve(path) != Some(content_type) {
            self.content_types.add_override(path, content_type);
        }
        self.parts.insert(path.to_string(), data);
    }

    /// Add an image part, registering its extension as a default.
    pub fn add_media(&mut self, path: &str, content_type: &str, data: Vec<u8>) {
        if let Some(ext) = extension(path) {
            if !self.content_types.defaults.contains_key(&ext) {
                self.content_types.add_default(&ext, content_type);
            }
        }
        self.add_part(path, content_type, data);
    }

    pub fn relate(&mut self, source: &str, rel_type: &str, target: &str, mode: TargetMode) -> String {
        self.relationships
            .entry(source.to_string())
            .or_default()
            .add(rel_type, target, mode)
    }

    pub fn part(&self, path: &str) -> Option<&[u8]> {
        self.parts.get(path).map(Vec::as_slice)
    }

    /// Check that every internal relationship target exists and that every part
    /// has a content type.
    pub fn validate(&self) -> Result<()> {
        for (source, rels) in &self.relationships {
            if !source.is_empty() && !self.parts.contains_key(source) {
                return Err(ConversionError::packaging(
                    source.clone(),
                    "relationship source part does not exist",
                ));
            }
            for rel in rels.iter().filter(|r| r.target_mode == TargetMode::Internal) {
                let target = resolve_target(source, &rel.target);
                if !self.parts.contains_key(&target) {
                    return Err(ConversionError::packaging(
                        target,
                        format!("target of relationship {} from `{}` is missing", rel.id, rels_part_for(source)),
                    ));
                }
            }
        }
        for path in self.parts.keys() {
            if self.content_types.resolve(path).is_none() {
                return Err(ConversionError::packaging(path.clone(), "part has no content type"));
            }
        }
        Ok(())
    }

    /// Validate and serialize to ZIP bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.validate()?;

        let mut entries: BTreeMap<String, Vec<u8>> = self.parts.clone();
        for (source, rels) in &self.relationships {
            entries.insert(rels_part_for(source), rels.to_xml().into_bytes());
        }

        let opts = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        zip.start_file(CONTENT_TYPES_PART, opts)?;
        zip.write_all(self.content_types.to_xml().as_bytes())?;
        for (path, data) in &entries {
            zip.start_file(path.as_str(), opts)?;
            zip.write_all(data)?;
        }

        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }
}

/// Assembles the parts of a document and serializes them.
#[derive(Debug, Clone, Copy, Default)]
pub struct Packager {
    page: PageSetup,
}

impl Packager {
    pub fn new(page: PageSetup) -> Self {
        Self { page }
    }

    pub fn build(&self, content: &[ContentNode], core: &CoreProperties, images: &ImageSet) -> Result<OpcPackage> {
        let mut pkg = OpcPackage::new();
        let mut links = PartLinks::default();

        pkg.add_part("word/styles.xml", content_types::STYLES, styles_xml().into_bytes());
        pkg.relate(MAIN_DOCUMENT_PART, rel_types::STYLES, "styles.xml", TargetMode::Internal);
        pkg.add_part("word/settings.xml", content_types::SETTINGS, settings_xml().as_bytes().to_vec());
        pkg.relate(MAIN_DOCUMENT_PART, rel_types::SETTINGS, "settings.xml", TargetMode::Internal);

        let lists = list_instances(content);
        if !lists.is_empty() {
            pkg.add_part(
                "word/numbering.xml",
                content_types::NUMBERING,
                numbering_xml(&lists).into_bytes(),
            );
            pkg.relate(MAIN_DOCUMENT_PART, rel_types::NUMBERING, "numbering.xml", TargetMode::Internal);
        }

        let mut hashes = BTreeSet::new();
        let mut hrefs = BTreeSet::new();
        for_each_run(content, &mut |run| {
            if let RunContent::Image(img) = &run.content {
                hashes.insert(img.hash.clone());
            }
            if let Some(href) = &run.link {
                hrefs.insert(href.clone());
            }
        });

        // Media is numbered in hash order.
        for (n, hash) in hashes.iter().enumerate() {
            let img = images
                .get(hash)
                .ok_or_else(|| ConversionError::resource(hash.clone(), "image bytes not supplied"))?;
            let name = format!("media/image{}.{}", n + 1, img.format.extension());
            pkg.add_media(
                &format!("word/{name}"),
                img.format.content_type(),
                img.bytes.clone(),
            );
            let rid = pkg.relate(MAIN_DOCUMENT_PART, rel_types::IMAGE, &name, TargetMode::Internal);
            links.images.insert(hash.clone(), rid);
        }
        for href in hrefs {
            let rid = pkg.relate(MAIN_DOCUMENT_PART, rel_types::HYPERLINK, &href, TargetMode::External);
            links.links.insert(href, rid);
        }

        let document = DocumentWriter::new(&links, self.page).document_xml(content)?;
        pkg.add_part(MAIN_DOCUMENT_PART, content_types::MAIN_DOCUMENT, document.into_bytes());
        pkg.add_part("docProps/core.xml", content_types::CORE_PROPERTIES, core_xml(core).into_bytes());
        pkg.add_part("docProps/app.xml", content_types::EXTENDED_PROPERTIES, app_xml().into_bytes());

        pkg.relate("", rel_types::OFFICE_DOCUMENT, MAIN_DOCUMENT_PART, TargetMode::Internal);
        pkg.relate("", rel_types::CORE_PROPERTIES, "docProps/core.xml", TargetMode::Internal);
        pkg.relate("", rel_types::EXTENDED_PROPERTIES, "docProps/app.xml", TargetMode::Internal);

        debug!(
            parts = pkg.parts.len(),
            images = links.images.len(),
            hyperlinks = links.links.len(),
            lists = lists.len(),
            "assembled package"
        );
        Ok(pkg)
    }

    pub fn pack(&self, content: &[ContentNode], core: &CoreProperties, images: &ImageSet) -> Result<Vec<u8>> {
        self.build(content, core, images)?.to_bytes()
    }
}

/// [`Packager::pack`] with the default page setup.
pub fn pack(content: &[ContentNode], core: &CoreProperties, images: &ImageSet) -> Result<Vec<u8>> {
    Packager::default().pack(content, core, images)
}
