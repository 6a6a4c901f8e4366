//! Convert editor HTML into a WordprocessingML (`.docx`) package.
//!
//! The pipeline is pure and synchronous: HTML is normalized into an owned
//! tree, styles are resolved by inheritance, the tree is lowered into
//! paragraphs and tables, and the result is packaged as an OPC archive.

pub mod builder;
pub mod capabilities;
pub mod dom;
pub mod error;
pub mod image;
pub mod inspect;
pub mod metadata;
pub mod model;
pub mod normalize;
pub mod package;
pub mod style;
pub mod table;
pub mod writer;

use chrono::{DateTime, Utc};
use tracing::debug;

pub use builder::{Builder, Resources};
pub use capabilities::{capabilities, Capabilities};
pub use dom::{to_html, DomNode, Element, Tag};
pub use error::{ConversionError, Result};
pub use inspect::{inspect, Inspection};
pub use metadata::{CoreProperties, DocumentMetadata};
pub use normalize::normalize;
pub use style::{ClassStyles, StyleResolver};
pub use writer::PageSetup;

#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// CSS declarations applied to elements by class name.
    pub class_styles: ClassStyles,
    /// Image bytes for `src` values that are not `data:` URIs.
    pub resources: Resources,
    pub page: PageSetup,
}

/// Output of one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub bytes: Vec<u8>,
    /// Formatting that was dropped, such as unsupported CSS.
    pub warnings: Vec<String>,
}

/// A configured conversion engine. Holds no per-conversion state, so one
/// instance can serve any number of threads.
#[derive(Debug, Clone)]
pub struct Converter {
    resolver: StyleResolver,
    resources: Resources,
    page: PageSetup,
}

impl Default for Converter {
    fn default() -> Self {
        Self::new(ConvertOptions::default())
    }
}

impl Converter {
    pub fn new(options: ConvertOptions) -> Self {
        Self {
            resolver: StyleResolver::new(options.class_styles),
            resources: options.resources,
            page: options.page,
        }
    }

    pub fn convert(
        &self,
        html: &str,
        filename: &str,
        metadata: Option<&DocumentMetadata>,
    ) -> Result<Vec<u8>> {
        Ok(self.convert_with_report(html, filename, metadata)?.bytes)
    }

    pub fn convert_with_report(
        &self,
        html: &str,
        filename: &str,
        metadata: Option<&DocumentMetadata>,
    ) -> Result<Conversion> {
        self.convert_at(html, filename, metadata, Utc::now())
    }

    /// Convert with an explicit clock. Identical inputs give identical bytes.
    pub fn convert_at(
        &self,
        html: &str,
        filename: &str,
        metadata: Option<&DocumentMetadata>,
        now: DateTime<Utc>,
    ) -> Result<Conversion> {
        debug!(filename, bytes = html.len(), "converting");
        let dom = normalize(html)?;

        let mut builder = Builder::new(&self.resolver, &self.resources, self.page.content_width());
        let content = builder.build(&dom)?;
        let (images, warnings) = builder.into_parts();

        let core = metadata::inject(metadata, now);
        let bytes = package::Packager::new(self.page).pack(&content, &core, &images)?;
        debug!(filename, size = bytes.len(), warnings = warnings.len(), "converted");
        Ok(Conversion { bytes, warnings })
    }
}

/// Convert `html` with default options. `filename` is informational only.
pub fn convert(html: &str, filename: &str, metadata: Option<&DocumentMetadata>) -> Result<Vec<u8>> {
    Converter::default().convert(html, filename, metadata)
}
