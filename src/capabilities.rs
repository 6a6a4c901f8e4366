//! Static description of what the converter supports.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Features {
    pub tables: bool,
    pub images: bool,
    pub styles: bool,
    pub headings: bool,
    pub lists: bool,
    pub metadata: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Limitations {
    pub css: &'static str,
    pub javascript: &'static str,
    pub mathml: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub supported_formats: &'static [&'static str],
    pub output_formats: &'static [&'static str],
    pub features: Features,
    pub limitations: Limitations,
}

static CAPABILITIES: Capabilities = Capabilities {
    supported_formats: &["HTML", "XHTML"],
    output_formats: &["DOCX", "WordprocessingML"],
    features: Features {
        tables: true,
        images: true,
        styles: true,
        headings: true,
        lists: true,
        metadata: true,
    },
    limitations: Limitations {
        css: "Basic CSS support - no flexbox/grid",
        javascript: "Not supported",
        mathml: "Not supported",
    },
};

pub fn capabilities() -> &'static Capabilities {
    &CAPABILITIES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mathml_limitation_matches_normalizer() {
        let html = "<p>a<math><mi>x</mi></math></p>";
        assert_eq!(crate::to_html(&crate::normalize(html).unwrap()), "<p>a</p>");
        assert_eq!(capabilities().limitations.mathml, "Not supported");
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let json = serde_json::to_value(capabilities()).unwrap();
        assert_eq!(json["supportedFormats"], serde_json::json!(["HTML", "XHTML"]));
        assert_eq!(json["outputFormats"][0], "DOCX");
        assert_eq!(json["features"]["tables"], true);
        assert_eq!(json["limitations"]["javascript"], "Not supported");
        assert_eq!(json["limitations"]["mathml"], "Not supported");
    }
}
