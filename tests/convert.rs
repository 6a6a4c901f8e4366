use chrono::{TimeZone, Utc};
use html_to_docx::model::ContentNode;
use html_to_docx::{
    convert, inspect, normalize, to_html, Builder, ConversionError, ConvertOptions, Converter,
    DocumentMetadata, PageSetup, Resources, StyleResolver,
};
use proptest::prelude::*;

const SAMPLE: &str = r#"<h1>Report</h1>
<p>Intro with <b>bold</b>, <i>italic</i> and a <a href="https://example.com">link</a>.</p>
<ul><li>one</li><li>two<ol><li>nested</li></ol></li></ul>
<table><tr><th>H1</th><th>H2</th></tr><tr><td rowspan="2">A</td><td>B</td></tr><tr><td>C</td></tr></table>"#;

fn build(html: &str) -> Vec<ContentNode> {
    let resolver = StyleResolver::default();
    let resources = Resources::new();
    let mut builder = Builder::new(&resolver, &resources, PageSetup::default().content_width());
    builder.build(&normalize(html).unwrap()).unwrap()
}

#[test]
fn identical_input_gives_identical_bytes() {
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    let converter = Converter::default();
    let a = converter.convert_at(SAMPLE, "r.docx", None, now).unwrap();
    let b = converter.convert_at(SAMPLE, "r.docx", None, now).unwrap();
    assert_eq!(a.bytes, b.bytes);
}

#[test]
fn every_row_covers_the_full_grid() {
    let html = r#"<table>
<tr><td colspan="2">a</td><td rowspan="3">b</td></tr>
<tr><td>c</td><td rowspan="2">d</td></tr>
<tr><td>e</td></tr>
<tr><td>f</td></tr>
</table>"#;
    let content = build(html);
    let table = content
        .iter()
        .find_map(|n| match n {
            ContentNode::Table(t) => Some(t),
            _ => None,
        })
        .unwrap();
    assert_eq!(table.column_count(), 3);
    for i in 0..table.rows.len() {
        assert_eq!(table.row_coverage(i), 3, "row {i}");
    }
}

#[test]
fn missing_metadata_uses_defaults() {
    let bytes = convert("<p>x</p>", "x.docx", None).unwrap();
    let report = inspect(&bytes).unwrap();
    assert_eq!(report.core["creator"], "unknown");
    assert_eq!(report.core["created"], report.core["modified"]);
}

#[test]
fn supplied_metadata_is_recorded() {
    let metadata = DocumentMetadata {
        title: Some("Quarterly & annual".to_string()),
        creator: Some("Ana".to_string()),
        ..Default::default()
    };
    let bytes = convert("<p>x</p>", "x.docx", Some(&metadata)).unwrap();
    let report = inspect(&bytes).unwrap();
    assert_eq!(report.core["title"], "Quarterly & annual");
    assert_eq!(report.core["creator"], "Ana");
}

#[test]
fn table_reads_back_as_a_grid() {
    let html = "<table><tr><td>A</td><td>B</td></tr><tr><td>C</td><td>D</td></tr></table>";
    let report = inspect(&convert(html, "t.docx", None).unwrap()).unwrap();
    assert_eq!(report.tables.len(), 1);
    assert_eq!(
        report.tables[0],
        vec![
            vec!["A".to_string(), "B".to_string()],
            vec!["C".to_string(), "D".to_string()],
        ]
    );
}

#[test]
fn body_text_and_parts_read_back() {
    let report = inspect(&convert(SAMPLE, "r.docx", None).unwrap()).unwrap();
    assert_eq!(report.parts[0], "[Content_Types].xml");
    assert!(report.parts.iter().any(|p| p == "word/numbering.xml"));
    assert_eq!(report.paragraphs[0], "Report");
    assert_eq!(report.paragraphs[1], "Intro with bold, italic and a link.");
}

#[test]
fn overlapping_merge_is_rejected() {
    let html = r#"<table><tr><td colspan="2">a</td><td data-col="1">b</td></tr></table>"#;
    match convert(html, "t.docx", None) {
        Err(ConversionError::InvalidTable { row, column, .. }) => {
            assert_eq!((row, column), (0, 1));
        }
        other => panic!("expected InvalidTable, got {other:?}"),
    }
}

#[test]
fn block_inside_inline_is_rejected() {
    match convert("<span><div>x</div></span>", "t.docx", None) {
        Err(ConversionError::Structural { path }) => assert_eq!(path, "span > div"),
        other => panic!("expected Structural, got {other:?}"),
    }
}

#[test]
fn missing_image_resource_is_rejected() {
    match convert(r#"<p><img src="logo.png"></p>"#, "t.docx", None) {
        Err(ConversionError::Resource { src, .. }) => assert_eq!(src, "logo.png"),
        other => panic!("expected Resource, got {other:?}"),
    }
}

#[test]
fn supplied_image_resource_is_packaged() {
    use base64::Engine;
    let png = base64::engine::general_purpose::STANDARD
        .decode("iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==")
        .unwrap();
    let mut resources = Resources::new();
    resources.insert("logo.png".to_string(), png);
    let converter = Converter::new(ConvertOptions {
        resources,
        ..Default::default()
    });
    let bytes = converter
        .convert(r#"<p><img src="logo.png" width="10" height="10"></p>"#, "t.docx", None)
        .unwrap();
    let report = inspect(&bytes).unwrap();
    assert!(report.parts.iter().any(|p| p == "word/media/image1.png"), "{:?}", report.parts);
}

fn text() -> impl Strategy<Value = String> {
    "[a-z]{1,6}( [a-z]{1,6}){0,2}"
}

fn inline() -> impl Strategy<Value = String> {
    text().prop_recursive(3, 24, 3, |inner| {
        (
            prop::sample::select(vec!["b", "i", "u", "s", "em", "strong", "span", "code", "sub", "sup"]),
            prop::collection::vec(inner, 1..4),
        )
            .prop_map(|(tag, kids)| format!("<{tag}>{}</{tag}>", kids.concat()))
    })
}

fn block() -> impl Strategy<Value = String> {
    let leaf = (
        prop::sample::select(vec!["p", "h1", "h2", "h3", "li", "td"]),
        prop::collection::vec(prop_oneof![inline(), Just("<br>".to_string())], 1..4),
    )
        .prop_map(|(tag, kids)| match tag {
            "li" => format!("<ul><li>{}</li></ul>", kids.concat()),
            "td" => format!("<table><tr><td>{}</td></tr></table>", kids.concat()),
            _ => format!("<{tag}>{}</{tag}>", kids.concat()),
        });
    leaf.prop_recursive(2, 12, 3, |inner| {
        (
            prop::sample::select(vec!["div", "blockquote"]),
            prop::collection::vec(inner, 1..3),
        )
            .prop_map(|(tag, kids)| format!("<{tag}>{}</{tag}>", kids.concat()))
    })
}

proptest! {
    #[test]
    fn normalizing_twice_changes_nothing(
        blocks in prop::collection::vec(block(), 1..4),
        full_document in any::<bool>(),
    ) {
        let html = if full_document {
            format!("<html><body>{}</body></html>", blocks.concat())
        } else {
            blocks.concat()
        };
        let once = normalize(&html).unwrap();
        let twice = normalize(&to_html(&once)).unwrap();
        prop_assert_eq!(once, twice);
    }
}
