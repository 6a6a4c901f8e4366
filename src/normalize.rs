use crate::dom::{DomNode, Element, Tag};
use crate::error::{ConversionError, Result};
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

/// Parser errors tolerated before the input is considered unrecoverable.
pub const MAX_PARSE_ERRORS: usize = 500;

/// Deepest element nesting accepted from the editor.
pub const MAX_DEPTH: usize = 256;

fn html5_parse(input: &str) -> RcDom {
    parse_document(RcDom::default(), Default::default()).one(input)
}

fn tag_lower(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.to_string().to_ascii_lowercase()),
        _ => None,
    }
}

fn attrs_vec(node: &Handle) -> Vec<(String, String)> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .map(|a| (a.name.local.to_string().to_ascii_lowercase(), a.value.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

fn sanitize_href(href: &str) -> Option<String> {
    let h = href.trim();
    if h.is_empty() {
        return None;
    }
    let low = h.to_ascii_lowercase();
    if low.starts_with("javascript:") || low.starts_with("data:") || low.starts_with("vbscript:") {
        return None;
    }
    Some(h.to_string())
}

fn is_drop_content_tag(lower: &str) -> bool {
    matches!(
        lower,
        "script"
            | "style"
            | "noscript"
            | "template"
            | "iframe"
            | "object"
            | "embed"
            | "svg"
            | "math"
            | "canvas"
            | "form"
            | "input"
            | "button"
            | "select"
            | "textarea"
            | "video"
            | "audio"
            | "head"
            | "title"
            | "meta"
            | "link"
    )
}

/// Wrappers whose children are kept in place of the element itself.
fn is_transparent_tag(lower: &str) -> bool {
    matches!(
        lower,
        "section"
            | "article"
            | "main"
            | "header"
            | "footer"
            | "aside"
            | "figure"
            | "font"
            | "mark"
            | "small"
            | "big"
            | "label"
            | "abbr"
            | "cite"
            | "q"
            | "time"
            | "ins"
            | "center"
    )
}

fn keep_attrs(tag: Tag, attrs: &[(String, String)]) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for (k, v) in attrs {
        let keep = match k.as_str() {
            "style" | "class" => true,
            "href" => {
                if tag == Tag::A {
                    if let Some(h) = sanitize_href(v) {
                        out.push((k.clone(), h));
                    }
                }
                false
            }
            "title" => tag == Tag::A,
            "src" | "alt" => tag == Tag::Img,
            "height" => tag == Tag::Img,
            "width" => matches!(tag, Tag::Img | Tag::Td | Tag::Th | Tag::Table),
            "colspan" | "rowspan" | "data-col" => matches!(tag, Tag::Td | Tag::Th),
            "start" => tag == Tag::Ol,
            "align" => tag.is_block(),
            _ => false,
        };
        if keep {
            out.push((k.clone(), v.clone()));
        }
    }
    out
}

fn push_child(children: &mut Vec<DomNode>, node: DomNode) {
    if let DomNode::Text(t) = &node {
        if t.is_empty() {
            return;
        }
        if let Some(DomNode::Text(prev)) = children.last_mut() {
            prev.push_str(t);
            return;
        }
    }
    children.push(node);
}

fn sanitize_children(handles: &[Handle], depth: usize, out: &mut Vec<DomNode>) -> Result<()> {
    for h in handles {
        sanitize_node(h, depth, out)?;
    }
    Ok(())
}

fn sanitize_node(node: &Handle, depth: usize, out: &mut Vec<DomNode>) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(ConversionError::MalformedInput(format!(
            "element nesting deeper than {MAX_DEPTH} levels"
        )));
    }
    match &node.data {
        NodeData::Text { contents } => {
            let text = contents.borrow().replace("\r\n", "\n").replace('\r', "\n");
            push_child(out, DomNode::Text(text));
        }
        NodeData::Element { .. } => {
            let Some(lower) = tag_lower(node) else {
                return Ok(());
            };
            if is_drop_content_tag(&lower) {
                return Ok(());
            }
            let children = node.children.borrow().clone();
            if is_transparent_tag(&lower) {
                return sanitize_children(&children, depth + 1, out);
            }
            // Unknown constructs go away together with their content.
            let Some(tag) = Tag::from_name(&lower) else {
                return Ok(());
            };
            let mut el = Element::new(tag);
            el.attrs = keep_attrs(tag, &attrs_vec(node));
            if !tag.is_void() {
                sanitize_children(&children, depth + 1, &mut el.children)?;
            }
            out.push(DomNode::Element(el));
        }
        _ => {}
    }
    Ok(())
}

fn find_body(node: &Handle) -> Option<Handle> {
    if let Some(tag) = tag_lower(node) {
        if tag == "body" {
            return Some(node.clone());
        }
    }
    for c in node.children.borrow().iter() {
        if let Some(body) = find_body(c) {
            return Some(body);
        }
    }
    None
}

fn is_html_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\x0C' | '\r')
}

fn collapse_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_ws = false;
    for ch in s.chars() {
        if is_html_space(ch) {
            if !in_ws {
                out.push(' ');
                in_ws = true;
            }
        } else {
            out.push(ch);
            in_ws = false;
        }
    }
    out
}

enum Item<'a> {
    Text(&'a mut String),
    /// Block edge or forced line break.
    Boundary,
    /// Non-text inline content such as an image.
    Atom,
}

/// Collects the inline formatting context of one block. Nested blocks become
/// boundaries and are queued to be processed as contexts of their own.
fn collect_context<'a>(
    children: &'a mut [DomNode],
    items: &mut Vec<Item<'a>>,
    blocks: &mut Vec<&'a mut Element>,
) {
    for child in children.iter_mut() {
        match child {
            DomNode::Text(t) => items.push(Item::Text(t)),
            DomNode::Element(el) => {
                let tag = el.tag;
                match tag {
                    Tag::Pre | Tag::Br => items.push(Item::Boundary),
                    Tag::Img => items.push(Item::Atom),
                    _ if tag.is_block() => {
                        items.push(Item::Boundary);
                        blocks.push(el);
                        items.push(Item::Boundary);
                    }
                    _ => collect_context(&mut el.children, items, blocks),
                }
            }
        }
    }
}

fn trim_context(items: &mut [Item<'_>]) {
    for item in items.iter_mut() {
        if let Item::Text(t) = item {
            let collapsed = collapse_ws(t);
            **t = collapsed;
        }
    }

    let mut prev_space = true;
    for item in items.iter_mut() {
        match item {
            Item::Text(t) => {
                if prev_space && t.starts_with(' ') {
                    t.remove(0);
                }
                if !t.is_empty() {
                    prev_space = t.ends_with(' ');
                }
            }
            Item::Boundary => prev_space = true,
            Item::Atom => prev_space = false,
        }
    }

    let mut next_boundary = true;
    for item in items.iter_mut().rev() {
        match item {
            Item::Text(t) => {
                if next_boundary && t.ends_with(' ') {
                    t.pop();
                }
                if !t.is_empty() {
                    next_boundary = false;
                }
            }
            Item::Boundary => next_boundary = true,
            Item::Atom => next_boundary = false,
        }
    }
}

fn normalize_whitespace(root: &mut Element) {
    let mut pending: Vec<&mut Element> = vec![root];
    while let Some(block) = pending.pop() {
        let mut items: Vec<Item<'_>> = Vec::new();
        let mut nested: Vec<&mut Element> = Vec::new();
        collect_context(&mut block.children, &mut items, &mut nested);
        trim_context(&mut items);
        drop(items);
        pending.extend(nested);
    }
}

fn prune_empty_text(el: &mut Element) {
    if el.tag == Tag::Pre {
        return;
    }
    el.children.retain(|c| !matches!(c, DomNode::Text(t) if t.is_empty()));
    let mut merged: Vec<DomNode> = Vec::with_capacity(el.children.len());
    for c in el.children.drain(..) {
        push_child(&mut merged, c);
    }
    el.children = merged;
    for c in el.children.iter_mut() {
        if let DomNode::Element(child) = c {
            prune_empty_text(child);
        }
    }
}

/// `input` without its leading doctype declaration, if it has one.
fn strip_doctype(input: &str) -> &str {
    let trimmed = input.trim_start();
    if trimmed.get(..9).is_some_and(|p| p.eq_ignore_ascii_case("<!doctype")) {
        if let Some(end) = trimmed.find('>') {
            return &trimmed[end + 1..];
        }
    }
    input
}

/// Parse editor HTML (a fragment or a full document) into the normalized tree.
///
/// The returned root is a [`Tag::Body`] element. Disallowed and unknown elements
/// are removed with their content, unrecognized attributes are dropped and
/// whitespace is collapsed the way a browser would render it.
pub fn normalize(input: &str) -> Result<DomNode> {
    if input.trim().is_empty() {
        return Err(ConversionError::MalformedInput("empty html".to_string()));
    }
    if let Some(pos) = input.find('\0') {
        return Err(ConversionError::MalformedInput(format!(
            "invalid encoding: NUL character at byte {pos}"
        )));
    }

    // Without a standards doctype html5ever falls back to quirks mode, where a
    // `p` may hold a `table`; serialized fragments always reparse without quirks.
    let wrapped = if input.to_ascii_lowercase().contains("<html") {
        format!("<!doctype html>{}", strip_doctype(input))
    } else {
        format!(
            "<!doctype html><html><head><meta charset=\"utf-8\"></head><body>{}</body></html>",
            input
        )
    };

    let dom = html5_parse(&wrapped);
    let error_count = dom.errors.borrow().len();
    if error_count > MAX_PARSE_ERRORS {
        return Err(ConversionError::MalformedInput(format!(
            "{error_count} parse errors (limit {MAX_PARSE_ERRORS})"
        )));
    }

    let body_children = match find_body(&dom.document) {
        Some(body) => body.children.borrow().clone(),
        None => dom.document.children.borrow().clone(),
    };

    let mut root = Element::new(Tag::Body);
    sanitize_children(&body_children, 1, &mut root.children)?;
    normalize_whitespace(&mut root);
    prune_empty_text(&mut root);
    Ok(DomNode::Element(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::to_html;

    fn norm_html(html: &str) -> String {
        to_html(&normalize(html).unwrap())
    }

    #[test]
    fn drops_script_with_content() {
        assert_eq!(norm_html("<p>a<script>alert(1)</script>b</p>"), "<p>ab</p>");
    }

    #[test]
    fn drops_unknown_tags_with_subtree_but_unwraps_wrappers() {
        assert_eq!(norm_html("<p>Hello<x-foo>World</x-foo></p>"), "<p>Hello</p>");
        assert_eq!(norm_html("<section><p>Ok</p></section>"), "<p>Ok</p>");
    }

    #[test]
    fn drops_unrecognized_attributes() {
        assert_eq!(
            norm_html(r#"<p onclick="x()" style="text-align:center" data-x="1">t</p>"#),
            r#"<p style="text-align:center">t</p>"#
        );
        assert_eq!(
            norm_html(r#"<a href="javascript:alert(1)">x</a>"#),
            "<a>x</a>"
        );
    }

    #[test]
    fn collapses_whitespace_around_blocks() {
        let html = "<div>\n  <p>  Hello   <b> world </b>  </p>\n  <p>x</p>\n</div>";
        assert_eq!(norm_html(html), "<div><p>Hello <b>world</b></p><p>x</p></div>");
    }

    #[test]
    fn keeps_pre_verbatim() {
        assert_eq!(norm_html("<pre>a  b\n  c</pre>"), "<pre>a  b\n  c</pre>");
    }

    #[test]
    fn keeps_non_breaking_spaces() {
        assert_eq!(norm_html("<p>a&nbsp;&nbsp;b</p>"), "<p>a\u{a0}\u{a0}b</p>");
    }

    #[test]
    fn trims_around_line_breaks() {
        assert_eq!(norm_html("<p>one <br> two</p>"), "<p>one<br/>two</p>");
    }

    #[test]
    fn rejects_empty_and_nul_input() {
        assert!(matches!(normalize("   "), Err(ConversionError::MalformedInput(_))));
        assert!(matches!(normalize("<p>a\0b</p>"), Err(ConversionError::MalformedInput(_))));
    }

    #[test]
    fn rejects_excessive_nesting() {
        let html = "<span>".repeat(MAX_DEPTH + 10);
        assert!(matches!(normalize(&html), Err(ConversionError::MalformedInput(_))));
    }

    #[test]
    fn is_deterministic() {
        let html = "<h1>T</h1><ul><li>a</li><li>b <i>c</i></li></ul>";
        assert_eq!(normalize(html).unwrap(), normalize(html).unwrap());
    }

    #[test]
    fn full_documents_parse_like_fragments() {
        let fragment = "<p>a<table><tr><td>b</td></tr></table></p>";
        for doc in [
            format!("<html><body>{fragment}</body></html>"),
            format!("<!DOCTYPE HTML PUBLIC \"-//W3C//DTD HTML 4.01 Transitional//EN\"><html><body>{fragment}</body></html>"),
        ] {
            let once = normalize(&doc).unwrap();
            assert_eq!(once, normalize(fragment).unwrap());
            assert_eq!(normalize(&to_html(&once)).unwrap(), once);
        }
    }

    #[test]
    fn too_many_parse_errors_is_malformed() {
        let html = format!("<p>x</p>{}", "</x>".repeat(MAX_PARSE_ERRORS + 1));
        match normalize(&html) {
            Err(ConversionError::MalformedInput(msg)) => assert!(msg.contains("parse errors"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(normalize(&format!("<p>x</p>{}", "</x>".repeat(10))).is_ok());
    }

    #[test]
    fn renormalizing_is_a_no_op() {
        let html = "<div> <p>a <b>b </b> c</p><table><tr><td> x </td></tr></table> tail </div>";
        let once = normalize(html).unwrap();
        let twice = normalize(&to_html(&once)).unwrap();
        assert_eq!(once, twice);
    }
}
