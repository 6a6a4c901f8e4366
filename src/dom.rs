//! Owned DOM produced by the normalizer.
//!
//! The tree only ever contains the tags of [`Tag`]; everything else is removed
//! while normalizing, so later stages can match exhaustively.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Root of a normalized fragment (the `<body>` contents).
    Body,
    P,
    Div,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    Blockquote,
    Pre,
    Hr,
    Ul,
    Ol,
    Li,
    Table,
    Thead,
    Tbody,
    Tfoot,
    Tr,
    Td,
    Th,
    B,
    Strong,
    I,
    Em,
    U,
    S,
    Del,
    Span,
    A,
    Code,
    Sub,
    Sup,
    Br,
    Img,
}

impl Tag {
    pub fn from_name(name: &str) -> Option<Tag> {
        let tag = match name.to_ascii_lowercase().as_str() {
            "p" => Tag::P,
            "div" => Tag::Div,
            "h1" => Tag::H1,
            "h2" => Tag::H2,
            "h3" => Tag::H3,
            "h4" => Tag::H4,
            "h5" => Tag::H5,
            "h6" => Tag::H6,
            "blockquote" => Tag::Blockquote,
            "pre" => Tag::Pre,
            "hr" => Tag::Hr,
            "ul" => Tag::Ul,
            "ol" => Tag::Ol,
            "li" => Tag::Li,
            "table" => Tag::Table,
            "thead" => Tag::Thead,
            "tbody" => Tag::Tbody,
            "tfoot" => Tag::Tfoot,
            "tr" => Tag::Tr,
            "td" => Tag::Td,
            "th" => Tag::Th,
            "b" => Tag::B,
            "strong" => Tag::Strong,
            "i" => Tag::I,
            "em" => Tag::Em,
            "u" => Tag::U,
            "s" | "strike" => Tag::S,
            "del" => Tag::Del,
            "span" => Tag::Span,
            "a" => Tag::A,
            "code" => Tag::Code,
            "sub" => Tag::Sub,
            "sup" => Tag::Sup,
            "br" => Tag::Br,
            "img" => Tag::Img,
            _ => return None,
        };
        Some(tag)
    }

    pub fn name(self) -> &'static str {
        match self {
            Tag::Body => "body",
            Tag::P => "p",
            Tag::Div => "div",
            Tag::H1 => "h1",
            Tag::H2 => "h2",
            Tag::H3 => "h3",
            Tag::H4 => "h4",
            Tag::H5 => "h5",
            Tag::H6 => "h6",
            Tag::Blockquote => "blockquote",
            Tag::Pre => "pre",
            Tag::Hr => "hr",
            Tag::Ul => "ul",
            Tag::Ol => "ol",
            Tag::Li => "li",
            Tag::Table => "table",
            Tag::Thead => "thead",
            Tag::Tbody => "tbody",
            Tag::Tfoot => "tfoot",
            Tag::Tr => "tr",
            Tag::Td => "td",
            Tag::Th => "th",
            Tag::B => "b",
            Tag::Strong => "strong",
            Tag::I => "i",
            Tag::Em => "em",
            Tag::U => "u",
            Tag::S => "s",
            Tag::Del => "del",
            Tag::Span => "span",
            Tag::A => "a",
            Tag::Code => "code",
            Tag::Sub => "sub",
            Tag::Sup => "sup",
            Tag::Br => "br",
            Tag::Img => "img",
        }
    }

    /// Block-level tags start a new paragraph (or table) in the output.
    pub fn is_block(self) -> bool {
        matches!(
            self,
            Tag::Body
                | Tag::P
                | Tag::Div
                | Tag::H1
                | Tag::H2
                | Tag::H3
                | Tag::H4
                | Tag::H5
                | Tag::H6
                | Tag::Blockquote
                | Tag::Pre
                | Tag::Hr
                | Tag::Ul
                | Tag::Ol
                | Tag::Li
                | Tag::Table
                | Tag::Thead
                | Tag::Tbody
                | Tag::Tfoot
                | Tag::Tr
                | Tag::Td
                | Tag::Th
        )
    }

    pub fn is_void(self) -> bool {
        matches!(self, Tag::Br | Tag::Hr | Tag::Img)
    }

    pub fn heading_level(self) -> Option<u8> {
        match self {
            Tag::H1 => Some(1),
            Tag::H2 => Some(2),
            Tag::H3 => Some(3),
            Tag::H4 => Some(4),
            Tag::H5 => Some(5),
            Tag::H6 => Some(6),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: Tag,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<DomNode>,
}

impl Element {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Concatenated text of the subtree, ignoring markup.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for c in &self.children {
            c.collect_text(&mut out);
        }
        out
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(DomNode::as_element)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomNode {
    Element(Element),
    Text(String),
}

impl DomNode {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            DomNode::Element(e) => Some(e),
            DomNode::Text(_) => None,
        }
    }

    pub fn tag(&self) -> Option<Tag> {
        self.as_element().map(|e| e.tag)
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            DomNode::Text(t) => out.push_str(t),
            DomNode::Element(e) => {
                for c in &e.children {
                    c.collect_text(out);
                }
            }
        }
    }
}

fn esc_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn esc_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

fn serialize_node(out: &mut String, n: &DomNode) {
    match n {
        DomNode::Text(t) => out.push_str(&esc_text(t)),
        DomNode::Element(el) if el.tag == Tag::Body => {
            for c in &el.children {
                serialize_node(out, c);
            }
        }
        DomNode::Element(el) => {
            out.push('<');
            out.push_str(el.tag.name());
            for (k, v) in &el.attrs {
                out.push(' ');
                out.push_str(k);
                out.push_str("=\"");
                out.push_str(&esc_attr(v));
                out.push('"');
            }
            if el.tag.is_void() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            // The parser swallows one newline right after <pre>.
            if el.tag == Tag::Pre {
                if let Some(DomNode::Text(t)) = el.children.first() {
                    if t.starts_with('\n') {
                        out.push('\n');
                    }
                }
            }
            for c in &el.children {
                serialize_node(out, c);
            }
            out.push_str("</");
            out.push_str(el.tag.name());
            out.push('>');
        }
    }
}

/// Serialize a normalized tree back to HTML. The root `body` is not emitted.
pub fn to_html(node: &DomNode) -> String {
    let mut out = String::new();
    serialize_node(&mut out, node);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_names_round_trip() {
        for name in ["p", "h3", "td", "strong", "img", "blockquote"] {
            let tag = Tag::from_name(name).unwrap();
            assert_eq!(tag.name(), name);
        }
        assert_eq!(Tag::from_name("STRIKE"), Some(Tag::S));
        assert_eq!(Tag::from_name("script"), None);
    }

    #[test]
    fn serializes_void_and_escaped_content() {
        let mut p = Element::new(Tag::P);
        p.attrs.push(("title".to_string(), "a \"b\"".to_string()));
        p.children.push(DomNode::Text("1 < 2 & 3".to_string()));
        p.children.push(DomNode::Element(Element::new(Tag::Br)));
        let mut root = Element::new(Tag::Body);
        root.children.push(DomNode::Element(p));
        assert_eq!(
            to_html(&DomNode::Element(root)),
            "<p title=\"a &quot;b&quot;\">1 &lt; 2 &amp; 3<br/></p>"
        );
    }

    #[test]
    fn pre_with_leading_newline_keeps_it() {
        let mut pre = Element::new(Tag::Pre);
        pre.children.push(DomNode::Text("\ncode".to_string()));
        assert_eq!(to_html(&DomNode::Element(pre)), "<pre>\n\ncode</pre>");
    }
}
