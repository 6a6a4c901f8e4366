//! Normalized DOM → WordprocessingML content tree.

use crate::dom::{DomNode, Element, Tag};
use crate::error::{ConversionError, Result};
use crate::image::{decode_data_uri, px_to_emu, ImageSet, EMU_PER_TWIP};
use crate::model::{
    ContentNode, ImageRef, ListRef, Paragraph, ParagraphProps, ParagraphStyle, Run, RunContent,
    Table,
};
use crate::style::{parse_declarations, parse_length, StyleResolver, StyleSpec};
use crate::table;
use std::collections::BTreeMap;
use tracing::debug;

/// Caller-supplied image bytes keyed by the `src` they are referenced by.
pub type Resources = BTreeMap<String, Vec<u8>>;

/// Size given to images whose dimensions are unknown, in pixels.
const FALLBACK_IMAGE_PX: u32 = 100;

/// Inherited walk state.
#[derive(Debug, Clone, Copy, Default)]
struct Frame<'n> {
    link: Option<&'n str>,
    pre: bool,
    quote: bool,
    /// List membership of the enclosing `li`.
    item: Option<ListRef>,
    /// `(num_id, start)` of the enclosing `ul`/`ol`.
    list: Option<(u32, u32)>,
}

/// Blocks produced so far plus the paragraph being filled.
#[derive(Default)]
struct Flow {
    blocks: Vec<ContentNode>,
    current: Paragraph,
}

impl Flow {
    /// Close the current paragraph. Empty paragraphs are dropped; the next one
    /// keeps the same properties.
    fn flush(&mut self) {
        let props = self.current.props;
        let mut p = std::mem::replace(&mut self.current, Paragraph::new(props));
        if !p.has_content() {
            return;
        }
        // A trailing <br> does not start a visible line in HTML.
        if matches!(p.runs.last(), Some(Run { content: RunContent::LineBreak, .. })) {
            p.runs.pop();
        }
        self.blocks.push(ContentNode::Paragraph(p));
    }
}

pub struct Builder<'a> {
    resolver: &'a StyleResolver,
    resources: &'a Resources,
    content_width: u32,
    images: ImageSet,
    warnings: Vec<String>,
    next_list_id: u32,
}

impl<'a> Builder<'a> {
    /// `content_width` is the text width of the page in twips.
    pub fn new(resolver: &'a StyleResolver, resources: &'a Resources, content_width: u32) -> Self {
        Self {
            resolver,
            resources,
            content_width,
            images: ImageSet::new(),
            warnings: Vec::new(),
            next_list_id: 1,
        }
    }

    pub fn build(&mut self, dom: &DomNode) -> Result<Vec<ContentNode>> {
        let mut flow = Flow::default();
        self.walk(dom, &StyleSpec::default(), Frame::default(), &mut Vec::new(), &mut flow)?;
        flow.flush();
        debug!(
            blocks = flow.blocks.len(),
            images = self.images.len(),
            warnings = self.warnings.len(),
            "built content tree"
        );
        Ok(flow.blocks)
    }

    pub fn images(&self) -> &ImageSet {
        &self.images
    }

    /// Formatting the builder had to drop, such as unsupported CSS.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn into_parts(self) -> (ImageSet, Vec<String>) {
        (self.images, self.warnings)
    }

    fn walk<'n>(
        &mut self,
        node: &'n DomNode,
        inherited: &StyleSpec,
        frame: Frame<'n>,
        path: &mut Vec<Tag>,
        flow: &mut Flow,
    ) -> Result<()> {
        let el = match node {
            DomNode::Text(text) => {
                emit_text(text, inherited, frame, flow);
                return Ok(());
            }
            DomNode::Element(el) => el,
        };

        if el.tag.is_block() && !path.is_empty() {
            let mut names: Vec<&str> = path.iter().map(|t| t.name()).collect();
            names.push(el.tag.name());
            return Err(ConversionError::Structural {
                path: names.join(" > "),
            });
        }

        let (spec, ignored) = self.resolver.resolve_with_report(el, inherited);
        for decl in ignored {
            self.warnings
                .push(format!("ignored unsupported CSS on <{}>: {decl}", el.tag.name()));
        }

        match el.tag {
            Tag::Br => flow.current.runs.push(Run {
                content: RunContent::LineBreak,
                style: spec,
                link: frame.link.map(str::to_string),
            }),
            Tag::Img => {
                let run = self.image(el, spec, frame)?;
                flow.current.runs.push(run);
            }
            Tag::Hr => {
                flow.flush();
                flow.blocks.push(ContentNode::Break);
            }
            Tag::Table => {
                flow.flush();
                let table = self.table(el, &spec)?;
                if table.column_count() > 0 {
                    flow.blocks.push(ContentNode::Table(table));
                }
            }
            Tag::Ul | Tag::Ol => {
                let start = if el.tag == Tag::Ol {
                    el.attr("start")
                        .and_then(|s| s.trim().parse::<u32>().ok())
                        .unwrap_or(1)
                } else {
                    1
                };
                let id = self.next_list_id;
                self.next_list_id += 1;
                let inner = Frame {
                    list: Some((id, start)),
                    ..frame
                };
                self.block(el, &spec, ParagraphProps::default(), inner, path, flow)?;
            }
            Tag::Li => {
                let item = match (frame.list, spec.list.value()) {
                    (Some((num_id, start)), Some(level)) => Some(ListRef {
                        num_id,
                        kind: level.kind,
                        level: level.level,
                        start,
                    }),
                    _ => None,
                };
                let props = paragraph_props(el.tag, &spec, frame, item);
                let inner = Frame { item, ..frame };
                let first = flow.blocks.len();
                self.block(el, &spec, props, inner, path, flow)?;
                // Later paragraphs of the item continue it without a new number.
                if item.is_some() {
                    let mut numbered = false;
                    for node in &mut flow.blocks[first..] {
                        if let ContentNode::Paragraph(p) = node {
                            if p.props.list == item {
                                if numbered {
                                    p.props.list = None;
                                }
                                numbered = true;
                            }
                        }
                    }
                }
            }
            Tag::Pre => {
                let props = paragraph_props(el.tag, &spec, frame, frame.item);
                let inner = Frame { pre: true, ..frame };
                self.block(el, &spec, props, inner, path, flow)?;
            }
            Tag::Blockquote => {
                let props = paragraph_props(el.tag, &spec, frame, frame.item);
                let inner = Frame { quote: true, ..frame };
                self.block(el, &spec, props, inner, path, flow)?;
            }
            tag if tag.is_block() => {
                let props = paragraph_props(tag, &spec, frame, frame.item);
                self.block(el, &spec, props, frame, path, flow)?;
            }
            tag => {
                let inner = if tag == Tag::A {
                    Frame {
                        link: el.attr("href").or(frame.link),
                        ..frame
                    }
                } else {
                    frame
                };
                path.push(tag);
                for child in &el.children {
                    self.walk(child, &spec, inner, path, flow)?;
                }
                path.pop();
            }
        }
        Ok(())
    }

    /// Walk a block element's children into paragraphs carrying `props`, then
    /// restore the enclosing paragraph properties.
    fn block<'n>(
        &mut self,
        el: &'n Element,
        spec: &StyleSpec,
        props: ParagraphProps,
        frame: Frame<'n>,
        path: &mut Vec<Tag>,
        flow: &mut Flow,
    ) -> Result<()> {
        let resume = flow.current.props;
        flow.flush();
        flow.current.props = props;
        for child in &el.children {
            self.walk(child, spec, frame, path, flow)?;
        }
        flow.flush();
        flow.current.props = resume;
        Ok(())
    }

    fn table(&mut self, el: &Element, spec: &StyleSpec) -> Result<Table> {
        let width = self.content_width;
        table::layout(el, width, &mut |cell: &Element| self.cell_content(cell, spec))
    }

    fn cell_content(&mut self, cell: &Element, table_spec: &StyleSpec) -> Result<Vec<ContentNode>> {
        let (spec, ignored) = self.resolver.resolve_with_report(cell, table_spec);
        for decl in ignored {
            self.warnings
                .push(format!("ignored unsupported CSS on <{}>: {decl}", cell.tag.name()));
        }
        let mut flow = Flow::default();
        flow.current.props = ParagraphProps {
            alignment: spec.alignment.value().copied(),
            ..ParagraphProps::default()
        };
        for child in &cell.children {
            self.walk(child, &spec, Frame::default(), &mut Vec::new(), &mut flow)?;
        }
        flow.flush();
        Ok(flow.blocks)
    }

    fn image(&mut self, el: &Element, spec: StyleSpec, frame: Frame<'_>) -> Result<Run> {
        let src = el
            .attr("src")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConversionError::resource("", "image has no src"))?;
        let bytes = if src.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("data:")) {
            decode_data_uri(src)?
        } else {
            self.resources
                .get(src)
                .cloned()
                .ok_or_else(|| ConversionError::resource(src, "resource not supplied"))?
        };
        let hash = self.images.insert(src, bytes)?;
        let intrinsic = self.images.get(&hash).and_then(|img| img.size);

        let width = self.length_emu(el, "width");
        let height = self.length_emu(el, "height");
        let (mut cx, mut cy) = match (width, height, intrinsic) {
            (Some(w), Some(h), _) => (w, h),
            (Some(w), None, Some((iw, ih))) => (w, mul_div(w, ih as u64, iw as u64)),
            (None, Some(h), Some((iw, ih))) => (mul_div(h, iw as u64, ih as u64), h),
            (Some(w), None, None) => (w, w),
            (None, Some(h), None) => (h, h),
            (None, None, Some((iw, ih))) => (px_to_emu(iw), px_to_emu(ih)),
            (None, None, None) => {
                self.warnings
                    .push(format!("image size unknown, using {FALLBACK_IMAGE_PX}px"));
                (px_to_emu(FALLBACK_IMAGE_PX), px_to_emu(FALLBACK_IMAGE_PX))
            }
        };
        let max = self.content_width as u64 * EMU_PER_TWIP;
        if cx > max {
            cy = mul_div(cy, max, cx);
            cx = max;
        }

        Ok(Run {
            content: RunContent::Image(ImageRef {
                hash,
                width_emu: cx.max(1),
                height_emu: cy.max(1),
                alt: el.attr("alt").unwrap_or_default().to_string(),
            }),
            style: spec,
            link: frame.link.map(str::to_string),
        })
    }

    /// `width`/`height` from the style attribute or the plain attribute, in EMU.
    fn length_emu(&self, el: &Element, name: &str) -> Option<u64> {
        let from_style = el.attr("style").and_then(|s| {
            parse_declarations(s)
                .into_iter()
                .rev()
                .find(|(prop, _)| prop == name)
                .map(|(_, v)| v)
        });
        let raw = from_style.or_else(|| el.attr(name).map(str::to_string))?;
        let twips = parse_length(&raw)?.to_twips(self.content_width);
        (twips > 0).then(|| twips as u64 * EMU_PER_TWIP)
    }
}

/// `a * b / c` without intermediate overflow, saturating at `u64::MAX`.
fn mul_div(a: u64, b: u64, c: u64) -> u64 {
    let q = a as u128 * b as u128 / (c as u128).max(1);
    u64::try_from(q).unwrap_or(u64::MAX)
}

fn paragraph_props(tag: Tag, spec: &StyleSpec, frame: Frame<'_>, list: Option<ListRef>) -> ParagraphProps {
    let style = if let Some(level) = spec.heading.value() {
        ParagraphStyle::Heading(*level)
    } else if tag == Tag::Pre || frame.pre {
        ParagraphStyle::CodeBlock
    } else if tag == Tag::Blockquote || frame.quote {
        ParagraphStyle::Quote
    } else {
        ParagraphStyle::Normal
    };
    ParagraphProps {
        style,
        alignment: spec.alignment.value().copied(),
        list,
    }
}

fn emit_text(text: &str, style: &StyleSpec, frame: Frame<'_>, flow: &mut Flow) {
    if !frame.pre {
        flow.current.push_text(text, style, frame.link);
        return;
    }
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            flow.current.runs.push(Run {
                content: RunContent::LineBreak,
                style: style.clone(),
                link: frame.link.map(str::to_string),
            });
        }
        flow.current.push_text(line, style, frame.link);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::tests::{pixel_png, PIXEL_PNG};
    use crate::normalize::normalize;
    use crate::style::{Alignment, ListKind, Prop};

    type Built = (Vec<ContentNode>, ImageSet, Vec<String>);

    fn build_with(html: &str, resources: &Resources) -> Result<Built> {
        let resolver = StyleResolver::default();
        let dom = normalize(html)?;
        let mut builder = Builder::new(&resolver, resources, 9360);
        let content = builder.build(&dom)?;
        let (images, warnings) = builder.into_parts();
        Ok((content, images, warnings))
    }

    fn build(html: &str) -> Vec<ContentNode> {
        build_with(html, &Resources::new()).unwrap().0
    }

    fn paragraphs(content: &[ContentNode]) -> Vec<&Paragraph> {
        content
            .iter()
            .filter_map(|n| match n {
                ContentNode::Paragraph(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn text_and_inline_formatting_become_runs() {
        let content = build("<p>Hello <b>world</b></p>");
        let ps = paragraphs(&content);
        assert_eq!(ps.len(), 1);
        assert_eq!(ps[0].runs.len(), 2);
        assert_eq!(ps[0].text(), "Hello world");
        assert!(!ps[0].runs[0].style.is_bold());
        assert!(ps[0].runs[1].style.is_bold());
    }

    #[test]
    fn headings_and_alignment() {
        let content = build("<h2 style=\"text-align:center\">Title</h2><p align=\"right\">x</p>");
        let ps = paragraphs(&content);
        assert_eq!(ps[0].props.style, ParagraphStyle::Heading(2));
        assert_eq!(ps[0].props.alignment, Some(Alignment::Center));
        assert_eq!(ps[1].props.style, ParagraphStyle::Normal);
        assert_eq!(ps[1].props.alignment, Some(Alignment::Right));
    }

    #[test]
    fn nested_lists_carry_kind_and_level() {
        let content = build("<ul><li>one<ol start=\"3\"><li>two</li></ol></li><li>three</li></ul>");
        let ps = paragraphs(&content);
        let lists: Vec<ListRef> = ps.iter().map(|p| p.props.list.unwrap()).collect();
        assert_eq!(ps.iter().map(|p| p.text()).collect::<Vec<_>>(), vec!["one", "two", "three"]);
        assert_eq!((lists[0].kind, lists[0].level), (ListKind::Bullet, 0));
        assert_eq!((lists[1].kind, lists[1].level, lists[1].start), (ListKind::Decimal, 1, 3));
        assert_ne!(lists[0].num_id, lists[1].num_id);
        assert_eq!(lists[0].num_id, lists[2].num_id);
    }

    #[test]
    fn list_item_paragraphs_share_one_number() {
        let content = build("<ul><li><p>a</p><p>b</p></li><li>c<ol><li>d</li></ol>e</li></ul>");
        let ps = paragraphs(&content);
        assert_eq!(ps.iter().map(|p| p.text()).collect::<Vec<_>>(), vec!["a", "b", "c", "d", "e"]);
        let lists: Vec<Option<ListRef>> = ps.iter().map(|p| p.props.list).collect();
        assert!(lists[0].is_some());
        assert_eq!(lists[1], None);
        assert_eq!(lists[2].map(|l| l.num_id), lists[0].map(|l| l.num_id));
        assert_eq!(lists[3].map(|l| l.level), Some(1));
        assert_eq!(lists[4], None);
    }

    #[test]
    fn block_inside_inline_is_structural_error() {
        let err = build_with("<span><div>x</div></span>", &Resources::new()).unwrap_err();
        assert_eq!(
            err,
            ConversionError::Structural {
                path: "span > div".to_string()
            }
        );
    }

    #[test]
    fn breaks_and_rules() {
        let content = build("<p>a<br>b</p><hr><p><br></p>");
        assert_eq!(content.len(), 3);
        match &content[0] {
            ContentNode::Paragraph(p) => assert_eq!(p.text(), "a\nb"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(content[1], ContentNode::Break);
        match &content[2] {
            ContentNode::Paragraph(p) => assert!(p.runs.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_blocks_produce_nothing() {
        assert!(build("<div><p></p><div></div></div>").is_empty());
    }

    #[test]
    fn pre_lines_become_line_breaks() {
        let content = build("<pre>let a = 1;\nlet b = 2;</pre>");
        let ps = paragraphs(&content);
        assert_eq!(ps.len(), 1);
        assert_eq!(ps[0].props.style, ParagraphStyle::CodeBlock);
        assert_eq!(ps[0].text(), "let a = 1;\nlet b = 2;");
        assert!(ps[0].runs[0].style.is_monospace());
    }

    #[test]
    fn links_tag_their_runs() {
        let content = build("<p>go <a href=\"https://example.com\">there <i>now</i></a></p>");
        let p = paragraphs(&content)[0];
        assert_eq!(p.runs[0].link, None);
        assert_eq!(p.runs[1].link.as_deref(), Some("https://example.com"));
        assert_eq!(p.runs[2].link.as_deref(), Some("https://example.com"));
        assert!(p.runs[2].style.is_italic());
    }

    #[test]
    fn blockquote_paragraphs_use_quote_style() {
        let content = build("<blockquote><p>cited</p></blockquote>");
        assert_eq!(paragraphs(&content)[0].props.style, ParagraphStyle::Quote);
    }

    #[test]
    fn data_uri_images_are_registered() {
        let html = format!("<p><img src=\"data:image/png;base64,{PIXEL_PNG}\" alt=\"dot\" width=\"20\"></p>");
        let (content, images, _) = build_with(&html, &Resources::new()).unwrap();
        assert_eq!(images.len(), 1);
        match &paragraphs(&content)[0].runs[0].content {
            RunContent::Image(img) => {
                assert_eq!(img.alt, "dot");
                assert_eq!(img.width_emu, px_to_emu(20));
                assert_eq!(img.height_emu, px_to_emu(20));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn supplied_resources_resolve_by_src() {
        let mut resources = Resources::new();
        resources.insert("logo.png".to_string(), pixel_png());
        let (content, _, _) = build_with("<p><img src=\"logo.png\"></p>", &resources).unwrap();
        match &paragraphs(&content)[0].runs[0].content {
            RunContent::Image(img) => assert_eq!(img.width_emu, px_to_emu(1)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_resource_fails() {
        let err = build_with("<p><img src=\"missing.png\"></p>", &Resources::new()).unwrap_err();
        assert_eq!(
            err,
            ConversionError::Resource {
                src: "missing.png".to_string(),
                reason: "resource not supplied".to_string()
            }
        );
    }

    #[test]
    fn oversized_images_are_scaled_to_page() {
        let html = format!("<p><img src=\"data:image/png;base64,{PIXEL_PNG}\" width=\"1248\" height=\"100\"></p>");
        let content = build(&html);
        match &paragraphs(&content)[0].runs[0].content {
            RunContent::Image(img) => {
                assert_eq!(img.width_emu, 9360 * EMU_PER_TWIP);
                assert_eq!(img.height_emu, px_to_emu(100) / 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn extreme_image_ratios_do_not_overflow() {
        let mut png = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR".to_vec();
        png.extend_from_slice(&1u32.to_be_bytes());
        png.extend_from_slice(&u32::MAX.to_be_bytes());
        png.extend_from_slice(&[8, 6, 0, 0, 0]);
        let mut resources = Resources::new();
        resources.insert("tall.png".to_string(), png);
        let (content, _, _) =
            build_with("<p><img src=\"tall.png\" width=\"500000\"></p>", &resources).unwrap();
        match &paragraphs(&content)[0].runs[0].content {
            RunContent::Image(img) => {
                assert_eq!(img.width_emu, 9360 * EMU_PER_TWIP);
                // The intrinsic ratio saturates first, then the page fit scales it down.
                assert_eq!(img.height_emu, mul_div(u64::MAX, 9360 * EMU_PER_TWIP, px_to_emu(500000)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn table_cells_hold_built_content() {
        let content = build("<table><tr><th>H</th></tr><tr><td><ul><li>x</li></ul></td></tr></table>");
        let table = match &content[0] {
            ContentNode::Table(t) => t,
            other => panic!("unexpected {other:?}"),
        };
        let header = match &table.rows[0].cells[0].content[0] {
            ContentNode::Paragraph(p) => p,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(header.props.alignment, Some(Alignment::Center));
        assert!(header.runs[0].style.is_bold());
        assert!(table.rows[0].header);
        match &table.rows[1].cells[0].content[0] {
            ContentNode::Paragraph(p) => assert!(p.props.list.is_some()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unsupported_css_becomes_a_warning() {
        let (_, _, warnings) = build_with("<p style=\"display:flex\">x</p>", &Resources::new()).unwrap();
        assert_eq!(warnings, vec!["ignored unsupported CSS on <p>: display: flex".to_string()]);
    }

    #[test]
    fn bold_reset_is_explicit() {
        let content = build("<h1>a <span style=\"font-weight:normal\">b</span></h1>");
        let p = paragraphs(&content)[0];
        assert_eq!(p.runs[1].style.bold, Prop::Set(false));
    }
}
