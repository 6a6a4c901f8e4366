//! In-memory WordprocessingML content tree.

use crate::style::{Alignment, ListKind, StyleSpec};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum ContentNode {
    Paragraph(Paragraph),
    Table(Table),
    /// Horizontal separator (`<hr>`).
    Break,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParagraphStyle {
    Normal,
    Heading(u8),
    Quote,
    CodeBlock,
}

impl ParagraphStyle {
    pub fn style_id(self) -> Option<String> {
        match self {
            ParagraphStyle::Normal => None,
            ParagraphStyle::Heading(level) => Some(format!("Heading{level}")),
            ParagraphStyle::Quote => Some("Quote".to_string()),
            ParagraphStyle::CodeBlock => Some("CodeBlock".to_string()),
        }
    }
}

/// Membership of a paragraph in one list instance (`w:num`).
///
/// Every `ul`/`ol` element gets its own instance so numbering restarts the way
/// browsers render it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListRef {
    pub num_id: u32,
    pub kind: ListKind,
    pub level: u8,
    /// First number of an ordered list.
    pub start: u32,
}

/// Paragraph-level properties shared by every paragraph a block produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParagraphProps {
    pub style: ParagraphStyle,
    pub alignment: Option<Alignment>,
    pub list: Option<ListRef>,
}

impl Default for ParagraphProps {
    fn default() -> Self {
        Self {
            style: ParagraphStyle::Normal,
            alignment: None,
            list: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// SHA-256 of the image bytes, lowercase hex.
    pub hash: String,
    pub width_emu: u64,
    pub height_emu: u64,
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunContent {
    Text(String),
    LineBreak,
    Image(ImageRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub content: RunContent,
    pub style: StyleSpec,
    /// External hyperlink target.
    pub link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paragraph {
    pub props: ParagraphProps,
    pub runs: Vec<Run>,
}

impl Paragraph {
    pub fn new(props: ParagraphProps) -> Self {
        Self {
            props,
            runs: Vec::new(),
        }
    }

    pub fn has_content(&self) -> bool {
        self.runs.iter().any(|r| match &r.content {
            RunContent::Text(t) => !t.trim().is_empty(),
            RunContent::LineBreak | RunContent::Image(_) => true,
        })
    }

    /// Append text, merging with the previous run when formatting matches.
    pub fn push_text(&mut self, text: &str, style: &StyleSpec, link: Option<&str>) {
        if text.is_empty() {
            return;
        }
        if let Some(last) = self.runs.last_mut() {
            if let RunContent::Text(prev) = &mut last.content {
                if last.style == *style && last.link.as_deref() == link {
                    prev.push_str(text);
                    return;
                }
            }
        }
        self.runs.push(Run {
            content: RunContent::Text(text.to_string()),
            style: style.clone(),
            link: link.map(str::to_string),
        });
    }

    pub fn text(&self) -> String {
        self.runs
            .iter()
            .map(|r| match &r.content {
                RunContent::Text(t) => t.as_str(),
                RunContent::LineBreak => "\n",
                RunContent::Image(_) => "",
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableLayout {
    /// Column widths taken verbatim from a fully specified row.
    Fixed,
    /// Column widths derived from partial widths and the table width.
    Calculated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// First grid column covered by the cell.
    pub column: usize,
    pub col_span: usize,
    pub row_span: usize,
    pub header: bool,
    pub content: Vec<ContentNode>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub header: bool,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub layout: TableLayout,
    /// Twips, one entry per grid column.
    pub column_widths: Vec<u32>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn column_count(&self) -> usize {
        self.column_widths.len()
    }

    /// Columns of row `index` that are covered by cells starting in earlier rows.
    pub fn covered_by_rows_above(&self, index: usize) -> usize {
        self.rows[..index]
            .iter()
            .enumerate()
            .flat_map(|(r, row)| row.cells.iter().map(move |c| (r, c)))
            .filter(|(r, c)| r + c.row_span > index)
            .map(|(_, c)| c.col_span)
            .sum()
    }

    /// Cell spans of row `index` plus the merge coverage reaching into it.
    pub fn row_coverage(&self, index: usize) -> usize {
        let own: usize = self.rows[index].cells.iter().map(|c| c.col_span).sum();
        own + self.covered_by_rows_above(index)
    }

    /// Width in twips of `span` columns starting at `column`.
    pub fn span_width(&self, column: usize, span: usize) -> u32 {
        self.column_widths
            .iter()
            .skip(column)
            .take(span)
            .sum()
    }
}

/// Every list instance used by `nodes` (including table cells), keyed by num id.
pub fn list_instances(nodes: &[ContentNode]) -> BTreeMap<u32, ListRef> {
    let mut out = BTreeMap::new();
    collect_lists(nodes, &mut out);
    out
}

fn collect_lists(nodes: &[ContentNode], out: &mut BTreeMap<u32, ListRef>) {
    for n in nodes {
        match n {
            ContentNode::Paragraph(p) => {
                if let Some(list) = p.props.list {
                    out.entry(list.num_id).or_insert(list);
                }
            }
            ContentNode::Table(t) => {
                for cell in t.rows.iter().flat_map(|r| r.cells.iter()) {
                    collect_lists(&cell.content, out);
                }
            }
            ContentNode::Break => {}
        }
    }
}

/// Visit every run in document order.
pub fn for_each_run<'a>(nodes: &'a [ContentNode], f: &mut dyn FnMut(&'a Run)) {
    for n in nodes {
        match n {
            ContentNode::Paragraph(p) => p.runs.iter().for_each(&mut *f),
            ContentNode::Table(t) => {
                for cell in t.rows.iter().flat_map(|r| r.cells.iter()) {
                    for_each_run(&cell.content, f);
                }
            }
            ContentNode::Break => {}
        }
    }
}
