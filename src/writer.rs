//! WordprocessingML emitters for the parts under `word/`.

use crate::error::{ConversionError, Result};
use crate::model::{Cell, ContentNode, ListRef, Paragraph, Run, RunContent, Table, TableLayout};
use crate::style::{heading_size, ListKind, StyleSpec, VerticalAlign, MAX_LIST_LEVEL};
use std::collections::BTreeMap;

/// Escape text for element content and attribute values. Characters XML 1.0
/// cannot carry are dropped.
pub fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(ch),
            c if (c as u32) < 0x20 || c == '\u{FFFE}' || c == '\u{FFFF}' => {}
            _ => out.push(ch),
        }
    }
    out
}

/// Page geometry in twips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSetup {
    pub width: u32,
    pub height: u32,
    pub margin: u32,
}

impl Default for PageSetup {
    /// US Letter with one-inch margins.
    fn default() -> Self {
        Self {
            width: 12240,
            height: 15840,
            margin: 1440,
        }
    }
}

impl PageSetup {
    /// Width available to content between the margins.
    pub fn content_width(&self) -> u32 {
        self.width.saturating_sub(self.margin * 2)
    }
}

/// Relationship ids the main document refers to.
#[derive(Debug, Clone, Default)]
pub struct PartLinks {
    /// Content hash → relationship id.
    pub images: BTreeMap<String, String>,
    /// Hyperlink target → relationship id.
    pub links: BTreeMap<String, String>,
}

fn run_props_xml(style: &StyleSpec) -> String {
    let mut out = String::new();
    if style.is_monospace() {
        out.push_str("<w:rFonts w:ascii=\"Consolas\" w:hAnsi=\"Consolas\" w:cs=\"Consolas\"/>");
    }
    match style.bold.value() {
        Some(true) => out.push_str("<w:b/>"),
        Some(false) => out.push_str("<w:b w:val=\"0\"/>"),
        None => {}
    }
    if style.is_italic() {
        out.push_str("<w:i/>");
    }
    if style.is_strike() {
        out.push_str("<w:strike/>");
    }
    if let Some(color) = style.color.value() {
        out.push_str(&format!("<w:color w:val=\"{color}\"/>"));
    }
    if let Some(sz) = style.font_size.value() {
        out.push_str(&format!("<w:sz w:val=\"{sz}\"/><w:szCs w:val=\"{sz}\"/>"));
    }
    if style.is_underline() {
        out.push_str("<w:u w:val=\"single\"/>");
    }
    if let Some(fill) = style.shading.value() {
        out.push_str(&format!(
            "<w:shd w:val=\"clear\" w:color=\"auto\" w:fill=\"{fill}\"/>"
        ));
    }
    match style.vertical.value() {
        Some(VerticalAlign::Superscript) => out.push_str("<w:vertAlign w:val=\"superscript\"/>"),
        Some(VerticalAlign::Subscript) => out.push_str("<w:vertAlign w:val=\"subscript\"/>"),
        _ => {}
    }
    if out.is_empty() {
        out
    } else {
        format!("<w:rPr>{out}</w:rPr>")
    }
}

fn text_run_xml(text: &str, rpr: &str) -> String {
    let mut out = String::new();
    out.push_str("<w:r>");
    out.push_str(rpr);
    for (i, piece) in text.split('\t').enumerate() {
        if i > 0 {
            out.push_str("<w:tab/>");
        }
        if !piece.is_empty() {
            out.push_str("<w:t xml:space=\"preserve\">");
            out.push_str(&xml_escape(piece));
            out.push_str("</w:t>");
        }
    }
    out.push_str("</w:r>");
    out
}

fn hr_paragraph_xml() -> &'static str {
    "<w:p><w:pPr><w:pBdr><w:bottom w:val=\"single\" w:sz=\"6\" w:space=\"1\" w:color=\"auto\"/></w:pBdr></w:pPr></w:p>"
}

/// Serializes the content tree into `word/document.xml`.
pub struct DocumentWriter<'a> {
    links: &'a PartLinks,
    page: PageSetup,
    next_drawing_id: u32,
}

impl<'a> DocumentWriter<'a> {
    pub fn new(links: &'a PartLinks, page: PageSetup) -> Self {
        Self {
            links,
            page,
            next_drawing_id: 1,
        }
    }

    pub fn document_xml(&mut self, content: &[ContentNode]) -> Result<String> {
        let mut body = String::new();
        self.blocks(&mut body, content)?;
        let PageSetup {
            width,
            height,
            margin,
        } = self.page;
        Ok(format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"
 xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"
 xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"
 xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"
 xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">
  <w:body>
    {body}
    <w:sectPr>
      <w:pgSz w:w="{width}" w:h="{height}"/>
      <w:pgMar w:top="{margin}" w:right="{margin}" w:bottom="{margin}" w:left="{margin}" w:header="708" w:footer="708" w:gutter="0"/>
      <w:cols w:space="708"/>
      <w:docGrid w:linePitch="360"/>
    </w:sectPr>
  </w:body>
</w:document>"#
        ))
    }

    fn blocks(&mut self, out: &mut String, nodes: &[ContentNode]) -> Result<()> {
        for node in nodes {
            match node {
                ContentNode::Paragraph(p) => self.paragraph(out, p)?,
                ContentNode::Table(t) => self.table(out, t)?,
                ContentNode::Break => out.push_str(hr_paragraph_xml()),
            }
        }
        Ok(())
    }

    fn paragraph(&mut self, out: &mut String, p: &Paragraph) -> Result<()> {
        out.push_str("<w:p>");

        let mut ppr = String::new();
        if let Some(id) = p.props.style.style_id() {
            ppr.push_str(&format!("<w:pStyle w:val=\"{id}\"/>"));
        }
        if let Some(list) = p.props.list {
            ppr.push_str(&format!(
                "<w:numPr><w:ilvl w:val=\"{}\"/><w:numId w:val=\"{}\"/></w:numPr>",
                list.level, list.num_id
            ));
        }
        if let Some(align) = p.props.alignment {
            ppr.push_str(&format!("<w:jc w:val=\"{}\"/>", align.wordml()));
        }
        if !ppr.is_empty() {
            out.push_str("<w:pPr>");
            out.push_str(&ppr);
            out.push_str("</w:pPr>");
        }

        // Consecutive runs sharing a target go into one hyperlink.
        let links = self.links;
        let mut i = 0;
        while i < p.runs.len() {
            match &p.runs[i].link {
                Some(href) => {
                    let rid = links.links.get(href).ok_or_else(|| {
                        ConversionError::packaging(
                            "word/document.xml",
                            format!("no relationship for hyperlink `{href}`"),
                        )
                    })?;
                    out.push_str(&format!("<w:hyperlink r:id=\"{rid}\" w:history=\"1\">"));
                    while i < p.runs.len() && p.runs[i].link.as_ref() == Some(href) {
                        self.run(out, &p.runs[i])?;
                        i += 1;
                    }
                    out.push_str("</w:hyperlink>");
                }
                None => {
                    self.run(out, &p.runs[i])?;
                    i += 1;
                }
            }
        }

        out.push_str("</w:p>");
        Ok(())
    }

    fn run(&mut self, out: &mut String, run: &Run) -> Result<()> {
        let rpr = run_props_xml(&run.style);
        match &run.content {
            RunContent::Text(text) => {
                if !text.is_empty() {
                    out.push_str(&text_run_xml(text, &rpr));
                }
            }
            RunContent::LineBreak => {
                out.push_str("<w:r>");
                out.push_str(&rpr);
                out.push_str("<w:br/></w:r>");
            }
            RunContent::Image(img) => {
                let links = self.links;
                let rid = links
                    .images
                    .get(&img.hash)
                    .ok_or_else(|| ConversionError::resource(img.hash.clone(), "image bytes not supplied"))?;
                let id = self.next_drawing_id;
                self.next_drawing_id += 1;
                let (cx, cy) = (img.width_emu, img.height_emu);
                out.push_str("<w:r>");
                out.push_str(&rpr);
                out.push_str(&format!(
                    concat!(
                        r#"<w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0">"#,
                        r#"<wp:extent cx="{cx}" cy="{cy}"/><wp:effectExtent l="0" t="0" r="0" b="0"/>"#,
                        r#"<wp:docPr id="{id}" name="Picture {id}" descr="{alt}"/>"#,
                        r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks noChangeAspect="1"/></wp:cNvGraphicFramePr>"#,
                        r#"<a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
                        r#"<pic:pic><pic:nvPicPr><pic:cNvPr id="{id}" name="Picture {id}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
                        r#"<pic:blipFill><a:blip r:embed="{rid}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
                        r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
                        r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr></pic:pic>"#,
                        r#"</a:graphicData></a:graphic></wp:inline></w:drawing>"#
                    ),
                    cx = cx,
                    cy = cy,
                    id = id,
                    alt = xml_escape(&img.alt),
                    rid = rid,
                ));
                out.push_str("</w:r>");
            }
        }
        Ok(())
    }

    fn table(&mut self, out: &mut String, t: &Table) -> Result<()> {
        let total: u32 = t.column_widths.iter().sum();
        out.push_str("<w:tbl>");
        out.push_str("<w:tblPr>");
        out.push_str(&format!("<w:tblW w:w=\"{total}\" w:type=\"dxa\"/>"));
        out.push_str(
            r#"<w:tblBorders>
<w:top w:val="single" w:sz="4" w:space="0" w:color="D9D9D9"/>
<w:left w:val="single" w:sz="4" w:space="0" w:color="D9D9D9"/>
<w:bottom w:val="single" w:sz="4" w:space="0" w:color="D9D9D9"/>
<w:right w:val="single" w:sz="4" w:space="0" w:color="D9D9D9"/>
<w:insideH w:val="single" w:sz="4" w:space="0" w:color="D9D9D9"/>
<w:insideV w:val="single" w:sz="4" w:space="0" w:color="D9D9D9"/>
</w:tblBorders>"#,
        );
        if t.layout == TableLayout::Fixed {
            out.push_str("<w:tblLayout w:type=\"fixed\"/>");
        }
        out.push_str("</w:tblPr>");

        out.push_str("<w:tblGrid>");
        for w in &t.column_widths {
            out.push_str(&format!("<w:gridCol w:w=\"{w}\"/>"));
        }
        out.push_str("</w:tblGrid>");

        for (r, row) in t.rows.iter().enumerate() {
            out.push_str("<w:tr>");
            if row.header {
                out.push_str("<w:trPr><w:tblHeader/></w:trPr>");
            }
            for slot in row_slots(t, r) {
                match slot {
                    Slot::Origin(cell) => self.cell(out, t, cell)?,
                    Slot::Continue { column, span } => {
                        out.push_str("<w:tc>");
                        out.push_str(&tc_pr_xml(t.span_width(column, span), span, Some(""), false));
                        out.push_str("<w:p/></w:tc>");
                    }
                }
            }
            out.push_str("</w:tr>");
        }

        out.push_str("</w:tbl>");
        Ok(())
    }

    fn cell(&mut self, out: &mut String, t: &Table, cell: &Cell) -> Result<()> {
        let merge = (cell.row_span > 1).then_some(" w:val=\"restart\"");
        out.push_str("<w:tc>");
        out.push_str(&tc_pr_xml(
            t.span_width(cell.column, cell.col_span),
            cell.col_span,
            merge,
            cell.header,
        ));
        self.blocks(out, &cell.content)?;
        out.push_str("</w:tc>");
        Ok(())
    }
}

enum Slot<'t> {
    Origin(&'t Cell),
    /// Position covered by a row span from above.
    Continue { column: usize, span: usize },
}

impl Slot<'_> {
    fn column(&self) -> usize {
        match self {
            Slot::Origin(c) => c.column,
            Slot::Continue { column, .. } => *column,
        }
    }
}

/// Cells of row `r` in grid order, including vertical merge continuations.
fn row_slots(t: &Table, r: usize) -> Vec<Slot<'_>> {
    let mut slots: Vec<Slot<'_>> = t.rows[r].cells.iter().map(Slot::Origin).collect();
    for (r0, row) in t.rows[..r].iter().enumerate() {
        for c in &row.cells {
            if r0 + c.row_span > r {
                slots.push(Slot::Continue {
                    column: c.column,
                    span: c.col_span,
                });
            }
        }
    }
    slots.sort_by_key(Slot::column);
    slots
}

fn tc_pr_xml(width: u32, span: usize, v_merge: Option<&str>, header: bool) -> String {
    let mut out = String::new();
    out.push_str("<w:tcPr>");
    out.push_str(&format!("<w:tcW w:w=\"{width}\" w:type=\"dxa\"/>"));
    if span > 1 {
        out.push_str(&format!("<w:gridSpan w:val=\"{span}\"/>"));
    }
    if let Some(val) = v_merge {
        out.push_str(&format!("<w:vMerge{val}/>"));
    }
    if header {
        out.push_str("<w:shd w:val=\"clear\" w:color=\"auto\" w:fill=\"F2F2F2\"/>");
    }
    out.push_str("</w:tcPr>");
    out
}

pub fn styles_xml() -> String {
    let mut out = String::new();
    out.push_str(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:docDefaults>
    <w:rPrDefault><w:rPr><w:rFonts w:ascii="Calibri" w:hAnsi="Calibri" w:cs="Calibri"/><w:sz w:val="22"/><w:szCs w:val="22"/></w:rPr></w:rPrDefault>
    <w:pPrDefault><w:pPr><w:spacing w:after="160" w:line="259" w:lineRule="auto"/></w:pPr></w:pPrDefault>
  </w:docDefaults>
  <w:style w:type="paragraph" w:default="1" w:styleId="Normal">
    <w:name w:val="Normal"/>
    <w:qFormat/>
  </w:style>
"#,
    );
    for level in 1..=6u8 {
        let before = if level <= 2 { 360 - 120 * (level as u32 - 1) } else { 160 };
        out.push_str(&format!(
            r#"  <w:style w:type="paragraph" w:styleId="Heading{level}">
    <w:name w:val="heading {level}"/>
    <w:basedOn w:val="Normal"/>
    <w:next w:val="Normal"/>
    <w:uiPriority w:val="9"/>
    <w:qFormat/>
    <w:pPr>
      <w:keepNext/>
      <w:spacing w:before="{before}" w:after="120"/>
      <w:outlineLvl w:val="{outline}"/>
    </w:pPr>
    <w:rPr>
      <w:b/>
      <w:sz w:val="{size}"/>
    </w:rPr>
  </w:style>
"#,
            outline = level - 1,
            size = heading_size(level),
        ));
    }
    out.push_str(
        r#"  <w:style w:type="paragraph" w:styleId="Quote">
    <w:name w:val="Quote"/>
    <w:basedOn w:val="Normal"/>
    <w:uiPriority w:val="29"/>
    <w:qFormat/>
    <w:pPr>
      <w:ind w:left="720" w:right="720"/>
    </w:pPr>
    <w:rPr>
      <w:i/>
      <w:color w:val="404040"/>
    </w:rPr>
  </w:style>
  <w:style w:type="paragraph" w:styleId="CodeBlock">
    <w:name w:val="Code Block"/>
    <w:basedOn w:val="Normal"/>
    <w:uiPriority w:val="99"/>
    <w:qFormat/>
    <w:pPr>
      <w:spacing w:before="120" w:after="120"/>
    </w:pPr>
    <w:rPr>
      <w:rFonts w:ascii="Consolas" w:hAnsi="Consolas" w:cs="Consolas"/>
      <w:sz w:val="20"/>
    </w:rPr>
  </w:style>
</w:styles>"#,
    );
    out
}

fn level_text(kind: ListKind, level: u8) -> String {
    match kind {
        ListKind::Bullet => ["•", "◦", "▪"][level as usize % 3].to_string(),
        ListKind::Decimal => format!("%{}.", level + 1),
    }
}

fn abstract_num_xml(kind: ListKind) -> String {
    let fmt = match kind {
        ListKind::Bullet => "bullet",
        ListKind::Decimal => "decimal",
    };
    let mut out = format!(
        "  <w:abstractNum w:abstractNumId=\"{}\">\n    <w:multiLevelType w:val=\"hybridMultilevel\"/>\n",
        kind.abstract_id()
    );
    for level in 0..=MAX_LIST_LEVEL {
        out.push_str(&format!(
            "    <w:lvl w:ilvl=\"{level}\"><w:start w:val=\"1\"/><w:numFmt w:val=\"{fmt}\"/><w:lvlText w:val=\"{text}\"/><w:lvlJc w:val=\"left\"/><w:pPr><w:ind w:left=\"{left}\" w:hanging=\"360\"/></w:pPr></w:lvl>\n",
            text = level_text(kind, level),
            left = 720 * (level as u32 + 1),
        ));
    }
    out.push_str("  </w:abstractNum>\n");
    out
}

/// `word/numbering.xml` with one `w:num` per list instance.
pub fn numbering_xml(lists: &BTreeMap<u32, ListRef>) -> String {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(r#"<w:numbering xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#);
    out.push('\n');
    out.push_str(&abstract_num_xml(ListKind::Bullet));
    out.push_str(&abstract_num_xml(ListKind::Decimal));
    for (num_id, list) in lists {
        out.push_str(&format!(
            "  <w:num w:numId=\"{num_id}\"><w:abstractNumId w:val=\"{}\"/>",
            list.kind.abstract_id()
        ));
        if list.kind == ListKind::Decimal {
            out.push_str(&format!(
                "<w:lvlOverride w:ilvl=\"{}\"><w:startOverride w:val=\"{}\"/></w:lvlOverride>",
                list.level, list.start
            ));
        }
        out.push_str("</w:num>\n");
    }
    out.push_str("</w:numbering>");
    out
}

pub fn settings_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:settings xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:zoom w:percent="100"/>
  <w:defaultTabStop w:val="720"/>
  <w:characterSpacingControl w:val="doNotCompress"/>
  <w:compat>
    <w:compatSetting w:name="compatibilityMode" w:uri="http://schemas.microsoft.com/office/word" w:val="15"/>
  </w:compat>
</w:settings>"#
}
