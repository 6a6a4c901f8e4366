//! Table layout: grid placement, merge regions and column widths.

use crate::dom::{Element, Tag};
use crate::error::{ConversionError, Result};
use crate::model::{Cell, ContentNode, Paragraph, ParagraphProps, Row, Table, TableLayout};
use crate::style::{parse_declarations, parse_length};
use std::collections::BTreeMap;
use tracing::debug;

/// Narrowest column produced when distributing leftover width, in twips.
pub const MIN_COLUMN_WIDTH: u32 = 360;

/// Word refuses tables wider than this many grid columns.
pub const MAX_COLUMNS: usize = 63;

/// Builds the content of one `td`/`th`.
pub type CellBuilder<'a> = dyn FnMut(&Element) -> Result<Vec<ContentNode>> + 'a;

fn collect_rows<'a>(el: &'a Element, out: &mut Vec<(&'a Element, bool)>, header: bool) {
    for child in el.child_elements() {
        match child.tag {
            Tag::Tr => out.push((child, header)),
            Tag::Thead => collect_rows(child, out, true),
            Tag::Tbody | Tag::Tfoot => collect_rows(child, out, false),
            _ => {}
        }
    }
}

fn span_attr(el: &Element, name: &str) -> Option<usize> {
    el.attr(name).and_then(|v| v.trim().parse::<usize>().ok())
}

/// Explicit width from the `width` attribute or a `width` declaration.
fn explicit_width(el: &Element, reference: u32) -> Option<u32> {
    let from_style = el.attr("style").and_then(|s| {
        parse_declarations(s)
            .into_iter()
            .rev()
            .find(|(prop, _)| prop == "width")
            .map(|(_, v)| v)
    });
    let raw = from_style.or_else(|| el.attr("width").map(str::to_string))?;
    let twips = parse_length(&raw)?.to_twips(reference);
    (twips > 0).then_some(twips)
}

struct Placed {
    row: usize,
    column: usize,
    col_span: usize,
    width: Option<u32>,
}

/// Lay out a `table` element.
///
/// `page_width` is the available width in twips; `build_cell` produces the
/// content of each cell.
pub fn layout(table: &Element, page_width: u32, build_cell: &mut CellBuilder<'_>) -> Result<Table> {
    let table_width = explicit_width(table, page_width).unwrap_or(page_width);

    let mut trs = Vec::new();
    collect_rows(table, &mut trs, false);
    let row_count = trs.len();

    // (row, column) → origin (row, column) of the cell covering it.
    let mut occupied: BTreeMap<(usize, usize), (usize, usize)> = BTreeMap::new();
    let mut placed: Vec<Placed> = Vec::new();
    let mut rows: Vec<Row> = Vec::with_capacity(row_count);

    for (r, (tr, in_thead)) in trs.iter().enumerate() {
        let mut row = Row {
            header: *in_thead,
            cells: Vec::new(),
        };
        let mut col = 0;
        for cell_el in tr.child_elements().filter(|e| matches!(e.tag, Tag::Td | Tag::Th)) {
            let col_span = span_attr(cell_el, "colspan").unwrap_or(1).clamp(1, MAX_COLUMNS);
            let row_span = match span_attr(cell_el, "rowspan") {
                Some(0) => row_count - r,
                Some(n) => n.min(row_count - r),
                None => 1,
            }
            .max(1);

            let start = match span_attr(cell_el, "data-col") {
                Some(c) => c,
                None => {
                    while occupied.contains_key(&(r, col)) {
                        col += 1;
                    }
                    col
                }
            };
            let end = start
                .checked_add(col_span)
                .filter(|&end| end <= MAX_COLUMNS)
                .ok_or_else(|| ConversionError::InvalidTable {
                    row: r,
                    column: start,
                    reason: format!("table exceeds {MAX_COLUMNS} columns"),
                })?;

            for rr in r..r + row_span {
                for cc in start..end {
                    if let Some(&(orow, ocol)) = occupied.get(&(rr, cc)) {
                        return Err(ConversionError::InvalidTable {
                            row: r,
                            column: start,
                            reason: format!(
                                "cell overlaps the merge region starting at row {orow}, column {ocol}"
                            ),
                        });
                    }
                }
            }
            for rr in r..r + row_span {
                for cc in start..end {
                    occupied.insert((rr, cc), (r, start));
                }
            }

            let mut content = build_cell(cell_el)?;
            if !matches!(content.last(), Some(ContentNode::Paragraph(_))) {
                content.push(ContentNode::Paragraph(Paragraph::new(ParagraphProps::default())));
            }
            placed.push(Placed {
                row: r,
                column: start,
                col_span,
                width: explicit_width(cell_el, table_width),
            });
            row.cells.push(Cell {
                column: start,
                col_span,
                row_span,
                header: cell_el.tag == Tag::Th,
                content,
            });
            col = end;
        }
        rows.push(row);
    }

    let column_count = occupied.keys().map(|&(_, c)| c + 1).max().unwrap_or(0);

    // Pad every uncovered slot; for ragged rows these land at the right end.
    for (r, row) in rows.iter_mut().enumerate() {
        for c in 0..column_count {
            if !occupied.contains_key(&(r, c)) {
                row.cells.push(Cell {
                    column: c,
                    col_span: 1,
                    row_span: 1,
                    header: false,
                    content: vec![ContentNode::Paragraph(Paragraph::new(ParagraphProps::default()))],
                });
            }
        }
        row.cells.sort_by_key(|cell| cell.column);
        if !row.cells.is_empty() && row.cells.iter().all(|c| c.header) {
            row.header = true;
        }
    }

    let (layout, column_widths) = column_widths(&placed, column_count, table_width);
    debug!(
        rows = rows.len(),
        columns = column_count,
        ?layout,
        "laid out table"
    );
    Ok(Table {
        layout,
        column_widths,
        rows,
    })
}

fn column_widths(placed: &[Placed], column_count: usize, table_width: u32) -> (TableLayout, Vec<u32>) {
    let mut by_row: BTreeMap<usize, Vec<&Placed>> = BTreeMap::new();
    for p in placed {
        by_row.entry(p.row).or_default().push(p);
    }

    // Fixed: a row that spans the whole grid with every width given.
    for cells in by_row.values() {
        let spans: usize = cells.iter().map(|p| p.col_span).sum();
        if spans != column_count || cells.iter().any(|p| p.width.is_none()) {
            continue;
        }
        let mut widths = vec![0u32; column_count];
        for p in cells {
            let total = p.width.unwrap_or(0);
            let each = total / p.col_span as u32;
            for i in 0..p.col_span {
                let extra = if i + 1 == p.col_span {
                    total - each * p.col_span as u32
                } else {
                    0
                };
                widths[p.column + i] = each + extra;
            }
        }
        return (TableLayout::Fixed, widths);
    }

    let mut widths: Vec<Option<u32>> = vec![None; column_count];
    for p in placed.iter().filter(|p| p.col_span == 1) {
        if widths[p.column].is_none() {
            widths[p.column] = p.width;
        }
    }
    let explicit: u32 = widths.iter().flatten().sum();
    let missing = widths.iter().filter(|w| w.is_none()).count() as u32;
    let share = if missing == 0 {
        0
    } else {
        (table_width.saturating_sub(explicit) / missing).max(MIN_COLUMN_WIDTH)
    };
    let widths = widths.into_iter().map(|w| w.unwrap_or(share)).collect();
    (TableLayout::Calculated, widths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::DomNode;

    fn cell(tag: Tag, text: &str, attrs: &[(&str, &str)]) -> DomNode {
        let mut el = Element::new(tag);
        el.attrs = attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        el.children.push(DomNode::Text(text.to_string()));
        DomNode::Element(el)
    }

    fn tr(cells: Vec<DomNode>) -> DomNode {
        let mut el = Element::new(Tag::Tr);
        el.children = cells;
        DomNode::Element(el)
    }

    fn table(rows: Vec<DomNode>) -> Element {
        let mut body = Element::new(Tag::Tbody);
        body.children = rows;
        let mut t = Element::new(Tag::Table);
        t.children.push(DomNode::Element(body));
        t
    }

    fn run(t: &Element) -> Result<Table> {
        layout(t, 9360, &mut |el: &Element| {
            let mut p = Paragraph::new(ParagraphProps::default());
            p.push_text(&el.text_content(), &Default::default(), None);
            Ok(vec![ContentNode::Paragraph(p)])
        })
    }

    fn assert_rows_covered(t: &Table) {
        for r in 0..t.rows.len() {
            assert_eq!(t.row_coverage(r), t.column_count(), "row {r}");
        }
    }

    #[test]
    fn simple_grid() {
        let t = run(&table(vec![
            tr(vec![cell(Tag::Td, "A", &[]), cell(Tag::Td, "B", &[])]),
            tr(vec![cell(Tag::Td, "C", &[]), cell(Tag::Td, "D", &[])]),
        ]))
        .unwrap();
        assert_eq!(t.column_count(), 2);
        assert_eq!(t.layout, TableLayout::Calculated);
        assert_eq!(t.column_widths, vec![4680, 4680]);
        assert_rows_covered(&t);
    }

    #[test]
    fn explicit_cell_inside_colspan_is_rejected() {
        let err = run(&table(vec![tr(vec![
            cell(Tag::Td, "wide", &[("colspan", "2")]),
            cell(Tag::Td, "x", &[("data-col", "1")]),
        ])]))
        .unwrap_err();
        match err {
            ConversionError::InvalidTable { row, column, .. } => {
                assert_eq!((row, column), (0, 1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn out_of_range_data_col_is_rejected() {
        for start in [MAX_COLUMNS, usize::MAX] {
            let attr = start.to_string();
            let err = run(&table(vec![tr(vec![cell(Tag::Td, "x", &[("data-col", attr.as_str())])])])).unwrap_err();
            match err {
                ConversionError::InvalidTable { row, column, .. } => {
                    assert_eq!((row, column), (0, start));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn wider_than_word_grid_is_rejected() {
        let cells = (0..=MAX_COLUMNS).map(|i| cell(Tag::Td, &i.to_string(), &[])).collect();
        let err = run(&table(vec![tr(cells)])).unwrap_err();
        assert!(matches!(err, ConversionError::InvalidTable { row: 0, column: 63, .. }), "{err:?}");
    }

    #[test]
    fn colspan_into_rowspan_is_rejected() {
        let err = run(&table(vec![
            tr(vec![cell(Tag::Td, "a", &[]), cell(Tag::Td, "tall", &[("rowspan", "2")])]),
            tr(vec![cell(Tag::Td, "c", &[("colspan", "2")])]),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConversionError::InvalidTable { row: 1, .. }));
    }

    #[test]
    fn spans_are_skipped_by_later_rows() {
        let t = run(&table(vec![
            tr(vec![
                cell(Tag::Td, "tall", &[("rowspan", "2")]),
                cell(Tag::Td, "b", &[]),
                cell(Tag::Td, "c", &[]),
            ]),
            tr(vec![cell(Tag::Td, "wide", &[("colspan", "2")])]),
        ]))
        .unwrap();
        assert_eq!(t.column_count(), 3);
        assert_eq!(t.rows[1].cells.len(), 1);
        assert_eq!(t.rows[1].cells[0].column, 1);
        assert_eq!(t.rows[1].cells[0].col_span, 2);
        assert_rows_covered(&t);
    }

    #[test]
    fn ragged_rows_are_padded_on_the_right() {
        let t = run(&table(vec![
            tr(vec![
                cell(Tag::Td, "a", &[]),
                cell(Tag::Td, "b", &[]),
                cell(Tag::Td, "c", &[]),
            ]),
            tr(vec![cell(Tag::Td, "d", &[])]),
        ]))
        .unwrap();
        let row = &t.rows[1];
        assert_eq!(row.cells.len(), 3);
        assert_eq!(row.cells[0].column, 0);
        match &row.cells[0].content[0] {
            ContentNode::Paragraph(p) => assert_eq!(p.text(), "d"),
            other => panic!("unexpected {other:?}"),
        }
        assert_rows_covered(&t);
    }

    #[test]
    fn fully_specified_row_gives_fixed_layout() {
        let t = run(&table(vec![
            tr(vec![
                cell(Tag::Td, "a", &[("width", "100")]),
                cell(Tag::Td, "b", &[("style", "width: 2in")]),
            ]),
            tr(vec![cell(Tag::Td, "c", &[]), cell(Tag::Td, "d", &[])]),
        ]))
        .unwrap();
        assert_eq!(t.layout, TableLayout::Fixed);
        assert_eq!(t.column_widths, vec![1500, 2880]);
    }

    #[test]
    fn partial_widths_share_the_remainder() {
        let t = run(&table(vec![tr(vec![
            cell(Tag::Td, "a", &[("width", "50%")]),
            cell(Tag::Td, "b", &[]),
            cell(Tag::Td, "c", &[]),
        ])]))
        .unwrap_or_else(|e| panic!("{e}"));
        // One cell lacks a width so the row cannot fix the layout.
        assert_eq!(t.layout, TableLayout::Calculated);
        assert_eq!(t.column_widths, vec![4680, 2340, 2340]);
    }

    #[test]
    fn remainder_never_drops_below_minimum() {
        let t = run(&table(vec![tr(vec![
            cell(Tag::Td, "a", &[("width", "100%")]),
            cell(Tag::Td, "b", &[]),
        ])]))
        .unwrap();
        assert_eq!(t.column_widths, vec![9360, MIN_COLUMN_WIDTH]);
    }

    #[test]
    fn header_rows_are_marked() {
        let mut head = Element::new(Tag::Thead);
        head.children.push(tr(vec![cell(Tag::Th, "h", &[])]));
        let mut t = table(vec![tr(vec![cell(Tag::Td, "v", &[])])]);
        t.children.insert(0, DomNode::Element(head));
        let t = run(&t).unwrap();
        assert!(t.rows[0].header);
        assert!(t.rows[0].cells[0].header);
        assert!(!t.rows[1].header);
    }

    #[test]
    fn empty_cells_still_hold_a_paragraph() {
        let t = layout(
            &table(vec![tr(vec![cell(Tag::Td, "", &[])])]),
            9360,
            &mut |_: &Element| Ok(Vec::new()),
        )
        .unwrap();
        assert!(matches!(
            t.rows[0].cells[0].content.as_slice(),
            [ContentNode::Paragraph(_)]
        ));
    }
}
