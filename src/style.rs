//! Style resolution: tag semantics, class mappings and inline CSS folded into a
//! fixed vocabulary of paragraph and run properties.

use crate::dom::{DomNode, Element, Tag};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

/// Font size used when nothing sets one, in half-points (11pt).
pub const DEFAULT_FONT_SIZE: u32 = 22;

/// Deepest list level WordML numbering supports.
pub const MAX_LIST_LEVEL: u8 = 8;

/// Per-field formatting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Prop<T> {
    /// No opinion; the parent's value applies.
    #[default]
    Inherit,
    /// Explicitly reset to the document default.
    Unset,
    Set(T),
}

impl<T: Clone> Prop<T> {
    /// This value layered over `parent`.
    pub fn over(&self, parent: &Prop<T>) -> Prop<T> {
        match self {
            Prop::Inherit => parent.clone(),
            other => other.clone(),
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Prop::Set(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Center,
    Right,
    Justify,
}

impl Alignment {
    pub fn wordml(self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
            Alignment::Justify => "both",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalAlign {
    Baseline,
    Superscript,
    Subscript,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Bullet,
    Decimal,
}

impl ListKind {
    /// `w:abstractNumId` of the level definitions in `numbering.xml`.
    pub fn abstract_id(self) -> u32 {
        match self {
            ListKind::Bullet => 1,
            ListKind::Decimal => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListLevel {
    pub kind: ListKind,
    pub level: u8,
}

/// Resolved formatting for one content unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleSpec {
    pub alignment: Prop<Alignment>,
    pub bold: Prop<bool>,
    pub italic: Prop<bool>,
    pub underline: Prop<bool>,
    pub strike: Prop<bool>,
    /// Half-points.
    pub font_size: Prop<u32>,
    /// `RRGGBB`.
    pub color: Prop<String>,
    /// Background shading, `RRGGBB`.
    pub shading: Prop<String>,
    pub monospace: Prop<bool>,
    pub vertical: Prop<VerticalAlign>,
    pub heading: Prop<u8>,
    pub list: Prop<ListLevel>,
}

impl StyleSpec {
    /// Layer `self` (local declarations) over `parent`.
    pub fn cascade(&self, parent: &StyleSpec) -> StyleSpec {
        StyleSpec {
            alignment: self.alignment.over(&parent.alignment),
            bold: self.bold.over(&parent.bold),
            italic: self.italic.over(&parent.italic),
            underline: self.underline.over(&parent.underline),
            strike: self.strike.over(&parent.strike),
            font_size: self.font_size.over(&parent.font_size),
            color: self.color.over(&parent.color),
            shading: self.shading.over(&parent.shading),
            monospace: self.monospace.over(&parent.monospace),
            vertical: self.vertical.over(&parent.vertical),
            heading: self.heading.over(&parent.heading),
            list: self.list.over(&parent.list),
        }
    }

    pub fn is_bold(&self) -> bool {
        self.bold.value().copied().unwrap_or(false)
    }

    pub fn is_italic(&self) -> bool {
        self.italic.value().copied().unwrap_or(false)
    }

    pub fn is_underline(&self) -> bool {
        self.underline.value().copied().unwrap_or(false)
    }

    pub fn is_strike(&self) -> bool {
        self.strike.value().copied().unwrap_or(false)
    }

    pub fn is_monospace(&self) -> bool {
        self.monospace.value().copied().unwrap_or(false)
    }

    pub fn effective_font_size(&self) -> u32 {
        self.font_size.value().copied().unwrap_or(DEFAULT_FONT_SIZE)
    }
}

/// Class name → CSS declaration block, supplied by the caller.
pub type ClassStyles = BTreeMap<String, String>;

/// A CSS length as written by the author.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Length {
    Px(f64),
    Pt(f64),
    Em(f64),
    Percent(f64),
    In(f64),
    Cm(f64),
    Mm(f64),
}

impl Length {
    /// Twips; percentages and ems are relative to `reference` twips.
    pub fn to_twips(self, reference: u32) -> u32 {
        let twips = match self {
            Length::Px(v) => v * 15.0,
            Length::Pt(v) => v * 20.0,
            Length::Em(v) => v * reference as f64,
            Length::Percent(v) => v / 100.0 * reference as f64,
            Length::In(v) => v * 1440.0,
            Length::Cm(v) => v * 567.0,
            Length::Mm(v) => v * 56.7,
        };
        twips.max(0.0).round() as u32
    }
}

lazy_static! {
    static ref LENGTH_RE: Regex =
        Regex::new(r"^(\d+(?:\.\d+)?|\.\d+)\s*(px|pt|em|rem|%|in|cm|mm)?$").unwrap();
    static ref HEX_COLOR_RE: Regex = Regex::new(r"^#([0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").unwrap();
    static ref RGB_COLOR_RE: Regex = Regex::new(
        r"^rgba?\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*(?:,\s*[\d.]+\s*)?\)$"
    )
    .unwrap();
}

pub fn parse_length(value: &str) -> Option<Length> {
    let value = value.trim().to_ascii_lowercase();
    let caps = LENGTH_RE.captures(&value)?;
    let v: f64 = caps[1].parse().ok()?;
    let len = match caps.get(2).map(|m| m.as_str()) {
        None | Some("px") => Length::Px(v),
        Some("pt") => Length::Pt(v),
        Some("em") | Some("rem") => Length::Em(v),
        Some("%") => Length::Percent(v),
        Some("in") => Length::In(v),
        Some("cm") => Length::Cm(v),
        Some("mm") => Length::Mm(v),
        Some(_) => return None,
    };
    Some(len)
}

pub fn parse_color(value: &str) -> Option<String> {
    let v = value.trim().to_ascii_lowercase();
    if let Some(caps) = HEX_COLOR_RE.captures(&v) {
        let hex = &caps[1];
        let full = if hex.len() == 3 {
            hex.chars().flat_map(|c| [c, c]).collect::<String>()
        } else {
            hex.to_string()
        };
        return Some(full.to_ascii_uppercase());
    }
    if let Some(caps) = RGB_COLOR_RE.captures(&v) {
        let mut out = String::with_capacity(6);
        for i in 1..=3 {
            let c: u32 = caps[i].parse().ok()?;
            out.push_str(&format!("{:02X}", c.min(255)));
        }
        return Some(out);
    }
    let named = match v.as_str() {
        "black" => "000000",
        "white" => "FFFFFF",
        "red" => "FF0000",
        "green" => "008000",
        "blue" => "0000FF",
        "yellow" => "FFFF00",
        "orange" => "FFA500",
        "purple" => "800080",
        "gray" | "grey" => "808080",
        "silver" => "C0C0C0",
        "maroon" => "800000",
        "navy" => "000080",
        "teal" => "008080",
        _ => return None,
    };
    Some(named.to_string())
}

/// Split a `style` attribute into `(property, value)` pairs.
pub fn parse_declarations(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let prop = prop.trim().to_ascii_lowercase();
            let value = value.trim();
            let value = value
                .strip_suffix("!important")
                .unwrap_or(value)
                .trim()
                .to_string();
            if prop.is_empty() || value.is_empty() {
                return None;
            }
            Some((prop, value))
        })
        .collect()
}

fn keyword<T>(value: &str) -> Option<Prop<T>> {
    match value.to_ascii_lowercase().as_str() {
        "initial" | "unset" | "revert" => Some(Prop::Unset),
        "inherit" => Some(Prop::Inherit),
        _ => None,
    }
}

fn font_size_half_points(value: &str, inherited: u32) -> Option<u32> {
    let v = value.to_ascii_lowercase();
    let keyword = match v.as_str() {
        "xx-small" => Some(14),
        "x-small" => Some(15),
        "small" => Some(20),
        "medium" => Some(24),
        "large" => Some(27),
        "x-large" => Some(36),
        "xx-large" => Some(48),
        _ => None,
    };
    if keyword.is_some() {
        return keyword;
    }
    let hp = match parse_length(&v)? {
        Length::Pt(p) => p * 2.0,
        Length::Px(p) => p * 1.5,
        Length::Em(e) => e * inherited as f64,
        Length::Percent(p) => p / 100.0 * inherited as f64,
        Length::In(i) => i * 144.0,
        Length::Cm(c) => c * 56.7,
        Length::Mm(m) => m * 5.67,
    };
    Some(hp.round().max(1.0) as u32)
}

/// Properties consumed by other stages (table layout, image sizing).
fn is_layout_property(prop: &str) -> bool {
    matches!(prop, "width" | "height" | "min-width" | "max-width")
}

/// Apply one declaration to `local`; returns false when the property or value is
/// not supported.
fn apply_declaration(local: &mut StyleSpec, prop: &str, value: &str, inherited: &StyleSpec) -> bool {
    let lower = value.to_ascii_lowercase();
    match prop {
        "text-align" => {
            local.alignment = match keyword(value) {
                Some(k) => k,
                None => match lower.as_str() {
                    "left" | "start" => Prop::Set(Alignment::Left),
                    "center" => Prop::Set(Alignment::Center),
                    "right" | "end" => Prop::Set(Alignment::Right),
                    "justify" => Prop::Set(Alignment::Justify),
                    _ => return false,
                },
            };
        }
        "font-weight" => {
            local.bold = match keyword(value) {
                Some(k) => k,
                None => match lower.as_str() {
                    "bold" | "bolder" => Prop::Set(true),
                    "normal" | "lighter" => Prop::Set(false),
                    n => match n.parse::<u32>() {
                        Ok(w) => Prop::Set(w >= 600),
                        Err(_) => return false,
                    },
                },
            };
        }
        "font-style" => {
            local.italic = match keyword(value) {
                Some(k) => k,
                None => match lower.as_str() {
                    "italic" | "oblique" => Prop::Set(true),
                    "normal" => Prop::Set(false),
                    _ => return false,
                },
            };
        }
        "text-decoration" | "text-decoration-line" => {
            if let Some(k) = keyword::<bool>(value) {
                local.underline = k;
                local.strike = k;
            } else if lower.split_whitespace().any(|w| w == "none") {
                local.underline = Prop::Set(false);
                local.strike = Prop::Set(false);
            } else {
                let words: Vec<&str> = lower.split_whitespace().collect();
                let underline = words.contains(&"underline");
                let strike = words.contains(&"line-through");
                if !underline && !strike {
                    return false;
                }
                if underline {
                    local.underline = Prop::Set(true);
                }
                if strike {
                    local.strike = Prop::Set(true);
                }
            }
        }
        "font-size" => {
            local.font_size = match keyword(value) {
                Some(k) => k,
                None => match font_size_half_points(value, inherited.effective_font_size()) {
                    Some(hp) => Prop::Set(hp),
                    None => return false,
                },
            };
        }
        "color" => {
            local.color = match keyword(value) {
                Some(k) => k,
                None => match parse_color(value) {
                    Some(c) => Prop::Set(c),
                    None => return false,
                },
            };
        }
        "background-color" | "background" => {
            local.shading = match keyword(value) {
                Some(k) => k,
                None if lower == "transparent" || lower == "none" => Prop::Unset,
                None => match parse_color(value) {
                    Some(c) => Prop::Set(c),
                    None => return false,
                },
            };
        }
        "font-family" => {
            local.monospace = keyword(value).unwrap_or_else(|| {
                let mono = ["monospace", "courier", "consolas", "menlo", "mono"]
                    .iter()
                    .any(|m| lower.contains(m));
                Prop::Set(mono)
            });
        }
        "vertical-align" => {
            local.vertical = match keyword(value) {
                Some(k) => k,
                None => match lower.as_str() {
                    "super" => Prop::Set(VerticalAlign::Superscript),
                    "sub" => Prop::Set(VerticalAlign::Subscript),
                    "baseline" => Prop::Set(VerticalAlign::Baseline),
                    _ => return false,
                },
            };
        }
        p if is_layout_property(p) => {}
        _ => return false,
    }
    true
}

pub(crate) fn heading_size(level: u8) -> u32 {
    match level {
        1 => 32,
        2 => 28,
        3 => 26,
        4 => 24,
        5 => 22,
        _ => 20,
    }
}

fn tag_defaults(tag: Tag, inherited: &StyleSpec) -> StyleSpec {
    let mut local = StyleSpec::default();
    match tag {
        Tag::B | Tag::Strong => local.bold = Prop::Set(true),
        Tag::I | Tag::Em => local.italic = Prop::Set(true),
        Tag::U => local.underline = Prop::Set(true),
        Tag::S | Tag::Del => local.strike = Prop::Set(true),
        Tag::Code | Tag::Pre => local.monospace = Prop::Set(true),
        Tag::Sub => local.vertical = Prop::Set(VerticalAlign::Subscript),
        Tag::Sup => local.vertical = Prop::Set(VerticalAlign::Superscript),
        Tag::A => {
            local.underline = Prop::Set(true);
            local.color = Prop::Set("0563C1".to_string());
        }
        Tag::Th => {
            local.bold = Prop::Set(true);
            local.alignment = Prop::Set(Alignment::Center);
        }
        Tag::Ul | Tag::Ol => {
            let kind = if tag == Tag::Ol {
                ListKind::Decimal
            } else {
                ListKind::Bullet
            };
            let level = match inherited.list.value() {
                Some(l) => (l.level + 1).min(MAX_LIST_LEVEL),
                None => 0,
            };
            local.list = Prop::Set(ListLevel { kind, level });
        }
        // Table contents never continue an outer list.
        Tag::Table => local.list = Prop::Unset,
        _ => {
            if let Some(level) = tag.heading_level() {
                local.heading = Prop::Set(level);
                local.bold = Prop::Set(true);
                local.font_size = Prop::Set(heading_size(level));
            }
        }
    }
    local
}

/// Resolves [`StyleSpec`]s for DOM nodes.
#[derive(Debug, Clone, Default)]
pub struct StyleResolver {
    classes: ClassStyles,
}

impl StyleResolver {
    pub fn new(classes: ClassStyles) -> Self {
        Self { classes }
    }

    pub fn resolve(&self, node: &DomNode, inherited: &StyleSpec) -> StyleSpec {
        match node {
            DomNode::Element(el) => self.resolve_with_report(el, inherited).0,
            DomNode::Text(_) => inherited.clone(),
        }
    }

    /// Like [`resolve`](Self::resolve), also returning the declarations that were
    /// ignored because they are not supported.
    pub fn resolve_with_report(&self, el: &Element, inherited: &StyleSpec) -> (StyleSpec, Vec<String>) {
        let mut local = tag_defaults(el.tag, inherited);
        let mut ignored = Vec::new();

        if let Some(class) = el.attr("class") {
            for name in class.split_whitespace() {
                if let Some(decls) = self.classes.get(name) {
                    for (prop, value) in parse_declarations(decls) {
                        if !apply_declaration(&mut local, &prop, &value, inherited) {
                            ignored.push(format!("{prop}: {value}"));
                        }
                    }
                }
            }
        }

        if el.tag.is_block() {
            if let Some(align) = el.attr("align") {
                apply_declaration(&mut local, "text-align", align, inherited);
            }
        }

        if let Some(style) = el.attr("style") {
            for (prop, value) in parse_declarations(style) {
                if !apply_declaration(&mut local, &prop, &value, inherited) {
                    ignored.push(format!("{prop}: {value}"));
                }
            }
        }

        (local.cascade(inherited), ignored)
    }
}
