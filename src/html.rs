// =============================================================================
// html.rs - JUST ENOUGH HTML TO READ A PROCESS PAGE
// =============================================================================
//
// The portal's process page is server-rendered markup that nobody validates.
// We don't build a DOM. We lowercase the page once (ASCII only, so byte
// offsets line up with the original) and walk it with substring searches.
//
// Each field is read through an ordered list of `Strategy`s. The first one
// that yields non-empty text wins, which keeps per-field fallback logic as
// data instead of nested ifs.
// =============================================================================

use std::ops::Range;

/// Tags that never have a closing counterpart.
const VOID_TAGS: &[&str] = &["br", "hr", "img", "input", "meta", "link", "col", "wbr"];

/// How many elements past a label we'll look at before giving up.
const MAX_SIBLING_HOPS: usize = 3;

/// Replace every `<...>` run with a space, keeping text content.
pub fn strip_tags(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;

    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

/// Decode the entities the portal actually emits: the XML five, `&nbsp;`,
/// Portuguese accented letters and numeric references.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&tail[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse().ok()?,
        };
        return char::from_u32(code);
    }

    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "aacute" => 'á',
        "agrave" => 'à',
        "acirc" => 'â',
        "atilde" => 'ã',
        "eacute" => 'é',
        "ecirc" => 'ê',
        "iacute" => 'í',
        "oacute" => 'ó',
        "ocirc" => 'ô',
        "otilde" => 'õ',
        "uacute" => 'ú',
        "ccedil" => 'ç',
        "Aacute" => 'Á',
        "Eacute" => 'É',
        "Ccedil" => 'Ç',
        "ordm" => 'º',
        "ordf" => 'ª',
        _ => return None,
    };
    Some(c)
}

/// Markup fragment to one line of display text.
pub fn clean_text(fragment: &str) -> String {
    decode_entities(&strip_tags(fragment))
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone)]
struct Element {
    inner: Range<usize>,
    end: usize,
}

/// A page plus its ASCII-lowercased twin for case-insensitive searching.
pub struct Document<'a> {
    raw: &'a str,
    lower: String,
}

impl<'a> Document<'a> {
    pub fn parse(raw: &'a str) -> Self {
        Self {
            raw,
            lower: raw.to_ascii_lowercase(),
        }
    }

    fn find_from(&self, pattern_lower: &str, from: usize) -> Option<usize> {
        self.lower
            .get(from..)?
            .find(pattern_lower)
            .map(|offset| offset + from)
    }

    /// Next `<name` that really is that tag, not a longer name sharing the
    /// prefix (`<td` must not match `<tdata`).
    fn find_tag(&self, prefix: &str, mut from: usize) -> Option<usize> {
        loop {
            let pos = self.find_from(prefix, from)?;
            match self.lower.as_bytes().get(pos + prefix.len()) {
                Some(b) if b.is_ascii_whitespace() || *b == b'>' || *b == b'/' => return Some(pos),
                Some(_) => from = pos + prefix.len(),
                None => return None,
            }
        }
    }

    /// Next opening tag at or after `from`. Skips closing tags, comments and
    /// doctype.
    fn next_open_tag(&self, mut from: usize) -> Option<usize> {
        loop {
            let pos = self.find_from("<", from)?;
            match self.lower.as_bytes().get(pos + 1) {
                Some(b) if b.is_ascii_alphabetic() => return Some(pos),
                Some(_) => from = pos + 1,
                None => return None,
            }
        }
    }

    /// The element whose opening tag starts at `start`, matched against its
    /// closing tag with nesting of the same tag name taken into account.
    fn element_at(&self, start: usize) -> Option<Element> {
        let open_end = self.find_from(">", start)? + 1;
        let name: String = self.lower[start + 1..open_end]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();
        if name.is_empty() {
            return None;
        }
        if VOID_TAGS.contains(&name.as_str()) || self.lower[start..open_end].ends_with("/>") {
            return Some(Element {
                inner: open_end..open_end,
                end: open_end,
            });
        }

        let open_pat = format!("<{}", name);
        let close_pat = format!("</{}", name);
        let mut depth = 1usize;
        let mut cursor = open_end;
        loop {
            let close = self.find_tag(&close_pat, cursor)?;
            match self.find_tag(&open_pat, cursor) {
                Some(open) if open < close => {
                    depth += 1;
                    cursor = open + open_pat.len();
                }
                _ => {
                    depth -= 1;
                    if depth == 0 {
                        let end = self.find_from(">", close)? + 1;
                        return Some(Element {
                            inner: open_end..close,
                            end,
                        });
                    }
                    cursor = close + close_pat.len();
                }
            }
        }
    }

    fn text(&self, range: Range<usize>) -> String {
        clean_text(&self.raw[range])
    }

    /// True when `pos` sits in text content, not inside a tag's attributes.
    fn in_text_node(&self, pos: usize) -> bool {
        match self.lower[..pos].rfind(['<', '>']) {
            Some(i) => self.lower.as_bytes()[i] == b'>',
            None => true,
        }
    }

    /// Occurrences of `label` that sit in text content.
    fn label_positions(&self, label: &str) -> Vec<Range<usize>> {
        let needle = label.to_ascii_lowercase();
        let mut found = Vec::new();
        if needle.is_empty() {
            return found;
        }
        let mut from = 0;
        while let Some(pos) = self.find_from(&needle, from) {
            from = pos + needle.len();
            if self.in_text_node(pos) {
                found.push(pos..pos + needle.len());
            }
        }
        found
    }

    /// First `pattern` that starts a whole attribute (`id=` but not the
    /// tail of `data-id=` or `grid=`).
    fn find_attribute(&self, pattern: &str) -> Option<usize> {
        let bytes = self.lower.as_bytes();
        let mut from = 0;
        while let Some(pos) = self.find_from(pattern, from) {
            if pos > 0 && bytes[pos - 1].is_ascii_whitespace() {
                return Some(pos);
            }
            from = pos + pattern.len();
        }
        None
    }

    fn element_by_id(&self, id: &str) -> Option<Element> {
        let id = id.to_ascii_lowercase();
        [format!("id=\"{}\"", id), format!("id='{}'", id)]
            .iter()
            .find_map(|pattern| self.find_attribute(pattern))
            .and_then(|attr| self.lower[..attr].rfind('<'))
            .and_then(|start| self.element_at(start))
    }

    /// Text of the element with the given id.
    pub fn text_by_id(&self, id: &str) -> Option<String> {
        self.element_by_id(id)
            .map(|element| self.text(element.inner))
            .filter(|text| !text.is_empty())
    }

    /// Value next to a label: inline (`Valor: R$ 10,00`) or in one of the
    /// next few elements (`<label>Classe</label> <span>Precatório</span>`).
    ///
    /// A label occurrence followed by anything other than a colon or the
    /// end of its text node is a different phrase and is skipped.
    pub fn text_after_label(&self, label: &str) -> Option<String> {
        for hit in self.label_positions(label) {
            let next_tag = self.find_from("<", hit.end).unwrap_or(self.raw.len());
            let trailing = clean_text(&self.raw[hit.end..next_tag]);
            let trailing = trailing.trim_start();
            if let Some(inline) = trailing.strip_prefix(':') {
                let inline = inline.trim();
                if !inline.is_empty() {
                    return Some(inline.to_string());
                }
            } else if !trailing.is_empty() {
                continue;
            }

            let mut cursor = next_tag;
            for _ in 0..MAX_SIBLING_HOPS {
                let Some(element) = self
                    .next_open_tag(cursor)
                    .and_then(|open| self.element_at(open))
                else {
                    break;
                };
                let text = self.text(element.inner.clone());
                if !text.is_empty() {
                    return Some(text);
                }
                cursor = element.end;
            }
        }
        None
    }

    /// Text of the first table cell following a cell that holds `label`.
    pub fn table_cell_after(&self, label: &str) -> Option<String> {
        self.label_positions(label).into_iter().find_map(|hit| {
            let cell = self.find_tag("<td", hit.end)?;
            let element = self.element_at(cell)?;
            Some(self.text(element.inner)).filter(|text| !text.is_empty())
        })
    }

    /// Cell `column` of the first data row of the table with the given id.
    pub fn first_row_cell(&self, table_id: &str, column: usize) -> Option<String> {
        let table = self.element_by_id(table_id)?;
        let mut cursor = table.inner.start;

        while let Some(row_start) = self
            .find_tag("<tr", cursor)
            .filter(|&pos| pos < table.inner.end)
        {
            let row = self.element_at(row_start)?;
            let cells = self.cells(row.inner.clone());
            if !cells.is_empty() {
                return cells.into_iter().nth(column).filter(|text| !text.is_empty());
            }
            cursor = row.end;
        }
        None
    }

    fn cells(&self, row: Range<usize>) -> Vec<String> {
        let mut cells = Vec::new();
        let mut cursor = row.start;
        while let Some(start) = self.find_tag("<td", cursor).filter(|&pos| pos < row.end) {
            let Some(cell) = self.element_at(start) else {
                break;
            };
            cells.push(self.text(cell.inner.clone()));
            cursor = cell.end;
        }
        cells
    }
}

/// One way of locating a field on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    ById(&'static str),
    AfterLabel(&'static str),
    TableCell(&'static str),
    FirstRowCell { table_id: &'static str, column: usize },
}

impl Strategy {
    pub fn extract(&self, doc: &Document<'_>) -> Option<String> {
        match *self {
            Strategy::ById(id) => doc.text_by_id(id),
            Strategy::AfterLabel(label) => doc.text_after_label(label),
            Strategy::TableCell(label) => doc.table_cell_after(label),
            Strategy::FirstRowCell { table_id, column } => doc.first_row_cell(table_id, column),
        }
    }
}

/// Try each strategy in order; the first non-empty value wins.
pub fn first_non_empty(doc: &Document<'_>, strategies: &[Strategy]) -> Option<String> {
    strategies
        .iter()
        .find_map(|strategy| strategy.extract(doc).filter(|value| !value.trim().is_empty()))
}
