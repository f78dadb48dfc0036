use crate::{
    address::{CellRange, CellRef, MAX_COLUMN},
    value::CellValue,
    xml::{attr, push_text},
};
use anyhow::{Context, Result, bail};
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use std::{collections::BTreeMap, ops::Range};

/// A worksheet part loaded into memory.
///
/// `xml` is the authoritative content; `cells` and `merged` are derived from it on load and
/// kept in sync by [`Worksheet::set_value`]. Edits splice only the affected `<c>` element,
/// every other byte of the part stays as it was.
#[derive(Debug, Clone)]
pub struct Worksheet {
    name: String,
    part: String,
    xml: Vec<u8>,
    cells: BTreeMap<CellRef, CellValue>,
    max_row: u32,
    merged: Vec<CellRange>,
}

impl Worksheet {
    /// Parses worksheet XML. `shared` is the workbook's shared-string table.
    pub fn parse(name: &str, part: &str, xml: Vec<u8>, shared: &[String]) -> Result<Self> {
        let mut cells = BTreeMap::new();
        let mut merged = Vec::new();
        let mut max_row = 0u32;
        {
            let mut reader = Reader::from_reader(xml.as_slice());
            let mut row = 0u32;
            let mut next_col = 1u32;
            let mut pending: Option<PendingCell> = None;
            let mut capture = Capture::Nothing;
            let mut in_phonetic = false;

            loop {
                let ev = reader.read_event()?;
                match &ev {
                    Event::Start(e) | Event::Empty(e) => {
                        let is_empty = matches!(ev, Event::Empty(_));
                        match e.local_name().as_ref() {
                            b"row" => {
                                row = row_number(e, row)?;
                                next_col = 1;
                            }
                            b"c" => {
                                let at = cell_position(e, row, next_col)?;
                                next_col = at.col + 1;
                                max_row = max_row.max(at.row);
                                if !is_empty {
                                    pending = Some(PendingCell::new(at, attr(e, b"t")?));
                                }
                            }
                            b"v" if !is_empty && pending.is_some() => capture = Capture::Value,
                            b"f" => {
                                if let Some(p) = pending.as_mut() {
                                    p.formula.get_or_insert_with(String::new);
                                    if !is_empty {
                                        capture = Capture::Formula;
                                    }
                                }
                            }
                            b"is" => {
                                if let Some(p) = pending.as_mut() {
                                    p.inline.get_or_insert_with(String::new);
                                }
                            }
                            b"t" if !is_empty && !in_phonetic && pending.is_some() => {
                                capture = Capture::Inline
                            }
                            b"rPh" if !is_empty => in_phonetic = true,
                            b"mergeCell" => {
                                if let Some(r) = attr(e, b"ref")? {
                                    let range = CellRange::parse(&r)
                                        .with_context(|| format!("bad merged range '{r}'"))?;
                                    merged.push(range);
                                }
                            }
                            _ => {}
                        }
                    }
                    Event::End(e) => match e.local_name().as_ref() {
                        b"v" | b"f" | b"t" => capture = Capture::Nothing,
                        b"rPh" => in_phonetic = false,
                        b"c" => {
                            capture = Capture::Nothing;
                            if let Some(p) = pending.take() {
                                if let Some(v) = p.resolve(shared)? {
                                    cells.insert(p.at, v);
                                }
                            }
                        }
                        _ => {}
                    },
                    Event::Eof => break,
                    _ => {
                        if let Some(p) = pending.as_mut() {
                            let buf = match capture {
                                Capture::Value => p.value.get_or_insert_with(String::new),
                                Capture::Inline => p.inline.get_or_insert_with(String::new),
                                Capture::Formula => p.formula.get_or_insert_with(String::new),
                                Capture::Nothing => continue,
                            };
                            push_text(buf, &ev)?;
                        }
                    }
                }
            }
        }

        Ok(Self {
            name: name.to_owned(),
            part: part.to_owned(),
            xml,
            cells,
            max_row,
            merged,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Zip entry this sheet was loaded from.
    pub fn part(&self) -> &str {
        &self.part
    }

    pub fn xml(&self) -> &[u8] {
        &self.xml
    }

    /// Largest row index holding any `<c>` element; never less than 1.
    pub fn max_row(&self) -> u32 {
        self.max_row.max(1)
    }

    pub fn value(&self, at: CellRef) -> Option<&CellValue> {
        self.cells.get(&at)
    }

    /// Missing cells and empty strings are blank. Formulas never are.
    pub fn is_blank(&self, at: CellRef) -> bool {
        self.cells.get(&at).is_none_or(CellValue::is_empty)
    }

    /// Stored values of one row, in column order.
    pub fn row_values(&self, row: u32) -> impl Iterator<Item = (u32, &CellValue)> {
        self.cells
            .range(CellRef::new(row, 1)..=CellRef::new(row, MAX_COLUMN))
            .map(|(at, v)| (at.col, v))
    }

    /// Merged ranges in document order.
    pub fn merged_ranges(&self) -> &[CellRange] {
        &self.merged
    }

    /// First merged range (document order) that covers `at`.
    pub fn merged_range_containing(&self, at: CellRef) -> Option<&CellRange> {
        self.merged.iter().find(|r| r.contains(at))
    }

    /// Writes `value` into the cell at `at`, creating the cell and its row when missing.
    ///
    /// An existing cell keeps its style index. Rows and cells stay sorted, as Excel reports
    /// out-of-order records as corruption.
    pub fn set_value(&mut self, at: CellRef, value: &CellValue) -> Result<()> {
        let Layout {
            sheet_data,
            sheet_data_close,
            row,
            next_row,
            ns,
        } = self.locate(at)?;
        let coord = at.to_string();

        match row {
            Some(row) => {
                let cell_xml = value.to_cell_xml(&coord, row.style.as_deref(), &ns)?;
                if let Some(span) = row.cell {
                    self.xml.splice(span, cell_xml.into_bytes());
                } else if row.self_closing {
                    let close = self_closing_end(&self.xml, &row.open)?;
                    let body = format!(">{cell_xml}</{ns}row>");
                    self.xml.splice(close..row.open.end, body.into_bytes());
                } else {
                    let pos = row
                        .insert_before
                        .or(row.close)
                        .with_context(|| format!("</row> not found for row {}", at.row))?;
                    self.xml.splice(pos..pos, cell_xml.into_bytes());
                }
            }
            None => {
                let cell_xml = value.to_cell_xml(&coord, None, &ns)?;
                let row_xml = format!(r#"<{ns}row r="{}">{cell_xml}</{ns}row>"#, at.row);
                let (data_open, data_self_closing) =
                    sheet_data.context("<sheetData> not found")?;
                if data_self_closing {
                    let close = self_closing_end(&self.xml, &data_open)?;
                    let body = format!(">{row_xml}</{ns}sheetData>");
                    self.xml.splice(close..data_open.end, body.into_bytes());
                } else {
                    let pos = next_row
                        .or(sheet_data_close)
                        .context("</sheetData> tag not found")?;
                    self.xml.splice(pos..pos, row_xml.into_bytes());
                }
            }
        }

        self.cells.insert(at, value.clone());
        self.max_row = self.max_row.max(at.row);
        Ok(())
    }

    /// Byte offsets of everything `set_value` may need to touch for `at`.
    fn locate(&self, at: CellRef) -> Result<Layout> {
        let mut reader = Reader::from_reader(self.xml.as_slice());
        let mut layout = Layout::default();
        let mut row = 0u32;
        let mut next_col = 1u32;
        let mut in_target = false;
        let mut open_cell: Option<usize> = None;

        loop {
            let ev = reader.read_event()?;
            let end = reader.buffer_position() as usize;
            match &ev {
                Event::Start(e) | Event::Empty(e) => {
                    let is_empty = matches!(ev, Event::Empty(_));
                    match e.local_name().as_ref() {
                        b"sheetData" => {
                            let start = tag_start(&self.xml, end)?;
                            layout.sheet_data = Some((start..end, is_empty));
                            layout.ns = element_prefix(e);
                        }
                        b"row" => {
                            row = row_number(e, row)?;
                            next_col = 1;
                            in_target = false;
                            if row == at.row && layout.row.is_none() {
                                let start = tag_start(&self.xml, end)?;
                                layout.row = Some(RowSlot::new(start..end, is_empty));
                                in_target = !is_empty;
                            } else if row > at.row
                                && layout.row.is_none()
                                && layout.next_row.is_none()
                            {
                                layout.next_row = Some(tag_start(&self.xml, end)?);
                            }
                        }
                        b"c" if in_target => {
                            let pos = cell_position(e, row, next_col)?;
                            next_col = pos.col + 1;
                            let start = tag_start(&self.xml, end)?;
                            if let Some(slot) = layout.row.as_mut() {
                                let searching = slot.cell.is_none() && open_cell.is_none();
                                if searching && pos.col == at.col {
                                    slot.style = attr(e, b"s")?;
                                    if is_empty {
                                        slot.cell = Some(start..end);
                                    } else {
                                        open_cell = Some(start);
                                    }
                                } else if searching
                                    && pos.col > at.col
                                    && slot.insert_before.is_none()
                                {
                                    slot.insert_before = Some(start);
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Event::End(e) => match e.local_name().as_ref() {
                    b"c" => {
                        if let (Some(start), Some(slot)) = (open_cell.take(), layout.row.as_mut())
                        {
                            slot.cell = Some(start..end);
                        }
                    }
                    b"row" if in_target => {
                        if let Some(slot) = layout.row.as_mut() {
                            slot.close = Some(tag_start(&self.xml, end)?);
                        }
                        in_target = false;
                    }
                    b"sheetData" => layout.sheet_data_close = Some(tag_start(&self.xml, end)?),
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(layout)
    }
}

#[derive(Clone, Copy)]
enum Capture {
    Nothing,
    Value,
    Inline,
    Formula,
}

/// A `<c>` element collected while parsing.
struct PendingCell {
    at: CellRef,
    kind: Option<String>,
    value: Option<String>,
    inline: Option<String>,
    formula: Option<String>,
}

impl PendingCell {
    fn new(at: CellRef, kind: Option<String>) -> Self {
        Self {
            at,
            kind,
            value: None,
            inline: None,
            formula: None,
        }
    }

    fn resolve(&self, shared: &[String]) -> Result<Option<CellValue>> {
        if let Some(f) = &self.formula {
            return Ok(Some(CellValue::Formula(f.clone())));
        }
        let kind = self.kind.as_deref().unwrap_or("n");
        if kind == "inlineStr" {
            return Ok(self.inline.clone().map(CellValue::Text));
        }
        let Some(v) = self.value.as_deref() else {
            return Ok(None);
        };
        let value = match kind {
            "s" => {
                let idx: usize = v
                    .trim()
                    .parse()
                    .with_context(|| format!("bad shared string index '{v}' in {}", self.at))?;
                let text = shared
                    .get(idx)
                    .with_context(|| format!("shared string {idx} out of range in {}", self.at))?;
                CellValue::Text(text.clone())
            }
            "b" => CellValue::Bool(v.trim() == "1"),
            "n" => v
                .trim()
                .parse::<f64>()
                .map(CellValue::Number)
                .unwrap_or_else(|_| CellValue::Text(v.to_owned())),
            _ => CellValue::Text(v.to_owned()),
        };
        Ok(Some(value))
    }
}

#[derive(Default)]
struct Layout {
    /// Start tag of `<sheetData>` and whether it is self-closing.
    sheet_data: Option<(Range<usize>, bool)>,
    sheet_data_close: Option<usize>,
    row: Option<RowSlot>,
    /// First row after the target row, when the target row does not exist.
    next_row: Option<usize>,
    /// Prefix bound to the main namespace (`"x:"`), empty for the default namespace.
    ns: String,
}

struct RowSlot {
    open: Range<usize>,
    self_closing: bool,
    close: Option<usize>,
    cell: Option<Range<usize>>,
    style: Option<String>,
    insert_before: Option<usize>,
}

impl RowSlot {
    fn new(open: Range<usize>, self_closing: bool) -> Self {
        Self {
            open,
            self_closing,
            close: None,
            cell: None,
            style: None,
            insert_before: None,
        }
    }
}

fn row_number(e: &BytesStart<'_>, prev: u32) -> Result<u32> {
    match attr(e, b"r")? {
        Some(r) => r
            .trim()
            .parse::<u32>()
            .with_context(|| format!("invalid row number '{r}'")),
        None => Ok(prev + 1),
    }
}

fn cell_position(e: &BytesStart<'_>, row: u32, next_col: u32) -> Result<CellRef> {
    match attr(e, b"r")? {
        Some(r) => CellRef::parse(&r),
        None => Ok(CellRef::new(row.max(1), next_col)),
    }
}

fn element_prefix(e: &BytesStart<'_>) -> String {
    match e.name().prefix() {
        Some(p) => format!("{}:", String::from_utf8_lossy(p.as_ref())),
        None => String::new(),
    }
}

/// Start offset of the tag that ends at `end`. Attribute values cannot hold a raw `<`.
fn tag_start(xml: &[u8], end: usize) -> Result<usize> {
    memchr::memrchr(b'<', &xml[..end]).context("malformed worksheet XML")
}

/// Offset of the `/>` that closes a self-closing tag.
fn self_closing_end(xml: &[u8], tag: &Range<usize>) -> Result<usize> {
    match memchr::memmem::rfind(&xml[tag.clone()], b"/>") {
        Some(p) => Ok(tag.start + p),
        None => bail!("expected a self-closing tag"),
    }
}
