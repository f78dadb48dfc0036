//! The `config` sheet: which column letters of which sheet carry which logical column.
//!
//! Layout (row 1 is the header row):
//!
//! | Sheet Name | Cell Number 1 | Column Name 1 | Cell Number 2 | Column Name 2 | … |
//! |------------|---------------|---------------|---------------|---------------|---|
//! | Sales      | B2            | Amount        | D2            | Region        |   |

use crate::{
    address::CellRef, error::AppendError, event_log::EventSink, sheet::Worksheet,
    value::CellValue, workbook::Workbook,
};
use anyhow::{Context, Result, bail};
use regex::Regex;
use std::{collections::BTreeMap, path::Path};

pub const CONFIG_SHEET: &str = "config";
pub const SHEET_NAME_HEADER: &str = "Sheet Name";

/// One `Cell Number {i}` / `Column Name {i}` pair of a config record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellSlot {
    pub index: u32,
    pub cell_reference: String,
    pub column_name: String,
}

/// One row of the config sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRecord {
    pub sheet_name: String,
    pub slots: Vec<CellSlot>,
}

/// `(sheet, reference, column name)` triple, one per slot with a non-empty column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigRow<'a> {
    pub sheet_name: &'a str,
    pub cell_reference: &'a str,
    pub column_name: &'a str,
}

impl ConfigRecord {
    pub fn rows(&self) -> impl Iterator<Item = ConfigRow<'_>> {
        self.slots
            .iter()
            .filter(|s| !s.column_name.trim().is_empty())
            .map(|s| ConfigRow {
                sheet_name: &self.sheet_name,
                cell_reference: &s.cell_reference,
                column_name: &s.column_name,
            })
    }
}

/// Parsed config sheet. An empty table means "no mapping available".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigTable {
    records: Vec<ConfigRecord>,
}

impl ConfigTable {
    pub fn new(records: Vec<ConfigRecord>) -> Self {
        Self { records }
    }

    pub fn from_workbook(wb: &Workbook) -> Result<Self> {
        if !wb.sheet_names().contains(&CONFIG_SHEET) {
            bail!("no sheet named '{CONFIG_SHEET}'");
        }
        Self::from_sheet(&wb.worksheet(CONFIG_SHEET)?)
    }

    pub fn from_sheet(sheet: &Worksheet) -> Result<Self> {
        let headers = Headers::parse(sheet)?;
        let mut records = Vec::new();
        for row in 2..=sheet.max_row() {
            let text = |col: u32| {
                sheet
                    .value(CellRef::new(row, col))
                    .map(CellValue::to_string)
                    .unwrap_or_default()
            };
            let record = ConfigRecord {
                sheet_name: text(headers.sheet_name),
                slots: headers
                    .pairs
                    .iter()
                    .map(|p| CellSlot {
                        index: p.index,
                        cell_reference: text(p.reference_col),
                        column_name: text(p.name_col),
                    })
                    .collect(),
            };
            let blank = record.sheet_name.trim().is_empty()
                && record.slots.iter().all(|s| {
                    s.cell_reference.trim().is_empty() && s.column_name.trim().is_empty()
                });
            if !blank {
                records.push(record);
            }
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[ConfigRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Triples for `sheet_name`, in sheet order then slot order.
    pub fn rows_for<'a>(&'a self, sheet_name: &'a str) -> impl Iterator<Item = ConfigRow<'a>> {
        self.records
            .iter()
            .filter(move |r| r.sheet_name == sheet_name)
            .flat_map(|r| r.rows())
    }

    /// Target sheet of the first record.
    pub fn first_sheet_name(&self) -> Option<&str> {
        self.records.first().map(|r| r.sheet_name.as_str())
    }
}

struct SlotColumns {
    index: u32,
    reference_col: u32,
    name_col: u32,
}

struct Headers {
    sheet_name: u32,
    pairs: Vec<SlotColumns>,
}

impl Headers {
    fn parse(sheet: &Worksheet) -> Result<Self> {
        let re = Regex::new(r"^(Cell Number|Column Name)\s+(\d+)$")?;
        let mut sheet_name = None;
        let mut references: BTreeMap<u32, u32> = BTreeMap::new();
        let mut names: BTreeMap<u32, u32> = BTreeMap::new();

        for (col, value) in sheet.row_values(1) {
            let header = value.to_string();
            let header = header.trim();
            if header == SHEET_NAME_HEADER {
                sheet_name.get_or_insert(col);
            } else if let Some(caps) = re.captures(header) {
                let index: u32 = caps[2]
                    .parse()
                    .with_context(|| format!("bad header '{header}'"))?;
                let slot = if &caps[1] == "Cell Number" {
                    &mut references
                } else {
                    &mut names
                };
                slot.entry(index).or_insert(col);
            }
        }

        let sheet_name =
            sheet_name.with_context(|| format!("header '{SHEET_NAME_HEADER}' not found"))?;
        let mut pairs = Vec::with_capacity(references.len());
        for (&index, &reference_col) in &references {
            let name_col = names
                .remove(&index)
                .with_context(|| format!("'Cell Number {index}' has no 'Column Name {index}'"))?;
            pairs.push(SlotColumns {
                index,
                reference_col,
                name_col,
            });
        }
        if let Some(index) = names.keys().next() {
            bail!("'Column Name {index}' has no 'Cell Number {index}'");
        }
        Ok(Self { sheet_name, pairs })
    }
}

/// Opens the workbook at `path` and reads its config sheet.
pub fn read_config<P: AsRef<Path>>(path: P) -> Result<ConfigTable, AppendError> {
    let path = path.as_ref();
    let wb = Workbook::open(path).map_err(|reason| AppendError::FileOpen {
        path: path.to_path_buf(),
        reason,
    })?;
    ConfigTable::from_workbook(&wb).map_err(|reason| AppendError::ConfigRead {
        path: path.to_path_buf(),
        reason,
    })
}

/// Like [`read_config`], but a failure is logged and yields an empty table.
pub fn read_config_logged<P: AsRef<Path>>(path: P, log: &mut dyn EventSink) -> ConfigTable {
    match read_config(path) {
        Ok(table) => table,
        Err(e) => {
            log.error(&e.to_string());
            ConfigTable::default()
        }
    }
}
