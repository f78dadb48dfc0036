use crate::{
    address::{CellRef, col_index, column_letters_of},
    config::ConfigTable,
    error::AppendError,
    event_log::EventSink,
    sheet::Worksheet,
    value::CellValue,
    workbook::Workbook,
};
use anyhow::{Context, Result, bail};
use std::{collections::BTreeMap, path::Path};

/// Column name → value for the row being appended.
pub type RowData = BTreeMap<String, CellValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedColumn {
    pub letters: String,
    pub column_name: String,
}

/// The same column letter was mapped to two different names; `replacement` won.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingConflict {
    pub letters: String,
    pub previous: String,
    pub replacement: String,
}

/// Writable columns of one sheet, keyed by column index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    columns: BTreeMap<u32, MappedColumn>,
    conflicts: Vec<MappingConflict>,
}

impl ColumnMapping {
    /// Maps the column of `reference` (only its letters count) to `column_name`.
    /// A later insert for the same column replaces the earlier one.
    pub fn insert(&mut self, reference: &str, column_name: &str) -> Result<()> {
        let letters = column_letters_of(reference);
        if letters.is_empty() {
            bail!("cell reference '{reference}' has no column letters");
        }
        let col = col_index(&letters)
            .with_context(|| format!("invalid cell reference '{reference}'"))?;
        let entry = MappedColumn {
            letters,
            column_name: column_name.to_owned(),
        };
        if let Some(prev) = self.columns.insert(col, entry) {
            if prev.column_name != column_name {
                self.conflicts.push(MappingConflict {
                    letters: prev.letters,
                    previous: prev.column_name,
                    replacement: column_name.to_owned(),
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, col: u32) -> Option<&MappedColumn> {
        self.columns.get(&col)
    }

    /// Column name mapped to `letters`, e.g. `"B"`.
    pub fn column_name(&self, letters: &str) -> Option<&str> {
        let col = col_index(letters).ok()?;
        self.columns.get(&col).map(|c| c.column_name.as_str())
    }

    /// `(column index, mapping)` in column order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &MappedColumn)> {
        self.columns.iter().map(|(&col, m)| (col, m))
    }

    pub fn columns(&self) -> impl Iterator<Item = u32> + '_ {
        self.columns.keys().copied()
    }

    pub fn conflicts(&self) -> &[MappingConflict] {
        &self.conflicts
    }
}

/// Builds the column mapping of `sheet_name` from every matching config record.
pub fn build_column_mapping(config: &ConfigTable, sheet_name: &str) -> Result<ColumnMapping> {
    let mut mapping = ColumnMapping::default();
    for row in config.rows_for(sheet_name) {
        mapping.insert(row.cell_reference, row.column_name)?;
    }
    Ok(mapping)
}

/// Row before the first blank cell of `col`, scanning down from row 2.
/// With no blank up to [`Worksheet::max_row`], that maximum is returned.
pub fn last_data_row(sheet: &Worksheet, col: u32) -> u32 {
    let max_row = sheet.max_row();
    (2..=max_row)
        .find(|&row| sheet.is_blank(CellRef::new(row, col)))
        .map_or(max_row, |row| row - 1)
}

/// First row below the data of every column in `columns`; `1` when `columns` is empty.
pub fn find_insertion_row<I>(sheet: &Worksheet, columns: I) -> u32
where
    I: IntoIterator<Item = u32>,
{
    columns
        .into_iter()
        .map(|col| last_data_row(sheet, col))
        .max()
        .unwrap_or(0)
        + 1
}

#[derive(Debug, Clone, PartialEq)]
pub struct WrittenCell {
    /// Cell that received the value.
    pub cell: CellRef,
    pub column_name: String,
    /// Original target when the write was redirected to a merged range's anchor.
    pub redirected_from: Option<CellRef>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppendReport {
    pub row: u32,
    pub written: Vec<WrittenCell>,
    /// Mapped column names that had no value in the row data.
    pub skipped: Vec<String>,
}

/// Writes `row_data` into `insertion_row` of `sheet` through `mapping`.
///
/// Columns without a value are left alone. A target inside a merged range is written to the
/// range's anchor instead; merged ranges are expected to be disjoint.
pub fn append_row(
    sheet: &mut Worksheet,
    mapping: &ColumnMapping,
    row_data: &RowData,
    insertion_row: u32,
) -> Result<AppendReport> {
    let mut report = AppendReport {
        row: insertion_row,
        ..Default::default()
    };
    for (col, mapped) in mapping.iter() {
        let Some(value) = row_data.get(&mapped.column_name) else {
            report.skipped.push(mapped.column_name.clone());
            continue;
        };
        let target = CellRef::new(insertion_row, col);
        let (cell, redirected_from) = match sheet.merged_range_containing(target) {
            Some(range) if range.anchor() != target => (range.anchor(), Some(target)),
            _ => (target, None),
        };
        sheet.set_value(cell, value).with_context(|| {
            format!("failed to write column '{}' to {cell}", mapped.column_name)
        })?;
        report.written.push(WrittenCell {
            cell,
            column_name: mapped.column_name.clone(),
            redirected_from,
        });
    }
    Ok(report)
}

/// Rewrites the whole package at its original path.
pub fn persist(workbook: &Workbook) -> Result<()> {
    workbook.save()
}

/// Runs a complete append against one file and reports through the given sink.
pub struct RowAppender<'a> {
    log: &'a mut dyn EventSink,
}

impl<'a> RowAppender<'a> {
    pub fn new(log: &'a mut dyn EventSink) -> Self {
        Self { log }
    }

    /// Opens `path`, appends `row_data` to `sheet_name` as mapped by `config` and saves.
    ///
    /// Every outcome is logged. On error nothing has been written to disk.
    pub fn append_to_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        sheet_name: &str,
        config: &ConfigTable,
        row_data: &RowData,
    ) -> Result<AppendReport, AppendError> {
        let path = path.as_ref();
        let outcome = Workbook::open(path)
            .map_err(|reason| AppendError::FileOpen {
                path: path.to_path_buf(),
                reason,
            })
            .and_then(|mut wb| {
                append_in_workbook(&mut wb, sheet_name, config, row_data).map_err(|reason| {
                    AppendError::Append {
                        path: path.to_path_buf(),
                        sheet: sheet_name.to_owned(),
                        reason,
                    }
                })
            });

        match outcome {
            Ok((report, mapping)) => {
                for c in mapping.conflicts() {
                    self.log
                        .warn(&format!("Conflicting mapping in {sheet_name} config: {c}"));
                }
                if report.written.is_empty() {
                    self.log.info(&format!(
                        "Nothing to append to {sheet_name} in {}: no mapped column has a value",
                        path.display()
                    ));
                } else {
                    self.log.info(&format!(
                        "Appended new row to {sheet_name} in {} at row {}",
                        path.display(),
                        report.row
                    ));
                }
                Ok(report)
            }
            Err(e) => {
                self.log.error(&e.to_string());
                Err(e)
            }
        }
    }
}

fn append_in_workbook(
    wb: &mut Workbook,
    sheet_name: &str,
    config: &ConfigTable,
    row_data: &RowData,
) -> Result<(AppendReport, ColumnMapping)> {
    let mut sheet = wb.worksheet(sheet_name)?;
    let mapping = build_column_mapping(config, sheet_name)?;
    let row = find_insertion_row(&sheet, mapping.columns());
    let report = append_row(&mut sheet, &mapping, row_data, row)?;
    if !report.written.is_empty() {
        wb.update(&sheet);
        persist(wb).with_context(|| format!("failed to save row {row}"))?;
    }
    Ok((report, mapping))
}

impl std::fmt::Display for MappingConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: '{}' replaced by '{}'",
            self.letters, self.previous, self.replacement
        )
    }
}
