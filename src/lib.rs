//! xlsx-config-append: appends one row to a sheet of an `.xlsx` workbook.
//!
//! The workbook carries its own `config` sheet that maps column letters of each target sheet
//! to logical column names. The new row goes below the data of every mapped column; writes
//! that land inside a merged region go to its anchor cell. Only the touched `<c>` elements
//! change, so styles, formulas and merges survive the edit.

pub mod address;
pub mod appender;
pub mod config;
pub mod error;
pub mod event_log;
pub mod files;
pub mod sheet;
pub mod value;
pub mod workbook;
mod xml;

pub use address::{CellRange, CellRef};
pub use appender::{
    AppendReport, ColumnMapping, RowAppender, RowData, append_row, build_column_mapping,
    find_insertion_row, last_data_row, persist,
};
pub use config::{ConfigTable, read_config, read_config_logged};
pub use error::AppendError;
pub use event_log::{EventSink, FileLog, MemoryLog};
pub use files::{list_spreadsheets, list_spreadsheets_logged};
pub use sheet::Worksheet;
pub use value::CellValue;
pub use workbook::{Workbook, scan};
