use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use xlsx_config_append::{
    CellValue, EventSink, FileLog, RowAppender, RowData, list_spreadsheets_logged,
    read_config_logged,
};

/// Append one row to a sheet, using the workbook's `config` sheet to place each value.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Directory to scan for .xls/.xlsx files.
    dir: Option<PathBuf>,

    /// Workbook to use instead of the first one found in DIR.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Target sheet. Defaults to the sheet of the first config row.
    #[arg(long)]
    sheet: Option<String>,

    /// Value for a column, as `NAME=VALUE` (repeatable).
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    values: Vec<(String, String)>,

    /// Append-only event log.
    #[arg(long, default_value = "app.log")]
    log_file: PathBuf,
}

fn parse_assignment(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut log = FileLog::open(&args.log_file)?;
    let dir = match args.dir {
        Some(d) => d,
        None => std::env::current_dir()?,
    };

    let file = match args.file {
        Some(f) => Some(f),
        None => match list_spreadsheets_logged(&dir, &mut log) {
            Ok(files) => files.into_iter().next(),
            Err(e) => {
                log.error(&format!("{e:#}"));
                None
            }
        },
    };
    let Some(file) = file else {
        return Ok(());
    };

    let config = read_config_logged(&file, &mut log);
    if config.is_empty() {
        return Ok(());
    }
    let Some(sheet) = args
        .sheet
        .or_else(|| config.first_sheet_name().map(str::to_owned))
    else {
        return Ok(());
    };

    let row_data: RowData = if args.values.is_empty() {
        // пример полезной нагрузки
        [("Column Name 1", "Value 1"), ("Column Name 2", "Value 2")]
            .into_iter()
            .map(|(k, v)| (k.to_owned(), CellValue::from(v)))
            .collect()
    } else {
        args.values
            .iter()
            .map(|(k, v)| (k.clone(), CellValue::infer(v)))
            .collect()
    };

    if RowAppender::new(&mut log)
        .append_to_file(&file, &sheet, &config, &row_data)
        .is_ok()
    {
        println!("Data appended successfully.");
    }
    Ok(())
}
