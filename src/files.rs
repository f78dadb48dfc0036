use crate::event_log::EventSink;
use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const SPREADSHEET_EXTENSIONS: &[&str] = &["xls", "xlsx"];

/// Spreadsheet files directly inside `dir`, sorted by name.
/// Office lock files (`~$Book.xlsx`) are left out.
pub fn list_spreadsheets<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("cannot list {}", dir.display()))? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with("~$") {
            continue;
        }
        let wanted = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                SPREADSHEET_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });
        if wanted {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn list_spreadsheets_logged<P: AsRef<Path>>(
    dir: P,
    log: &mut dyn EventSink,
) -> Result<Vec<PathBuf>> {
    let files = list_spreadsheets(dir)?;
    let names: Vec<String> = files
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect();
    log.info(&format!("Excel files found: {names:?}"));
    Ok(files)
}
