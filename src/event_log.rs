//! Explicit event sinks. Nothing here touches global logger state: the entry point builds one
//! sink and hands it to every operation that reports.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use log::Level;
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

pub trait EventSink {
    fn record(&mut self, level: Level, message: &str);

    fn info(&mut self, message: &str) {
        self.record(Level::Info, message);
    }

    fn warn(&mut self, message: &str) {
        self.record(Level::Warn, message);
    }

    fn error(&mut self, message: &str) {
        self.record(Level::Error, message);
    }
}

/// `2024-05-01 09:30:00,125 - INFO - message`
pub fn format_line(at: NaiveDateTime, level: Level, message: &str) -> String {
    format!("{} - {} - {}", at.format(TIMESTAMP_FORMAT), level, message)
}

/// Append-only text log, one line per event.
pub struct FileLog {
    file: File,
}

impl FileLog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("cannot open log file {}", path.display()))?;
        Ok(Self { file })
    }
}

impl EventSink for FileLog {
    fn record(&mut self, level: Level, message: &str) {
        let line = format_line(Local::now().naive_local(), level, message);
        if let Err(e) = writeln!(self.file, "{line}") {
            eprintln!("log write failed: {e}; dropped: {line}");
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryLog {
    pub entries: Vec<(Level, String)>,
}

impl MemoryLog {
    pub fn messages(&self, level: Level) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.as_str())
            .collect()
    }
}

impl EventSink for MemoryLog {
    fn record(&mut self, level: Level, message: &str) {
        self.entries.push((level, message.to_owned()));
    }
}
