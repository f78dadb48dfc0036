//! A1-style addressing: column letters, cell coordinates and rectangular ranges.

use anyhow::{Context, Result, bail};
use std::fmt;

/// Last column Excel supports (`XFD`).
pub const MAX_COLUMN: u32 = 16_384;

/// 1-based column index → letters (`1` → `A`, `27` → `AA`).
pub fn col_letter(col: u32) -> String {
    let mut n = col.saturating_sub(1);
    let mut s = String::new();
    loop {
        s.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    s
}

/// Letters → 1-based column index. Case-insensitive.
pub fn col_index(letters: &str) -> Result<u32> {
    if letters.is_empty() || !letters.bytes().all(|b| b.is_ascii_alphabetic()) {
        bail!("invalid column letters '{letters}'");
    }
    let idx = letters.bytes().try_fold(0u32, |acc, b| {
        acc.checked_mul(26)?
            .checked_add((b.to_ascii_uppercase() - b'A' + 1) as u32)
    });
    match idx {
        Some(i) if i <= MAX_COLUMN => Ok(i),
        _ => bail!("column '{letters}' is beyond {}", col_letter(MAX_COLUMN)),
    }
}

/// Keeps only the alphabetic part of a reference: `"C5"` → `"C"`, `"$c$5"` → `"C"`.
pub fn column_letters_of(reference: &str) -> String {
    reference
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// 1-based `(row, col)` coordinate of a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Parses `B5` or `$B$5`.
    pub fn parse(coord: &str) -> Result<Self> {
        let coord = coord.trim().replace('$', "");
        let row_start = coord
            .find(|c: char| c.is_ascii_digit())
            .with_context(|| format!("invalid cell coordinate '{coord}': no digits found"))?;
        let col = col_index(&coord[..row_start])?;
        let row: u32 = coord[row_start..]
            .parse()
            .with_context(|| format!("invalid row number in cell coordinate '{coord}'"))?;
        if row == 0 {
            bail!("row 0 in cell coordinate '{coord}'");
        }
        Ok(Self { row, col })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", col_letter(self.col), self.row)
    }
}

/// Inclusive rectangle, e.g. a merged region. The anchor is the top-left cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub start: CellRef,
    pub end: CellRef,
}

impl CellRange {
    /// Parses `B2:C2`; a single coordinate is a 1x1 range.
    pub fn parse(range: &str) -> Result<Self> {
        let (a, b) = match range.split_once(':') {
            Some((a, b)) => (CellRef::parse(a)?, CellRef::parse(b)?),
            None => {
                let c = CellRef::parse(range)?;
                (c, c)
            }
        };
        Ok(Self {
            start: CellRef::new(a.row.min(b.row), a.col.min(b.col)),
            end: CellRef::new(a.row.max(b.row), a.col.max(b.col)),
        })
    }

    pub fn anchor(&self) -> CellRef {
        self.start
    }

    pub fn contains(&self, cell: CellRef) -> bool {
        (self.start.row..=self.end.row).contains(&cell.row)
            && (self.start.col..=self.end.col).contains(&cell.col)
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}
