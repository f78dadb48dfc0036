use anyhow::{Result, bail};
use quick_xml::escape::escape;
use std::fmt;

/// Scalar written to or read from a single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
    /// Formula expression without the leading `=`.
    Formula(String),
}

impl CellValue {
    /// Infers the cell type from a raw string: `=…` is a formula, anything that parses as a
    /// float is a number, `TRUE`/`FALSE` are booleans, the rest is text.
    pub fn infer(raw: &str) -> Self {
        if let Some(expr) = raw.strip_prefix('=') {
            return Self::Formula(expr.to_owned());
        }
        if let Ok(n) = raw.trim().parse::<f64>() {
            if n.is_finite() {
                return Self::Number(n);
            }
        }
        match raw {
            "TRUE" | "true" => Self::Bool(true),
            "FALSE" | "false" => Self::Bool(false),
            _ => Self::Text(raw.to_owned()),
        }
    }

    /// Empty text counts as a blank cell.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(s) if s.is_empty())
    }

    /// Renders the `<c>` element for `coord`, carrying over the style index if any.
    /// `ns` is the element prefix of the surrounding part, e.g. `"x:"`, or empty.
    pub(crate) fn to_cell_xml(
        &self,
        coord: &str,
        style: Option<&str>,
        ns: &str,
    ) -> Result<String> {
        let mut open = format!(r#"<{ns}c r="{coord}""#);
        if let Some(s) = style {
            open.push_str(&format!(r#" s="{s}""#));
        }
        let xml = match self {
            Self::Text(text) => {
                let space = if text.trim() != text {
                    r#" xml:space="preserve""#
                } else {
                    ""
                };
                format!(
                    r#"{open} t="inlineStr"><{ns}is><{ns}t{space}>{}</{ns}t></{ns}is></{ns}c>"#,
                    escape(text.as_str())
                )
            }
            Self::Number(n) => {
                if !n.is_finite() {
                    bail!("{n} cannot be stored in cell {coord}");
                }
                format!("{open}><{ns}v>{n}</{ns}v></{ns}c>")
            }
            Self::Bool(b) => format!(r#"{open} t="b"><{ns}v>{}</{ns}v></{ns}c>"#, u8::from(*b)),
            Self::Formula(expr) => {
                format!("{open}><{ns}f>{}</{ns}f></{ns}c>", escape(expr.as_str()))
            }
        };
        Ok(xml)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(true) => f.write_str("TRUE"),
            Self::Bool(false) => f.write_str("FALSE"),
            Self::Formula(expr) => write!(f, "={expr}"),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}
