use crate::{
    sheet::Worksheet,
    xml::{attr, push_text, read_part, resolve_target},
};
use ::zip as zip_crate;
use anyhow::{Context, Result};
use quick_xml::{Reader, events::Event};
use std::{
    collections::HashMap,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_FALLBACK: &str = "xl/sharedStrings.xml";

/// One entry of the workbook's `<sheets>` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetEntry {
    pub name: String,
    /// Zip entry of the worksheet, e.g. `xl/worksheets/sheet2.xml`.
    pub part: String,
}

/// An opened `.xlsx` package.
///
/// Only the parts that were changed through [`Workbook::update`] are rewritten on save;
/// every other entry is copied raw, so styles, drawings and the rest survive untouched.
pub struct Workbook {
    src_path: PathBuf,
    sheets: Vec<SheetEntry>,
    shared_strings: Vec<String>,
    modified: Vec<(String, Vec<u8>)>, // изменённые части, пишутся при save()
}

impl Workbook {
    /// Opens the package and reads the sheet catalog and the shared-string table.
    pub fn open<P: AsRef<Path>>(src: P) -> Result<Self> {
        let src_path = src.as_ref().to_path_buf();
        let file = File::open(&src_path)
            .with_context(|| format!("cannot open {}", src_path.display()))?;
        let mut zip = zip_crate::ZipArchive::new(file)
            .context("not an OOXML package (only .xlsx/.xlsm workbooks can be edited)")?;

        let workbook_xml = read_part(&mut zip, WORKBOOK_PART)?;
        let rels_xml = read_part(&mut zip, WORKBOOK_RELS_PART)?;
        let rels = parse_relationships(&rels_xml)?;

        let mut sheets = Vec::new();
        for (name, rid) in parse_sheet_list(&workbook_xml)? {
            let (_, target) = rels
                .get(&rid)
                .with_context(|| format!("relationship {rid} of sheet '{name}' not found"))?;
            sheets.push(SheetEntry {
                name,
                part: resolve_target("xl", target),
            });
        }

        let sst_part = rels
            .values()
            .find(|(kind, _)| kind.ends_with("/sharedStrings"))
            .map(|(_, target)| resolve_target("xl", target))
            .unwrap_or_else(|| SHARED_STRINGS_FALLBACK.to_owned());
        let shared_strings = if zip.file_names().any(|n| n == sst_part) {
            parse_shared_strings(&read_part(&mut zip, &sst_part)?)?
        } else {
            Vec::new()
        };

        Ok(Self {
            src_path,
            sheets,
            shared_strings,
            modified: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.src_path
    }

    pub fn sheets(&self) -> &[SheetEntry] {
        &self.sheets
    }

    /// Sheet names in tab order.
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn shared_strings(&self) -> &[String] {
        &self.shared_strings
    }

    /// Loads and parses the worksheet called `sheet_name`.
    /// Pending in-memory edits of that sheet are returned instead of the stored part.
    pub fn worksheet(&self, sheet_name: &str) -> Result<Worksheet> {
        let entry = self
            .sheets
            .iter()
            .find(|s| s.name == sheet_name)
            .with_context(|| format!("Sheet '{sheet_name}' not found"))?;

        let xml = match self.modified.iter().find(|(p, _)| p == &entry.part) {
            Some((_, xml)) => xml.clone(),
            None => {
                let mut zip = zip_crate::ZipArchive::new(File::open(&self.src_path)?)?;
                read_part(&mut zip, &entry.part)?
            }
        };
        Worksheet::parse(&entry.name, &entry.part, xml, &self.shared_strings)
            .with_context(|| format!("failed to parse sheet '{sheet_name}'"))
    }

    /// Stages the sheet's current XML for the next save.
    pub fn update(&mut self, sheet: &Worksheet) {
        let xml = sheet.xml().to_vec();
        if let Some((_, c)) = self.modified.iter_mut().find(|(p, _)| p == sheet.part()) {
            *c = xml;
        } else {
            self.modified.push((sheet.part().to_owned(), xml));
        }
    }

    /// Overwrites the source file with the staged changes.
    pub fn save(&self) -> Result<()> {
        self.save_as(&self.src_path)
    }

    /// Writes the package to `dst`.
    ///
    /// The archive is assembled in a temporary file next to `dst` and renamed over it at the
    /// end, so nothing at `dst` changes unless the whole write succeeded. An existing `dst`
    /// keeps its permissions.
    pub fn save_as<P: AsRef<Path>>(&self, dst: P) -> Result<()> {
        let dst = dst.as_ref();
        let dir = match dst.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut zin = zip_crate::ZipArchive::new(File::open(&self.src_path)?)?;
        let mut tmp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("cannot create temporary file in {}", dir.display()))?;
        {
            let mut zout = zip_crate::ZipWriter::new(tmp.as_file_mut());
            let opt: zip_crate::write::FileOptions<'_, ()> =
                zip_crate::write::FileOptions::default()
                    .compression_method(zip_crate::CompressionMethod::Deflated)
                    .compression_level(Some(1));

            for i in 0..zin.len() {
                let file = zin.by_index_raw(i)?;
                let name = file.name().to_owned();
                match self.modified.iter().find(|(p, _)| *p == name) {
                    Some((_, content)) => {
                        zout.start_file(name.as_str(), opt)?;
                        zout.write_all(content)?;
                    }
                    None => zout.raw_copy_file(file)?,
                }
            }
            zout.finish()?;
        }
        if let Ok(meta) = fs::metadata(dst) {
            tmp.as_file()
                .set_permissions(meta.permissions())
                .with_context(|| format!("cannot copy permissions of {}", dst.display()))?;
        }
        tmp.persist(dst)
            .with_context(|| format!("cannot replace {}", dst.display()))?;
        Ok(())
    }
}

/// Sheet names of the workbook at `src`, in tab order.
pub fn scan<P: AsRef<Path>>(src: P) -> Result<Vec<String>> {
    let wb = Workbook::open(src)?;
    Ok(wb.sheets.into_iter().map(|s| s.name).collect())
}

/// `(name, r:id)` of every `<sheet>` in `workbook.xml`.
fn parse_sheet_list(workbook_xml: &[u8]) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.config_mut().trim_text(true);

    let mut sheets = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Empty(ref e) | Event::Start(ref e) if e.local_name().as_ref() == b"sheet" => {
                let name = attr(e, b"name")?.context("<sheet> without a name")?;
                let rid = attr(e, b"id")?
                    .with_context(|| format!("<sheet name=\"{name}\"> without r:id"))?;
                sheets.push((name, rid));
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(sheets)
}

/// Relationship id → (type, target).
fn parse_relationships(rels_xml: &[u8]) -> Result<HashMap<String, (String, String)>> {
    let mut reader = Reader::from_reader(rels_xml);
    reader.config_mut().trim_text(true);

    let mut rels = HashMap::new();
    loop {
        match reader.read_event()? {
            Event::Empty(ref e) | Event::Start(ref e)
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attr(e, b"Id")?, attr(e, b"Target")?) {
                    let kind = attr(e, b"Type")?.unwrap_or_default();
                    rels.insert(id, (kind, target));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rels)
}

/// Plain text of every `<si>`; rich-text runs are concatenated, phonetic hints dropped.
fn parse_shared_strings(sst_xml: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(sst_xml);

    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_t = false;
    let mut in_phonetic = false;
    loop {
        let ev = reader.read_event()?;
        match &ev {
            Event::Start(e) => match e.local_name().as_ref() {
                b"t" if !in_phonetic => in_t = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"rPh" => in_phonetic = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Eof => break,
            _ if in_t => {
                push_text(&mut current, &ev)?;
            }
            _ => {}
        }
    }
    Ok(strings)
}
