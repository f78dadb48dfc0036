// маленькие хелперы для quick-xml и zip

use ::zip as zip_crate;
use anyhow::{Context, Result};
use quick_xml::{
    escape::unescape,
    events::{BytesStart, Event},
};
use std::io::{Read, Seek};

/// Reads a whole archive entry into memory.
pub(crate) fn read_part<R: Read + Seek>(
    zip: &mut zip_crate::ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>> {
    let mut part = zip
        .by_name(name)
        .with_context(|| format!("{name} not found"))?;
    let mut buf = Vec::with_capacity(part.size() as usize);
    part.read_to_end(&mut buf)
        .with_context(|| format!("failed to read {name}"))?;
    Ok(buf)
}

/// Attribute value by local name (`r:id` matches `id`), entities resolved.
pub(crate) fn attr(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for a in e.attributes().with_checks(false).flatten() {
        if a.key.local_name().as_ref() == key {
            let raw = String::from_utf8_lossy(&a.value);
            return Ok(Some(unescape(&raw)?.into_owned()));
        }
    }
    Ok(None)
}

/// Appends the character data carried by `ev` to `out`.
/// Returns `false` for events that carry no text.
pub(crate) fn push_text(out: &mut String, ev: &Event<'_>) -> Result<bool> {
    match ev {
        Event::Text(t) => {
            let raw = String::from_utf8_lossy(t);
            out.push_str(&unescape(&raw)?);
        }
        Event::GeneralRef(r) => {
            let raw = format!("&{};", String::from_utf8_lossy(r));
            out.push_str(&unescape(&raw)?);
        }
        Event::CData(c) => out.push_str(&String::from_utf8_lossy(c)),
        _ => return Ok(false),
    }
    Ok(true)
}

/// Resolves a relationship target against the `xl/` folder.
pub(crate) fn resolve_target(base_dir: &str, target: &str) -> String {
    let joined = match target.strip_prefix('/') {
        Some(abs) => abs.to_owned(),
        None => format!("{base_dir}/{target}"),
    };
    let mut parts: Vec<&str> = Vec::new();
    for seg in joined.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}
