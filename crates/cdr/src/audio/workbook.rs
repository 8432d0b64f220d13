//! Minimal `.xlsx` reader: one column of the first worksheet.

use std::io::{Cursor, Read, Seek};

use zip::ZipArchive;

use super::AudioError;
use crate::xml::{self, Element};

const SHARED_STRINGS: &str = "xl/sharedStrings.xml";
const WORKSHEET_PREFIX: &str = "xl/worksheets/";

/// A non-empty cell value with its 1-based row number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellValue {
    pub row: u32,
    pub value: String,
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, part: &str) -> Result<Option<Element>, AudioError> {
    let mut entry = match archive.by_name(part) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(AudioError::Zip {
                name: part.to_string(),
                source: e,
            })
        }
    };
    let mut text = String::new();
    entry.read_to_string(&mut text).map_err(|e| AudioError::Io {
        path: part.into(),
        source: e,
    })?;
    let root = xml::parse(&text).map_err(|e| AudioError::Workbook {
        part: part.to_string(),
        source: e,
    })?;
    Ok(Some(root))
}

fn shared_strings(root: Option<Element>) -> Vec<String> {
    let Some(root) = root else {
        return Vec::new();
    };
    root.child_elements()
        .filter(|si| si.local_name() == "si")
        .map(|si| {
            si.descendants()
                .into_iter()
                .filter(|e| e.local_name() == "t")
                .map(|t| t.text())
                .collect::<String>()
        })
        .collect()
}

/// Splits a cell reference such as `E12` into column letters and row.
fn split_ref(reference: &str) -> Option<(&str, u32)> {
    let digits_at = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(digits_at);
    Some((letters, digits.parse().ok()?))
}

fn cell_text(cell: &Element, shared: &[String]) -> String {
    let value = || cell.child_elements().find(|e| e.local_name() == "v").map(Element::text);
    match cell.attr("t") {
        Some("s") => value()
            .and_then(|v| v.parse::<usize>().ok())
            .and_then(|i| shared.get(i).cloned())
            .unwrap_or_default(),
        Some("inlineStr") => cell
            .descendants()
            .into_iter()
            .filter(|e| e.local_name() == "t")
            .map(|t| t.text())
            .collect(),
        _ => value().unwrap_or_default(),
    }
}

/// Reads every non-empty cell of `column` from the first worksheet.
pub fn read_column(bytes: &[u8], column: &str) -> Result<Vec<CellValue>, AudioError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| AudioError::Zip {
        name: "workbook".to_string(),
        source: e,
    })?;
    let mut sheets: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(WORKSHEET_PREFIX) && n.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    sheets.sort();
    let Some(sheet_name) = sheets.first() else {
        return Ok(Vec::new());
    };
    let shared = shared_strings(read_part(&mut archive, SHARED_STRINGS)?);
    let Some(sheet) = read_part(&mut archive, sheet_name)? else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    for cell in sheet.descendants().into_iter().filter(|e| e.local_name() == "c") {
        let Some((letters, row)) = cell.attr("r").and_then(split_ref) else {
            continue;
        };
        if !letters.eq_ignore_ascii_case(column) {
            continue;
        }
        let value = cell_text(cell, &shared);
        if !value.is_empty() {
            out.push(CellValue { row, value });
        }
    }
    Ok(out)
}
