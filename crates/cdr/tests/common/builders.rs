//! Builders for test fixtures.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use cdr::filters::FilterSetSpec;
use cdr::{DocId, FilterRef};

/// A Summary document with the given title and optional links.
pub fn summary_xml(title: &str, links: &[DocId]) -> String {
    let refs: String = links
        .iter()
        .map(|id| format!(r#"<SummaryRef cdr:href="{}#_1">see also</SummaryRef>"#, cdr::canonical(*id)))
        .collect();
    format!(
        r#"<Summary xmlns:cdr="cips.nci.nih.gov/cdr"><SummaryTitle>{}</SummaryTitle><SummarySection>{}</SummarySection></Summary>"#,
        title, refs
    )
}

/// Builder for filter set specs.
pub struct FilterSetBuilder {
    spec: FilterSetSpec,
}

impl FilterSetBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            spec: FilterSetSpec::new(name, format!("{} for tests", name), Vec::new()),
        }
    }

    pub fn filter(mut self, id: DocId) -> Self {
        self.spec.members.push(FilterRef::Id(id));
        self
    }

    pub fn set(mut self, name: &str) -> Self {
        self.spec.members.push(FilterRef::SetName(name.to_string()));
        self
    }

    pub fn notes(mut self, notes: &str) -> Self {
        self.spec.notes = Some(notes.to_string());
        self
    }

    pub fn build(self) -> FilterSetSpec {
        self.spec
    }
}

/// A one-sheet workbook using inline strings, with `paths` in column E
/// below a header row.
pub fn workbook_bytes(paths: &[&str]) -> Vec<u8> {
    let cell = |r: usize, col: &str, text: &str| {
        format!(r#"<c r="{col}{r}" t="inlineStr"><is><t>{text}</t></is></c>"#)
    };
    let mut rows = format!(r#"<row r="1">{}{}</row>"#, cell(1, "A", "Title"), cell(1, "E", "MP3"));
    for (i, path) in paths.iter().enumerate() {
        let r = i + 2;
        rows.push_str(&format!(r#"<row r="{r}">{}{}</row>"#, cell(r, "A", "Term"), cell(r, "E", path)));
    }

    let mut buf = Vec::new();
    {
        let mut zip = ZipWriter::new(std::io::Cursor::new(&mut buf));
        let options = SimpleFileOptions::default();
        zip.start_file("xl/worksheets/sheet1.xml", options).unwrap();
        write!(
            zip,
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
            rows
        )
        .unwrap();
        zip.finish().unwrap();
    }
    buf
}

/// Writes an audio delivery archive to `dir/name` holding the workbook
/// (listing `listed`) and an empty MP3 for every entry of `mp3s`.
pub fn write_delivery(dir: &Path, name: &str, listed: &[&str], mp3s: &[&str]) -> PathBuf {
    let path = dir.join(name);
    let file = File::create(&path).unwrap();
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    let stem = name.trim_end_matches(".zip");
    zip.start_file(format!("{}/{}.xlsx", stem, stem), options).unwrap();
    zip.write_all(&workbook_bytes(listed)).unwrap();
    for mp3 in mp3s {
        zip.start_file(*mp3, options).unwrap();
        zip.write_all(b"ID3").unwrap();
    }
    zip.finish().unwrap();
    path
}
