use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use serde::Serialize;
use zip::ZipArchive;

use super::{is_valid_mp3_path, read_column, ArchiveName, AudioError, PATH_COLUMN};

/// Entries from macOS resource forks; never part of a delivery.
const IGNORED_PREFIX: &str = "__MACOSX";

/// Outcome of checking one archive. `problems` names every offending path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveReport {
    pub archive: String,
    pub workbook: Option<String>,
    pub mp3_paths: Vec<String>,
    pub problems: Vec<String>,
}

impl ArchiveReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// A directory listing split by the archive naming rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveSelection {
    /// Conforming names, sorted without regard to case.
    pub accepted: Vec<String>,
    pub rejected: Vec<String>,
}

pub fn select_archives<I, S>(names: I) -> ArchiveSelection
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut selection = ArchiveSelection::default();
    for name in names {
        let name = name.into();
        if ArchiveName::parse(&name).is_ok() {
            selection.accepted.push(name);
        } else {
            log::warn!("Skipping audio archive with unexpected name {:?}", name);
            selection.rejected.push(name);
        }
    }
    selection.accepted.sort_by_key(|n| n.to_uppercase());
    selection
}

/// Zip file names in `dir`.
pub fn list_directory(dir: &Path) -> Result<Vec<String>, AudioError> {
    let pattern = dir.join("*.zip");
    let entries = glob::glob(&pattern.to_string_lossy()).map_err(|e| AudioError::Io {
        path: dir.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
    })?;
    let mut names = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) => {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push(name.to_string());
                }
            }
            Err(e) => log::warn!("Unreadable entry in {}: {}", dir.display(), e),
        }
    }
    Ok(names)
}

pub fn check_archive(path: &Path) -> Result<ArchiveReport, AudioError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let file = File::open(path).map_err(|e| AudioError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    check_reader(&name, file)
}

/// Checks an archive's name, its MP3 paths, and that the workbook lists
/// exactly the MP3 files present.
pub fn check_reader<R: Read + Seek>(name: &str, reader: R) -> Result<ArchiveReport, AudioError> {
    let mut problems = Vec::new();
    if let Err(e) = ArchiveName::parse(name) {
        problems.push(e.to_string());
    }
    let mut archive = ZipArchive::new(reader).map_err(|e| AudioError::Zip {
        name: name.to_string(),
        source: e,
    })?;

    let mut mp3_paths = Vec::new();
    let mut workbook = None;
    let members: Vec<String> = archive.file_names().map(str::to_string).collect();
    for member in &members {
        if member.contains(IGNORED_PREFIX) || member.ends_with('/') {
            continue;
        }
        let lower = member.to_ascii_lowercase();
        if lower.ends_with(".xlsx") {
            if workbook.is_none() {
                workbook = Some(member.clone());
            }
            continue;
        }
        if !is_valid_mp3_path(member) {
            problems.push(format!("{}: name does not follow the MP3 path rule", member));
        }
        if lower.ends_with(".mp3") {
            mp3_paths.push(member.clone());
        }
    }
    mp3_paths.sort();

    match &workbook {
        Some(book) => {
            let mut bytes = Vec::new();
            archive
                .by_name(book)
                .map_err(|e| AudioError::Zip {
                    name: book.clone(),
                    source: e,
                })?
                .read_to_end(&mut bytes)
                .map_err(|e| AudioError::Io {
                    path: book.into(),
                    source: e,
                })?;
            let listed: BTreeSet<String> = read_column(&bytes, PATH_COLUMN)?
                .into_iter()
                .filter(|cell| cell.row > 1)
                .map(|cell| cell.value.trim().to_string())
                .collect();
            let present: BTreeSet<String> = mp3_paths.iter().cloned().collect();
            for missing in listed.difference(&present) {
                problems.push(format!("{}: listed in workbook but not in archive", missing));
            }
            for extra in present.difference(&listed) {
                problems.push(format!("{}: in archive but not listed in workbook", extra));
            }
        }
        None => problems.push(format!("{}: no Excel workbook found", name)),
    }

    if problems.is_empty() {
        log::info!("Audio archive {} passed ({} MP3 files)", name, mp3_paths.len());
    } else {
        log::warn!("Audio archive {} has {} problems", name, problems.len());
    }
    Ok(ArchiveReport {
        archive: name.to_string(),
        workbook,
        mp3_paths,
        problems,
    })
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    use super::*;
    use crate::audio::workbook::test_support::build_workbook;

    fn build_archive(members: &[&str], listed: &[&str]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = ZipWriter::new(Cursor::new(&mut buf));
            let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
            for member in members {
                zip.start_file(*member, options).unwrap();
                zip.write_all(b"ID3").unwrap();
            }
            zip.start_file("Week_2024_15/Week_2024_15.xlsx", options).unwrap();
            zip.write_all(&build_workbook(listed)).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn test_conforming_archive_passes() {
        let paths = ["Week_2024_15/1234_en.mp3", "Week_2024_15/1234_es.mp3"];
        let bytes = build_archive(&paths, &paths);
        let report = check_reader("Week_2024_15.zip", Cursor::new(bytes)).unwrap();
        assert!(report.is_ok(), "{:?}", report.problems);
        assert_eq!(report.mp3_paths.len(), 2);
        assert_eq!(report.workbook.as_deref(), Some("Week_2024_15/Week_2024_15.xlsx"));
    }

    #[test]
    fn test_bad_path_is_named() {
        let listed = ["Week_2024_15/1234_en.mp3"];
        let bytes = build_archive(&["Week_2024_15/1234_en.mp3", "Week_2024_15/bad name.mp3"], &listed);
        let report = check_reader("Week_2024_15.zip", Cursor::new(bytes)).unwrap();
        assert!(!report.is_ok());
        assert!(report.problems.iter().all(|p| p.contains("Week_2024_15/bad name.mp3")));
    }

    #[test]
    fn test_workbook_mismatch() {
        let bytes = build_archive(&["Week_2024_15/1234_en.mp3"], &["Week_2024_15/9999_en.mp3"]);
        let report = check_reader("Week_2024_15_Rev1.zip", Cursor::new(bytes)).unwrap();
        assert_eq!(report.problems.len(), 2);
        assert!(report.problems[0].starts_with("Week_2024_15/9999_en.mp3"));
        assert!(report.problems[1].starts_with("Week_2024_15/1234_en.mp3"));
    }

    #[test]
    fn test_select_archives() {
        let selection = select_archives(vec!["week_2024_16.zip", "Week_2024_15.zip", "notes.zip", "Week_2024_15_Rev1.zip"]);
        assert_eq!(
            selection.accepted,
            vec!["Week_2024_15.zip", "Week_2024_15_Rev1.zip", "week_2024_16.zip"]
        );
        assert_eq!(selection.rejected, vec!["notes.zip"]);
    }

    #[test]
    fn test_check_archive_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Week_2024_15.zip");
        let paths = ["Week_2024_15/1234_en.mp3"];
        std::fs::write(&path, build_archive(&paths, &paths)).unwrap();
        assert!(check_archive(&path).unwrap().is_ok());
        assert_eq!(list_directory(dir.path()).unwrap(), vec!["Week_2024_15.zip"]);
    }
}
