//! Checks on glossary audio deliveries: weekly zip archives of MP3
//! pronunciations with a companion workbook listing every file.

pub mod archive;
pub mod workbook;

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::error::CdrError;
use crate::xml::XmlError;

pub use archive::{check_archive, check_reader, list_directory, select_archives, ArchiveReport, ArchiveSelection};
pub use workbook::{read_column, CellValue};

/// Column of the workbook holding the MP3 paths.
pub const PATH_COLUMN: &str = "E";

static RE_ARCHIVE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(Week_\d{4}_\d{2})(?:_Rev(\d+))?\.zip$").unwrap());

static RE_MP3_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Week_\d{4}_\d{2}(?:_Rev\d+)?/\d+_e[sn]\d*\.mp3$").unwrap());

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid zip archive '{name}': {source}")]
    Zip {
        name: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Malformed workbook part '{part}': {source}")]
    Workbook {
        part: String,
        #[source]
        source: XmlError,
    },

    #[error("Archive name '{0}' does not match Week_YYYY_WW[_RevN].zip")]
    BadArchiveName(String),
}

impl From<AudioError> for CdrError {
    fn from(e: AudioError) -> Self {
        match e {
            AudioError::Io { path, source } => CdrError::io(path, source),
            other => CdrError::InvalidInput(other.to_string()),
        }
    }
}

/// A conforming archive file name split into its week and revision.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArchiveName {
    /// `Week_YYYY_WW`, as written in the file name.
    pub base: String,
    pub revision: Option<u32>,
}

impl ArchiveName {
    pub fn parse(file_name: &str) -> Result<Self, AudioError> {
        let caps = RE_ARCHIVE_NAME
            .captures(file_name)
            .ok_or_else(|| AudioError::BadArchiveName(file_name.to_string()))?;
        let revision = match caps.get(2) {
            Some(m) => Some(
                m.as_str()
                    .parse()
                    .map_err(|_| AudioError::BadArchiveName(file_name.to_string()))?,
            ),
            None => None,
        };
        Ok(Self {
            base: caps[1].to_string(),
            revision,
        })
    }

    /// Directory name MP3 paths inside the archive start with.
    pub fn stem(&self) -> String {
        match self.revision {
            Some(n) => format!("{}_Rev{}", self.base, n),
            None => self.base.clone(),
        }
    }
}

/// True when an archive member path follows the MP3 naming rule.
pub fn is_valid_mp3_path(path: &str) -> bool {
    RE_MP3_PATH.is_match(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_name() {
        let name = ArchiveName::parse("Week_2024_15.zip").unwrap();
        assert_eq!(name.base, "Week_2024_15");
        assert_eq!(name.revision, None);
        let rev = ArchiveName::parse("week_2024_15_Rev2.zip").unwrap();
        assert_eq!(rev.revision, Some(2));
        assert_eq!(rev.stem(), "week_2024_15_Rev2");
        assert!(ArchiveName::parse("Week_24_15.zip").is_err());
        assert!(ArchiveName::parse("Week_2024_15.tar").is_err());
    }

    #[test]
    fn test_mp3_path_rule() {
        assert!(is_valid_mp3_path("Week_2024_15/1234_en.mp3"));
        assert!(is_valid_mp3_path("Week_2024_15_Rev1/1234_es2.MP3"));
        assert!(!is_valid_mp3_path("Week_2024_15/bad name.mp3"));
        assert!(!is_valid_mp3_path("1234_en.mp3"));
        assert!(!is_valid_mp3_path("Week_2024_15/1234_fr.mp3"));
    }
}
