//! Parameter maps for the QC and generic filter reports.

use serde::{Deserialize, Serialize};

use super::engine::FilterParams;

/// Which reviewer comments a QC report shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CommentDisplay {
    All,
    Internal,
    External,
    #[default]
    None,
}

impl CommentDisplay {
    pub fn from_selection(internal: bool, external: bool) -> Self {
        match (internal, external) {
            (true, true) => CommentDisplay::All,
            (true, false) => CommentDisplay::Internal,
            (false, true) => CommentDisplay::External,
            (false, false) => CommentDisplay::None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CommentDisplay::All => "A",
            CommentDisplay::Internal => "I",
            CommentDisplay::External => "E",
            CommentDisplay::None => "N",
        }
    }
}

/// Options chosen on the filter/QC form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QcReportOptions {
    /// Revision levels whose insertions are shown (`publish`, `approved`,
    /// `proposed`, `rejected`).
    pub markup_levels: Vec<String>,
    /// Show deletions struck out rather than dropping them.
    pub redline_strikeout: bool,
    pub comments: CommentDisplay,
    pub glossary: bool,
    pub images: bool,
    pub standard_wording: bool,
    pub boards: Vec<String>,
    pub audiences: Vec<String>,
    pub is_pp: bool,
    pub is_qc: bool,
    pub loe_terms: bool,
    pub vendor_or_qc: bool,
    /// Free-form name/value pairs; these override the named options.
    pub custom: Vec<(String, String)>,
}

fn yn(flag: bool) -> String {
    let code = if flag { "Y" } else { "N" };
    code.to_string()
}

impl QcReportOptions {
    pub fn to_params(&self) -> FilterParams {
        let mut params = FilterParams::new();
        params.insert("insRevLevels".into(), self.markup_levels.join("_"));
        params.insert("delRevLevels".into(), yn(!self.redline_strikeout));
        params.insert("DisplayComments".into(), self.comments.code().to_string());
        params.insert("DisplayGlossaryTermList".into(), yn(self.glossary));
        params.insert("DisplayImages".into(), yn(self.images));
        params.insert("ShowStandardWording".into(), yn(self.standard_wording));
        params.insert("displayBoard".into(), self.boards.join("_"));
        params.insert("displayAudience".into(), self.audiences.join("_"));
        params.insert("isPP".into(), yn(self.is_pp));
        params.insert("isQC".into(), yn(self.is_qc));
        params.insert("displayLOETermList".into(), yn(self.loe_terms));
        if self.vendor_or_qc {
            params.insert("vendorOrQC".into(), "QC".into());
        }
        for (name, value) in &self.custom {
            let name = name.trim();
            if !name.is_empty() {
                params.insert(name.to_string(), value.trim().to_string());
            }
        }
        params
    }
}
