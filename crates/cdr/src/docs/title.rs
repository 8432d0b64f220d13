//! Title derivation from document bodies.

use crate::xml::{self, Element};

/// Longest title stored on a document row.
pub const MAX_TITLE_CHARS: usize = 255;

/// Element paths (matched as a suffix of the element ancestry) holding the
/// title of each document type, tried in order.
fn title_paths(doc_type: &str) -> &'static [&'static [&'static str]] {
    match doc_type {
        "Summary" => &[&["SummaryTitle"]],
        "Citation" => &[&["ArticleTitle"], &["CitationTitle"]],
        "GlossaryTermName" => &[&["TermName", "TermNameString"]],
        "GlossaryTermConcept" => &[&["TermDefinition", "DefinitionText"]],
        "Media" => &[&["MediaTitle"]],
        "Organization" => &[&["OfficialName", "Name"], &["OrganizationName"]],
        "Term" => &[&["PreferredName"]],
        "DrugInformationSummary" => &[&["Title"]],
        _ => &[],
    }
}

fn person_name(root: &Element) -> Option<String> {
    let surname = root.first_text_by_suffix(&["SurName"]);
    let given = root.first_text_by_suffix(&["GivenName"]);
    match (surname, given) {
        (Some(s), Some(g)) => Some(format!("{}, {}", s, g)),
        (Some(s), None) => Some(s),
        _ => root.first_text_by_suffix(&["PersonName"]),
    }
}

/// Collapses runs of whitespace and truncates to [`MAX_TITLE_CHARS`].
pub fn normalize(title: &str) -> String {
    let collapsed = title.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_TITLE_CHARS).collect()
}

/// Title derived from the body, or `None` when the type has no title rule
/// or the body lacks the element.
pub fn derive(doc_type: &str, body: &str) -> Option<String> {
    let root = xml::parse(body).ok()?;
    let found = if doc_type == "Person" {
        person_name(&root)
    } else {
        title_paths(doc_type)
            .iter()
            .find_map(|path| root.first_text_by_suffix(path))
    };
    found.map(|t| normalize(&t)).filter(|t| !t.is_empty())
}
