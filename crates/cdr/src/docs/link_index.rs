//! Derivation of link index rows from a document body.

use thiserror::Error;

use crate::db::link_repo::{IndexRow, NODE_LOC_WIDTH};
use crate::ids::{CdrId, DocId};
use crate::xml::{self, Element, XmlError};

/// Largest sibling ordinal a `node_loc` segment can hold.
pub const MAX_ORDINAL: usize = 9999;

#[derive(Error, Debug)]
pub enum LinkIndexError {
    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("<{element}> has {count} child elements; at most 9999 can be indexed")]
    TooManyChildren { element: String, count: usize },
}

fn segment(ordinal: usize) -> String {
    format!("{:0width$}", ordinal, width = NODE_LOC_WIDTH)
}

/// Document id referenced by an index value such as `CDR0000012345#_3`.
pub fn referenced_id(value: &str) -> Option<DocId> {
    let trimmed = value.trim();
    let prefixed = trimmed.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("CDR"));
    if !prefixed || trimmed.len() < 4 {
        return None;
    }
    CdrId::parse(trimmed).ok().map(|p| p.id)
}

fn is_namespace_decl(name: &str) -> bool {
    name == "xmlns" || name.starts_with("xmlns:")
}

fn walk(
    doc_id: DocId,
    element: &Element,
    parent_path: &str,
    loc: &str,
    rows: &mut Vec<IndexRow>,
) -> Result<(), LinkIndexError> {
    let path = format!("{}/{}", parent_path, element.name);

    for (name, value) in &element.attrs {
        if is_namespace_decl(name) || value.trim().is_empty() {
            continue;
        }
        rows.push(IndexRow {
            doc_id,
            path: format!("{}/@{}", path, name),
            value: value.clone(),
            int_val: referenced_id(value),
            node_loc: loc.to_string(),
        });
    }

    if element.is_leaf() {
        let text = element.text();
        if !text.is_empty() {
            rows.push(IndexRow {
                doc_id,
                path: path.clone(),
                int_val: referenced_id(&text),
                value: text,
                node_loc: loc.to_string(),
            });
        }
        return Ok(());
    }

    let count = element.child_elements().count();
    if count > MAX_ORDINAL {
        return Err(LinkIndexError::TooManyChildren {
            element: element.name.clone(),
            count,
        });
    }
    for (i, child) in element.child_elements().enumerate() {
        let child_loc = format!("{}{}", loc, segment(i + 1));
        walk(doc_id, child, &path, &child_loc, rows)?;
    }
    Ok(())
}

/// One row per non-empty leaf text and per attribute, in document order.
pub fn extract(doc_id: DocId, body: &str) -> Result<Vec<IndexRow>, LinkIndexError> {
    let root = xml::parse(body)?;
    let mut rows = Vec::new();
    walk(doc_id, &root, "", &segment(1), &mut rows)?;
    Ok(rows)
}
