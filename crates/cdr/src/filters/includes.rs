//! Scans filter bodies for `xsl:include` / `xsl:import` references.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::DocId;
use crate::xml;

/// Prefix of an href naming another filter by title.
pub const NAME_HREF_PREFIX: &str = "cdr:name:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterInclude {
    /// `include` or `import`.
    pub kind: String,
    pub href: String,
    /// Filter name when the href uses the `cdr:name:` form.
    pub name: Option<String>,
    /// Filter id the name resolves to, if it does.
    pub resolved: Option<DocId>,
}

/// Includes and imports in document order. A body that is not
/// well-formed has none.
pub fn scan<F>(body: &str, mut lookup: F) -> Result<Vec<FilterInclude>>
where
    F: FnMut(&str) -> Result<Option<DocId>>,
{
    let root = match xml::parse(body) {
        Ok(root) => root,
        Err(e) => {
            log::debug!("Filter body not scanned for includes: {}", e);
            return Ok(Vec::new());
        }
    };
    let mut found = Vec::new();
    for el in root.descendants() {
        let kind = el.local_name();
        if !el.name.starts_with("xsl:") || !(kind == "include" || kind == "import") {
            continue;
        }
        let Some(href) = el.attr("href") else {
            continue;
        };
        let name = href
            .strip_prefix(NAME_HREF_PREFIX)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let resolved = match &name {
            Some(n) => lookup(n)?,
            None => None,
        };
        found.push(FilterInclude {
            kind: kind.to_string(),
            href: href.to_string(),
            name,
            resolved,
        });
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"<xsl:transform xmlns:xsl="http://www.w3.org/1999/XSL/Transform" version="1.0">
  <xsl:include href="cdr:name:Module: Table Formatter"/>
  <xsl:import href="cdr:name:Missing Module"/>
  <xsl:include href="local.xsl"/>
  <xsl:template match="/"/>
</xsl:transform>"#;

    #[test]
    fn test_scan_resolves_names() {
        let found = scan(BODY, |name| {
            Ok(if name == "Module: Table Formatter" { Some(42) } else { None })
        })
        .unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].kind, "include");
        assert_eq!(found[0].resolved, Some(42));
        assert_eq!(found[1].kind, "import");
        assert_eq!(found[1].name.as_deref(), Some("Missing Module"));
        assert_eq!(found[1].resolved, None);
        assert_eq!(found[2].name, None);
    }

    #[test]
    fn test_malformed_body_has_no_includes() {
        assert!(scan("<xsl:transform>", |_| Ok(None)).unwrap().is_empty());
    }
}
