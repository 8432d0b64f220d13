//! Schema validation seam.

use crate::error::ValidationMessage;
use crate::xml;

/// Validates a body against a named schema.
///
/// The schema name is a document type (`Summary`) or a schema file name
/// (`Summary.xml`). Returns every message found; the body is valid when
/// none of them is an error.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, schema: &str, body: &str) -> Vec<ValidationMessage>;
}

/// Checks well-formedness and that the root element matches the schema's
/// document type.
#[derive(Debug, Clone, Copy, Default)]
pub struct WellFormedValidator;

/// Document type named by a schema reference.
pub fn schema_doc_type(schema: &str) -> &str {
    let base = schema.rsplit('/').next().unwrap_or(schema);
    base.strip_suffix(".xml")
        .or_else(|| base.strip_suffix(".xsd"))
        .unwrap_or(base)
}

impl SchemaValidator for WellFormedValidator {
    fn validate(&self, schema: &str, body: &str) -> Vec<ValidationMessage> {
        let root = match xml::parse(body) {
            Ok(root) => root,
            Err(e) => return vec![ValidationMessage::error(Some(e.line()), e.message())],
        };

        let mut messages = Vec::new();
        let expected = schema_doc_type(schema);
        if !expected.is_empty() && root.name != expected {
            messages.push(ValidationMessage::error(
                Some(1),
                format!("root element <{}> does not match document type {}", root.name, expected),
            ));
        }

        let uses_cdr_prefix = root
            .descendants()
            .iter()
            .any(|e| e.attrs.iter().any(|(k, _)| k.starts_with("cdr:")));
        if uses_cdr_prefix && root.attr("xmlns:cdr").is_none() {
            messages.push(ValidationMessage::warning(
                None,
                "cdr: attributes used without an xmlns:cdr declaration on the root",
            ));
        }
        messages
    }
}
