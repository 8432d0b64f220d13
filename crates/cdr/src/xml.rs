//! Small XML layer over quick-xml.
//!
//! Document bodies are parsed into a lightweight element tree for reading
//! (titles, link index, filter includes). Edits that must preserve the
//! original bytes (link rewriting) stream events through a writer instead.

use std::io::Cursor;

use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XmlError {
    #[error("line {line}: {message}")]
    Malformed { line: u32, message: String },
}

impl XmlError {
    pub fn line(&self) -> u32 {
        match self {
            XmlError::Malformed { line, .. } => *line,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            XmlError::Malformed { message, .. } => message,
        }
    }
}

/// A parsed element with its attributes in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    fn new(start: &BytesStart<'_>, xml: &str, pos: u64) -> Result<Self, XmlError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| malformed(xml, pos, e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| malformed(xml, pos, e.to_string()))?
                .into_owned();
            attrs.push((key, value));
        }
        Ok(Self {
            name,
            attrs,
            children: Vec::new(),
        })
    }

    /// Name without any namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn is_leaf(&self) -> bool {
        self.child_elements().next().is_none()
    }

    /// All text beneath this element, concatenated and trimmed.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out.trim().to_string()
    }

    /// Follows a path of child element names from this element.
    pub fn find_path(&self, path: &[&str]) -> Option<&Element> {
        let mut current = self;
        for step in path {
            current = current.child_elements().find(|c| c.name == *step)?;
        }
        Some(current)
    }

    /// Depth-first, document-order walk over this element and its
    /// descendants.
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(e) = stack.pop() {
            out.push(e);
            let children: Vec<&Element> = e.child_elements().collect();
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Text of the first element (in document order) whose trailing
    /// ancestry matches `suffix`, e.g. `["TermName", "TermNameString"]`.
    pub fn first_text_by_suffix(&self, suffix: &[&str]) -> Option<String> {
        fn walk<'a>(e: &'a Element, trail: &mut Vec<&'a str>, suffix: &[&str]) -> Option<String> {
            trail.push(&e.name);
            if trail.ends_with(suffix) {
                let text = e.text();
                if !text.is_empty() {
                    return Some(text);
                }
            }
            for child in e.child_elements() {
                if let Some(found) = walk(child, trail, suffix) {
                    return Some(found);
                }
            }
            trail.pop();
            None
        }
        if suffix.is_empty() {
            return None;
        }
        walk(self, &mut Vec::new(), suffix)
    }
}

fn collect_text(e: &Element, out: &mut String) {
    for node in &e.children {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(child) => collect_text(child, out),
        }
    }
}

/// 1-based line number of a byte offset.
pub fn line_at(xml: &str, pos: usize) -> u32 {
    let end = pos.min(xml.len());
    xml.as_bytes()[..end].iter().filter(|b| **b == b'\n').count() as u32 + 1
}

fn malformed(xml: &str, pos: u64, message: impl Into<String>) -> XmlError {
    XmlError::Malformed {
        line: line_at(xml, pos as usize),
        message: message.into(),
    }
}

fn resolve_ref(r: &BytesRef<'_>) -> Result<String, String> {
    if let Some(c) = r.resolve_char_ref().map_err(|e| e.to_string())? {
        return Ok(c.to_string());
    }
    let name = std::str::from_utf8(r).map_err(|e| e.to_string())?;
    quick_xml::escape::resolve_predefined_entity(name)
        .map(str::to_string)
        .ok_or_else(|| format!("undefined entity '&{};'", name))
}

/// Parses a document body into its root element.
///
/// Fails on syntax errors, mismatched or unclosed tags, content outside the
/// root element, and a missing root.
pub fn parse(xml: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut pending = String::new();

    fn flush(pending: &mut String, stack: &mut [Element]) {
        if pending.trim().is_empty() {
            pending.clear();
            return;
        }
        if let Some(top) = stack.last_mut() {
            top.children.push(Node::Text(std::mem::take(pending)));
        }
    }

    loop {
        let pos = reader.buffer_position();
        let event = reader
            .read_event()
            .map_err(|e| malformed(xml, reader.error_position(), e.to_string()))?;
        match event {
            Event::Start(ref e) => {
                flush(&mut pending, &mut stack);
                if stack.is_empty() && root.is_some() {
                    return Err(malformed(xml, pos, "multiple root elements"));
                }
                stack.push(Element::new(e, xml, pos)?);
            }
            Event::Empty(ref e) => {
                flush(&mut pending, &mut stack);
                let element = Element::new(e, xml, pos)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(Node::Element(element)),
                    None if root.is_none() => root = Some(element),
                    None => return Err(malformed(xml, pos, "multiple root elements")),
                }
            }
            Event::End(_) => {
                flush(&mut pending, &mut stack);
                let element = stack
                    .pop()
                    .ok_or_else(|| malformed(xml, pos, "unexpected closing tag"))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(Node::Element(element)),
                    None => root = Some(element),
                }
            }
            Event::Text(ref t) => {
                let text = t
                    .decode()
                    .map_err(|e| malformed(xml, pos, e.to_string()))?;
                if stack.is_empty() {
                    if !text.trim().is_empty() {
                        return Err(malformed(xml, pos, "text outside the root element"));
                    }
                } else {
                    pending.push_str(&text);
                }
            }
            Event::CData(ref c) => {
                if stack.is_empty() {
                    return Err(malformed(xml, pos, "CDATA outside the root element"));
                }
                pending.push_str(&String::from_utf8_lossy(c));
            }
            Event::GeneralRef(ref r) => {
                if stack.is_empty() {
                    return Err(malformed(xml, pos, "entity outside the root element"));
                }
                let resolved = resolve_ref(r).map_err(|m| malformed(xml, pos, m))?;
                pending.push_str(&resolved);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(malformed(
            xml,
            xml.len() as u64,
            format!("element <{}> is not closed", open.name),
        ));
    }
    root.ok_or_else(|| malformed(xml, 0, "document has no root element"))
}

/// Name of the root element, or `None` when the body does not parse.
pub fn root_name(xml: &str) -> Option<String> {
    parse(xml).ok().map(|root| root.name)
}

/// Rewrites attribute values in place, leaving every other byte of the
/// document untouched. `rewrite` receives `(attribute name, raw value)` and
/// returns a replacement raw value when it wants a change. Returns the new
/// body and the number of values changed.
pub fn rewrite_attributes<F>(xml: &str, mut rewrite: F) -> Result<(String, usize), XmlError>
where
    F: FnMut(&str, &str) -> Option<String>,
{
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut changed = 0usize;

    loop {
        let pos = reader.buffer_position();
        let event = reader
            .read_event()
            .map_err(|e| malformed(xml, reader.error_position(), e.to_string()))?;
        let event = match event {
            Event::Eof => break,
            Event::Start(e) => match rewrite_start(&e, &mut rewrite, xml, pos)? {
                Some((start, n)) => {
                    changed += n;
                    Event::Start(start)
                }
                None => Event::Start(e),
            },
            Event::Empty(e) => match rewrite_start(&e, &mut rewrite, xml, pos)? {
                Some((start, n)) => {
                    changed += n;
                    Event::Empty(start)
                }
                None => Event::Empty(e),
            },
            other => other,
        };
        writer
            .write_event(event)
            .map_err(|e| malformed(xml, pos, e.to_string()))?;
    }

    let bytes = writer.into_inner().into_inner();
    let out = String::from_utf8(bytes).map_err(|e| malformed(xml, 0, e.to_string()))?;
    Ok((out, changed))
}

fn rewrite_start<F>(
    start: &BytesStart<'_>,
    rewrite: &mut F,
    xml: &str,
    pos: u64,
) -> Result<Option<(BytesStart<'static>, usize)>, XmlError>
where
    F: FnMut(&str, &str) -> Option<String>,
{
    let mut pairs: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
    let mut changed = 0usize;
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(xml, pos, e.to_string()))?;
        let key = attr.key.as_ref().to_vec();
        let raw = attr.value.as_ref().to_vec();
        let replacement = rewrite(
            &String::from_utf8_lossy(&key),
            &String::from_utf8_lossy(&raw),
        );
        match replacement {
            Some(new_value) => {
                changed += 1;
                pairs.push((key, new_value.into_bytes()));
            }
            None => pairs.push((key, raw)),
        }
    }
    if changed == 0 {
        return Ok(None);
    }
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    for (k, v) in &pairs {
        out.push_attribute((k.as_slice(), v.as_slice()));
    }
    Ok(Some((out.into_owned(), changed)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tree() {
        let root = parse(
            r#"<?xml version="1.0"?>
<Summary xmlns:cdr="cips.nci.nih.gov/cdr">
  <SummaryTitle>Breast &amp; Ovarian</SummaryTitle>
  <Para cdr:id="_1">See <SummaryRef cdr:href="CDR0000000042">this</SummaryRef>.</Para>
</Summary>"#,
        )
        .unwrap();
        assert_eq!(root.name, "Summary");
        assert_eq!(root.find_path(&["SummaryTitle"]).unwrap().text(), "Breast & Ovarian");
        let para = root.find_path(&["Para"]).unwrap();
        assert_eq!(para.attr("cdr:id"), Some("_1"));
        assert!(!para.is_leaf());
        assert_eq!(para.text(), "See this.");
        let names: Vec<_> = root.descendants().iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec!["Summary", "SummaryTitle", "Para", "SummaryRef"]);
    }

    #[test]
    fn test_first_text_by_suffix() {
        let root = parse(
            "<GlossaryTermName><TermName><TermNameString>  tumor </TermNameString></TermName></GlossaryTermName>",
        )
        .unwrap();
        assert_eq!(
            root.first_text_by_suffix(&["TermName", "TermNameString"]).as_deref(),
            Some("tumor")
        );
        assert!(root.first_text_by_suffix(&["Missing"]).is_none());
    }

    #[test]
    fn test_char_refs() {
        let root = parse("<a>&#65;&#x42;</a>").unwrap();
        assert_eq!(root.text(), "AB");
    }

    #[test]
    fn test_malformed_reports_line() {
        let err = parse("<a>\n\n\n<b></c></a>").unwrap_err();
        assert_eq!(err.line(), 4);

        let err = parse("<a>\n<b/>\n").unwrap_err();
        assert!(err.message().contains("not closed"));

        assert!(parse("<a/><b/>").is_err());
        assert!(parse("").is_err());
        assert!(parse("<a>&bogus;</a>").is_err());
    }

    #[test]
    fn test_root_name() {
        assert_eq!(root_name("<Citation/>").as_deref(), Some("Citation"));
        assert_eq!(root_name("<Citation>"), None);
    }

    #[test]
    fn test_rewrite_attributes_preserves_other_bytes() {
        let xml = "<Summary>\n  <Ref cdr:ref=\"CDR0000000001#_3\">x &amp; y</Ref>\n  <Ref cdr:ref=\"CDR0000000002\"/>\n</Summary>";
        let (out, n) = rewrite_attributes(xml, |name, value| {
            if name == "cdr:ref" && value.starts_with("CDR0000000001") {
                Some(value.replacen("CDR0000000001", "CDR0000000009", 1))
            } else {
                None
            }
        })
        .unwrap();
        assert_eq!(n, 1);
        assert_eq!(out, xml.replace("CDR0000000001", "CDR0000000009"));
    }
}
