//! Exclusive XML canonicalization (`http://www.w3.org/2001/10/xml-exc-c14n#`), comments omitted.
//!
//! Subtrees are canonicalized in the context of the whole document: namespace declarations made
//! on ancestors of the selected element are tracked so that visibly utilized prefixes are
//! rendered on the subtree root.

use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Write};
use std::str;

use crate::soap::wsse::{Error, Result};

const XML_NS: &[u8] = b"http://www.w3.org/XML/1998/namespace";

type NsMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// Canonicalize a whole document (its root element and descendants).
pub fn canonicalize(xml: impl AsRef<str>, inclusive_ns: Option<&[&str]>) -> Result<String> {
    canonicalize_subtree(xml, inclusive_ns, |_| true)
}

/// Canonicalize the first element accepted by `select`, together with its descendants.
pub fn canonicalize_subtree<F>(
    xml: impl AsRef<str>,
    inclusive_ns: Option<&[&str]>,
    mut select: F,
) -> Result<String>
where
    F: FnMut(&BytesStart) -> bool,
{
    let mut reader = Reader::from_str(xml.as_ref());
    reader.config_mut().trim_text(false);
    reader.config_mut().expand_empty_elements = true;

    let mut state = Canonicalizer {
        writer: Writer::new(Cursor::new(Vec::new())),
        ns_declared_stack: vec![NsMap::new()],
        ns_rendered_stack: vec![NsMap::new()],
        inclusive_ns,
        depth: 0,
    };
    let mut found = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let declared = state.enter_scope(&e)?;
                if state.depth == 0 && !select(&e) {
                    continue;
                }
                found = true;
                state.write_start(&e, &declared)?;
                state.depth += 1;
            }
            Ok(Event::End(e)) => {
                state.ns_declared_stack.pop();
                if state.depth > 0 {
                    state.writer.write_event(Event::End(e))?;
                    state.ns_rendered_stack.pop();
                    state.depth -= 1;
                    if state.depth == 0 {
                        break;
                    }
                }
            }
            Ok(Event::Text(e)) if state.depth > 0 => {
                let text = e.xml_content().map_err(|e| Error::Xml(e.to_string()))?;
                state.write_text(text.as_bytes())?;
            }
            Ok(Event::CData(e)) if state.depth > 0 => {
                // CDATA is normalized to text content
                let v = e.into_inner();
                let normalized = normalize_line_endings(&v);
                state.write_text(&normalized)?;
            }
            Ok(Event::GeneralRef(e)) if state.depth > 0 => {
                let resolved = match e.resolve_char_ref()? {
                    Some(ch) => ch.to_string(),
                    None => {
                        let name = e.decode().map_err(|e| Error::Xml(e.to_string()))?;
                        resolve_predefined_entity(&name)
                            .ok_or_else(|| Error::Xml(format!("undeclared entity &{name};")))?
                            .to_string()
                    }
                };
                state.write_text(resolved.as_bytes())?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(Error::Xml(e.to_string())),
        }
    }

    if !found {
        return Err(Error::NotFound("no element matched the selection".into()));
    }
    if state.depth != 0 {
        return Err(Error::Xml("Unexpected end of document".into()));
    }
    Ok(String::from_utf8(state.writer.into_inner().into_inner())?)
}

struct Canonicalizer<'a> {
    writer: Writer<Cursor<Vec<u8>>>,
    // Namespace bindings in scope, one map per open element of the source document
    ns_declared_stack: Vec<NsMap>,
    // Namespace bindings already rendered, one map per open element of the output
    ns_rendered_stack: Vec<NsMap>,
    inclusive_ns: Option<&'a [&'a str]>,
    depth: usize,
}

impl Canonicalizer<'_> {
    /// Push the namespace scope of `e` and return the bindings in effect for it.
    fn enter_scope(&mut self, e: &BytesStart) -> Result<NsMap> {
        let mut current = self.ns_declared_stack.last().cloned().unwrap_or_default();
        for attr in e.attributes().with_checks(false) {
            let attr = attr.map_err(|e| Error::Xml(e.to_string()))?;
            let key = attr.key.as_ref();
            let prefix = if key == b"xmlns" {
                Vec::new()
            } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
                prefix.to_vec()
            } else {
                continue;
            };
            if attr.value.is_empty() {
                current.remove(&prefix);
            } else {
                current.insert(prefix, attr.value.to_vec());
            }
        }
        self.ns_declared_stack.push(current.clone());
        Ok(current)
    }

    fn write_text(&mut self, v: &[u8]) -> Result<()> {
        let esc = escape_text_value(v)?;
        self.writer
            .write_event(Event::Text(BytesText::from_escaped(esc)))?;
        Ok(())
    }

    /// Write a start tag with canonicalized namespaces and attributes.
    fn write_start(&mut self, e: &BytesStart, current_declared: &NsMap) -> Result<()> {
        let ns_rendered = self.ns_rendered_stack.last().cloned().unwrap_or_default();

        let mut regular_attrs = vec![];
        for attr in e.attributes().with_checks(false) {
            let attr = attr.map_err(|e| Error::Xml(e.to_string()))?;
            let key = attr.key.as_ref();
            if key == b"xmlns" || key.starts_with(b"xmlns:") {
                continue;
            }
            let normalized = normalize_attr_whitespace(&attr.value);
            let unescaped_value =
                unescape(str::from_utf8(&normalized)?).map_err(|e| Error::Xml(e.to_string()))?;
            regular_attrs.push((key.to_vec(), unescaped_value.into_owned().into_bytes()));
        }

        // Determine visibly-utilized prefixes
        let mut visibly_utilized = BTreeSet::new();
        let name = e.name();
        let name_bytes = name.as_ref();
        match name_bytes.iter().position(|&b| b == b':') {
            Some(pos) => visibly_utilized.insert(name_bytes[..pos].to_vec()),
            None => visibly_utilized.insert(vec![]),
        };

        for (key_bytes, _) in &regular_attrs {
            if let Some(pos) = key_bytes.iter().position(|&b| b == b':') {
                let prefix = key_bytes[..pos].to_vec();
                // xml: prefix is never rendered as it's implicitly bound
                if prefix != b"xml" {
                    visibly_utilized.insert(prefix);
                }
            }
        }

        if let Some(prefixes) = self.inclusive_ns {
            for prefix_str in prefixes {
                let prefix = if *prefix_str == "#default" { "" } else { prefix_str };
                if current_declared.contains_key(prefix.as_bytes()) {
                    visibly_utilized.insert(prefix.as_bytes().to_vec());
                }
            }
        }

        // BTreeSet iteration already yields prefixes in lexical order
        let mut render_ns = Vec::new();
        for prefix in &visibly_utilized {
            if let Some(current_uri) = current_declared.get(prefix) {
                let already_rendered = ns_rendered
                    .get(prefix)
                    .is_some_and(|rendered_uri| rendered_uri == current_uri);
                if !already_rendered {
                    render_ns.push((prefix.clone(), current_uri.clone()));
                }
            } else if prefix.is_empty() && ns_rendered.get(prefix).is_some_and(|u| !u.is_empty()) {
                // Undeclare a default namespace rendered by an output ancestor
                render_ns.push((vec![], vec![]));
            }
        }

        let name_str = str::from_utf8(name_bytes)?;
        let mut tag_start = format!("<{name_str}");

        for (prefix, uri) in &render_ns {
            if prefix.is_empty() {
                tag_start.push_str(" xmlns=\"");
            } else {
                let p = str::from_utf8(prefix)?;
                tag_start.push_str(&format!(" xmlns:{p}=\""));
            }
            tag_start.push_str(&escape_attr_value(uri)?);
            tag_start.push('"');
        }

        // Attributes sort by namespace URI, then local name
        let mut attr_info = vec![];
        for (key_bytes, value_bytes) in regular_attrs {
            let (ns_uri, local_name) = match key_bytes.iter().position(|&b| b == b':') {
                Some(pos) => {
                    let prefix = &key_bytes[..pos];
                    let uri = if prefix == b"xml" {
                        XML_NS.to_vec()
                    } else {
                        current_declared.get(prefix).cloned().unwrap_or_default()
                    };
                    (uri, key_bytes[pos + 1..].to_vec())
                }
                None => (vec![], key_bytes.clone()),
            };
            attr_info.push((ns_uri, local_name, key_bytes, value_bytes));
        }
        attr_info.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        for (_, _, key_bytes, value_bytes) in &attr_info {
            tag_start.push(' ');
            tag_start.push_str(str::from_utf8(key_bytes)?);
            tag_start.push_str("=\"");
            tag_start.push_str(&escape_attr_value(value_bytes)?);
            tag_start.push('"');
        }

        tag_start.push('>');
        self.writer.get_mut().write_all(tag_start.as_bytes())?;

        let mut new_rendered = ns_rendered;
        for (prefix, uri) in render_ns {
            new_rendered.insert(prefix, uri);
        }
        self.ns_rendered_stack.push(new_rendered);
        Ok(())
    }
}

/// Normalize line endings to LF as per C14N spec
fn normalize_line_endings(text: &[u8]) -> Cow<'_, [u8]> {
    if !text.contains(&b'\r') {
        return Cow::Borrowed(text);
    }

    let mut result = Vec::with_capacity(text.len());
    let mut i = 0;
    while i < text.len() {
        if text[i] == b'\r' {
            result.push(b'\n');
            // CRLF collapses to a single LF
            i += if text.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
        } else {
            result.push(text[i]);
            i += 1;
        }
    }
    Cow::Owned(result)
}

/// Attribute-value normalization of a raw (still escaped) value: line endings first, then every
/// literal tab or line feed becomes a space. Character references are left for unescaping.
fn normalize_attr_whitespace(raw: &[u8]) -> Cow<'_, [u8]> {
    if !raw.iter().any(|b| matches!(b, b'\t' | b'\n' | b'\r')) {
        return Cow::Borrowed(raw);
    }
    let normalized = normalize_line_endings(raw)
        .iter()
        .map(|&b| if b == b'\t' || b == b'\n' { b' ' } else { b })
        .collect();
    Cow::Owned(normalized)
}

/// Escape attribute value per C14N rules.
fn escape_attr_value(v: &[u8]) -> Result<String> {
    let s = str::from_utf8(v)?;
    let mut out = String::with_capacity(s.len() + s.len() / 4);
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    Ok(out)
}

/// Escape text node value per C14N rules.
fn escape_text_value(v: &[u8]) -> Result<String> {
    let s = str::from_utf8(v)?;
    let mut out = String::with_capacity(s.len() + s.len() / 4);
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_name_is(name: &'static str) -> impl FnMut(&BytesStart) -> bool {
        move |e| e.local_name().as_ref() == name.as_bytes()
    }

    #[test]
    fn test_basic_canonicalization() {
        let xml = r#"<root><child attr="value">text</child></root>"#;
        let result = canonicalize(xml, None).unwrap();
        assert_eq!(result, r#"<root><child attr="value">text</child></root>"#);
    }

    #[test]
    fn test_empty_elements_are_expanded() {
        let xml = r#"<root><Data/></root>"#;
        let result = canonicalize(xml, None).unwrap();
        assert_eq!(result, "<root><Data></Data></root>");
    }

    #[test]
    fn test_attribute_escaping() {
        let xml = r#"<root attr="&lt;&quot;&#x9;&#xA;&#xD;">text</root>"#;
        let result = canonicalize(xml, None).unwrap();
        assert!(result.contains("&lt;&quot;&#x9;&#xA;&#xD;"));
    }

    #[test]
    fn test_literal_attribute_whitespace_is_normalized() {
        let result = canonicalize("<Data a=\"x\ny\"/>", None).unwrap();
        assert_eq!(result, r#"<Data a="x y"></Data>"#);

        let result = canonicalize("<Data a=\"1\t2\r\n3\r4\"/>", None).unwrap();
        assert_eq!(result, r#"<Data a="1 2 3 4"></Data>"#);

        let result = canonicalize(r#"<Data a="x&#xA;y&#9;z"/>"#, None).unwrap();
        assert_eq!(result, r#"<Data a="x&#xA;y&#x9;z"></Data>"#);
    }

    #[test]
    fn test_default_namespace_undeclaration() {
        let xml = r#"<Data xmlns="urn:d"><Inner xmlns=""><Leaf/></Inner></Data>"#;
        let result = canonicalize(xml, None).unwrap();
        assert_eq!(
            result,
            r#"<Data xmlns="urn:d"><Inner xmlns=""><Leaf></Leaf></Inner></Data>"#
        );
    }

    #[test]
    fn test_text_references_are_resolved() {
        let xml = r#"<root>a &amp; b &#x41; &gt;</root>"#;
        let result = canonicalize(xml, None).unwrap();
        assert_eq!(result, "<root>a &amp; b A &gt;</root>");
    }

    #[test]
    fn test_comments_are_dropped() {
        let xml = r#"<root><!-- note --><a>1</a></root>"#;
        let result = canonicalize(xml, None).unwrap();
        assert_eq!(result, "<root><a>1</a></root>");
    }

    #[test]
    fn test_namespace_not_duplicated() {
        let xml = r#"<root xmlns="http://example.com"><child>text</child></root>"#;
        let result = canonicalize(xml, None).unwrap();

        let count = result.matches(r#"xmlns="http://example.com""#).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_line_ending_normalization() {
        let input = b"hello\r\nworld\rtest";
        let result = normalize_line_endings(input);
        assert_eq!(&*result, b"hello\nworld\ntest");
    }

    #[test]
    fn test_unused_prefix_not_rendered() {
        let xml = r#"<root xmlns:a="http://a.com"><child>text</child></root>"#;
        let result = canonicalize(xml, None).unwrap();
        assert_eq!(result, "<root><child>text</child></root>");
    }

    #[test]
    fn test_prefix_utilized_by_element() {
        let xml = r#"<root xmlns:a="http://a.com"><a:child>text</a:child></root>"#;
        let result = canonicalize(xml, None).unwrap();
        assert!(result.contains(r#"<a:child xmlns:a="http://a.com""#));
    }

    #[test]
    fn test_prefix_utilized_by_attribute() {
        let xml = r#"<root xmlns:a="http://a.com"><child a:attr="value">text</child></root>"#;
        let result = canonicalize(xml, None).unwrap();
        assert!(result.contains(r#"<child xmlns:a="http://a.com" a:attr="value""#));
    }

    #[test]
    fn test_inclusive_namespaces_with_prefix_list() {
        let xml =
            r#"<root xmlns:a="http://a.com" xmlns:b="http://b.com"><child>text</child></root>"#;
        let result = canonicalize(xml, Some(&["a"])).unwrap();
        assert!(result.contains(r#"xmlns:a="http://a.com""#));
        assert!(!result.contains(r#"xmlns:b=""#));
    }

    #[test]
    fn test_subtree_inherits_ancestor_namespaces() {
        let xml = r#"<s:Envelope xmlns:s="urn:s" xmlns:u="urn:u" xmlns:x="urn:x"><s:Header/><s:Body u:Id="_1"><Data/></s:Body></s:Envelope>"#;
        let result = canonicalize_subtree(xml, None, local_name_is("Body")).unwrap();
        assert_eq!(
            result,
            r#"<s:Body xmlns:s="urn:s" xmlns:u="urn:u" u:Id="_1"><Data></Data></s:Body>"#
        );
    }

    #[test]
    fn test_subtree_with_default_namespace() {
        let xml = r#"<o:Security xmlns:o="urn:o"><Signature xmlns="urn:ds"><SignedInfo><Method Algorithm="x"/></SignedInfo><SignatureValue/></Signature></o:Security>"#;
        let result = canonicalize_subtree(xml, None, local_name_is("SignedInfo")).unwrap();
        assert_eq!(
            result,
            r#"<SignedInfo xmlns="urn:ds"><Method Algorithm="x"></Method></SignedInfo>"#
        );
    }

    #[test]
    fn test_attributes_sorted_by_namespace_then_name() {
        let xml = r#"<e xmlns:z="urn:a" xmlns:b="urn:b" b:x="1" z:y="2" c="3" a="4"/>"#;
        let result = canonicalize(xml, None).unwrap();
        assert_eq!(
            result,
            r#"<e xmlns:b="urn:b" xmlns:z="urn:a" a="4" c="3" z:y="2" b:x="1"></e>"#
        );
    }

    #[test]
    fn test_missing_subtree_is_an_error() {
        let xml = r#"<root><a/></root>"#;
        assert!(canonicalize_subtree(xml, None, local_name_is("Body")).is_err());
    }

    #[test]
    fn test_only_first_match_is_canonicalized() {
        let xml = r#"<root><a>1</a><a>2</a></root>"#;
        let result = canonicalize_subtree(xml, None, local_name_is("a")).unwrap();
        assert_eq!(result, "<a>1</a>");
    }
}
