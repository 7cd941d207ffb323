use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;

use crate::soap::wsse::{Error, Result, c14n};

/// Elements whose `Id` attribute may be the target of a same-document reference.
///
/// A reference `#id` only resolves to an element that was registered under that id with a
/// matching local name, so a stray duplicate `Id` elsewhere in the document is never digested.
#[derive(Debug, Clone, Default)]
pub struct IdRegistry {
    entries: Vec<(String, String)>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `element` (local name) as the owner of `id`
    pub fn register(mut self, element: &str, id: &str) -> Self {
        self.entries.push((element.to_string(), id.to_string()));
        self
    }

    /// Local name of the element registered for a `#id` reference URI
    pub fn resolve(&self, uri: &str) -> Result<&str> {
        let id = uri
            .strip_prefix('#')
            .ok_or_else(|| Error::Invalid(format!("Invalid reference URI: {uri}")))?;
        self.entries
            .iter()
            .find(|(_, registered)| registered == id)
            .map(|(element, _)| element.as_str())
            .ok_or_else(|| Error::Invalid(format!("Unregistered reference URI: {uri}")))
    }

    /// Exclusive canonical form of the element a `#id` reference URI points to
    pub fn canonicalize_reference(&self, xml: &str, uri: &str) -> Result<String> {
        let element = self.resolve(uri)?;
        let id = &uri[1..];
        c14n::canonicalize_subtree(xml, None, |e| {
            e.local_name().as_ref() == element.as_bytes() && has_id(e, id)
        })
        .map_err(|error| match error {
            Error::NotFound(_) => Error::NotFound(format!("{element} with Id='{id}'")),
            other => other,
        })
    }
}

fn has_id(e: &BytesStart, id: &str) -> bool {
    e.attributes().filter_map(|a| a.ok()).any(|attr| {
        attr.key.local_name().as_ref() == b"Id"
            && attr.unescape_value().ok().as_deref() == Some(id)
    })
}

/// Extract element by ID attribute
pub fn extract_element_by_id(xml: &str, id: &str) -> Result<String> {
    extract_with_predicate(xml, |e| has_id(e, id)).map_err(|error| match error {
        Error::NotFound(_) => Error::NotFound(format!("element with Id='{id}'")),
        other => other,
    })
}

/// Extract element by local name
pub fn extract_element(xml: &str, name: &str) -> Result<String> {
    let target = name.as_bytes();
    extract_with_predicate(xml, |e| e.name().local_name().as_ref() == target).map_err(|error| {
        match error {
            Error::NotFound(_) => Error::NotFound(format!("element '{name}'")),
            other => other,
        }
    })
}

/// Count the elements with the given local name
pub fn count_elements(xml: &str, name: &str) -> Result<usize> {
    let mut reader = Reader::from_str(xml);
    let mut count = 0;
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == name.as_bytes() => {
                count += 1
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(count)
}

/// Extract element by predicate
fn extract_with_predicate<F>(xml: &str, mut predicate: F) -> Result<String>
where
    F: FnMut(&BytesStart) -> bool,
{
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    reader.config_mut().expand_empty_elements = true;

    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut depth = 0;
    let mut capturing = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if !capturing && predicate(&e) {
                    capturing = true;
                    depth = 1;
                    writer.write_event(Event::Start(e))?;
                } else if capturing {
                    depth += 1;
                    writer.write_event(Event::Start(e))?;
                }
            }
            Ok(Event::End(e)) => {
                if capturing {
                    writer.write_event(Event::End(e))?;
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(e) => {
                if capturing {
                    writer.write_event(e)?;
                }
            }
            Err(e) => return Err(Error::Xml(e.to_string())),
        }
    }

    if !capturing {
        return Err(Error::NotFound("no element matched the selection".into()));
    }
    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENVELOPE: &str = r#"<s:Envelope xmlns:s="urn:s" xmlns:a="urn:a" xmlns:u="urn:u"><s:Header><a:To u:Id="_1">http://gw</a:To><o:Security xmlns:o="urn:o"><u:Timestamp u:Id="_0"><u:Created>c</u:Created></u:Timestamp></o:Security></s:Header><s:Body u:Id="_1"><Data/></s:Body></s:Envelope>"#;

    fn registry() -> IdRegistry {
        IdRegistry::new()
            .register("Timestamp", "_0")
            .register("Body", "_1")
    }

    #[test]
    fn test_extract_element_by_id() {
        let xml = r#"<root><Body wsu:Id="body-123">content</Body></root>"#;
        let element = extract_element_by_id(xml, "body-123").unwrap();
        assert_eq!(element, "<Body wsu:Id=\"body-123\">content</Body>");
    }

    #[test]
    fn test_extract_security_header() {
        let security = extract_element(ENVELOPE, "Security").unwrap();
        assert!(security.starts_with("<o:Security"));
        assert!(security.contains("Timestamp"));
        assert!(!security.contains("Body"));
    }

    #[test]
    fn test_registry_skips_unregistered_duplicate_id() {
        let body = registry().canonicalize_reference(ENVELOPE, "#_1").unwrap();
        assert_eq!(
            body,
            r#"<s:Body xmlns:s="urn:s" xmlns:u="urn:u" u:Id="_1"><Data></Data></s:Body>"#
        );
    }

    #[test]
    fn test_registry_resolves_timestamp() {
        let ts = registry().canonicalize_reference(ENVELOPE, "#_0").unwrap();
        assert_eq!(
            ts,
            r#"<u:Timestamp xmlns:u="urn:u" u:Id="_0"><u:Created>c</u:Created></u:Timestamp>"#
        );
    }

    #[test]
    fn test_registry_rejects_unknown_uris() {
        assert!(registry().resolve("_0").is_err());
        assert!(registry().resolve("#_9").is_err());
        assert_eq!(registry().resolve("#_1").unwrap(), "Body");
    }

    #[test]
    fn test_count_elements() {
        assert_eq!(count_elements(ENVELOPE, "Body").unwrap(), 1);
        assert_eq!(count_elements(ENVELOPE, "Data").unwrap(), 1);
        assert_eq!(count_elements(ENVELOPE, "Signature").unwrap(), 0);
    }

    #[test]
    fn test_missing_reference_target() {
        let xml = r#"<s:Envelope xmlns:s="urn:s"><s:Body><Data/></s:Body></s:Envelope>"#;
        let err = registry().canonicalize_reference(xml, "#_1").unwrap_err();
        assert!(matches!(err, Error::NotFound(ref what) if what == "Body with Id='_1'"), "{err}");
    }

    #[test]
    fn test_canonicalization_failure_keeps_its_cause() {
        let xml = r#"<s:Envelope xmlns:s="urn:s" xmlns:u="urn:u"><s:Body u:Id="_1"><Data>&custom;</Data></s:Body></s:Envelope>"#;
        let err = registry().canonicalize_reference(xml, "#_1").unwrap_err();
        assert!(matches!(err, Error::Xml(_)), "{err:?}");
        assert!(err.to_string().contains("undeclared entity &custom;"), "{err}");
    }
}
