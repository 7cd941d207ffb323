//! Caller supplied XML that becomes the content of the SOAP Body.

use std::io::Write;
use std::path::{Path, PathBuf};

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::{NsReader, Writer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("failed to read payload file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed payload XML: {0}")]
    Xml(String),

    #[error("invalid payload structure: {0}")]
    Structure(String),
}

/// Where the Body content of a request comes from.
#[derive(Debug, Clone)]
pub enum PayloadSource {
    /// XML text supplied by the caller
    Inline(String),
    /// XML document stored on disk
    File(PathBuf),
}

impl PayloadSource {
    pub fn load(&self) -> Result<Payload, PayloadError> {
        match self {
            PayloadSource::Inline(xml) => Payload::parse(xml),
            PayloadSource::File(path) => Payload::from_file(path),
        }
    }
}

/// A well-formed, namespace-checked XML element tree, kept as an owned event stream so it can
/// be replayed byte-for-byte into the envelope.
#[derive(Debug, Clone)]
pub struct Payload {
    events: Vec<Event<'static>>,
}

impl Payload {
    /// Parse a payload document. The XML declaration, DOCTYPE, comments and processing
    /// instructions are dropped; exactly one root element is required.
    ///
    /// Entity references must be character references or one of the five predefined
    /// entities, since a dropped DOCTYPE can no longer declare anything.
    pub fn parse(xml: &str) -> Result<Self, PayloadError> {
        let mut reader = NsReader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut events = Vec::new();
        let mut depth = 0usize;
        let mut roots = 0usize;

        loop {
            let (resolved, event) = reader
                .read_resolved_event()
                .map_err(|e| PayloadError::Xml(e.to_string()))?;
            let unbound_prefix = match resolved {
                ResolveResult::Unknown(prefix) => {
                    Some(String::from_utf8_lossy(&prefix).into_owned())
                }
                _ => None,
            };

            match event {
                Event::Start(_) | Event::Empty(_) if depth == 0 && roots == 1 => {
                    return Err(PayloadError::Structure(
                        "payload must have exactly one root element".into(),
                    ));
                }
                Event::Start(e) => {
                    check_element(&reader, &e, unbound_prefix)?;
                    if depth == 0 {
                        roots += 1;
                    }
                    depth += 1;
                    events.push(Event::Start(e.into_owned()));
                }
                Event::Empty(e) => {
                    check_element(&reader, &e, unbound_prefix)?;
                    if depth == 0 {
                        roots += 1;
                    }
                    events.push(Event::Empty(e.into_owned()));
                }
                Event::End(e) => {
                    depth = depth.saturating_sub(1);
                    events.push(Event::End(e.into_owned()));
                }
                Event::Text(e) if depth == 0 => {
                    if !e.iter().all(u8::is_ascii_whitespace) {
                        return Err(PayloadError::Structure(
                            "text content outside the root element".into(),
                        ));
                    }
                }
                Event::Text(e) => {
                    if e.contains(&b'&') || e.windows(3).any(|w| w == b"]]>") {
                        return Err(PayloadError::Xml(
                            "character data contains a bare '&' or ']]>'".into(),
                        ));
                    }
                    events.push(Event::Text(e.into_owned()))
                }
                Event::CData(e) if depth > 0 => events.push(Event::CData(e.into_owned())),
                Event::GeneralRef(e) if depth > 0 => {
                    check_reference(&e)?;
                    events.push(Event::GeneralRef(e.into_owned()))
                }
                Event::CData(_) | Event::GeneralRef(_) => {
                    return Err(PayloadError::Structure(
                        "character data outside the root element".into(),
                    ));
                }
                Event::Eof => break,
                Event::Decl(_) | Event::DocType(_) | Event::Comment(_) | Event::PI(_) => {}
            }
        }

        if depth != 0 {
            return Err(PayloadError::Xml(
                "unexpected end of document: unclosed element".into(),
            ));
        }
        if roots == 0 {
            return Err(PayloadError::Structure("payload has no root element".into()));
        }
        Ok(Self { events })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PayloadError> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path).map_err(|source| PayloadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&xml)
    }

    /// Local name of the root element
    pub fn root_name(&self) -> Option<String> {
        self.events.iter().find_map(|event| match event {
            Event::Start(e) | Event::Empty(e) => {
                Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned())
            }
            _ => None,
        })
    }

    /// Replay the payload into `writer` exactly as it was read.
    pub fn write_to<W: Write>(&self, writer: &mut Writer<W>) -> std::io::Result<()> {
        for event in &self.events {
            writer.write_event(event.borrow())?;
        }
        Ok(())
    }
}

fn check_element(
    reader: &NsReader<&[u8]>,
    e: &BytesStart,
    unbound_prefix: Option<String>,
) -> Result<(), PayloadError> {
    let element = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    if let Some(prefix) = unbound_prefix {
        return Err(PayloadError::Xml(format!(
            "unbound namespace prefix '{prefix}' on element <{element}>"
        )));
    }
    for attr in e.attributes() {
        let attr = attr.map_err(|err| PayloadError::Xml(err.to_string()))?;
        let key = attr.key.as_ref();
        if attr.value.contains(&b'<') {
            return Err(PayloadError::Xml(format!(
                "unescaped '<' in value of attribute {} on <{element}>",
                String::from_utf8_lossy(key)
            )));
        }
        attr.unescape_value().map_err(|err| {
            PayloadError::Xml(format!(
                "attribute {} on <{element}>: {err}",
                String::from_utf8_lossy(key)
            ))
        })?;
        if key == b"xmlns" || key.starts_with(b"xmlns:") || key.starts_with(b"xml:") {
            continue;
        }
        if let (ResolveResult::Unknown(prefix), _) = reader.resolve_attribute(attr.key) {
            return Err(PayloadError::Xml(format!(
                "unbound namespace prefix '{}' on attribute {}",
                String::from_utf8_lossy(&prefix),
                String::from_utf8_lossy(key)
            )));
        }
    }
    Ok(())
}

fn check_reference(e: &BytesRef) -> Result<(), PayloadError> {
    let is_char_ref = e
        .resolve_char_ref()
        .map_err(|err| PayloadError::Xml(err.to_string()))?
        .is_some();
    if is_char_ref {
        return Ok(());
    }
    let name = e
        .decode()
        .map_err(|err| PayloadError::Xml(err.to_string()))?;
    match resolve_predefined_entity(&name) {
        Some(_) => Ok(()),
        None => Err(PayloadError::Xml(format!("undeclared entity &{name};"))),
    }
}
