use quick_xml::events::{BytesDecl, Event};
use quick_xml::{SeError, Writer};

use crate::soap::SoapDocument;
use crate::soap::config::XmlConfig;

const XML_VERSION: &str = "1.0";

/// Render a document to its transport form: the optional XML declaration followed by the
/// envelope exactly as rendered for signing.
pub fn to_string(config: &XmlConfig, document: &SoapDocument) -> Result<String, SeError> {
    let envelope = document.render()?;

    let mut output_buf = Vec::with_capacity(envelope.len() + 64);
    if config.xml_decl {
        let mut writer = Writer::new(&mut output_buf);
        let decl = BytesDecl::new(XML_VERSION, Some(&config.encoding), None);
        writer.write_event(Event::Decl(decl))?;
    }
    output_buf.extend_from_slice(envelope.as_bytes());

    String::from_utf8(output_buf).map_err(|e| SeError::Custom(e.to_string()))
}
