use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{SeError, Writer};

use crate::soap::wsse::{BODY_ID, WsSecurity};
use crate::soap::{Header, Payload, ns, prefix};

const ENVELOPE: &str = "s:Envelope";
const HEADER: &str = "s:Header";
const BODY: &str = "s:Body";

/// A SOAP 1.2 envelope under construction: one Header, one Body carrying the payload.
#[derive(Debug, Clone)]
pub struct SoapDocument {
    header: Option<Header>,
    body_id: String,
    payload: Payload,
}

/// Wrap `payload` in an envelope whose Body carries the `u:Id` referenced by the signature.
pub fn build_envelope(payload: Payload) -> SoapDocument {
    SoapDocument {
        header: None,
        body_id: BODY_ID.to_string(),
        payload,
    }
}

impl SoapDocument {
    pub fn body_id(&self) -> &str {
        &self.body_id
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// Install the header. Returns the rejected header if one is already present.
    pub fn set_header(&mut self, header: Header) -> Result<(), Box<Header>> {
        if self.header.is_some() {
            return Err(Box::new(header));
        }
        self.header = Some(header);
        Ok(())
    }

    pub fn security(&self) -> Option<&WsSecurity> {
        self.header.as_ref().map(|h| &h.security)
    }

    pub fn security_mut(&mut self) -> Option<&mut WsSecurity> {
        self.header.as_mut().map(|h| &mut h.security)
    }

    /// Render the envelope element without an XML declaration.
    ///
    /// Rendering is deterministic, so the bytes of the Timestamp and Body subtrees are the same
    /// in every rendering of the same document.
    pub fn render(&self) -> Result<String, SeError> {
        let mut writer = Writer::new(Vec::new());

        let mut envelope = BytesStart::new(ENVELOPE);
        envelope.push_attribute((xmlns(prefix::SOAP_ENV).as_str(), ns::SOAP_ENV));
        envelope.push_attribute((xmlns(prefix::WSA).as_str(), ns::WSA));
        envelope.push_attribute((xmlns(prefix::WSU).as_str(), ns::WSU));
        writer.write_event(Event::Start(envelope))?;

        match &self.header {
            Some(header) => {
                let header_xml = quick_xml::se::to_string_with_root(HEADER, header)?;
                writer.get_mut().extend_from_slice(header_xml.as_bytes());
            }
            None => writer.write_event(Event::Empty(BytesStart::new(HEADER)))?,
        }

        let mut body = BytesStart::new(BODY);
        body.push_attribute(("u:Id", self.body_id.as_str()));
        writer.write_event(Event::Start(body))?;
        self.payload.write_to(&mut writer)?;
        writer.write_event(Event::End(BytesEnd::new(BODY)))?;
        writer.write_event(Event::End(BytesEnd::new(ENVELOPE)))?;

        String::from_utf8(writer.into_inner()).map_err(|e| SeError::Custom(e.to_string()))
    }
}

fn xmlns(prefix: &str) -> String {
    format!("xmlns:{prefix}")
}
