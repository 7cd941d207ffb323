mod config;
mod envelope;
mod payload;
mod ser;
pub mod wsse;

pub use config::XmlConfig;
pub use envelope::{SoapDocument, build_envelope};
pub use payload::{Payload, PayloadError, PayloadSource};
pub use ser::to_string;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::soap::wsse::WsSecurity;

pub mod ns {
    pub const SOAP_ENV: &str = "http://www.w3.org/2003/05/soap-envelope";
    pub const WSA: &str = "http://www.w3.org/2005/08/addressing";
    pub use super::wsse::ns::{WSSE, WSU};
}

/// The only prefixes ever written into an envelope
pub mod prefix {
    pub const SOAP_ENV: &str = "s";
    pub const WSA: &str = "a";
    pub const WSU: &str = "u";
    pub const WSSE: &str = "o";
}

pub mod actions {
    pub const FETCH_REFERENCE: &str = "http://tempuri.org/IReferenceService/FetchReference";
    pub const SUBMIT_DATA: &str = "http://tempuri.org/IReferenceService/SubmitData";
}

/// WS-Addressing anonymous endpoint used for `ReplyTo`
pub const ANONYMOUS_ADDRESS: &str = "http://www.w3.org/2005/08/addressing/anonymous";

const MUST_UNDERSTAND: &str = "1";

/// Remote operation a request is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceVariant {
    FetchReference,
    SubmitData,
}

impl ServiceVariant {
    /// WS-Addressing `Action` URI of the operation
    pub fn action(self) -> &'static str {
        match self {
            ServiceVariant::FetchReference => actions::FETCH_REFERENCE,
            ServiceVariant::SubmitData => actions::SUBMIT_DATA,
        }
    }
}

impl fmt::Display for ServiceVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceVariant::FetchReference => "FetchReference",
            ServiceVariant::SubmitData => "SubmitData",
        };
        f.write_str(name)
    }
}

/// The SOAP header: WS-Addressing blocks followed by the WS-Security block.
/// Field order is the document order and takes part in the signed digests.
#[derive(Debug, Clone, Serialize)]
pub struct Header {
    #[serde(rename = "a:Action")]
    pub action: Action,

    #[serde(rename = "a:MessageID")]
    pub message_id: String,

    #[serde(rename = "a:ReplyTo")]
    pub reply_to: ReplyTo,

    #[serde(rename = "a:To")]
    pub to: To,

    #[serde(rename = "o:Security")]
    pub security: WsSecurity,
}

#[derive(Debug, Clone, Serialize)]
pub struct Action {
    #[serde(rename = "@s:mustUnderstand")]
    pub must_understand: &'static str,

    #[serde(rename = "$text")]
    pub uri: String,
}

impl Action {
    pub fn new(variant: ServiceVariant) -> Self {
        Self {
            must_understand: MUST_UNDERSTAND,
            uri: variant.action().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplyTo {
    #[serde(rename = "a:Address")]
    pub address: String,
}

impl Default for ReplyTo {
    fn default() -> Self {
        Self {
            address: ANONYMOUS_ADDRESS.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct To {
    #[serde(rename = "@s:mustUnderstand")]
    pub must_understand: &'static str,

    #[serde(rename = "@u:Id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "$text")]
    pub address: String,
}

impl To {
    pub fn new(address: impl Into<String>, id: Option<String>) -> Self {
        Self {
            must_understand: MUST_UNDERSTAND,
            id,
            address: address.into(),
        }
    }
}
