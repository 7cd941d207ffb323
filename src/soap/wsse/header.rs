use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use tracing::debug;
use uuid::Uuid;

use crate::soap::wsse::*;
use crate::soap::{Action, Header, ReplyTo, ServiceVariant, SoapDocument, To};

/// Identifiers generated once per invocation.
///
/// The UsernameToken id, the BinarySecurityToken id and the SecurityTokenReference URI all
/// derive from the same correlation UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationIds {
    correlation: Uuid,
    message: Uuid,
}

impl CorrelationIds {
    pub fn generate() -> Self {
        Self {
            correlation: Uuid::new_v4(),
            message: Uuid::new_v4(),
        }
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation
    }

    pub fn username_token_id(&self) -> String {
        format!("uuid-{}-1", self.correlation)
    }

    pub fn binary_token_id(&self) -> String {
        format!("uuid-{}-2", self.correlation)
    }

    /// Same-document URI of the BinarySecurityToken
    pub fn token_reference_uri(&self) -> String {
        format!("#{}", self.binary_token_id())
    }

    /// WS-Addressing MessageID
    pub fn message_id(&self) -> String {
        format!("urn:uuid:{}", self.message)
    }
}

/// Per-request inputs of the header composer
#[derive(Debug, Clone, Copy)]
pub struct HeaderParams<'a> {
    pub variant: ServiceVariant,
    pub username: &'a str,
    pub password: &'a str,
    pub destination_url: &'a str,
    /// Also stamp the Body id on the `To` element, as the legacy profile does
    pub to_carries_body_id: bool,
}

/// Append the addressing headers and the WS-Security skeleton to `document`.
///
/// Document order is Action, MessageID, ReplyTo, To, Security, and inside Security:
/// Timestamp, UsernameToken, BinarySecurityToken. The Signature is added later by the signer.
pub fn compose_security_header(
    document: &mut SoapDocument,
    params: &HeaderParams<'_>,
    ids: &CorrelationIds,
    certificate_der: &[u8],
) -> Result<()> {
    let to_id = params
        .to_carries_body_id
        .then(|| document.body_id().to_string());

    let security = WsSecurity {
        xmlns: ns::WSSE,
        must_understand: "1",
        timestamp: Timestamp::new(TIMESTAMP_ID)?,
        username_token: UsernameToken {
            id: ids.username_token_id(),
            username: params.username.to_string(),
            password: Password {
                kind: token_profiles::PASSWORD_TEXT,
                value: params.password.to_string(),
            },
        },
        binary_security_token: BinarySecurityToken {
            id: ids.binary_token_id(),
            value_type: token_profiles::X509V3.to_string(),
            encoding_type: token_profiles::BASE64_BINARY.to_string(),
            value: BASE64.encode(certificate_der),
        },
        signature: None,
    };

    let header = Header {
        action: Action::new(params.variant),
        message_id: ids.message_id(),
        reply_to: ReplyTo::default(),
        to: To::new(params.destination_url, to_id),
        security,
    };

    document
        .set_header(header)
        .map_err(|_| Error::Invalid("SOAP header already composed".into()))?;

    debug!(
        message_id = %ids.message_id(),
        correlation_id = %ids.correlation_id(),
        "composed WS-Addressing and WS-Security headers"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::{Payload, build_envelope};

    fn params(to_carries_body_id: bool) -> HeaderParams<'static> {
        HeaderParams {
            variant: ServiceVariant::SubmitData,
            username: "alice",
            password: "p&ss<word>",
            destination_url: "https://gateway.example/service",
            to_carries_body_id,
        }
    }

    fn composed(to_carries_body_id: bool) -> (CorrelationIds, String) {
        let mut document = build_envelope(Payload::parse("<Data/>").unwrap());
        let ids = CorrelationIds::generate();
        compose_security_header(&mut document, &params(to_carries_body_id), &ids, b"cert")
            .unwrap();
        (ids, document.render().unwrap())
    }

    #[test]
    fn test_correlation_ids_share_one_uuid() {
        let ids = CorrelationIds::generate();
        let uuid = ids.correlation_id().to_string();
        assert_eq!(ids.username_token_id(), format!("uuid-{uuid}-1"));
        assert_eq!(ids.binary_token_id(), format!("uuid-{uuid}-2"));
        assert_eq!(ids.token_reference_uri(), format!("#uuid-{uuid}-2"));
        assert!(ids.message_id().starts_with("urn:uuid:"));
        assert_ne!(ids.message_id(), format!("urn:uuid:{uuid}"));
    }

    #[test]
    fn test_header_order() {
        let (_, xml) = composed(false);
        let order = [
            "<a:Action",
            "<a:MessageID>",
            "<a:ReplyTo>",
            "<a:To",
            "<o:Security",
            "<u:Timestamp",
            "<o:UsernameToken",
            "<o:BinarySecurityToken",
            "<s:Body",
        ];
        let positions: Vec<usize> = order.iter().map(|tag| xml.find(tag).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{xml}");
    }

    #[test]
    fn test_header_content() {
        let (ids, xml) = composed(false);
        assert!(xml.contains(&format!(
            r#"<a:Action s:mustUnderstand="1">{}</a:Action>"#,
            ServiceVariant::SubmitData.action()
        )));
        assert!(xml.contains(&format!("<a:MessageID>{}</a:MessageID>", ids.message_id())));
        assert!(xml.contains(
            "<a:ReplyTo><a:Address>http://www.w3.org/2005/08/addressing/anonymous</a:Address></a:ReplyTo>"
        ));
        assert!(xml.contains(
            r#"<a:To s:mustUnderstand="1">https://gateway.example/service</a:To>"#
        ));
        assert!(xml.contains(&format!(
            r#"<o:Security xmlns:o="{}" s:mustUnderstand="1">"#,
            ns::WSSE
        )));
        assert!(xml.contains(r#"<u:Timestamp u:Id="_0">"#));
        assert!(xml.contains(&format!(
            r#"<o:UsernameToken u:Id="{}"><o:Username>alice</o:Username>"#,
            ids.username_token_id()
        )));
        assert!(xml.contains(token_profiles::PASSWORD_TEXT));
        assert!(xml.contains("p&amp;ss&lt;word"));
        assert!(xml.contains(&format!(
            r#"<o:BinarySecurityToken u:Id="{}" ValueType="{}" EncodingType="{}">Y2VydA==</o:BinarySecurityToken>"#,
            ids.binary_token_id(),
            token_profiles::X509V3,
            token_profiles::BASE64_BINARY
        )));
        assert!(!xml.contains("<Signature"));
    }

    #[test]
    fn test_to_carries_body_id_when_enabled() {
        let (_, xml) = composed(true);
        assert!(xml.contains(r#"<a:To s:mustUnderstand="1" u:Id="_1">"#));
        assert!(xml.contains(r#"<s:Body u:Id="_1">"#));
    }

    #[test]
    fn test_header_composed_once() {
        let mut document = build_envelope(Payload::parse("<Data/>").unwrap());
        let ids = CorrelationIds::generate();
        compose_security_header(&mut document, &params(false), &ids, b"cert").unwrap();
        assert!(compose_security_header(&mut document, &params(false), &ids, b"cert").is_err());
    }
}
