use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use tracing::debug;

use crate::crypto::rsa::{self, RsaPrivateKey};
use crate::soap::SoapDocument;
use crate::soap::wsse::*;

/// Per-call signing configuration. Nothing here is process-global.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignConfig {
    pub algorithm: SignatureAlgorithm,
}

/// Add a detached signature over the Timestamp (`#_0`) and the Body (`#_1`) to the Security
/// header of `document`.
///
/// `token_reference_uri` points at the BinarySecurityToken carrying the signing certificate;
/// the signature itself embeds no certificate.
pub fn sign_document(
    document: &mut SoapDocument,
    private_key: &RsaPrivateKey,
    token_reference_uri: &str,
    config: SignConfig,
) -> Result<()> {
    let algorithm = config.algorithm;
    let hash_alg = algorithm.hash_alg();

    if document
        .security()
        .ok_or_else(|| Error::Invalid("Document has no Security header to sign".into()))?
        .signature
        .is_some()
    {
        return Err(Error::Invalid("Document is already signed".into()));
    }

    let registry = IdRegistry::new()
        .register("Timestamp", TIMESTAMP_ID)
        .register("Body", document.body_id());

    // Digest each referenced subtree in the context of the composed document
    let unsigned_xml = document.render()?;
    let mut references = Vec::with_capacity(2);
    for uri in [format!("#{TIMESTAMP_ID}"), format!("#{}", document.body_id())] {
        let canonical = registry.canonicalize_reference(&unsigned_xml, &uri)?;
        let digest = hash_alg.hash(canonical.as_bytes())?;
        debug!(%uri, digest = %BASE64.encode(&digest), "computed reference digest");
        references.push(Reference {
            uri,
            transforms: Transforms {
                transform: vec![AlgorithmRef::new(algorithms::EXCLUSIVE_C14N)],
            },
            digest_method: AlgorithmRef::new(algorithm.digest_uri()),
            digest_value: BASE64.encode(&digest),
        });
    }

    let signature = Signature {
        xmlns: ns::DS.to_string(),
        signed_info: SignedInfo {
            canon_method: AlgorithmRef::new(algorithms::EXCLUSIVE_C14N),
            signature_method: AlgorithmRef::new(algorithm.signature_uri()),
            references,
        },
        signature_value: String::new(),
        key_info: KeyInfo {
            security_token_ref: SecurityTokenReference {
                reference: TokenReference {
                    uri: token_reference_uri.to_string(),
                    value_type: token_profiles::X509V3.to_string(),
                },
            },
        },
    };

    // SignedInfo is canonicalized where it sits, inside Signature inside Security
    let security = document
        .security_mut()
        .ok_or_else(|| Error::Invalid("Document has no Security header to sign".into()))?;
    security.signature = Some(signature);
    let placed_xml = document.render()?;
    let signed_info_c14n = c14n::canonicalize_subtree(&placed_xml, None, |e| {
        e.local_name().as_ref() == b"SignedInfo"
    })?;

    let signature_value = rsa::sign(private_key, signed_info_c14n.as_bytes(), hash_alg)?;

    if let Some(signature) = document
        .security_mut()
        .and_then(|security| security.signature.as_mut())
    {
        signature.signature_value = BASE64.encode(signature_value.as_bytes());
    }

    debug!(
        algorithm = ?algorithm,
        signature_len = signature_value.len(),
        "signed SOAP envelope"
    );
    Ok(())
}
