//! Structural self-check of envelopes produced by this crate.
//!
//! Re-parses the serialized document, recomputes both reference digests, resolves the
//! SecurityTokenReference to its BinarySecurityToken and checks the signature value with the
//! certificate found there. No trust decision is made about the certificate itself.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use openssl::x509::X509;
use quick_xml::de::from_str as xml_from_str;

use crate::crypto::rsa::{self, RsaPublicKey, RsaSignature};
use crate::soap::wsse::timestamp::Timestamp;
use crate::soap::wsse::*;

/// Verify a signed SOAP envelope against the certificate it carries
pub fn verify_envelope(envelope_xml: &str) -> Result<()> {
    let security_xml = utils::extract_element(envelope_xml, "Security")?;

    let timestamp = extract_timestamp(&security_xml)?;
    timestamp.validate()?;

    let signature = extract_signature(&security_xml)?;
    let algorithm =
        SignatureAlgorithm::from_signature_uri(&signature.signed_info.signature_method.algorithm)?;

    if signature.signed_info.canon_method.algorithm != algorithms::EXCLUSIVE_C14N {
        return Err(Error::Invalid(format!(
            "Unsupported canonicalization method: {}",
            signature.signed_info.canon_method.algorithm
        )));
    }

    let registry = IdRegistry::new()
        .register("Timestamp", TIMESTAMP_ID)
        .register("Body", BODY_ID);
    verify_references(
        envelope_xml,
        &registry,
        &signature.signed_info.references,
        algorithm,
    )?;

    let public_key = resolve_token_key(&security_xml, &signature.key_info)?;

    let signed_info_c14n = c14n::canonicalize_subtree(envelope_xml, None, |e| {
        e.local_name().as_ref() == b"SignedInfo"
    })?;
    let signature_bytes = BASE64.decode(signature.signature_value.trim())?;
    let rsa_sig = RsaSignature::new(signature_bytes);

    if !rsa::verify(
        &public_key,
        signed_info_c14n.as_bytes(),
        &rsa_sig,
        algorithm.hash_alg(),
    )? {
        return Err(Error::Invalid("Signature verification failed".into()));
    }
    Ok(())
}

/// Verify digest values for all references
fn verify_references(
    envelope_xml: &str,
    registry: &IdRegistry,
    references: &[Reference],
    algorithm: SignatureAlgorithm,
) -> Result<()> {
    if references.is_empty() {
        return Err(Error::Invalid("SignedInfo has no references".into()));
    }
    for reference in references {
        if reference.digest_method.algorithm != algorithm.digest_uri() {
            return Err(Error::Invalid(format!(
                "Unsupported digest algorithm: {}",
                reference.digest_method.algorithm
            )));
        }
        if let Some(transform) = reference
            .transforms
            .transform
            .iter()
            .find(|t| t.algorithm != algorithms::EXCLUSIVE_C14N)
        {
            return Err(Error::Invalid(format!(
                "Unsupported transform: {}",
                transform.algorithm
            )));
        }

        let canonical = registry.canonicalize_reference(envelope_xml, &reference.uri)?;
        let computed_digest = algorithm.hash_alg().hash(canonical.as_bytes())?;
        let expected_digest = BASE64.decode(reference.digest_value.trim())?;

        if computed_digest != expected_digest {
            return Err(Error::Invalid(format!(
                "Digest mismatch for reference: {}",
                reference.uri
            )));
        }
    }
    Ok(())
}

/// Follow KeyInfo/SecurityTokenReference to the BinarySecurityToken and extract its key
fn resolve_token_key(security_xml: &str, key_info: &KeyInfo) -> Result<RsaPublicKey> {
    let reference = &key_info.security_token_ref.reference;
    if reference.value_type != token_profiles::X509V3 {
        return Err(Error::Invalid(format!(
            "Unsupported token reference type: {}",
            reference.value_type
        )));
    }
    let token_id = reference.uri.strip_prefix('#').ok_or_else(|| {
        Error::Invalid(format!("Invalid token reference URI: {}", reference.uri))
    })?;

    let token_xml = utils::extract_element_by_id(security_xml, token_id)?;
    let token: BinarySecurityToken = xml_from_str(&token_xml)?;
    let der = BASE64.decode(token.value.trim())?;
    let certificate = X509::from_der(&der)?;
    Ok(RsaPublicKey::from_certificate(&certificate)?)
}

fn extract_timestamp(security_xml: &str) -> Result<Timestamp> {
    let timestamp_xml = utils::extract_element(security_xml, "Timestamp")?;
    xml_from_str(&timestamp_xml).map_err(Error::from)
}

fn extract_signature(security_xml: &str) -> Result<Signature> {
    let signature_xml = utils::extract_element(security_xml, "Signature")?;
    xml_from_str(&signature_xml).map_err(Error::from)
}
