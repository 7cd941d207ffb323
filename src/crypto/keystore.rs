//! PKCS#12 key store access.
//!
//! The store arrives as a base64 blob from configuration and is decoded entirely in memory,
//! so no key material ever touches the filesystem.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use openssl::error::ErrorStack;
use openssl::pkcs12::Pkcs12;
use openssl::x509::{X509, X509Ref};
use thiserror::Error;
use tracing::debug;

use crate::crypto::rsa::RsaPrivateKey;

#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("key store blob is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("key store could not be opened (wrong password or corrupt store): {0}")]
    Open(#[source] ErrorStack),

    #[error("alias '{0}' not found in key store")]
    AliasNotFound(String),

    #[error("alias '{0}' does not refer to a private key entry")]
    NotAKeyEntry(String),

    #[error("unusable private key for alias '{alias}': {reason}")]
    UnusableKey { alias: String, reason: String },

    #[error("certificate encoding failed: {0}")]
    Certificate(#[source] ErrorStack),
}

/// Private key and certificate resolved from the key store for one invocation.
pub struct KeyMaterial {
    private_key: RsaPrivateKey,
    certificate: X509,
}

impl KeyMaterial {
    pub fn new(private_key: RsaPrivateKey, certificate: X509) -> Self {
        Self {
            private_key,
            certificate,
        }
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    pub fn certificate(&self) -> &X509Ref {
        &self.certificate
    }

    /// DER encoding of the certificate, as carried by the BinarySecurityToken
    pub fn certificate_der(&self) -> Result<Vec<u8>, KeystoreError> {
        self.certificate.to_der().map_err(KeystoreError::Certificate)
    }

    pub fn into_parts(self) -> (RsaPrivateKey, X509) {
        (self.private_key, self.certificate)
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("private_key", &self.private_key)
            .field("subject", &self.certificate.subject_name())
            .finish()
    }
}

/// Decode a base64 PKCS#12 blob and return the key entry stored under `alias`.
pub fn load_key_material(
    blob_b64: &str,
    password: &str,
    alias: &str,
) -> Result<KeyMaterial, KeystoreError> {
    // Blobs copied from files or env vars are often line-wrapped
    let compact: String = blob_b64.chars().filter(|c| !c.is_whitespace()).collect();
    let der = BASE64.decode(compact.as_bytes())?;

    let parsed = Pkcs12::from_der(&der)
        .and_then(|store| store.parse2(password))
        .map_err(KeystoreError::Open)?;

    let alias_matches = |cert: &X509Ref| {
        cert.alias()
            .is_some_and(|name| name.eq_ignore_ascii_case(alias.as_bytes()))
    };

    match (parsed.pkey, parsed.cert) {
        (Some(pkey), Some(cert)) if alias_matches(&cert) => {
            let private_key =
                RsaPrivateKey::from_pkey(pkey).map_err(|e| KeystoreError::UnusableKey {
                    alias: alias.to_string(),
                    reason: e.to_string(),
                })?;
            debug!(
                alias,
                key_bits = private_key.bits(),
                "resolved key entry from key store"
            );
            Ok(KeyMaterial::new(private_key, cert))
        }
        (_, cert) => {
            let in_chain = parsed
                .ca
                .as_ref()
                .is_some_and(|chain| chain.iter().any(alias_matches));
            let bare_cert = cert.as_deref().is_some_and(alias_matches);
            if in_chain || bare_cert {
                Err(KeystoreError::NotAKeyEntry(alias.to_string()))
            } else {
                Err(KeystoreError::AliasNotFound(alias.to_string()))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
    use openssl::asn1::Asn1Time;
    use openssl::bn::BigNum;
    use openssl::hash::MessageDigest;
    use openssl::pkcs12::Pkcs12;
    use openssl::pkey::{PKey, Private};
    use openssl::rsa::Rsa;
    use openssl::x509::{X509, X509NameBuilder};

    pub fn self_signed(cn: &str) -> (PKey<Private>, X509) {
        self_signed_rsa(cn, 2048)
    }

    pub fn self_signed_rsa(cn: &str, bits: u32) -> (PKey<Private>, X509) {
        let key = PKey::from_rsa(Rsa::generate(bits).unwrap()).unwrap();
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", cn).unwrap();
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(42).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(365).unwrap())
            .unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();
        (key, builder.build())
    }

    pub fn store_b64(alias: &str, password: &str) -> String {
        store_b64_rsa(alias, password, 2048)
    }

    pub fn store_b64_rsa(alias: &str, password: &str, bits: u32) -> String {
        let (key, cert) = self_signed_rsa("wsse-envelope test", bits);
        let store = Pkcs12::builder()
            .name(alias)
            .pkey(&key)
            .cert(&cert)
            .build2(password)
            .unwrap();
        BASE64.encode(store.to_der().unwrap())
    }
}
