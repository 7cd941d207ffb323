use crate::crypto::HashAlg;
use crate::crypto::errors::{CryptoResult, Error};
use openssl::pkey::{Id, PKey, Private, Public};
use openssl::rsa::Rsa;
use openssl::sign::{Signer, Verifier};
use openssl::x509::X509Ref;
use std::fmt;

/// PKCS#1 v1.5 signature value
#[derive(Clone, PartialEq, Eq)]
pub struct RsaSignature(Vec<u8>);

impl RsaSignature {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self(data.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for RsaSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RsaSignature")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

/// RSA private key wrapper
#[derive(Clone)]
pub struct RsaPrivateKey {
    key: PKey<Private>,
}

impl RsaPrivateKey {
    /// Generate a new RSA private key with a modulus of `bits` bits
    pub fn generate(bits: u32) -> CryptoResult<Self> {
        let rsa = Rsa::generate(bits)?;
        Self::from_pkey(PKey::from_rsa(rsa)?)
    }

    /// Wrap an OpenSSL key, rejecting anything that is not RSA.
    pub fn from_pkey(key: PKey<Private>) -> CryptoResult<Self> {
        if key.id() != Id::RSA {
            return Err(Error::UnsupportedKey(format!(
                "expected an RSA private key, found {:?}",
                key.id()
            )));
        }
        Ok(Self { key })
    }

    /// Get the corresponding public key
    pub fn public_key(&self) -> CryptoResult<RsaPublicKey> {
        let key = PKey::public_key_from_der(&self.key.public_key_to_der()?)?;
        Ok(RsaPublicKey { key })
    }

    /// Modulus size in bits
    pub fn bits(&self) -> u32 {
        self.key.bits()
    }

    pub(crate) fn pkey(&self) -> &PKey<Private> {
        &self.key
    }
}

impl fmt::Debug for RsaPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaPrivateKey")
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}

/// RSA public key wrapper
#[derive(Debug, Clone)]
pub struct RsaPublicKey {
    key: PKey<Public>,
}

impl RsaPublicKey {
    /// Extract the public key of an X.509 certificate
    pub fn from_certificate(cert: &X509Ref) -> CryptoResult<Self> {
        let key = cert.public_key()?;
        if key.id() != Id::RSA {
            return Err(Error::UnsupportedKey(format!(
                "expected an RSA public key, found {:?}",
                key.id()
            )));
        }
        Ok(Self { key })
    }

    /// Length in bytes of every signature this key verifies
    pub fn signature_len(&self) -> usize {
        self.key.size()
    }

    pub(crate) fn pkey(&self) -> &PKey<Public> {
        &self.key
    }
}

/// Sign data using RSA PKCS#1 v1.5 with the given digest
pub fn sign(
    private_key: &RsaPrivateKey,
    data: impl AsRef<[u8]>,
    hash_alg: HashAlg,
) -> CryptoResult<RsaSignature> {
    let mut signer = Signer::new(hash_alg.into(), private_key.pkey())?;
    let signature_data = signer.sign_oneshot_to_vec(data.as_ref())?;

    Ok(RsaSignature::new(signature_data))
}

/// Verify an RSA PKCS#1 v1.5 signature
pub fn verify(
    public_key: &RsaPublicKey,
    data: impl AsRef<[u8]>,
    signature: &RsaSignature,
    hash_alg: HashAlg,
) -> CryptoResult<bool> {
    if signature.len() != public_key.signature_len() {
        return Err(Error::Invalid(format!(
            "signature is {} bytes, key modulus is {} bytes",
            signature.len(),
            public_key.signature_len()
        )));
    }

    let mut verifier = Verifier::new(hash_alg.into(), public_key.pkey())?;
    let result = verifier.verify_oneshot(signature.as_bytes(), data.as_ref())?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsa_sign_verify() {
        let private_key = RsaPrivateKey::generate(2048).unwrap();
        let public_key = private_key.public_key().unwrap();
        let data = b"test data";

        for hash_alg in [HashAlg::Sha1, HashAlg::Sha256] {
            let signature = sign(&private_key, data, hash_alg).unwrap();
            assert_eq!(signature.len(), 256);

            assert!(verify(&public_key, data, &signature, hash_alg).unwrap());
            assert!(!verify(&public_key, b"wrong data", &signature, hash_alg).unwrap());
        }
    }

    #[test]
    fn test_signature_is_deterministic() {
        let private_key = RsaPrivateKey::generate(2048).unwrap();
        let first = sign(&private_key, b"payload", HashAlg::Sha1).unwrap();
        let second = sign(&private_key, b"payload", HashAlg::Sha1).unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn test_cross_key_verification_fails() {
        let key1 = RsaPrivateKey::generate(2048).unwrap();
        let key2 = RsaPrivateKey::generate(2048).unwrap();
        let data = b"test data";

        let signature = sign(&key1, data, HashAlg::Sha256).unwrap();
        let is_valid = verify(&key2.public_key().unwrap(), data, &signature, HashAlg::Sha256);
        assert!(!is_valid.unwrap());
    }

    #[test]
    fn test_uncommon_modulus_sizes() {
        for bits in [1536, 2560] {
            let private_key = RsaPrivateKey::generate(bits).unwrap();
            assert_eq!(private_key.bits(), bits);

            let public_key = private_key.public_key().unwrap();
            let signature = sign(&private_key, b"data", HashAlg::Sha1).unwrap();
            assert_eq!(signature.len(), bits as usize / 8);
            assert!(verify(&public_key, b"data", &signature, HashAlg::Sha1).unwrap());
        }
    }

    #[test]
    fn test_truncated_signature_rejected() {
        let private_key = RsaPrivateKey::generate(2048).unwrap();
        let signature = sign(&private_key, b"data", HashAlg::Sha256).unwrap();
        let truncated = RsaSignature::new(&signature.as_bytes()[1..]);

        let result = verify(&private_key.public_key().unwrap(), b"data", &truncated, HashAlg::Sha256);
        assert!(matches!(result, Err(Error::Invalid(_))));
    }

    #[test]
    fn test_non_rsa_key_rejected() {
        use openssl::ec::{EcGroup, EcKey};
        use openssl::nid::Nid;

        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let ec = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();
        assert!(matches!(
            RsaPrivateKey::from_pkey(ec),
            Err(Error::UnsupportedKey(_))
        ));
    }

    #[test]
    fn test_private_key_debug_hides_material() {
        let private_key = RsaPrivateKey::generate(2048).unwrap();
        let debug = format!("{private_key:?}");
        assert!(debug.contains("2048"));
        assert!(!debug.contains("BEGIN"));
    }
}
