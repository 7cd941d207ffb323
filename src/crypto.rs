mod errors;
pub mod keystore;
pub mod rsa;

pub use errors::Error;
pub use keystore::{KeyMaterial, KeystoreError, load_key_material};

use errors::CryptoResult;
use openssl::hash::{Hasher, MessageDigest as Digest};
use std::fmt;

/// Hash algorithms usable for XML signature digests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlg {
    /// SHA-1, only for legacy gateways
    Sha1,
    /// SHA-256
    Sha256,
}

impl HashAlg {
    /// Hash the given data with this hash algorithm
    pub fn hash(&self, data: impl AsRef<[u8]>) -> CryptoResult<Vec<u8>> {
        let mut hasher = Hasher::new(self.into())?;
        hasher.update(data.as_ref())?;
        Ok(hasher.finish()?.to_vec())
    }

    /// Get the output size in bytes
    pub fn output_size(self) -> usize {
        match self {
            HashAlg::Sha1 => 20,
            HashAlg::Sha256 => 32,
        }
    }
}

impl From<&HashAlg> for Digest {
    fn from(hash_alg: &HashAlg) -> Self {
        match hash_alg {
            HashAlg::Sha1 => Digest::sha1(),
            HashAlg::Sha256 => Digest::sha256(),
        }
    }
}

impl From<HashAlg> for Digest {
    fn from(hash_alg: HashAlg) -> Self {
        (&hash_alg).into()
    }
}

impl fmt::Display for HashAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HashAlg::Sha1 => "SHA-1",
            HashAlg::Sha256 => "SHA-256",
        };
        write!(f, "{name}")
    }
}
