mod c14n;
mod error;
mod header;
mod signer;
mod timestamp;
mod utils;
mod verifier;

pub use c14n::{canonicalize, canonicalize_subtree};
pub use error::Error;
pub use header::{CorrelationIds, HeaderParams, compose_security_header};
pub use signer::{SignConfig, sign_document};
pub use timestamp::{TTL_SECONDS, Timestamp};
pub use utils::IdRegistry;
pub use verifier::verify_envelope;

use serde::{Deserialize, Serialize};

use crate::crypto::HashAlg;

pub type Result<T> = std::result::Result<T, Error>;

/// Identifier of the security Timestamp, referenced as `#_0`
pub const TIMESTAMP_ID: &str = "_0";
/// Identifier of the SOAP Body, referenced as `#_1`
pub const BODY_ID: &str = "_1";

pub mod algorithms {
    // Digest algorithms
    pub const SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
    pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

    // Signature algorithms
    pub const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
    pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";

    // Canonicalization algorithms
    pub const EXCLUSIVE_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
}

pub mod ns {
    pub const WSSE: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
    pub const WSU: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
    pub const DS: &str = "http://www.w3.org/2000/09/xmldsig#";
}

pub mod token_profiles {
    pub const PASSWORD_TEXT: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText";
    pub const X509V3: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509v3";
    pub const BASE64_BINARY: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";
}

/// RSA signature / digest pairing used for the detached signature.
///
/// `RsaSha1` matches the legacy gateway profile and stays the default; new deployments should
/// configure `RsaSha256`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureAlgorithm {
    #[default]
    RsaSha1,
    RsaSha256,
}

impl SignatureAlgorithm {
    pub fn signature_uri(self) -> &'static str {
        match self {
            Self::RsaSha1 => algorithms::RSA_SHA1,
            Self::RsaSha256 => algorithms::RSA_SHA256,
        }
    }

    pub fn digest_uri(self) -> &'static str {
        match self {
            Self::RsaSha1 => algorithms::SHA1,
            Self::RsaSha256 => algorithms::SHA256,
        }
    }

    pub fn hash_alg(self) -> HashAlg {
        match self {
            Self::RsaSha1 => HashAlg::Sha1,
            Self::RsaSha256 => HashAlg::Sha256,
        }
    }

    /// Look up the pairing from a `SignatureMethod` algorithm URI
    pub fn from_signature_uri(uri: &str) -> Result<Self> {
        match uri {
            algorithms::RSA_SHA1 => Ok(Self::RsaSha1),
            algorithms::RSA_SHA256 => Ok(Self::RsaSha256),
            alg => Err(Error::Invalid(format!(
                "Unsupported signature algorithm: {alg}"
            ))),
        }
    }
}

/// The `o:Security` header block
#[derive(Debug, Clone, Serialize)]
pub struct WsSecurity {
    #[serde(rename = "@xmlns:o")]
    pub xmlns: &'static str,

    #[serde(rename = "@s:mustUnderstand")]
    pub must_understand: &'static str,

    #[serde(rename = "u:Timestamp")]
    pub timestamp: Timestamp,

    #[serde(rename = "o:UsernameToken")]
    pub username_token: UsernameToken,

    #[serde(rename = "o:BinarySecurityToken")]
    pub binary_security_token: BinarySecurityToken,

    #[serde(rename = "Signature", skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

#[derive(Clone, Serialize)]
pub struct UsernameToken {
    #[serde(rename = "@u:Id")]
    pub id: String,

    #[serde(rename = "o:Username")]
    pub username: String,

    #[serde(rename = "o:Password")]
    pub password: Password,
}

impl std::fmt::Debug for UsernameToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsernameToken")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone, Serialize)]
pub struct Password {
    #[serde(rename = "@Type")]
    pub kind: &'static str,

    #[serde(rename = "$text")]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinarySecurityToken {
    #[serde(rename(serialize = "@u:Id", deserialize = "@Id"))]
    pub id: String,

    #[serde(rename = "@ValueType")]
    pub value_type: String,

    #[serde(rename = "@EncodingType")]
    pub encoding_type: String,

    #[serde(rename = "$text")]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    #[serde(rename = "@xmlns", default)]
    pub xmlns: String,

    #[serde(rename = "SignedInfo")]
    pub signed_info: SignedInfo,

    #[serde(rename = "SignatureValue", default)]
    pub signature_value: String,

    #[serde(rename = "KeyInfo")]
    pub key_info: KeyInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedInfo {
    #[serde(rename = "CanonicalizationMethod")]
    pub canon_method: AlgorithmRef,

    #[serde(rename = "SignatureMethod")]
    pub signature_method: AlgorithmRef,

    #[serde(rename = "Reference", default)]
    pub references: Vec<Reference>,
}

/// Any element whose only content is an `Algorithm` attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmRef {
    #[serde(rename = "@Algorithm")]
    pub algorithm: String,
}

impl AlgorithmRef {
    pub fn new(algorithm: &str) -> Self {
        Self {
            algorithm: algorithm.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "@URI")]
    pub uri: String,

    #[serde(rename = "Transforms")]
    pub transforms: Transforms,

    #[serde(rename = "DigestMethod")]
    pub digest_method: AlgorithmRef,

    #[serde(rename = "DigestValue")]
    pub digest_value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transforms {
    #[serde(rename = "Transform", default)]
    pub transform: Vec<AlgorithmRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyInfo {
    #[serde(rename(
        serialize = "o:SecurityTokenReference",
        deserialize = "SecurityTokenReference"
    ))]
    pub security_token_ref: SecurityTokenReference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityTokenReference {
    #[serde(rename(serialize = "o:Reference", deserialize = "Reference"))]
    pub reference: TokenReference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenReference {
    #[serde(rename = "@URI")]
    pub uri: String,

    #[serde(rename = "@ValueType")]
    pub value_type: String,
}
