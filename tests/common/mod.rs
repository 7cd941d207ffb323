use std::path::PathBuf;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::{X509, X509NameBuilder};
use secrecy::SecretString;
use wsse_envelope::config::{KeystoreConfig, SignerConfig};
use wsse_envelope::soap::wsse::SignatureAlgorithm;

pub const STORE_PASSWORD: &str = "changeit";
pub const ALIAS: &str = "gateway-signing";
pub const DESTINATION: &str = "https://gateway.example/ReferenceService.svc";

/// Base64 PKCS#12 store holding one RSA key entry under `alias`
pub fn keystore_b64(alias: &str, password: &str) -> String {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", "integration signer").unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(7).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(30).unwrap())
        .unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();
    let cert = builder.build();

    let store = Pkcs12::builder()
        .name(alias)
        .pkey(&key)
        .cert(&cert)
        .build2(password)
        .unwrap();
    BASE64.encode(store.to_der().unwrap())
}

pub fn signer_config() -> SignerConfig {
    SignerConfig {
        username: "gateway-user".to_string(),
        password: SecretString::from("gateway-pass".to_string()),
        destination_url: DESTINATION.to_string(),
        keystore: KeystoreConfig {
            blob: SecretString::from(keystore_b64(ALIAS, STORE_PASSWORD)),
            password: SecretString::from(STORE_PASSWORD.to_string()),
            alias: ALIAS.to_string(),
        },
        signature_algorithm: SignatureAlgorithm::RsaSha1,
        reference_payload_path: PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("config/fetch_reference.xml"),
        to_carries_body_id: false,
    }
}
