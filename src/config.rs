use std::{collections::HashMap, path::PathBuf};

use config::{Config as ConfigLib, ConfigError, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;

use crate::soap::wsse::SignatureAlgorithm;

pub const DEFAULT_REFERENCE_PAYLOAD_PATH: &str = "config/fetch_reference.xml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub signer: SignerConfig,
}

/// Everything one signing invocation reads. Loaded once, then shared read-only.
#[derive(Debug, Clone, Deserialize)]
pub struct SignerConfig {
    pub username: String,
    pub password: SecretString,
    /// Gateway endpoint, written into `a:To`
    pub destination_url: String,
    pub keystore: KeystoreConfig,
    #[serde(default)]
    pub signature_algorithm: SignatureAlgorithm,
    /// Payload of the FetchReference operation
    #[serde(default = "default_reference_payload_path")]
    pub reference_payload_path: PathBuf,
    /// Stamp the Body id on `a:To` as well (legacy gateway profile)
    #[serde(default)]
    pub to_carries_body_id: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeystoreConfig {
    /// Base64 encoded PKCS#12 store
    pub blob: SecretString,
    pub password: SecretString,
    pub alias: String,
}

fn default_reference_payload_path() -> PathBuf {
    PathBuf::from(DEFAULT_REFERENCE_PAYLOAD_PATH)
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder()
            .set_default("signer.signature_algorithm", "rsa-sha1")?
            .set_default(
                "signer.reference_payload_path",
                DEFAULT_REFERENCE_PAYLOAD_PATH,
            )?
            .set_default("signer.to_carries_body_id", false)?
            .add_source(File::with_name("config/settings").required(false));

        // Explicit overrides keep tests independent of the process environment
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // e.g. APP_SIGNER__USERNAME or APP_SIGNER__KEYSTORE__ALIAS
            builder = builder.add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        builder.build()?.try_deserialize()
    }
}
