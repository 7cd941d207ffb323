//! Signing pipeline shared by both gateway operations.

use std::sync::Arc;

use secrecy::ExposeSecret;
use tracing::{debug, info, info_span, warn};

use crate::config::SignerConfig;
use crate::crypto::load_key_material;
use crate::error::{Error, Result};
use crate::soap::wsse::{
    CorrelationIds, HeaderParams, SignConfig, compose_security_header, sign_document,
};
use crate::soap::{self, PayloadSource, ServiceVariant, XmlConfig, build_envelope};

/// Produces signed SOAP envelopes for the reference and data-submission operations.
///
/// The service holds only read-only configuration; each call owns its document, key material
/// and identifiers, so one instance can be shared between threads.
#[derive(Debug, Clone)]
pub struct EnvelopeService {
    config: Arc<SignerConfig>,
}

impl EnvelopeService {
    pub fn new(config: SignerConfig) -> Self {
        Self::from_shared(Arc::new(config))
    }

    pub fn from_shared(config: Arc<SignerConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignerConfig {
        &self.config
    }

    /// Sign the caller supplied `payload_xml` for the SubmitData operation
    pub fn submit_data(&self, payload_xml: &str) -> Result<String> {
        self.sign(
            ServiceVariant::SubmitData,
            PayloadSource::Inline(payload_xml.to_string()),
        )
    }

    /// Sign the configured reference request for the FetchReference operation
    pub fn fetch_reference(&self) -> Result<String> {
        self.sign(
            ServiceVariant::FetchReference,
            PayloadSource::File(self.config.reference_payload_path.clone()),
        )
    }

    /// Run the full pipeline for `variant` and return the serialized envelope.
    pub fn sign(&self, variant: ServiceVariant, source: PayloadSource) -> Result<String> {
        let ids = CorrelationIds::generate();
        let span = info_span!(
            "sign_envelope",
            variant = %variant,
            message_id = %ids.message_id()
        );
        let _guard = span.enter();

        let result = self.run(variant, &source, &ids);
        match &result {
            Ok(xml) => info!(bytes = xml.len(), "envelope signed"),
            Err(err) => warn!(error = %err, "envelope signing failed"),
        }
        result
    }

    fn run(
        &self,
        variant: ServiceVariant,
        source: &PayloadSource,
        ids: &CorrelationIds,
    ) -> Result<String> {
        let keystore = &self.config.keystore;
        let key_material = load_key_material(
            keystore.blob.expose_secret(),
            keystore.password.expose_secret(),
            &keystore.alias,
        )?;
        let certificate_der = key_material.certificate_der()?;
        debug!(alias = %keystore.alias, "signing credentials loaded");

        let payload = source.load()?;
        let mut document = build_envelope(payload);

        let params = HeaderParams {
            variant,
            username: &self.config.username,
            password: self.config.password.expose_secret(),
            destination_url: &self.config.destination_url,
            to_carries_body_id: self.config.to_carries_body_id,
        };
        compose_security_header(&mut document, &params, ids, &certificate_der)
            .map_err(Error::envelope)?;

        // The private key is dropped at the end of this block, before serialization
        {
            let (private_key, _certificate) = key_material.into_parts();
            let sign_config = SignConfig {
                algorithm: self.config.signature_algorithm,
            };
            sign_document(
                &mut document,
                &private_key,
                &ids.token_reference_uri(),
                sign_config,
            )
            .map_err(Error::signature)?;
        }

        soap::to_string(&XmlConfig::default(), &document).map_err(Error::envelope)
    }
}
