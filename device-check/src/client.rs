use std::{sync::Arc, time::Duration};

use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE},
    Method, Response,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info, instrument, Instrument};
use url::Url;

use crate::{
    constants::{ATTESTATIONS_PATH, DEFAULT_TIMEOUT, ENROLLMENTS_PATH, PRIVATE_KEY_ID},
    errors::{DeviceCheckError, Result, ServerError},
    key_store::{DeviceKey, SecureKeyStore},
    token::DeviceTokenProvider,
    types::{
        AttestationBlob, AttestationRequest, AttestationVerification, DeviceCheckEnrollment,
        DeviceCheckRegistration,
    },
    utils::{attestation_response_url, get_base_url, sign_blob},
};

/// Options for the device check client
#[derive(Debug, Default, Clone)]
pub struct ClientOptions {
    /// Optional base URL of the service. If `None`, uses [`get_base_url`]
    pub base_url: Option<String>,
    /// Optional identifier of the device key. If `None`, uses [`PRIVATE_KEY_ID`]
    pub private_key_id: Option<String>,
    /// Optional request timeout. If `None`, uses [`DEFAULT_TIMEOUT`]
    pub timeout: Option<Duration>,
}

/// Client for device enrollment and nonce attestation.
///
/// Every operation is a single attempt; failures are returned to the caller,
/// which decides whether to retry.
#[derive(Clone)]
pub struct DeviceCheckClient {
    http: reqwest::Client,
    base_url: Url,
    private_key_id: String,
    key_store: Arc<dyn SecureKeyStore>,
    token_provider: Arc<dyn DeviceTokenProvider>,
}

impl std::fmt::Debug for DeviceCheckClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCheckClient")
            .field("base_url", &self.base_url.as_str())
            .field("private_key_id", &self.private_key_id)
            .finish_non_exhaustive()
    }
}

impl DeviceCheckClient {
    pub fn new(
        options: ClientOptions,
        key_store: Arc<dyn SecureKeyStore>,
        token_provider: Arc<dyn DeviceTokenProvider>,
    ) -> Result<Self> {
        let ClientOptions {
            base_url,
            private_key_id,
            timeout,
        } = options;
        let base_url = Url::parse(&base_url.unwrap_or_else(get_base_url))?;
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;
        Ok(Self {
            http,
            base_url,
            private_key_id: private_key_id.unwrap_or_else(|| PRIVATE_KEY_ID.to_string()),
            key_store,
            token_provider,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Registers the device with the service.
    ///
    /// Succeeds on any 2xx response, whatever its body.
    ///
    /// # Errors
    ///
    /// Returns `DeviceCheckError` if:
    /// * The HTTP request fails
    /// * The service answers with an error payload or a non-2xx status
    #[instrument(
        level = "info",
        name = "register_device",
        skip(self, registration),
        fields(payment_id = %registration.enrollment_blob.payment_id)
    )]
    pub async fn register_device(&self, registration: &DeviceCheckRegistration) -> Result<()> {
        let url = self.base_url.join(ENROLLMENTS_PATH)?;
        self.execute(Method::POST, url, registration).await?;
        info!(level = "register_device", "Device registered");
        Ok(())
    }

    /// Asks the service for a pending nonce challenge for this device.
    ///
    /// # Errors
    ///
    /// Returns `DeviceCheckError` if:
    /// * No device key exists yet
    /// * The HTTP request fails
    /// * The service answers with an error payload, a non-2xx status or an empty body
    /// * The challenge cannot be decoded
    #[instrument(level = "info", name = "get_attestation", skip(self))]
    pub async fn get_attestation(&self, payment_id: &str) -> Result<AttestationBlob> {
        let key = self.existing_key()?;
        let request = AttestationRequest {
            public_key_hash: key.public_key_sha256_fingerprint()?,
            payment_id: payment_id.to_string(),
        };
        let url = self.base_url.join(ATTESTATIONS_PATH)?;
        let response = self.execute(Method::POST, url, &request).await?;
        let blob: AttestationBlob = decode_json(&response)?;
        info!(
            level = "get_attestation",
            nonce = %blob.nonce,
            "Received attestation challenge"
        );
        Ok(blob)
    }

    /// Answers a nonce challenge with a signature from the device key.
    ///
    /// # Errors
    ///
    /// Returns `DeviceCheckError` if:
    /// * The nonce is empty, `.` or `..`
    /// * No device key exists yet
    /// * Signing fails
    /// * The HTTP request fails
    /// * The service answers with an error payload or a non-2xx status
    #[instrument(level = "info", name = "set_attestation", skip(self))]
    pub async fn set_attestation(&self, nonce: &str) -> Result<()> {
        let url = attestation_response_url(&self.base_url, nonce)?;
        let key = self.existing_key()?;
        let attestation = AttestationBlob::new(nonce);
        let signature = sign_blob(key.as_ref(), &attestation)?;
        let verification = AttestationVerification::new(attestation, signature);
        self.execute(Method::PUT, url, &verification).await?;
        info!(level = "set_attestation", "Attestation accepted");
        Ok(())
    }

    /// Fetches the pending challenge for `payment_id` and answers it.
    ///
    /// Returns the nonce that was answered.
    #[instrument(level = "info", name = "attest", skip(self))]
    pub async fn attest(&self, payment_id: &str) -> Result<String> {
        let AttestationBlob { nonce } = self.get_attestation(payment_id).await?;
        self.set_attestation(&nonce).await?;
        Ok(nonce)
    }

    /// Generates a one-time device-integrity token, base64 encoded.
    #[instrument(level = "debug", name = "generate_token", skip(self))]
    pub async fn generate_token(&self) -> Result<String> {
        let token = self.token_provider.generate_token().await.map_err(|e| {
            error!(level = "generate_token", "Failed to generate device token: {e}");
            e
        })?;
        Ok(STANDARD.encode(token))
    }

    /// Generates a fresh device key and the signed enrollment to pass to
    /// [`Self::register_device`].
    ///
    /// Any key previously stored under the configured identifier is replaced.
    #[instrument(level = "info", name = "generate_enrollment", skip(self, token))]
    pub fn generate_enrollment(
        &self,
        payment_id: &str,
        token: &str,
    ) -> Result<DeviceCheckRegistration> {
        let key = self.key_store.generate_key(&self.private_key_id)?;
        let enrollment = DeviceCheckEnrollment::new(payment_id, key.public_key_pem()?, token);
        let signature = sign_blob(key.as_ref(), &enrollment)?;
        debug!(level = "generate_enrollment", "Signed enrollment");
        Ok(DeviceCheckRegistration::new(enrollment, signature))
    }

    fn existing_key(&self) -> Result<Arc<dyn DeviceKey>> {
        self.key_store
            .existing_key(&self.private_key_id)?
            .ok_or_else(|| DeviceCheckError::MissingKey(self.private_key_id.clone()))
    }

    /// Sends `body` as JSON and returns the response once it is known not to
    /// carry an error.
    async fn execute<T: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: &T,
    ) -> Result<Vec<u8>> {
        let request_span =
            tracing::info_span!("device_check_request", method = %method, url = %url);
        let response = self
            .http
            .request(method, url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .json(body)
            .send()
            .instrument(request_span)
            .await
            .map_err(|e| {
                error!(
                    level = "device_check_request",
                    "Failed to send request: {e}"
                );
                DeviceCheckError::Transport(e)
            })?;
        check_response(response).await
    }
}

/// Turns a response into its body, or the error it reports.
///
/// An error payload wins over the status code; a non-2xx status without one
/// is reported as an invalid response code.
async fn check_response(response: Response) -> Result<Vec<u8>> {
    let status = response.status();
    let body = response.bytes().await?;
    if let Ok(server_error) = serde_json::from_slice::<ServerError>(&body) {
        error!(
            level = "device_check_request",
            status = status.as_u16(),
            "Service returned an error: {server_error}"
        );
        return Err(server_error.into());
    }
    if !status.is_success() {
        error!(
            level = "device_check_request",
            "Request failed with status code {status}"
        );
        return Err(ServerError::invalid_response_code(status.as_u16()).into());
    }
    Ok(body.to_vec())
}

fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    if body.is_empty() {
        error!(level = "device_check_request", "Empty response body");
        return Err(ServerError::empty_response().into());
    }
    serde_json::from_slice(body).map_err(|e| {
        error!(
            level = "device_check_request",
            "Failed to parse response: {e}"
        );
        DeviceCheckError::JsonError(e)
    })
}
