use std::time::Duration;

/// Default base URL of the device check reputation service.
///
/// Used when neither `ClientOptions::base_url`, the process-wide override nor
/// the `DEVICE_CHECK_BASE_URL` environment variable provides one.
pub const DEFAULT_BASE_URL: &str = "https://reputation.rewards.brave.software";

/// Environment variable consulted for the service base URL.
pub const DEVICE_CHECK_BASE_URL_KEY: &str = "DEVICE_CHECK_BASE_URL";

/// Identifier of the device private key inside the secure key store.
pub const PRIVATE_KEY_ID: &str = "com.brave.device.check.private.key";

/// Path of the enrollment registration endpoint.
pub const ENROLLMENTS_PATH: &str = "/v1/devicecheck/enrollments";

/// Path of the attestation endpoint.
///
/// Attestation requests are POSTed here; responses to a nonce challenge are
/// PUT to this path followed by the percent-encoded nonce.
pub const ATTESTATIONS_PATH: &str = "/v1/devicecheck/attestations";

/// Default timeout for requests to the device check service.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Message of the error reported when the service answers with a non-2xx
/// status and no decodable error body.
pub const INVALID_RESPONSE_CODE_MESSAGE: &str = "Validation Failed: Invalid Response Code";

/// Message of the error reported when a typed response arrives with no body.
pub const EMPTY_RESPONSE_MESSAGE: &str = "Validation Failed: Empty Server Response";

/// Status code carried by the empty response error.
pub const EMPTY_RESPONSE_CODE: u16 = 500;
