use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    EMPTY_RESPONSE_CODE, EMPTY_RESPONSE_MESSAGE, INVALID_RESPONSE_CODE_MESSAGE,
};

pub type Result<T> = std::result::Result<T, DeviceCheckError>;

/// An error payload returned by the device check service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerError {
    /// The error message
    pub message: String,

    /// The HTTP status code the service associates with the error
    pub code: u16,
}

impl ServerError {
    /// The error reported for a non-2xx status without a decodable body.
    pub fn invalid_response_code(status: u16) -> Self {
        Self {
            message: INVALID_RESPONSE_CODE_MESSAGE.to_string(),
            code: status,
        }
    }

    /// The error reported for a typed response that arrived without a body.
    pub fn empty_response() -> Self {
        Self {
            message: EMPTY_RESPONSE_MESSAGE.to_string(),
            code: EMPTY_RESPONSE_CODE,
        }
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

#[derive(Debug, Error)]
pub enum DeviceCheckError {
    #[error("Failed to reach the device check service: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Device check service error: {0}")]
    Server(ServerError),
    #[error("Unable to retrieve existing private key `{0}`")]
    MissingKey(String),
    #[error("Cryptography error: {0}")]
    Cryptography(String),
    #[error("Cannot decode {0}")]
    MalformedBlob(String),
    #[error("Nonce `{0}` cannot address an attestation")]
    InvalidNonce(String),
    #[error("Failed to encode or decode JSON")]
    JsonError(#[from] serde_json::Error),
    #[error("Failed to build request URL")]
    UrlParseError(#[from] url::ParseError),
    #[error("Failed to generate device token: {0}")]
    TokenGeneration(String),
    #[error("Key store I/O error")]
    Io(#[from] std::io::Error),
}

impl From<ServerError> for DeviceCheckError {
    fn from(error: ServerError) -> Self {
        Self::Server(error)
    }
}

impl From<p256::ecdsa::Error> for DeviceCheckError {
    fn from(error: p256::ecdsa::Error) -> Self {
        Self::Cryptography(error.to_string())
    }
}

impl From<p256::pkcs8::Error> for DeviceCheckError {
    fn from(error: p256::pkcs8::Error) -> Self {
        Self::Cryptography(error.to_string())
    }
}

impl From<p256::pkcs8::spki::Error> for DeviceCheckError {
    fn from(error: p256::pkcs8::spki::Error) -> Self {
        Self::Cryptography(error.to_string())
    }
}
