use async_trait::async_trait;

use crate::errors::{DeviceCheckError, Result};

/// Source of one-time device-integrity tokens.
///
/// On devices this wraps the platform device-integrity API; the token is
/// opaque to this crate and only forwarded to the service.
#[async_trait]
pub trait DeviceTokenProvider: Send + Sync {
    async fn generate_token(&self) -> Result<Vec<u8>>;
}

/// Hands out a token obtained elsewhere, for example exported by the
/// platform side into a file.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: Vec<u8>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<Vec<u8>>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl DeviceTokenProvider for StaticTokenProvider {
    async fn generate_token(&self) -> Result<Vec<u8>> {
        if self.token.is_empty() {
            return Err(DeviceCheckError::TokenGeneration(
                "no device token available".to_string(),
            ));
        }
        Ok(self.token.clone())
    }
}
