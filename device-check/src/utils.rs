use crate::{
    constants::{ATTESTATIONS_PATH, DEFAULT_BASE_URL, DEVICE_CHECK_BASE_URL_KEY},
    errors::{DeviceCheckError, Result},
    key_store::DeviceKey,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use once_cell::sync::Lazy;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, sync::Mutex};
use url::Url;

/// Process-wide override of the service base URL.
/// This is initialized as `None` and can be set at runtime.
static BASE_URL_OVERRIDE: Lazy<Mutex<Option<String>>> = Lazy::new(|| Mutex::new(None));

/// Sets the base URL used by clients built without an explicit one.
///
/// Passing `None` clears the override.
pub fn set_base_url(value: Option<String>) {
    if let Ok(mut base_url) = BASE_URL_OVERRIDE.lock() {
        *base_url = value;
    }
}

/// Determines the base URL of the device check service.
///
/// This function first checks the process-wide override set through
/// [`set_base_url`]. If not set, it falls back to the `DEVICE_CHECK_BASE_URL`
/// environment variable and finally to [`DEFAULT_BASE_URL`].
pub fn get_base_url() -> String {
    let overridden = BASE_URL_OVERRIDE
        .lock()
        .ok()
        .and_then(|base_url| base_url.clone())
        .filter(|url| !url.is_empty());
    overridden
        .or_else(|| {
            std::env::var(DEVICE_CHECK_BASE_URL_KEY)
                .ok()
                .filter(|url| !url.is_empty())
        })
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

/// Records that are signed and embedded as canonical JSON.
///
/// The canonical form is compact JSON with object keys sorted at every level,
/// so the bytes a device signs are the bytes the service receives.
pub trait CanonicalJson: Serialize {
    fn canonical_bytes(&self) -> Result<Vec<u8>> {
        let value = sort_keys(serde_json::to_value(self)?);
        Ok(serde_json::to_vec(&value)?)
    }
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted.into_iter().collect::<Map<String, Value>>())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Decodes a base64 encoded canonical JSON blob.
///
/// `field` names the blob in the returned error.
pub fn decode_blob<T: DeserializeOwned>(encoded: &str, field: &str) -> Result<T> {
    let bytes = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|_| DeviceCheckError::MalformedBlob(field.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|_| DeviceCheckError::MalformedBlob(field.to_string()))
}

/// Signs the canonical bytes of `record` and returns the base64 signature.
pub fn sign_blob<T: CanonicalJson>(key: &dyn DeviceKey, record: &T) -> Result<String> {
    let signature = key.sign(&record.canonical_bytes()?)?;
    Ok(STANDARD.encode(signature))
}

/// Serializes a record as the base64 of its canonical JSON.
///
/// Meant for `#[serde(serialize_with = "blob::serialize")]`.
pub mod blob {
    use super::CanonicalJson;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{ser::Error, Serializer};

    pub fn serialize<T, S>(value: &T, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        T: CanonicalJson,
        S: Serializer,
    {
        let bytes = value.canonical_bytes().map_err(S::Error::custom)?;
        serializer.serialize_str(&STANDARD.encode(bytes))
    }
}

/// Builds the URL a nonce challenge response is PUT to.
///
/// The nonce becomes a single path segment, so reserved characters such as
/// `/`, `?`, `#` and spaces are percent-encoded. Empty, `.` and `..` nonces
/// are rejected: URL normalization would drop them and address the
/// attestation collection instead.
pub fn attestation_response_url(base_url: &Url, nonce: &str) -> Result<Url> {
    if matches!(nonce, "" | "." | "..") {
        return Err(DeviceCheckError::InvalidNonce(nonce.to_string()));
    }
    let mut url = base_url.join(ATTESTATIONS_PATH)?;
    url.path_segments_mut()
        .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .push(nonce);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_keys_is_recursive() {
        let value = serde_json::json!({"b": {"z": 1, "a": [{"y": 2, "x": 3}]}, "a": 0});
        let sorted = serde_json::to_string(&sort_keys(value)).unwrap();
        assert_eq!(sorted, r#"{"a":0,"b":{"a":[{"x":3,"y":2}],"z":1}}"#);
    }

    #[test]
    fn test_attestation_response_url_escapes_reserved_characters() {
        let base = Url::parse("https://service.example").unwrap();
        let url = attestation_response_url(&base, "a/b?c#d e").unwrap();
        assert_eq!(
            url.as_str(),
            "https://service.example/v1/devicecheck/attestations/a%2Fb%3Fc%23d%20e"
        );

        let url = attestation_response_url(&base, "5b0f4e1b-1f1f-4d3a-9d53-0c7a6a1f3c11").unwrap();
        assert_eq!(url.path(), "/v1/devicecheck/attestations/5b0f4e1b-1f1f-4d3a-9d53-0c7a6a1f3c11");
    }

    #[test]
    fn test_attestation_response_url_rejects_dot_segments() {
        let base = Url::parse("https://service.example").unwrap();
        for nonce in ["", ".", ".."] {
            assert!(
                matches!(
                    attestation_response_url(&base, nonce),
                    Err(DeviceCheckError::InvalidNonce(ref n)) if n == nonce
                ),
                "nonce {nonce:?} was accepted"
            );
        }

        // dots inside a longer segment are ordinary characters
        let url = attestation_response_url(&base, "...").unwrap();
        assert_eq!(url.path(), "/v1/devicecheck/attestations/...");
        let url = attestation_response_url(&base, "a.b").unwrap();
        assert_eq!(url.path(), "/v1/devicecheck/attestations/a.b");
    }

    #[test]
    fn test_base_url_resolution_order() {
        use crate::{ClientOptions, DeviceCheckClient, MemoryKeyStore, StaticTokenProvider};
        use std::sync::Arc;

        let client_with = |base_url: Option<&str>| {
            DeviceCheckClient::new(
                ClientOptions {
                    base_url: base_url.map(str::to_string),
                    ..Default::default()
                },
                Arc::new(MemoryKeyStore::new()),
                Arc::new(StaticTokenProvider::new(b"token".to_vec())),
            )
            .unwrap()
        };

        // the only test touching the override and the environment variable
        set_base_url(None);
        std::env::remove_var(DEVICE_CHECK_BASE_URL_KEY);
        assert_eq!(get_base_url(), DEFAULT_BASE_URL);

        std::env::set_var(DEVICE_CHECK_BASE_URL_KEY, "http://from-env");
        assert_eq!(get_base_url(), "http://from-env");

        set_base_url(Some("http://from-override".to_string()));
        assert_eq!(get_base_url(), "http://from-override");
        assert_eq!(client_with(None).base_url().as_str(), "http://from-override/");
        assert_eq!(
            client_with(Some("http://from-options")).base_url().as_str(),
            "http://from-options/"
        );

        // an empty override or variable counts as unset
        set_base_url(Some(String::new()));
        assert_eq!(get_base_url(), "http://from-env");
        std::env::set_var(DEVICE_CHECK_BASE_URL_KEY, "");
        assert_eq!(get_base_url(), DEFAULT_BASE_URL);

        set_base_url(None);
        std::env::remove_var(DEVICE_CHECK_BASE_URL_KEY);
    }

    #[test]
    fn test_decode_blob_reports_field() {
        let err = decode_blob::<serde_json::Value>("***", "attestationBlob").unwrap_err();
        assert!(matches!(err, DeviceCheckError::MalformedBlob(field) if field == "attestationBlob"));
    }
}
