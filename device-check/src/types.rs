use serde::{Deserialize, Serialize};

use crate::{
    errors::DeviceCheckError,
    utils::{blob, decode_blob, CanonicalJson},
};

/// The record a device enrolls with the device check service.
///
/// Its canonical JSON form is what the device key signs and what travels,
/// base64 encoded, inside a [`DeviceCheckRegistration`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCheckEnrollment {
    /// The payment id of the rewards wallet, in UUIDv4 format
    pub payment_id: String,

    /// The device public key as a PEM encoded SubjectPublicKeyInfo
    pub public_key: String,

    /// The device-integrity token, base64 encoded
    pub device_token: String,
}

impl DeviceCheckEnrollment {
    pub fn new(
        payment_id: impl Into<String>,
        public_key: impl Into<String>,
        device_token: impl Into<String>,
    ) -> Self {
        Self {
            payment_id: payment_id.into(),
            public_key: public_key.into(),
            device_token: device_token.into(),
        }
    }
}

impl CanonicalJson for DeviceCheckEnrollment {}

/// The body of an enrollment registration request.
///
/// On the wire `enrollmentBlob` is the base64 of the enrollment's canonical
/// JSON and `signature` is the base64 of the device key's signature over those
/// same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", try_from = "RawRegistration")]
pub struct DeviceCheckRegistration {
    #[serde(serialize_with = "blob::serialize")]
    pub enrollment_blob: DeviceCheckEnrollment,

    pub signature: String,
}

impl DeviceCheckRegistration {
    pub fn new(enrollment_blob: DeviceCheckEnrollment, signature: impl Into<String>) -> Self {
        Self {
            enrollment_blob,
            signature: signature.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRegistration {
    enrollment_blob: String,
    signature: String,
}

impl TryFrom<RawRegistration> for DeviceCheckRegistration {
    type Error = DeviceCheckError;

    fn try_from(raw: RawRegistration) -> Result<Self, Self::Error> {
        Ok(Self {
            enrollment_blob: decode_blob(&raw.enrollment_blob, "enrollmentBlob")?,
            signature: raw.signature,
        })
    }
}

/// A nonce challenge issued by the device check service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AttestationBlob {
    /// The nonce, a UUIDv4 string
    pub nonce: String,
}

impl AttestationBlob {
    pub fn new(nonce: impl Into<String>) -> Self {
        Self {
            nonce: nonce.into(),
        }
    }
}

impl CanonicalJson for AttestationBlob {}

/// The response to a nonce challenge.
///
/// `attestationBlob` is the base64 of the challenge's canonical JSON and
/// `signature` the base64 of the device key's signature over those bytes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", try_from = "RawVerification")]
pub struct AttestationVerification {
    #[serde(serialize_with = "blob::serialize")]
    pub attestation_blob: AttestationBlob,

    pub signature: String,
}

impl AttestationVerification {
    pub fn new(attestation_blob: AttestationBlob, signature: impl Into<String>) -> Self {
        Self {
            attestation_blob,
            signature: signature.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVerification {
    attestation_blob: String,
    signature: String,
}

impl TryFrom<RawVerification> for AttestationVerification {
    type Error = DeviceCheckError;

    fn try_from(raw: RawVerification) -> Result<Self, Self::Error> {
        Ok(Self {
            attestation_blob: decode_blob(&raw.attestation_blob, "attestationBlob")?,
            signature: raw.signature,
        })
    }
}

/// Parameters of an attestation request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationRequest {
    /// SHA-256 fingerprint of the device public key, hex encoded
    pub public_key_hash: String,

    /// The payment id the device enrolled with
    pub payment_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEM: &str = "-----BEGIN PUBLIC KEY-----\nMFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAE+/abc==\n-----END PUBLIC KEY-----\n";

    #[test]
    fn test_registration_round_trips_through_blob_encoding() {
        let enrollment = DeviceCheckEnrollment::new(
            "5b0f4e1b-1f1f-4d3a-9d53-0c7a6a1f3c11",
            PEM,
            "dG9rZW4=",
        );
        let registration = DeviceCheckRegistration::new(enrollment.clone(), "c2lnbmF0dXJl");

        let json = serde_json::to_value(&registration).unwrap();
        assert!(json["enrollmentBlob"].is_string());
        assert_eq!(json["signature"], "c2lnbmF0dXJl");

        let decoded: DeviceCheckRegistration = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, registration);
        assert_eq!(decoded.enrollment_blob, enrollment);
    }

    #[test]
    fn test_enrollment_canonical_form_has_sorted_keys() {
        let enrollment = DeviceCheckEnrollment::new("id", "pem", "token");
        let bytes = enrollment.canonical_bytes().unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"deviceToken":"token","paymentId":"id","publicKey":"pem"}"#
        );
    }

    #[test]
    fn test_verification_round_trips_through_blob_encoding() {
        let verification =
            AttestationVerification::new(AttestationBlob::new("a/b?c#d"), "c2ln");
        let encoded = serde_json::to_string(&verification).unwrap();
        let decoded: AttestationVerification = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, verification);
    }

    #[test]
    fn test_malformed_blob_is_rejected() {
        let err = serde_json::from_str::<DeviceCheckRegistration>(
            r#"{"enrollmentBlob":"%%% not base64 %%%","signature":"c2ln"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Cannot decode enrollmentBlob"));

        // valid base64, but not an attestation record
        let err = serde_json::from_str::<AttestationVerification>(
            r#"{"attestationBlob":"bm90IGpzb24=","signature":"c2ln"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Cannot decode attestationBlob"));
    }

    #[test]
    fn test_attestation_request_field_names() {
        let request = AttestationRequest {
            public_key_hash: "abcd".to_string(),
            payment_id: "id".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"publicKeyHash": "abcd", "paymentId": "id"}));
    }
}
