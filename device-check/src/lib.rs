//! Device check enrollment and attestation
//!
//! This crate registers a device key with the device check reputation
//! service and answers the nonce challenges it issues, signing canonical
//! JSON blobs with a key held in a secure key store.

pub mod client;
pub mod constants;
pub mod errors;
pub mod key_store;
pub mod token;
pub mod types;
pub mod utils;

pub use client::{ClientOptions, DeviceCheckClient};
pub use errors::{DeviceCheckError, Result, ServerError};
pub use key_store::{DeviceKey, FileKeyStore, MemoryKeyStore, P256DeviceKey, SecureKeyStore};
pub use token::{DeviceTokenProvider, StaticTokenProvider};
pub use types::{
    AttestationBlob, AttestationRequest, AttestationVerification, DeviceCheckEnrollment,
    DeviceCheckRegistration,
};
