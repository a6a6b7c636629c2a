//! Secure key store seam.
//!
//! The device private key never leaves the store; callers only get a handle
//! that can sign and export the public half.

use std::{
    collections::HashMap,
    fmt, fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use p256::{
    ecdsa::{signature::Signer, Signature, SigningKey},
    pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding},
    SecretKey,
};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::errors::{DeviceCheckError, Result};

/// A handle to an asymmetric key held by a [`SecureKeyStore`].
pub trait DeviceKey: Send + Sync {
    /// Signs `message`, returning a DER encoded signature.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;

    /// The public key as a PEM encoded SubjectPublicKeyInfo.
    fn public_key_pem(&self) -> Result<String>;

    /// The hex encoded SHA-256 digest of the DER SubjectPublicKeyInfo.
    fn public_key_sha256_fingerprint(&self) -> Result<String>;
}

/// Platform storage for device keys, addressed by identifier.
pub trait SecureKeyStore: Send + Sync {
    /// Generates a key under `id`, replacing any key already stored there.
    fn generate_key(&self, id: &str) -> Result<Arc<dyn DeviceKey>>;

    /// Looks up the key stored under `id`.
    fn existing_key(&self, id: &str) -> Result<Option<Arc<dyn DeviceKey>>>;
}

/// An ECDSA P-256 key signing SHA-256 digests.
#[derive(Clone)]
pub struct P256DeviceKey {
    secret_key: SecretKey,
}

impl P256DeviceKey {
    pub fn generate() -> Self {
        Self {
            secret_key: SecretKey::random(&mut OsRng),
        }
    }

    pub fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        Ok(Self {
            secret_key: SecretKey::from_pkcs8_pem(pem)?,
        })
    }

    pub fn to_pkcs8_pem(&self) -> Result<String> {
        Ok(self.secret_key.to_pkcs8_pem(LineEnding::LF)?.to_string())
    }
}

impl fmt::Debug for P256DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("P256DeviceKey").finish_non_exhaustive()
    }
}

impl DeviceKey for P256DeviceKey {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signing_key = SigningKey::from(&self.secret_key);
        let signature: Signature = signing_key.try_sign(message)?;
        Ok(signature.to_der().as_bytes().to_vec())
    }

    fn public_key_pem(&self) -> Result<String> {
        Ok(self.secret_key.public_key().to_public_key_pem(LineEnding::LF)?)
    }

    fn public_key_sha256_fingerprint(&self) -> Result<String> {
        let der = self.secret_key.public_key().to_public_key_der()?;
        Ok(hex::encode(Sha256::digest(der.as_bytes())))
    }
}

/// Keeps keys in memory for the lifetime of the store.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: RwLock<HashMap<String, Arc<P256DeviceKey>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureKeyStore for MemoryKeyStore {
    fn generate_key(&self, id: &str) -> Result<Arc<dyn DeviceKey>> {
        let key = Arc::new(P256DeviceKey::generate());
        self.keys
            .write()
            .map_err(|_| DeviceCheckError::Cryptography("key store lock poisoned".to_string()))?
            .insert(id.to_string(), key.clone());
        debug!(key_id = %id, "generated in-memory device key");
        Ok(key)
    }

    fn existing_key(&self, id: &str) -> Result<Option<Arc<dyn DeviceKey>>> {
        let keys = self
            .keys
            .read()
            .map_err(|_| DeviceCheckError::Cryptography("key store lock poisoned".to_string()))?;
        Ok(keys.get(id).map(|key| key.clone() as Arc<dyn DeviceKey>))
    }
}

/// Persists each key as a PKCS#8 PEM file named `<id>.pem` under a directory.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.pem"))
    }
}

impl SecureKeyStore for FileKeyStore {
    #[instrument(level = "debug", skip(self), fields(dir = %self.dir.display()))]
    fn generate_key(&self, id: &str) -> Result<Arc<dyn DeviceKey>> {
        fs::create_dir_all(&self.dir)?;
        let key = P256DeviceKey::generate();
        // created with mode 0600 on unix, renamed into place once complete
        let mut staged = NamedTempFile::new_in(&self.dir)?;
        staged.write_all(key.to_pkcs8_pem()?.as_bytes())?;
        staged.as_file().sync_all()?;
        staged
            .persist(self.key_path(id))
            .map_err(|e| DeviceCheckError::Io(e.error))?;
        debug!(key_id = %id, "stored device key");
        Ok(Arc::new(key))
    }

    #[instrument(level = "debug", skip(self), fields(dir = %self.dir.display()))]
    fn existing_key(&self, id: &str) -> Result<Option<Arc<dyn DeviceKey>>> {
        match fs::read_to_string(self.key_path(id)) {
            Ok(pem) => Ok(Some(Arc::new(P256DeviceKey::from_pkcs8_pem(&pem)?))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
