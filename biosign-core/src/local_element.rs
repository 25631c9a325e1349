//! Local software secure element
//!
//! Used where no hardware keystore is available. Private keys are kept as
//! PKCS#8 documents sealed with AES-256-GCM under a master key and are only
//! ever unsealed inside [`SecureElement::sign`].
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::element::SecureElement;
use crate::error::{SignerError, SignerResult};
use crate::key_types::{
    DigestAlgorithm, KeyAlgorithm, KeyId, KeyPairRecord, KeyPolicy, KeyUsage, SignaturePadding,
};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::signature::{SignatureEncoding, Signer};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Smallest RSA modulus the element will generate
pub const MIN_MODULUS_BITS: usize = 1024;

const NONCE_LEN: usize = 12;

/// Master key for sealing stored private keys
type MasterKey = [u8; 32];

/// Metadata file contents: the record plus the public key it describes
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    #[serde(flatten)]
    record: KeyPairRecord,
    /// SubjectPublicKeyInfo DER, hex encoded
    public_key_der: String,
}

/// Local software secure element
pub struct LocalSecureElement {
    /// Storage directory
    storage_path: PathBuf,
    master_key: MasterKey,
    /// In-memory cache of key records
    records: tokio::sync::RwLock<HashMap<KeyId, StoredRecord>>,
}

impl LocalSecureElement {
    /// Open (creating if needed) an element rooted at `storage_path`
    ///
    /// # Arguments
    /// * `storage_path` - Directory holding sealed keys and their records
    /// * `master_secret` - 64 hex characters used as-is, or any other string
    ///   hashed with SHA-256. A random key is generated when `None`, which
    ///   makes previously sealed keys unusable after a restart.
    pub async fn open<P: AsRef<Path>>(
        storage_path: P,
        master_secret: Option<&str>,
    ) -> SignerResult<Self> {
        let storage_path = storage_path.as_ref().to_path_buf();

        fs::create_dir_all(&storage_path).await.map_err(|e| {
            SignerError::StoreUnavailable(format!("{}: {}", storage_path.display(), e))
        })?;

        let master_key = match master_secret {
            Some(secret) => Self::derive_master_key(secret),
            None => {
                warn!("No master key configured, generating an ephemeral one");
                let mut master_key = [0u8; 32];
                use rand::RngCore;
                rand::thread_rng().fill_bytes(&mut master_key);
                master_key
            }
        };

        let element = Self {
            storage_path,
            master_key,
            records: tokio::sync::RwLock::new(HashMap::new()),
        };

        element.load_records().await?;

        Ok(element)
    }

    fn derive_master_key(secret: &str) -> MasterKey {
        let mut mk = [0u8; 32];
        match hex::decode(secret) {
            Ok(bytes) if bytes.len() == 32 => mk.copy_from_slice(&bytes),
            _ => mk.copy_from_slice(&Sha256::digest(secret.as_bytes())),
        }
        mk
    }

    fn seal(&self, plaintext: &[u8]) -> SignerResult<Vec<u8>> {
        let cipher = Aes256Gcm::new(&self.master_key.into());
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| SignerError::CryptoFailure(format!("Sealing key failed: {}", e)))?;

        // Prepend nonce to ciphertext
        let mut result = nonce.to_vec();
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    fn unseal(&self, sealed: &[u8]) -> SignerResult<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(SignerError::CryptoFailure("Sealed key too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let cipher = Aes256Gcm::new(&self.master_key.into());

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| SignerError::CryptoFailure(format!("Unsealing key failed: {}", e)))
    }

    /// Hex of the id bytes, so distinct ids never share files
    fn file_stem(key_id: &KeyId) -> String {
        hex::encode(key_id.as_bytes())
    }

    fn key_path(&self, key_id: &KeyId) -> PathBuf {
        self.storage_path.join(format!("{}.key", Self::file_stem(key_id)))
    }

    fn record_path(&self, key_id: &KeyId) -> PathBuf {
        self.storage_path.join(format!("{}.meta", Self::file_stem(key_id)))
    }

    /// Load records from disk
    async fn load_records(&self) -> SignerResult<()> {
        let mut cache = self.records.write().await;
        cache.clear();

        let mut entries = fs::read_dir(&self.storage_path).await.map_err(|e| {
            SignerError::StoreUnavailable(format!("{}: {}", self.storage_path.display(), e))
        })?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "meta") {
                continue;
            }
            let content = match fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read key record");
                    continue;
                }
            };
            match serde_json::from_str::<StoredRecord>(&content) {
                Ok(stored) => {
                    cache.insert(stored.record.id.clone(), stored);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse key record");
                }
            }
        }

        debug!("Loaded {} key records", cache.len());
        Ok(())
    }

    async fn stored(&self, key_id: &KeyId) -> SignerResult<StoredRecord> {
        let cache = self.records.read().await;
        cache
            .get(key_id)
            .cloned()
            .ok_or_else(|| SignerError::KeyNotFound(key_id.clone()))
    }

    /// Write a file that must not exist yet
    async fn write_new(key_id: &KeyId, path: &Path, contents: &[u8]) -> SignerResult<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    warn!(
                        key_id = %key_id,
                        path = %path.display(),
                        "Refusing to overwrite key file"
                    );
                    SignerError::AlreadyExists(key_id.clone())
                }
                _ => SignerError::Io(e),
            })?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        Ok(())
    }

    fn check_policy(policy: &KeyPolicy) -> SignerResult<()> {
        if policy.algorithm != KeyAlgorithm::Rsa {
            return Err(SignerError::CryptoFailure(format!(
                "Unsupported algorithm: {:?}",
                policy.algorithm
            )));
        }
        if policy.modulus_bits < MIN_MODULUS_BITS {
            return Err(SignerError::CryptoFailure(format!(
                "RSA modulus of {} bits is below the {} bit minimum",
                policy.modulus_bits, MIN_MODULUS_BITS
            )));
        }
        if !policy.usages.contains(&KeyUsage::Sign) {
            return Err(SignerError::CryptoFailure(
                "Key policy does not permit signing".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SecureElement for LocalSecureElement {
    fn is_hardware_backed(&self) -> bool {
        false
    }

    async fn contains(&self, key_id: &KeyId) -> bool {
        let cache = self.records.read().await;
        cache.contains_key(key_id)
    }

    async fn generate(&self, key_id: &KeyId, policy: &KeyPolicy) -> SignerResult<KeyPairRecord> {
        if self.contains(key_id).await {
            return Err(SignerError::AlreadyExists(key_id.clone()));
        }
        Self::check_policy(policy)?;

        info!(key_id = %key_id, bits = policy.modulus_bits, "Generating RSA key pair");

        let bits = policy.modulus_bits;
        let private_key =
            tokio::task::spawn_blocking(move || RsaPrivateKey::new(&mut rand::rngs::OsRng, bits))
                .await
                .map_err(|e| SignerError::CryptoFailure(format!("Key generation aborted: {}", e)))??;

        let public_key = RsaPublicKey::from(&private_key);
        let public_key_der = public_key.to_public_key_der()?;
        let private_key_der = private_key.to_pkcs8_der()?;

        let stored = StoredRecord {
            record: KeyPairRecord::new(key_id.clone(), policy, self.is_hardware_backed()),
            public_key_der: hex::encode(public_key_der.as_bytes()),
        };

        // The key file lands first; a key only exists once its record does.
        let sealed = self.seal(private_key_der.as_bytes())?;
        Self::write_new(key_id, &self.key_path(key_id), &sealed).await?;

        let json = serde_json::to_string_pretty(&stored)?;
        Self::write_new(key_id, &self.record_path(key_id), json.as_bytes()).await?;

        let record = stored.record.clone();
        self.records.write().await.insert(key_id.clone(), stored);

        debug!(key_id = %key_id, "Key pair stored");
        Ok(record)
    }

    async fn record(&self, key_id: &KeyId) -> SignerResult<KeyPairRecord> {
        Ok(self.stored(key_id).await?.record)
    }

    async fn public_key(&self, key_id: &KeyId) -> SignerResult<RsaPublicKey> {
        let stored = self.stored(key_id).await?;
        let der = hex::decode(&stored.public_key_der).map_err(|e| {
            SignerError::CryptoFailure(format!("Corrupt public key for {}: {}", key_id, e))
        })?;
        Ok(RsaPublicKey::from_public_key_der(&der)?)
    }

    async fn sign(&self, key_id: &KeyId, payload: &[u8]) -> SignerResult<Vec<u8>> {
        let record = self.record(key_id).await?;
        if !record.allows(KeyUsage::Sign) {
            return Err(SignerError::CryptoFailure(format!(
                "Key {} is not permitted to sign",
                key_id
            )));
        }

        let sealed = fs::read(self.key_path(key_id)).await?;
        let private_key = RsaPrivateKey::from_pkcs8_der(&self.unseal(&sealed)?)?;

        let signature = match (record.digest, record.padding) {
            (DigestAlgorithm::Sha256, SignaturePadding::Pkcs1v15) => {
                SigningKey::<Sha256>::new(private_key)
                    .try_sign(payload)
                    .map_err(|e| SignerError::CryptoFailure(e.to_string()))?
                    .to_vec()
            }
        };

        debug!(key_id = %key_id, len = signature.len(), "Payload signed");
        Ok(signature)
    }

    async fn list(&self) -> SignerResult<Vec<KeyId>> {
        let cache = self.records.read().await;
        let mut ids: Vec<KeyId> = cache.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1v15::{Signature, VerifyingKey};
    use rsa::signature::Verifier;
    use tempfile::TempDir;

    const MASTER: &str = "local element test master";

    fn test_policy() -> KeyPolicy {
        KeyPolicy::with_modulus_bits(1024)
    }

    #[tokio::test]
    async fn test_generate_and_sign() {
        let temp_dir = TempDir::new().unwrap();
        let element = LocalSecureElement::open(temp_dir.path(), Some(MASTER)).await.unwrap();
        let key_id = "k1".to_string();

        let record = element.generate(&key_id, &test_policy()).await.unwrap();
        assert!(!record.hardware_backed);
        assert!(element.contains(&key_id).await);

        let signature = element.sign(&key_id, b"payload").await.unwrap();
        assert_eq!(signature.len(), 128);

        let public_key = element.public_key(&key_id).await.unwrap();
        let verifying_key = VerifyingKey::<Sha256>::new(public_key);
        let signature = Signature::try_from(signature.as_slice()).unwrap();
        assert!(verifying_key.verify(b"payload", &signature).is_ok());
    }

    #[tokio::test]
    async fn test_generate_refuses_to_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let element = LocalSecureElement::open(temp_dir.path(), Some(MASTER)).await.unwrap();
        let key_id = "k1".to_string();

        element.generate(&key_id, &test_policy()).await.unwrap();
        let result = element.generate(&key_id, &test_policy()).await;
        assert!(matches!(result, Err(SignerError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_similar_ids_keep_separate_keys() {
        let temp_dir = TempDir::new().unwrap();
        let slash = "a/b".to_string();
        let underscore = "a_b".to_string();

        let element = LocalSecureElement::open(temp_dir.path(), Some(MASTER)).await.unwrap();
        element.generate(&slash, &test_policy()).await.unwrap();
        element.generate(&underscore, &test_policy()).await.unwrap();

        let reopened = LocalSecureElement::open(temp_dir.path(), Some(MASTER)).await.unwrap();
        assert_eq!(
            reopened.list().await.unwrap(),
            vec![slash.clone(), underscore.clone()]
        );
        for key_id in [&slash, &underscore] {
            let signature = reopened.sign(key_id, b"payload").await.unwrap();
            let public_key = reopened.public_key(key_id).await.unwrap();
            let verifying_key = VerifyingKey::<Sha256>::new(public_key);
            let signature = Signature::try_from(signature.as_slice()).unwrap();
            assert!(verifying_key.verify(b"payload", &signature).is_ok());
        }
    }

    #[tokio::test]
    async fn test_generate_keeps_untracked_key_file() {
        let temp_dir = TempDir::new().unwrap();
        let element = LocalSecureElement::open(temp_dir.path(), Some(MASTER)).await.unwrap();
        let key_id = "k1".to_string();
        std::fs::write(element.key_path(&key_id), b"sealed elsewhere").unwrap();

        let result = element.generate(&key_id, &test_policy()).await;
        assert!(matches!(result, Err(SignerError::AlreadyExists(_))));
        assert!(!element.contains(&key_id).await);
        assert_eq!(
            std::fs::read(element.key_path(&key_id)).unwrap(),
            b"sealed elsewhere"
        );
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let key_id = "k1".to_string();

        let public_key = {
            let element = LocalSecureElement::open(temp_dir.path(), Some(MASTER)).await.unwrap();
            element.generate(&key_id, &test_policy()).await.unwrap();
            element.public_key(&key_id).await.unwrap()
        };

        let reopened = LocalSecureElement::open(temp_dir.path(), Some(MASTER)).await.unwrap();
        assert_eq!(reopened.list().await.unwrap(), vec![key_id.clone()]);
        assert_eq!(reopened.public_key(&key_id).await.unwrap(), public_key);
        assert!(reopened.sign(&key_id, b"payload").await.is_ok());
    }

    #[tokio::test]
    async fn test_wrong_master_key_cannot_unseal() {
        let temp_dir = TempDir::new().unwrap();
        let key_id = "k1".to_string();

        let element = LocalSecureElement::open(temp_dir.path(), Some(MASTER)).await.unwrap();
        element.generate(&key_id, &test_policy()).await.unwrap();

        let other = LocalSecureElement::open(temp_dir.path(), Some("another master"))
            .await
            .unwrap();
        let result = other.sign(&key_id, b"payload").await;
        assert!(matches!(result, Err(SignerError::CryptoFailure(_))));
    }

    #[tokio::test]
    async fn test_unknown_key() {
        let temp_dir = TempDir::new().unwrap();
        let element = LocalSecureElement::open(temp_dir.path(), Some(MASTER)).await.unwrap();
        let key_id = "missing".to_string();

        assert!(!element.contains(&key_id).await);
        assert!(matches!(
            element.sign(&key_id, b"payload").await,
            Err(SignerError::KeyNotFound(_))
        ));
        assert!(matches!(
            element.public_key(&key_id).await,
            Err(SignerError::KeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_record_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("broken.meta"), "{ not json").unwrap();

        let element = LocalSecureElement::open(temp_dir.path(), Some(MASTER)).await.unwrap();
        assert!(element.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_path_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("not-a-dir");
        std::fs::write(&file_path, b"occupied").unwrap();

        let result = LocalSecureElement::open(&file_path, Some(MASTER)).await;
        assert!(matches!(result, Err(SignerError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_rejects_weak_policy() {
        let temp_dir = TempDir::new().unwrap();
        let element = LocalSecureElement::open(temp_dir.path(), Some(MASTER)).await.unwrap();

        let result = element
            .generate(&"k1".to_string(), &KeyPolicy::with_modulus_bits(512))
            .await;
        assert!(matches!(result, Err(SignerError::CryptoFailure(_))));
        assert!(!element.contains(&"k1".to_string()).await);
    }

    #[test]
    fn test_hex_master_key_used_verbatim() {
        let secret = "11".repeat(32);
        assert_eq!(LocalSecureElement::derive_master_key(&secret), [0x11u8; 32]);
        assert_ne!(LocalSecureElement::derive_master_key("passphrase"), [0u8; 32]);
    }
}
