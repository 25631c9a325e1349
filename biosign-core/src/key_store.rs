//! High-level key store interface
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
use crate::key_types::{KeyCreationOutcome, KeyId, KeyPairRecord, KeyPolicy};
use rsa::RsaPublicKey;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Opaque reference to a private key held by a secure element.
///
/// Carries no key material. The only way to use it is to present it to the
/// authentication gate.
#[derive(Clone)]
pub struct KeyHandle {
    key_id: KeyId,
    element: Arc<dyn SecureElement>,
}

impl KeyHandle {
    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    pub(crate) async fn sign(&self, payload: &[u8]) -> SignerResult<Vec<u8>> {
        self.element.sign(&self.key_id, payload).await
    }
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyHandle")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Key store owning every key pair record, backed by a secure element
pub struct SecureKeyStore {
    element: Arc<dyn SecureElement>,
    /// Serializes check-then-create in `ensure_key`
    creation_lock: Mutex<()>,
}

impl SecureKeyStore {
    /// Create a new key store with a secure element backend
    pub fn new(element: Arc<dyn SecureElement>) -> Self {
        Self {
            element,
            creation_lock: Mutex::new(()),
        }
    }

    /// Check if a key pair exists. Never generates one.
    pub async fn has_key(&self, key_id: &KeyId) -> bool {
        self.element.contains(key_id).await
    }

    /// Generate a key pair for `key_id` unless one already exists.
    ///
    /// An existing pair is never replaced, even past its validity window:
    /// regenerating would orphan every signature made with the old key.
    pub async fn ensure_key(
        &self,
        key_id: &KeyId,
        policy: &KeyPolicy,
    ) -> SignerResult<KeyCreationOutcome> {
        let _guard = self.creation_lock.lock().await;

        if self.element.contains(key_id).await {
            let record = self.element.record(key_id).await?;
            if record.is_expired() {
                warn!(
                    key_id = %key_id,
                    not_after = %record.not_after,
                    "Key pair is past its validity window and will not be regenerated"
                );
            }
            info!(key_id = %key_id, "Key pair already exists");
            return Ok(KeyCreationOutcome::AlreadyExists);
        }

        let record = self.element.generate(key_id, policy).await?;
        info!(
            key_id = %key_id,
            hardware_backed = record.hardware_backed,
            not_after = %record.not_after,
            "Key pair generated"
        );
        Ok(KeyCreationOutcome::Created)
    }

    /// Attributes of a key pair
    pub async fn record_of(&self, key_id: &KeyId) -> SignerResult<KeyPairRecord> {
        self.element.record(key_id).await
    }

    /// Public half of a key pair
    pub async fn public_key_of(&self, key_id: &KeyId) -> SignerResult<RsaPublicKey> {
        self.element.public_key(key_id).await
    }

    /// Reference to the private half of a key pair
    pub async fn private_handle_of(&self, key_id: &KeyId) -> SignerResult<KeyHandle> {
        let record = self.element.record(key_id).await?;
        if record.is_expired() {
            return Err(SignerError::KeyExpired(key_id.clone()));
        }

        Ok(KeyHandle {
            key_id: key_id.clone(),
            element: Arc::clone(&self.element),
        })
    }

    /// List all keys
    pub async fn list_keys(&self) -> SignerResult<Vec<KeyId>> {
        self.element.list().await
    }
}
