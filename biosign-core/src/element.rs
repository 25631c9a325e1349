//! Secure element interface
//!
//! A secure element generates key pairs and performs private-key operations
//! without handing the private key to its caller. Backends:
//! - Local software element with sealed key files (current implementation)
//! - Platform keystores and hardware tokens
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


use crate::error::SignerResult;
use crate::key_types::{KeyId, KeyPairRecord, KeyPolicy};
use async_trait::async_trait;
use rsa::RsaPublicKey;

/// Trait for secure element backends
#[async_trait]
pub trait SecureElement: Send + Sync {
    /// Whether private-key operations run in isolated hardware
    fn is_hardware_backed(&self) -> bool;

    /// Check if a key pair exists
    async fn contains(&self, key_id: &KeyId) -> bool;

    /// Generate and persist a new key pair.
    ///
    /// Fails with `AlreadyExists` rather than overwriting an existing pair.
    async fn generate(&self, key_id: &KeyId, policy: &KeyPolicy) -> SignerResult<KeyPairRecord>;

    /// Attributes of a stored key pair
    async fn record(&self, key_id: &KeyId) -> SignerResult<KeyPairRecord>;

    /// Public half of a stored key pair
    async fn public_key(&self, key_id: &KeyId) -> SignerResult<RsaPublicKey>;

    /// Sign `payload` with the stored private key, using the digest and
    /// padding recorded at generation time
    async fn sign(&self, key_id: &KeyId, payload: &[u8]) -> SignerResult<Vec<u8>>;

    /// List all key IDs
    async fn list(&self) -> SignerResult<Vec<KeyId>>;
}
