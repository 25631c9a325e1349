//! Signature production and verification
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


use crate::auth::AuthorizedOperation;
use crate::codec;
use crate::error::{SignerError, SignerResult};
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use sha2::Sha256;
use tracing::{debug, info};

/// Payload signed when the application does not supply one
pub const DEFAULT_PAYLOAD: &[u8] = b"Data to be signed";

/// Raw signature bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureBlob(Vec<u8>);

impl SignatureBlob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        codec::encode(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for SignatureBlob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for SignatureBlob {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// SHA-256 / PKCS#1 v1.5 signing engine
#[derive(Debug, Clone, Copy, Default)]
pub struct SigningEngine;

impl SigningEngine {
    pub fn new() -> Self {
        Self
    }

    /// Sign `payload` with the key bound to `op`.
    ///
    /// The authorization is consumed whether or not signing succeeds.
    pub async fn sign(&self, op: AuthorizedOperation, payload: &[u8]) -> SignerResult<SignatureBlob> {
        if op.is_expired() {
            debug!(key_id = %op.key_id(), "Authorization expired before use");
            return Err(SignerError::CapabilityExpired);
        }

        let handle = op.into_handle();
        let signature = handle.sign(payload).await.map_err(|e| match e {
            SignerError::KeyNotFound(_) | SignerError::CryptoFailure(_) => e,
            other => SignerError::CryptoFailure(other.to_string()),
        })?;

        info!(key_id = %handle.key_id(), len = signature.len(), "Signature produced");
        Ok(SignatureBlob(signature))
    }

    /// Verify `signature` over `payload`.
    ///
    /// Returns `Ok(false)` for a well-formed signature that does not match,
    /// including one made with another digest or padding. Fails with
    /// `MalformedSignature` when the length cannot fit the key's modulus.
    pub fn verify(
        &self,
        public_key: &RsaPublicKey,
        payload: &[u8],
        signature: &[u8],
    ) -> SignerResult<bool> {
        let expected_len = public_key.size();
        if signature.len() != expected_len {
            return Err(SignerError::MalformedSignature(format!(
                "expected {} bytes, got {}",
                expected_len,
                signature.len()
            )));
        }

        let signature = Signature::try_from(signature)
            .map_err(|e| SignerError::MalformedSignature(e.to_string()))?;
        let verifying_key = VerifyingKey::<Sha256>::new(public_key.clone());

        let valid = verifying_key.verify(payload, &signature).is_ok();
        debug!(valid, "Signature verified");
        Ok(valid)
    }
}
