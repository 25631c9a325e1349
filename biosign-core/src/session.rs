//! Signing session: the state a host keeps between boundary calls
//!
//! A session owns the pending authorization and the most recent signature.
//! Each successful sign overwrites the last signature; each authentication
//! attempt replaces (or clears) the pending authorization.
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


use crate::auth::{AuthenticationGate, AuthorizedOperation};
use crate::codec;
use crate::error::{SignerError, SignerResult};
use crate::key_store::SecureKeyStore;
use crate::key_types::{KeyCreationOutcome, KeyId, KeyPolicy};
use crate::signing::{SignatureBlob, SigningEngine, DEFAULT_PAYLOAD};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct SigningSession {
    store: Arc<SecureKeyStore>,
    gate: Arc<AuthenticationGate>,
    engine: SigningEngine,
    key_id: KeyId,
    policy: KeyPolicy,
    payload: Vec<u8>,
    auth_timeout: Option<Duration>,
    pending: Option<AuthorizedOperation>,
    last_signature: Option<SignatureBlob>,
}

impl SigningSession {
    pub fn new(store: Arc<SecureKeyStore>, gate: Arc<AuthenticationGate>, key_id: KeyId) -> Self {
        Self {
            store,
            gate,
            engine: SigningEngine::new(),
            key_id,
            policy: KeyPolicy::default(),
            payload: DEFAULT_PAYLOAD.to_vec(),
            auth_timeout: None,
            pending: None,
            last_signature: None,
        }
    }

    pub fn with_policy(mut self, policy: KeyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Payload signed and verified by this session
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Cancel challenges the operator has not answered within `timeout`
    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = Some(timeout);
        self
    }

    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn store(&self) -> &SecureKeyStore {
        &self.store
    }

    pub fn gate(&self) -> &AuthenticationGate {
        &self.gate
    }

    pub fn is_authorized(&self) -> bool {
        self.pending.is_some()
    }

    pub async fn ensure_key(&self) -> SignerResult<KeyCreationOutcome> {
        self.store.ensure_key(&self.key_id, &self.policy).await
    }

    /// Run the authentication challenge for the session key.
    ///
    /// On success the authorization is held for the next sign call. On any
    /// failure a previously held authorization is dropped.
    pub async fn authenticate(&mut self) -> SignerResult<()> {
        self.pending = None;

        let handle = self.store.private_handle_of(&self.key_id).await?;
        let result = match self.auth_timeout {
            Some(timeout) => self.gate.challenge_with_timeout(handle, timeout).await,
            None => self.gate.challenge(handle).await,
        };

        self.pending = Some(result?);
        debug!(key_id = %self.key_id, "Authorization held for next signature");
        Ok(())
    }

    /// Sign the session payload with the held authorization.
    ///
    /// Fails with `CapabilityExpired` when no authorization is held, which
    /// includes the second call after a single authentication.
    pub async fn sign_after_auth(&mut self) -> SignerResult<SignatureBlob> {
        let op = self.pending.take().ok_or(SignerError::CapabilityExpired)?;
        let signature = self.engine.sign(op, &self.payload).await?;

        self.last_signature = Some(signature.clone());
        Ok(signature)
    }

    /// Authenticate, then sign immediately
    pub async fn authenticate_and_sign(&mut self) -> SignerResult<SignatureBlob> {
        self.authenticate().await?;
        self.sign_after_auth().await
    }

    /// Verify raw signature bytes against the session payload
    pub async fn verify(&self, signature: &[u8]) -> SignerResult<bool> {
        let public_key = self.store.public_key_of(&self.key_id).await?;
        self.engine.verify(&public_key, &self.payload, signature)
    }

    /// Verify a hex-encoded signature against the session payload
    pub async fn verify_hex(&self, signature_hex: &str) -> SignerResult<bool> {
        if !self.store.has_key(&self.key_id).await {
            return Err(SignerError::KeyNotFound(self.key_id.clone()));
        }
        let signature = codec::decode(signature_hex)?;
        let valid = self.verify(&signature).await?;
        info!(key_id = %self.key_id, valid, "Signature checked");
        Ok(valid)
    }

    pub fn last_signature(&self) -> Option<&SignatureBlob> {
        self.last_signature.as_ref()
    }

    pub fn last_signature_hex(&self) -> Option<String> {
        self.last_signature.as_ref().map(SignatureBlob::to_hex)
    }
}
