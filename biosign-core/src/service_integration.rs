//! Helpers for wiring the signing subsystem into a host
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


use crate::auth::{AuthenticationGate, Authenticator, DEFAULT_LOCKOUT_DURATION};
use crate::error::SignerResult;
use crate::key_store::SecureKeyStore;
use crate::key_types::{KeyId, KeyPolicy};
use crate::local_element::LocalSecureElement;
use crate::session::SigningSession;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Settings a host supplies to build a session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub key_id: KeyId,
    pub storage_path: String,
    pub master_secret: Option<String>,
    pub policy: KeyPolicy,
    pub max_failed_attempts: u32,
    pub lockout_duration: Duration,
    pub auth_timeout: Option<Duration>,
    pub authorization_max_age: Option<Duration>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            key_id: "key_alias".to_string(),
            storage_path: "./keys".to_string(),
            master_secret: None,
            policy: KeyPolicy::default(),
            max_failed_attempts: 5,
            lockout_duration: DEFAULT_LOCKOUT_DURATION,
            auth_timeout: None,
            authorization_max_age: None,
        }
    }
}

/// Open the software secure element and wrap it in a key store
pub async fn init_key_store(
    storage_path: &str,
    master_secret: Option<&str>,
) -> SignerResult<Arc<SecureKeyStore>> {
    info!(path = %storage_path, "Initializing key store");

    let element = LocalSecureElement::open(storage_path, master_secret).await?;
    Ok(Arc::new(SecureKeyStore::new(Arc::new(element))))
}

/// Build a signing session backed by the local element and `authenticator`
pub async fn init_session(
    settings: &SessionSettings,
    authenticator: Arc<dyn Authenticator>,
) -> SignerResult<SigningSession> {
    let store = init_key_store(&settings.storage_path, settings.master_secret.as_deref()).await?;

    let mut gate = AuthenticationGate::new(authenticator)
        .with_max_failed_attempts(settings.max_failed_attempts)
        .with_lockout_duration(settings.lockout_duration);
    if let Some(max_age) = settings.authorization_max_age {
        gate = gate.with_authorization_max_age(max_age);
    }

    let mut session = SigningSession::new(store, Arc::new(gate), settings.key_id.clone())
        .with_policy(settings.policy.clone());
    if let Some(timeout) = settings.auth_timeout {
        session = session.with_auth_timeout(timeout);
    }

    info!(key_id = %settings.key_id, "Signing session ready");
    Ok(session)
}
