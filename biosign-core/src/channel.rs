//! Method channel: string-in, string-out boundary for host applications
//!
//! Hosts call [`MethodChannel::invoke`] with a method name and a JSON
//! argument map. Every known method answers with a human-readable status
//! string; only an unknown method is an error.
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


use crate::error::{AuthFailure, SignerError};
use crate::key_types::KeyCreationOutcome;
use crate::session::SigningSession;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

pub const GET_MESSAGE: &str = "getMessage";
pub const ENSURE_KEY: &str = "ensureKey";
pub const AUTHENTICATE: &str = "authenticate";
pub const SIGN_AFTER_AUTH: &str = "signAfterAuth";
pub const AUTHENTICATE_AND_SIGN: &str = "authenticateAndSign";
pub const VERIFY_SIGNATURE: &str = "verifySignature";
pub const EXPOSE_LAST_SIGNATURE: &str = "exposeLastSignature";

/// Argument carrying the hex signature for `verifySignature`
pub const SIGNATURE_ARGUMENT: &str = "signedKeyInput";

pub const METHODS: &[&str] = &[
    GET_MESSAGE,
    ENSURE_KEY,
    AUTHENTICATE,
    SIGN_AFTER_AUTH,
    AUTHENTICATE_AND_SIGN,
    VERIFY_SIGNATURE,
    EXPOSE_LAST_SIGNATURE,
];

const GREETING: &str = "Hello from biosign!";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Method not implemented: {0}")]
    NotImplemented(String),
}

pub struct MethodChannel {
    session: SigningSession,
}

impl MethodChannel {
    pub fn new(session: SigningSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SigningSession {
        &self.session
    }

    pub async fn invoke(&mut self, method: &str, args: &Value) -> Result<String, ChannelError> {
        debug!(method, "Channel call");
        let reply = match method {
            GET_MESSAGE => GREETING.to_string(),
            ENSURE_KEY => self.ensure_key().await,
            AUTHENTICATE => self.authenticate().await,
            SIGN_AFTER_AUTH => self.sign_after_auth().await,
            AUTHENTICATE_AND_SIGN => self.authenticate_and_sign().await,
            VERIFY_SIGNATURE => {
                let input = args
                    .get(SIGNATURE_ARGUMENT)
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                self.verify_signature(input).await
            }
            EXPOSE_LAST_SIGNATURE => self
                .session
                .last_signature_hex()
                .unwrap_or_else(|| "No signed data available".to_string()),
            other => return Err(ChannelError::NotImplemented(other.to_string())),
        };
        Ok(reply)
    }

    async fn ensure_key(&self) -> String {
        let key_id = self.session.key_id();
        match self.session.ensure_key().await {
            Ok(KeyCreationOutcome::AlreadyExists) => {
                format!("Key pair already exists with alias: {}", key_id)
            }
            Ok(KeyCreationOutcome::Created) => {
                format!("Key pair generated successfully with alias: {}", key_id)
            }
            Err(e) => {
                error!(key_id = %key_id, error = %e, "Key check failed");
                format!("Error checking key pair: {}", e)
            }
        }
    }

    async fn authenticate(&mut self) -> String {
        match self.session.authenticate().await {
            Ok(()) => "Authentication succeeded".to_string(),
            Err(e) => describe_auth_error(&e),
        }
    }

    async fn sign_after_auth(&mut self) -> String {
        match self.session.sign_after_auth().await {
            Ok(signature) => signature.to_hex(),
            Err(e) => {
                error!(error = %e, "Signing failed");
                format!("Error accessing key: {}", e)
            }
        }
    }

    async fn authenticate_and_sign(&mut self) -> String {
        match self.session.authenticate_and_sign().await {
            Ok(signature) => format!(
                "Key accessed successfully. Signed data: {}",
                signature.to_hex()
            ),
            Err(e @ SignerError::Auth(_)) => describe_auth_error(&e),
            Err(e) => {
                error!(error = %e, "Signing failed");
                format!("Error accessing key: {}", e)
            }
        }
    }

    async fn verify_signature(&self, input: &str) -> String {
        match self.session.verify_hex(input).await {
            Ok(true) => "Signature verification succeeded. The data is valid.".to_string(),
            Ok(false) => "Signature verification failed.".to_string(),
            Err(SignerError::KeyNotFound(_)) => "Error: Key does not exist.".to_string(),
            Err(e) => {
                error!(error = %e, "Verification failed");
                format!("Error verifying signature: {}", e)
            }
        }
    }
}

fn describe_auth_error(err: &SignerError) -> String {
    match err {
        SignerError::Auth(AuthFailure::Denied { .. }) => "Authentication failed".to_string(),
        SignerError::Auth(AuthFailure::Cancelled) => "Authentication cancelled".to_string(),
        SignerError::Auth(failure @ AuthFailure::Errored { .. }) => failure.to_string(),
        other => format!("Error: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthenticationGate, BiometricOutcome, ScriptedAuthenticator};
    use crate::key_store::SecureKeyStore;
    use crate::key_types::KeyPolicy;
    use crate::local_element::LocalSecureElement;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn create_channel(authenticator: ScriptedAuthenticator) -> (MethodChannel, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let element = LocalSecureElement::open(temp_dir.path(), Some("channel test"))
            .await
            .unwrap();
        let store = Arc::new(SecureKeyStore::new(Arc::new(element)));
        let gate = Arc::new(AuthenticationGate::new(Arc::new(authenticator)));
        let session = SigningSession::new(store, gate, "key_alias".to_string())
            .with_policy(KeyPolicy::with_modulus_bits(1024));
        (MethodChannel::new(session), temp_dir)
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (mut channel, _temp_dir) = create_channel(ScriptedAuthenticator::default()).await;
        assert_eq!(
            channel.invoke("launchRockets", &Value::Null).await,
            Err(ChannelError::NotImplemented("launchRockets".to_string()))
        );
        assert_eq!(
            channel.invoke(GET_MESSAGE, &Value::Null).await.unwrap(),
            "Hello from biosign!"
        );
    }

    #[tokio::test]
    async fn test_ensure_key_messages() {
        let (mut channel, _temp_dir) = create_channel(ScriptedAuthenticator::default()).await;

        let first = channel.invoke(ENSURE_KEY, &Value::Null).await.unwrap();
        assert_eq!(first, "Key pair generated successfully with alias: key_alias");

        let second = channel.invoke(ENSURE_KEY, &Value::Null).await.unwrap();
        assert_eq!(second, "Key pair already exists with alias: key_alias");
    }

    #[tokio::test]
    async fn test_status_before_key_exists() {
        let (mut channel, _temp_dir) = create_channel(ScriptedAuthenticator::default()).await;

        let verify = channel
            .invoke(VERIFY_SIGNATURE, &json!({ SIGNATURE_ARGUMENT: "00" }))
            .await
            .unwrap();
        assert_eq!(verify, "Error: Key does not exist.");

        let exposed = channel.invoke(EXPOSE_LAST_SIGNATURE, &Value::Null).await.unwrap();
        assert_eq!(exposed, "No signed data available");
    }

    #[tokio::test]
    async fn test_authentication_outcomes_are_distinguishable() {
        let (mut channel, _temp_dir) = create_channel(ScriptedAuthenticator::new([
            BiometricOutcome::Failed,
            BiometricOutcome::Cancelled,
            BiometricOutcome::Error {
                code: 1,
                message: "Hardware unavailable".to_string(),
            },
        ]))
        .await;
        channel.invoke(ENSURE_KEY, &Value::Null).await.unwrap();

        let replies = [
            channel.invoke(AUTHENTICATE, &Value::Null).await.unwrap(),
            channel.invoke(AUTHENTICATE, &Value::Null).await.unwrap(),
            channel.invoke(AUTHENTICATE, &Value::Null).await.unwrap(),
        ];
        assert_eq!(replies[0], "Authentication failed");
        assert_eq!(replies[1], "Authentication cancelled");
        assert_eq!(
            replies[2],
            "Authentication error: Hardware unavailable (Code: 1)"
        );
    }

    #[tokio::test]
    async fn test_verify_reports_bad_encoding() {
        let (mut channel, _temp_dir) = create_channel(ScriptedAuthenticator::default()).await;
        channel.invoke(ENSURE_KEY, &Value::Null).await.unwrap();

        let reply = channel
            .invoke(VERIFY_SIGNATURE, &json!({ SIGNATURE_ARGUMENT: "abc" }))
            .await
            .unwrap();
        assert!(reply.starts_with("Error verifying signature: Invalid hex encoding"));

        let reply = channel
            .invoke(VERIFY_SIGNATURE, &json!({ SIGNATURE_ARGUMENT: "0000" }))
            .await
            .unwrap();
        assert!(reply.starts_with("Error verifying signature: Malformed signature"));
    }

    #[tokio::test]
    async fn test_authenticate_and_sign() {
        let (mut channel, _temp_dir) =
            create_channel(ScriptedAuthenticator::always_succeed()).await;
        channel.invoke(ENSURE_KEY, &Value::Null).await.unwrap();

        let reply = channel.invoke(AUTHENTICATE_AND_SIGN, &Value::Null).await.unwrap();
        let hex = reply
            .strip_prefix("Key accessed successfully. Signed data: ")
            .unwrap();
        assert_eq!(
            channel.invoke(EXPOSE_LAST_SIGNATURE, &Value::Null).await.unwrap(),
            hex
        );
    }
}
