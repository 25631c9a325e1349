//! Authentication gate in front of private-key operations
//!
//! A key handle only becomes usable for signing once an operator passes an
//! interactive challenge. Each successful challenge yields one
//! [`AuthorizedOperation`], which the signing engine consumes.
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


use crate::error::AuthFailure;
use crate::key_store::KeyHandle;
use crate::key_types::KeyId;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Biometric hardware is unavailable
pub const ERROR_HW_UNAVAILABLE: i32 = 1;
/// Another challenge is already being presented
pub const ERROR_UNABLE_TO_PROCESS: i32 = 2;
/// Too many failed attempts
pub const ERROR_LOCKOUT: i32 = 7;
/// The operator cancelled the prompt
pub const ERROR_USER_CANCELED: i32 = 10;
/// No credential is enrolled
pub const ERROR_NO_BIOMETRICS: i32 = 11;
/// The operator pressed the prompt's negative button
pub const ERROR_NEGATIVE_BUTTON: i32 = 13;

/// How long the gate stays locked after too many denials
pub const DEFAULT_LOCKOUT_DURATION: Duration = Duration::from_secs(30);

/// Text shown by the interactive prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptInfo {
    pub title: String,
    pub subtitle: String,
    pub negative_button: String,
}

impl Default for PromptInfo {
    fn default() -> Self {
        Self {
            title: "Biometric Authentication".to_string(),
            subtitle: "Authenticate using your biometric credential".to_string(),
            negative_button: "Cancel".to_string(),
        }
    }
}

/// What the operator's prompt reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BiometricOutcome {
    Succeeded,
    /// A credential was presented and did not match
    Failed,
    Error { code: i32, message: String },
    Cancelled,
}

/// Presents the interactive challenge to the operator.
///
/// Implementations resolve exactly once per call. Dropping the future
/// dismisses the prompt.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, prompt: &PromptInfo, key_id: &KeyId) -> BiometricOutcome;
}

/// Gate lifecycle. Terminal states fall back to `Idle` once the challenge
/// returns its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    Presenting,
    Succeeded,
    Failed,
    Errored,
    Cancelled,
}

/// Single-use permission to sign with one key
#[derive(Debug)]
pub struct AuthorizedOperation {
    handle: KeyHandle,
    issued_at: Instant,
    max_age: Option<Duration>,
}

impl AuthorizedOperation {
    pub fn key_id(&self) -> &KeyId {
        self.handle.key_id()
    }

    pub fn is_expired(&self) -> bool {
        self.max_age
            .map_or(false, |max_age| self.issued_at.elapsed() > max_age)
    }

    pub(crate) fn into_handle(self) -> KeyHandle {
        self.handle
    }
}

/// Gate that turns key handles into authorized operations
pub struct AuthenticationGate {
    authenticator: Arc<dyn Authenticator>,
    prompt: PromptInfo,
    state: Mutex<GateState>,
    last_outcome: Mutex<Option<GateState>>,
    failed_attempts: AtomicU32,
    max_failed_attempts: u32,
    locked_until: Mutex<Option<Instant>>,
    lockout_duration: Duration,
    authorization_max_age: Option<Duration>,
}

/// Returns the gate to `Idle` when a challenge finishes or is dropped
struct PresentingGuard<'a> {
    gate: &'a AuthenticationGate,
}

impl Drop for PresentingGuard<'_> {
    fn drop(&mut self) {
        *self.gate.lock_state() = GateState::Idle;
    }
}

impl AuthenticationGate {
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            authenticator,
            prompt: PromptInfo::default(),
            state: Mutex::new(GateState::Idle),
            last_outcome: Mutex::new(None),
            failed_attempts: AtomicU32::new(0),
            max_failed_attempts: 5,
            locked_until: Mutex::new(None),
            lockout_duration: DEFAULT_LOCKOUT_DURATION,
            authorization_max_age: None,
        }
    }

    pub fn with_prompt(mut self, prompt: PromptInfo) -> Self {
        self.prompt = prompt;
        self
    }

    /// Consecutive denials tolerated before the gate locks out
    pub fn with_max_failed_attempts(mut self, max_failed_attempts: u32) -> Self {
        self.max_failed_attempts = max_failed_attempts.max(1);
        self
    }

    /// How long the gate refuses to prompt once locked out
    pub fn with_lockout_duration(mut self, lockout_duration: Duration) -> Self {
        self.lockout_duration = lockout_duration;
        self
    }

    /// Expire unused authorizations after `max_age`
    pub fn with_authorization_max_age(mut self, max_age: Duration) -> Self {
        self.authorization_max_age = Some(max_age);
        self
    }

    pub fn state(&self) -> GateState {
        *self.lock_state()
    }

    /// Terminal state of the most recent challenge
    pub fn last_outcome(&self) -> Option<GateState> {
        *self
            .last_outcome
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts.load(Ordering::SeqCst)
    }

    fn lock_state(&self) -> MutexGuard<'_, GateState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Time left on an active lockout. An elapsed lockout is lifted here
    /// and clears the denial count.
    fn lockout_remaining(&self) -> Option<Duration> {
        let mut locked_until = self
            .locked_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let until = (*locked_until)?;
        let now = Instant::now();
        if now < until {
            return Some(until - now);
        }
        *locked_until = None;
        self.failed_attempts.store(0, Ordering::SeqCst);
        info!("Authentication lockout lifted");
        None
    }

    fn lock_out(&self) {
        *self
            .locked_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) =
            Some(Instant::now() + self.lockout_duration);
    }

    fn record(&self, terminal: GateState) {
        *self
            .last_outcome
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(terminal);
    }

    fn finish(&self, terminal: GateState) {
        *self.lock_state() = terminal;
        self.record(terminal);
    }

    /// Present the challenge for `handle` and wait for the operator.
    pub async fn challenge(&self, handle: KeyHandle) -> Result<AuthorizedOperation, AuthFailure> {
        if let Some(remaining) = self.lockout_remaining() {
            warn!(
                key_id = %handle.key_id(),
                remaining_ms = remaining.as_millis() as u64,
                "Authentication locked out"
            );
            self.record(GateState::Errored);
            return Err(AuthFailure::Errored {
                code: ERROR_LOCKOUT,
                message: "Too many attempts. Try again later.".to_string(),
            });
        }

        {
            let mut state = self.lock_state();
            if *state == GateState::Presenting {
                return Err(AuthFailure::Errored {
                    code: ERROR_UNABLE_TO_PROCESS,
                    message: "Another authentication is in progress".to_string(),
                });
            }
            *state = GateState::Presenting;
        }
        let _guard = PresentingGuard { gate: self };

        debug!(key_id = %handle.key_id(), "Presenting authentication prompt");
        let outcome = self
            .authenticator
            .authenticate(&self.prompt, handle.key_id())
            .await;

        match outcome {
            BiometricOutcome::Succeeded => {
                self.failed_attempts.store(0, Ordering::SeqCst);
                self.finish(GateState::Succeeded);
                info!(key_id = %handle.key_id(), "Authentication succeeded");
                Ok(AuthorizedOperation {
                    handle,
                    issued_at: Instant::now(),
                    max_age: self.authorization_max_age,
                })
            }
            BiometricOutcome::Failed => {
                let attempts = self.failed_attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if attempts >= self.max_failed_attempts {
                    self.lock_out();
                }
                self.finish(GateState::Failed);
                warn!(key_id = %handle.key_id(), attempts, "Authentication failed");
                Err(AuthFailure::Denied {
                    attempts_remaining: self.max_failed_attempts.saturating_sub(attempts),
                })
            }
            BiometricOutcome::Cancelled
            | BiometricOutcome::Error {
                code: ERROR_USER_CANCELED | ERROR_NEGATIVE_BUTTON,
                ..
            } => {
                self.finish(GateState::Cancelled);
                info!(key_id = %handle.key_id(), "Authentication cancelled");
                Err(AuthFailure::Cancelled)
            }
            BiometricOutcome::Error { code, message } => {
                self.finish(GateState::Errored);
                warn!(key_id = %handle.key_id(), code, message = %message, "Authentication error");
                Err(AuthFailure::Errored { code, message })
            }
        }
    }

    /// Like [`challenge`](Self::challenge), but dismisses the prompt and
    /// reports `Cancelled` once `timeout` elapses.
    pub async fn challenge_with_timeout(
        &self,
        handle: KeyHandle,
        timeout: Duration,
    ) -> Result<AuthorizedOperation, AuthFailure> {
        match tokio::time::timeout(timeout, self.challenge(handle)).await {
            Ok(result) => result,
            Err(_) => {
                self.record(GateState::Cancelled);
                info!(timeout_ms = timeout.as_millis() as u64, "Authentication timed out");
                Err(AuthFailure::Cancelled)
            }
        }
    }
}

/// Authenticator that replays a fixed sequence of outcomes.
///
/// Once the script runs out it keeps answering with its fallback, which is
/// hardware unavailable unless configured otherwise.
#[derive(Debug)]
pub struct ScriptedAuthenticator {
    outcomes: Mutex<VecDeque<BiometricOutcome>>,
    fallback: BiometricOutcome,
    presented: AtomicUsize,
}

impl Default for ScriptedAuthenticator {
    fn default() -> Self {
        Self::new([])
    }
}

impl ScriptedAuthenticator {
    pub fn new(outcomes: impl IntoIterator<Item = BiometricOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            fallback: BiometricOutcome::Error {
                code: ERROR_HW_UNAVAILABLE,
                message: "No authenticator response available".to_string(),
            },
            presented: AtomicUsize::new(0),
        }
    }

    /// Authenticator that always succeeds
    pub fn always_succeed() -> Self {
        Self::new([]).with_fallback(BiometricOutcome::Succeeded)
    }

    pub fn with_fallback(mut self, fallback: BiometricOutcome) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn push(&self, outcome: BiometricOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(outcome);
    }

    /// How many prompts were presented
    pub fn presented(&self) -> usize {
        self.presented.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authenticator for ScriptedAuthenticator {
    async fn authenticate(&self, _prompt: &PromptInfo, _key_id: &KeyId) -> BiometricOutcome {
        self.presented.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_store::SecureKeyStore;
    use crate::key_types::KeyPolicy;
    use crate::local_element::LocalSecureElement;
    use tempfile::TempDir;

    /// Never answers, like an operator who walked away
    struct SilentAuthenticator;

    #[async_trait]
    impl Authenticator for SilentAuthenticator {
        async fn authenticate(&self, _prompt: &PromptInfo, _key_id: &KeyId) -> BiometricOutcome {
            std::future::pending().await
        }
    }

    async fn create_handle() -> (KeyHandle, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let element = LocalSecureElement::open(temp_dir.path(), Some("gate test"))
            .await
            .unwrap();
        let store = SecureKeyStore::new(Arc::new(element));
        let key_id = "k1".to_string();
        store
            .ensure_key(&key_id, &KeyPolicy::with_modulus_bits(1024))
            .await
            .unwrap();
        (store.private_handle_of(&key_id).await.unwrap(), temp_dir)
    }

    #[tokio::test]
    async fn test_success_binds_handle() {
        let (handle, _temp_dir) = create_handle().await;
        let gate = AuthenticationGate::new(Arc::new(ScriptedAuthenticator::always_succeed()));

        let op = gate.challenge(handle).await.unwrap();
        assert_eq!(op.key_id(), "k1");
        assert!(!op.is_expired());
        assert_eq!(gate.state(), GateState::Idle);
        assert_eq!(gate.last_outcome(), Some(GateState::Succeeded));
    }

    #[tokio::test]
    async fn test_denied_then_retry_succeeds() {
        let (handle, _temp_dir) = create_handle().await;
        let authenticator = Arc::new(ScriptedAuthenticator::new([
            BiometricOutcome::Failed,
            BiometricOutcome::Succeeded,
        ]));
        let gate = AuthenticationGate::new(authenticator.clone()).with_max_failed_attempts(3);

        let failure = gate.challenge(handle.clone()).await.unwrap_err();
        assert_eq!(failure, AuthFailure::Denied { attempts_remaining: 2 });
        assert!(failure.is_retryable());
        assert_eq!(gate.last_outcome(), Some(GateState::Failed));

        assert!(gate.challenge(handle).await.is_ok());
        assert_eq!(gate.failed_attempts(), 0);
        assert_eq!(authenticator.presented(), 2);
    }

    #[tokio::test]
    async fn test_cancel_is_distinct_from_denied() {
        let (handle, _temp_dir) = create_handle().await;
        let gate = AuthenticationGate::new(Arc::new(ScriptedAuthenticator::new([
            BiometricOutcome::Cancelled,
            BiometricOutcome::Error {
                code: ERROR_NEGATIVE_BUTTON,
                message: "Cancel".to_string(),
            },
        ])));

        for _ in 0..2 {
            let failure = gate.challenge(handle.clone()).await.unwrap_err();
            assert_eq!(failure, AuthFailure::Cancelled);
            assert!(!failure.is_retryable());
        }
        assert_eq!(gate.last_outcome(), Some(GateState::Cancelled));
        assert_eq!(gate.failed_attempts(), 0);
    }

    #[tokio::test]
    async fn test_hardware_error_is_reported() {
        let (handle, _temp_dir) = create_handle().await;
        let gate = AuthenticationGate::new(Arc::new(ScriptedAuthenticator::default()));

        let failure = gate.challenge(handle).await.unwrap_err();
        assert!(matches!(
            failure,
            AuthFailure::Errored { code: ERROR_HW_UNAVAILABLE, .. }
        ));
        assert_eq!(gate.last_outcome(), Some(GateState::Errored));
    }

    #[tokio::test]
    async fn test_lockout_after_repeated_denials() {
        let (handle, _temp_dir) = create_handle().await;
        let authenticator = Arc::new(ScriptedAuthenticator::new([
            BiometricOutcome::Failed,
            BiometricOutcome::Failed,
            BiometricOutcome::Succeeded,
        ]));
        let gate = AuthenticationGate::new(authenticator.clone()).with_max_failed_attempts(2);

        assert!(matches!(
            gate.challenge(handle.clone()).await,
            Err(AuthFailure::Denied { attempts_remaining: 1 })
        ));
        assert!(matches!(
            gate.challenge(handle.clone()).await,
            Err(AuthFailure::Denied { attempts_remaining: 0 })
        ));

        let failure = gate.challenge(handle).await.unwrap_err();
        assert!(matches!(failure, AuthFailure::Errored { code: ERROR_LOCKOUT, .. }));
        // The third prompt was never shown
        assert_eq!(authenticator.presented(), 2);
    }

    #[tokio::test]
    async fn test_prompts_again_after_lockout_expires() {
        let (handle, _temp_dir) = create_handle().await;
        let authenticator = Arc::new(
            ScriptedAuthenticator::new([BiometricOutcome::Failed])
                .with_fallback(BiometricOutcome::Succeeded),
        );
        let gate = AuthenticationGate::new(authenticator.clone())
            .with_max_failed_attempts(1)
            .with_lockout_duration(Duration::from_millis(50));

        assert!(matches!(
            gate.challenge(handle.clone()).await,
            Err(AuthFailure::Denied { attempts_remaining: 0 })
        ));
        assert!(matches!(
            gate.challenge(handle.clone()).await,
            Err(AuthFailure::Errored { code: ERROR_LOCKOUT, .. })
        ));
        assert_eq!(authenticator.presented(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;

        let op = gate.challenge(handle).await.unwrap();
        assert_eq!(op.key_id(), "k1");
        assert_eq!(gate.failed_attempts(), 0);
        assert_eq!(authenticator.presented(), 2);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_cancelled() {
        let (handle, _temp_dir) = create_handle().await;
        let gate = AuthenticationGate::new(Arc::new(SilentAuthenticator));

        let failure = gate
            .challenge_with_timeout(handle, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(failure, AuthFailure::Cancelled);
        assert_eq!(gate.state(), GateState::Idle);
        assert_eq!(gate.last_outcome(), Some(GateState::Cancelled));
    }

    #[tokio::test]
    async fn test_authorization_expires() {
        let (handle, _temp_dir) = create_handle().await;
        let gate = AuthenticationGate::new(Arc::new(ScriptedAuthenticator::always_succeed()))
            .with_authorization_max_age(Duration::from_millis(10));

        let op = gate.challenge(handle).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(op.is_expired());
    }
}
