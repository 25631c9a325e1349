//! Error types for the signing subsystem
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


use thiserror::Error;

/// Why an authentication challenge did not authorize a key
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    /// The presented credential did not match. The caller may retry.
    #[error("Authentication failed ({attempts_remaining} attempts remaining)")]
    Denied { attempts_remaining: u32 },

    /// Hardware unavailable, lockout, nothing enrolled, ...
    #[error("Authentication error: {message} (Code: {code})")]
    Errored { code: i32, message: String },

    /// The operator dismissed the prompt
    #[error("Authentication cancelled")]
    Cancelled,
}

impl AuthFailure {
    /// Only a denied credential may be retried by re-invoking the challenge
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthFailure::Denied { .. })
    }
}

/// Hex codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid hex encoding: {0}")]
    InvalidEncoding(String),
}

/// Signing subsystem errors
#[derive(Error, Debug)]
pub enum SignerError {
    #[error("Secure key storage unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Key already exists: {0}")]
    AlreadyExists(String),

    #[error("Key validity period has ended: {0}")]
    KeyExpired(String),

    #[error(transparent)]
    Auth(#[from] AuthFailure),

    #[error("Authorization has expired or was already used")]
    CapabilityExpired,

    #[error("Cryptographic failure: {0}")]
    CryptoFailure(String),

    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SignerError {
    /// Whether the failed operation may be re-invoked as is
    pub fn is_retryable(&self) -> bool {
        match self {
            SignerError::Auth(failure) => failure.is_retryable(),
            _ => false,
        }
    }
}

impl From<rsa::Error> for SignerError {
    fn from(err: rsa::Error) -> Self {
        SignerError::CryptoFailure(err.to_string())
    }
}

impl From<rsa::pkcs8::Error> for SignerError {
    fn from(err: rsa::pkcs8::Error) -> Self {
        SignerError::CryptoFailure(format!("PKCS#8: {}", err))
    }
}

impl From<rsa::pkcs8::spki::Error> for SignerError {
    fn from(err: rsa::pkcs8::spki::Error) -> Self {
        SignerError::CryptoFailure(format!("SPKI: {}", err))
    }
}

/// Result type for signing subsystem operations
pub type SignerResult<T> = Result<T, SignerError>;
