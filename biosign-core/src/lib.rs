//! Biometric-gated signing for biosign
//!
//! Provides a secure key store whose private keys never leave their secure
//! element, an authentication gate that releases a key for exactly one
//! signature, and SHA-256 / PKCS#1 v1.5 signing and verification with hex
//! encoding at text boundaries.
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


pub mod auth;
pub mod channel;
pub mod codec;
pub mod element;
pub mod error;
pub mod key_store;
pub mod key_types;
pub mod local_element;
pub mod service_integration;
pub mod session;
pub mod signing;

pub use auth::{
    AuthenticationGate, Authenticator, AuthorizedOperation, BiometricOutcome, GateState,
    PromptInfo, ScriptedAuthenticator,
};
pub use channel::{ChannelError, MethodChannel};
pub use element::SecureElement;
pub use error::{AuthFailure, CodecError, SignerError, SignerResult};
pub use key_store::{KeyHandle, SecureKeyStore};
pub use key_types::{KeyCreationOutcome, KeyId, KeyPairRecord, KeyPolicy};
pub use rsa::RsaPublicKey as PublicKey;
pub use service_integration::*;
pub use session::SigningSession;
pub use signing::{SignatureBlob, SigningEngine, DEFAULT_PAYLOAD};
