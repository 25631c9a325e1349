//! Key type definitions
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


use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a key pair slot in the store
pub type KeyId = String;

/// Validity window of a generated key pair, in days
pub const KEY_VALIDITY_DAYS: i64 = 365;

/// Serial number written into every key's certificate attributes
pub const CERTIFICATE_SERIAL: u64 = 1;

/// Asymmetric algorithm of a key pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAlgorithm {
    Rsa,
}

/// Operations a key pair may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyUsage {
    Sign,
    Verify,
}

/// Message digest applied before signing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestAlgorithm {
    Sha256,
}

/// Signature padding scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignaturePadding {
    Pkcs1v15,
}

/// Parameters for generating a key pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPolicy {
    pub algorithm: KeyAlgorithm,
    pub modulus_bits: usize,
    pub usages: Vec<KeyUsage>,
    pub digest: DigestAlgorithm,
    pub padding: SignaturePadding,
    pub validity_days: i64,
}

impl KeyPolicy {
    /// Default policy with a different modulus size
    pub fn with_modulus_bits(modulus_bits: usize) -> Self {
        Self {
            modulus_bits,
            ..Self::default()
        }
    }
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            algorithm: KeyAlgorithm::Rsa,
            modulus_bits: 2048,
            usages: vec![KeyUsage::Sign, KeyUsage::Verify],
            digest: DigestAlgorithm::Sha256,
            padding: SignaturePadding::Pkcs1v15,
            validity_days: KEY_VALIDITY_DAYS,
        }
    }
}

/// Result of `ensure_key`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCreationOutcome {
    AlreadyExists,
    Created,
}

/// Attributes of a stored key pair. Never contains private key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPairRecord {
    pub id: KeyId,
    pub algorithm: KeyAlgorithm,
    pub modulus_bits: usize,
    pub usages: Vec<KeyUsage>,
    pub digest: DigestAlgorithm,
    pub padding: SignaturePadding,
    pub serial_number: u64,
    pub subject: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub hardware_backed: bool,
}

impl KeyPairRecord {
    pub fn new(id: KeyId, policy: &KeyPolicy, hardware_backed: bool) -> Self {
        let now = Utc::now();
        Self {
            subject: format!("CN={}", id),
            id,
            algorithm: policy.algorithm,
            modulus_bits: policy.modulus_bits,
            usages: policy.usages.clone(),
            digest: policy.digest,
            padding: policy.padding,
            serial_number: CERTIFICATE_SERIAL,
            not_before: now,
            not_after: now + Duration::days(policy.validity_days),
            created_at: now,
            hardware_backed,
        }
    }

    pub fn allows(&self, usage: KeyUsage) -> bool {
        self.usages.contains(&usage)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        at > self.not_after
    }
}
