//! Configuration management for biosign hosts
//!
//! Values are layered: built-in defaults, then a `.env` file if present,
//! then `BIOSIGN_*` environment variables.
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


use config::{Config, Environment, Map};
use serde::Deserialize;
use thiserror::Error;

/// Environment prefix for every setting (`BIOSIGN_KEY_ALIAS`, ...)
pub const ENV_PREFIX: &str = "BIOSIGN";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Structured JSON lines
    Json,
    /// Human-readable console output
    Console,
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Identifier of the single signing key pair
    pub key_alias: String,
    /// Directory of the software secure element
    pub storage_path: String,
    /// Master key sealing private keys at rest (hex or passphrase)
    pub master_key: Option<String>,
    /// SHA-256 (hex) of the fallback passcode accepted by the terminal prompt
    pub passcode_sha256: Option<String>,
    /// RSA modulus size for newly generated keys
    pub modulus_bits: usize,
    /// Consecutive denials before the gate locks out
    pub max_failed_attempts: u32,
    /// How long the gate stays locked after too many denials
    pub lockout_secs: u64,
    /// External timeout applied to a challenge, 0 disables it
    pub auth_timeout_secs: u64,
    /// Maximum age of an unused authorization, unset means no limit
    pub authorization_max_age_secs: Option<u64>,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load configuration from `.env` and the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();
        Self::load(Environment::with_prefix(ENV_PREFIX))
    }

    /// Load configuration from an explicit variable map instead of the process
    /// environment. Keys carry the `BIOSIGN_` prefix.
    pub fn from_map(vars: Map<String, String>) -> Result<Self, ConfigError> {
        Self::load(
            Environment::with_prefix(ENV_PREFIX).source(Some(vars)),
        )
    }

    fn load(environment: Environment) -> Result<Self, ConfigError> {
        let config: AppConfig = Config::builder()
            .set_default("key_alias", "key_alias")?
            .set_default("storage_path", "./keys")?
            .set_default("modulus_bits", 2048_i64)?
            .set_default("max_failed_attempts", 5_i64)?
            .set_default("lockout_secs", 30_i64)?
            .set_default("auth_timeout_secs", 0_i64)?
            .set_default("log_level", "info")?
            .set_default("log_format", "console")?
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.key_alias.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "key_alias",
                reason: "must not be empty".to_string(),
            });
        }
        if !(2048..=4096).contains(&self.modulus_bits) || self.modulus_bits % 8 != 0 {
            return Err(ConfigError::Invalid {
                field: "modulus_bits",
                reason: format!("{} is not a supported RSA size", self.modulus_bits),
            });
        }
        if self.max_failed_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "max_failed_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(digest) = &self.passcode_sha256 {
            let well_formed =
                digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit());
            if !well_formed {
                return Err(ConfigError::Invalid {
                    field: "passcode_sha256",
                    reason: "expected 64 hex characters".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Get log level, defaulting to "info"
    pub fn log_level(&self) -> &str {
        if self.log_level.is_empty() {
            "info"
        } else {
            &self.log_level
        }
    }
}
