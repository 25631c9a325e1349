//! Terminal input shared by the command loop and the passcode prompt
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


use async_trait::async_trait;
use biosign_core::auth::{
    Authenticator, BiometricOutcome, PromptInfo, ERROR_HW_UNAVAILABLE, ERROR_NEGATIVE_BUTTON,
    ERROR_NO_BIOMETRICS,
};
use biosign_core::KeyId;
use sha2::{Digest, Sha256};
use std::io::BufRead;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Lines read from stdin by a dedicated thread.
///
/// A reader that is dropped before a line arrives leaves that line for the
/// next reader, so a dismissed prompt never swallows a command.
pub struct Terminal {
    lines: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl Terminal {
    pub fn spawn() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
            debug!("stdin closed");
        });
        Arc::new(Self {
            lines: Mutex::new(rx),
        })
    }

    /// Next line without its terminator, `None` once stdin is closed
    pub async fn next_line(&self) -> Option<String> {
        self.lines.lock().await.recv().await
    }
}

/// Fallback credential prompt: a passcode typed on the terminal, checked
/// against its configured SHA-256 digest.
pub struct PasscodeAuthenticator {
    terminal: Arc<Terminal>,
    passcode_sha256: Option<Vec<u8>>,
}

impl PasscodeAuthenticator {
    pub fn new(terminal: Arc<Terminal>, passcode_sha256: Option<&str>) -> anyhow::Result<Self> {
        let passcode_sha256 = passcode_sha256.map(hex::decode).transpose()?;
        Ok(Self {
            terminal,
            passcode_sha256,
        })
    }
}

#[async_trait]
impl Authenticator for PasscodeAuthenticator {
    async fn authenticate(&self, prompt: &PromptInfo, key_id: &KeyId) -> BiometricOutcome {
        let Some(expected) = &self.passcode_sha256 else {
            return BiometricOutcome::Error {
                code: ERROR_NO_BIOMETRICS,
                message: "No credential enrolled".to_string(),
            };
        };

        eprintln!("== {} ==", prompt.title);
        eprintln!("{} (key: {})", prompt.subtitle, key_id);
        eprintln!("Passcode, or an empty line to {}:", prompt.negative_button);

        match self.terminal.next_line().await {
            None => BiometricOutcome::Error {
                code: ERROR_HW_UNAVAILABLE,
                message: "Terminal input closed".to_string(),
            },
            Some(line) if line.trim().is_empty() => BiometricOutcome::Error {
                code: ERROR_NEGATIVE_BUTTON,
                message: prompt.negative_button.clone(),
            },
            Some(line) => {
                if Sha256::digest(line.trim().as_bytes()).as_slice() == expected.as_slice() {
                    BiometricOutcome::Succeeded
                } else {
                    BiometricOutcome::Failed
                }
            }
        }
    }
}
