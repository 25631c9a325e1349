//! biosign host
//!
//! Reads channel calls from stdin, one per line, and prints each reply on
//! stdout. Authentication prompts ask for the fallback passcode on the same
//! terminal.
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


mod command;
mod terminal;

use anyhow::Result;
use biosign_config::{AppConfig, LogFormat};
use biosign_core::channel::METHODS;
use biosign_core::key_types::KeyPolicy;
use biosign_core::{init_session, MethodChannel, SessionSettings};
use biosign_logging::{init_console_logging, init_logging};
use command::Command;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use terminal::{PasscodeAuthenticator, Terminal};
use tokio::signal;
use tracing::{error, info};

const COMPONENT: &str = "biosign";

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!(error = %err, "Unable to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}

/// Drive `work` to completion, or abandon it with `None` once `shutdown`
/// fires. Abandoning a channel call dismisses any prompt it is showing.
async fn until_shutdown<W, S>(work: W, shutdown: S) -> Option<W::Output>
where
    W: Future,
    S: Future<Output = ()>,
{
    tokio::select! {
        output = work => Some(output),
        _ = shutdown => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    match config.log_format {
        LogFormat::Json => init_logging(COMPONENT, config.log_level()),
        LogFormat::Console => init_console_logging(COMPONENT, config.log_level()),
    }

    info!(
        key_alias = %config.key_alias,
        storage_path = %config.storage_path,
        "Configuration loaded"
    );

    let terminal = Terminal::spawn();
    let authenticator = PasscodeAuthenticator::new(
        Arc::clone(&terminal),
        config.passcode_sha256.as_deref(),
    )?;

    let settings = SessionSettings {
        key_id: config.key_alias.clone(),
        storage_path: config.storage_path.clone(),
        master_secret: config.master_key.clone(),
        policy: KeyPolicy::with_modulus_bits(config.modulus_bits),
        max_failed_attempts: config.max_failed_attempts,
        lockout_duration: Duration::from_secs(config.lockout_secs),
        auth_timeout: (config.auth_timeout_secs > 0)
            .then(|| Duration::from_secs(config.auth_timeout_secs)),
        authorization_max_age: config.authorization_max_age_secs.map(Duration::from_secs),
    };
    let session = init_session(&settings, Arc::new(authenticator))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open signing session: {}", e))?;
    let mut channel = MethodChannel::new(session);

    eprintln!("biosign ready. Type `help` for the list of methods.");

    loop {
        let Some(line) = until_shutdown(terminal.next_line(), shutdown_signal()).await else {
            break;
        };
        let Some(line) = line else { break };

        match command::parse(&line) {
            Ok(Command::Empty) => {}
            Ok(Command::Help) => {
                for method in METHODS {
                    println!("{}", method);
                }
            }
            Ok(Command::Quit) => break,
            Ok(Command::Invoke { method, args }) => {
                let Some(reply) =
                    until_shutdown(channel.invoke(&method, &args), shutdown_signal()).await
                else {
                    break;
                };
                match reply {
                    Ok(reply) => println!("{}", reply),
                    Err(e) => println!("{}", e),
                }
            }
            Err(e) => println!("Invalid arguments: {}", e),
        }
    }

    info!("biosign stopped");
    Ok(())
}
