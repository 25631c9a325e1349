//! Structured logging setup for biosign hosts
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


use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install JSON formatted logging.
///
/// `RUST_LOG` overrides `default_level` when set. Fails if a global
/// subscriber is already installed.
pub fn try_init_logging(component: &str, default_level: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .try_init()?;

    tracing::info!(component = component, "Logging initialized");
    Ok(())
}

/// Install human-readable console logging on stderr.
pub fn try_init_console_logging(
    component: &str,
    default_level: &str,
) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stderr),
        )
        .try_init()?;

    tracing::info!(component = component, "Console logging initialized");
    Ok(())
}

/// Like [`try_init_logging`], but a second call is a no-op.
pub fn init_logging(component: &str, default_level: &str) {
    let _ = try_init_logging(component, default_level);
}

/// Like [`try_init_console_logging`], but a second call is a no-op.
pub fn init_console_logging(component: &str, default_level: &str) {
    let _ = try_init_console_logging(component, default_level);
}
