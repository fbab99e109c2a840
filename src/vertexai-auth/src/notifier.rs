// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! User-visible diagnostics.
//!
//! The [Authenticator][crate::Authenticator] never writes to a UI directly.
//! It reports progress and failures through a [Notifier]. Applications with
//! a UI supply their own implementation (any `Fn(Level, &str)` closure
//! works), the default logs through `tracing`.

/// The severity of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Level {
    /// An operation completed.
    Success,
    /// An operation failed, and the caller recovered from it.
    Error,
    /// No recovery is possible, the application cannot continue.
    Blocking,
}

impl Level {
    /// The name used when logging diagnostics at this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Blocking => "blocking",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives diagnostics.
pub trait Notifier: Send + Sync {
    /// Reports `message` at `level`.
    fn notify(&self, level: Level, message: &str);
}

impl<F> Notifier for F
where
    F: Fn(Level, &str) + Send + Sync,
{
    fn notify(&self, level: Level, message: &str) {
        self(level, message)
    }
}

/// A [Notifier] that logs every diagnostic with `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: Level, message: &str) {
        let diagnostic = level.as_str();
        match level {
            Level::Success => tracing::info!(diagnostic, "{message}"),
            Level::Error | Level::Blocking => tracing::error!(diagnostic, "{message}"),
        }
    }
}
