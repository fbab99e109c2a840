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

//! Google Cloud Client Libraries for Rust - Vertex AI start-up authentication
//!
//! This crate authenticates an application against [Vertex AI] and
//! initializes the client context the rest of the application uses. It is
//! meant to run once, when the application starts.
//!
//! Credentials are resolved from three sources, in order:
//!
//! 1. A [secrets store](secrets::SecretsStore) holding a `google_credentials`
//!    entry whose `json` field contains a [service account key].
//! 2. A service account key file supplied by the caller.
//! 3. [Application Default Credentials], resolved by the environment.
//!
//! Failures in one source fall through to the next. Each failure is reported
//! to a [Notifier](notifier::Notifier), which applications can replace to
//! route the diagnostics to their own UI.
//!
//! # Example
//!
//! ```no_run
//! # use google_cloud_vertexai_auth::{Authenticator, PlatformConfig, Runtime};
//! # use std::sync::Arc;
//! # tokio_test::block_on(async {
//! let runtime = Arc::new(Runtime::new());
//! let config = PlatformConfig::new("my-project", "us-central1");
//! let credentials = Authenticator::new(runtime.clone(), config)
//!     .authenticate(Some("service-account.json".as_ref()))
//!     .await;
//! let context = runtime.current().expect("context is initialized");
//! println!("endpoint={} explicit={}", context.endpoint(), credentials.is_some());
//! # });
//! ```
//!
//! [Vertex AI]: https://cloud.google.com/vertex-ai
//! [service account key]: https://cloud.google.com/iam/docs/keys-create-delete#creating
//! [Application Default Credentials]: https://cloud.google.com/docs/authentication/application-default-credentials

pub mod authenticator;
pub mod config;
pub mod context;
pub mod credentials;
pub mod errors;
pub mod notifier;
pub mod secrets;
pub mod token;

pub(crate) mod constants;
pub(crate) mod jws;

pub use authenticator::{Authenticator, CredentialSource};
pub use config::PlatformConfig;
pub use context::{AmbientSource, Runtime, SdkContext};
pub use credentials::Credentials;

/// A `Result` alias where the `Err` case is
/// `google_cloud_vertexai_auth::errors::Error`.
pub type Result<T> = std::result::Result<T, crate::errors::Error>;
