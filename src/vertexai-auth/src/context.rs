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

//! The initialized AI platform runtime.
//!
//! Applications create one [Runtime] and share it. Each successful
//! [init][Runtime::init] replaces the [SdkContext] held by the runtime, the
//! last writer wins.

use crate::Result;
use crate::config::PlatformConfig;
use crate::constants::GOOGLE_APPLICATION_CREDENTIALS_VAR;
use crate::credentials::Credentials;
use crate::errors::Error;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

const GLOBAL_LOCATION: &str = "global";
const ADC_FILE: &str = "application_default_credentials.json";

// Regions serving the Vertex AI API.
const SUPPORTED_LOCATIONS: &[&str] = &[
    "africa-south1",
    "asia-east1",
    "asia-east2",
    "asia-northeast1",
    "asia-northeast2",
    "asia-northeast3",
    "asia-south1",
    "asia-southeast1",
    "asia-southeast2",
    "australia-southeast1",
    "australia-southeast2",
    "europe-central2",
    "europe-north1",
    "europe-southwest1",
    "europe-west1",
    "europe-west2",
    "europe-west3",
    "europe-west4",
    "europe-west6",
    "europe-west8",
    "europe-west9",
    "europe-west12",
    "me-central1",
    "me-central2",
    "me-west1",
    "northamerica-northeast1",
    "northamerica-northeast2",
    "southamerica-east1",
    "southamerica-west1",
    "us-central1",
    "us-east1",
    "us-east4",
    "us-east5",
    "us-south1",
    "us-west1",
    "us-west2",
    "us-west3",
    "us-west4",
];

/// Where the platform finds credentials for a context initialized without
/// explicit [Credentials].
///
/// Follows the [Application Default Credentials] lookup order. Detection only
/// inspects the environment and the filesystem.
///
/// [Application Default Credentials]: https://cloud.google.com/docs/authentication/application-default-credentials
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AmbientSource {
    /// The file named by `GOOGLE_APPLICATION_CREDENTIALS`.
    EnvironmentVariable(PathBuf),
    /// The credentials file created by `gcloud auth application-default login`.
    WellKnownFile(PathBuf),
    /// The metadata server of the compute environment.
    MetadataServer,
}

impl AmbientSource {
    /// Inspects the environment to find the ambient credentials.
    pub fn detect() -> Self {
        if let Some(path) = std::env::var_os(GOOGLE_APPLICATION_CREDENTIALS_VAR)
            .filter(|v| !v.is_empty())
        {
            return Self::EnvironmentVariable(PathBuf::from(path));
        }
        match well_known_file() {
            Some(path) if path.is_file() => Self::WellKnownFile(path),
            _ => Self::MetadataServer,
        }
    }
}

#[cfg(not(target_os = "windows"))]
fn well_known_file() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("gcloud")
            .join(ADC_FILE),
    )
}

#[cfg(target_os = "windows")]
fn well_known_file() -> Option<PathBuf> {
    let appdata = std::env::var_os("APPDATA")?;
    Some(PathBuf::from(appdata).join("gcloud").join(ADC_FILE))
}

/// An initialized client context for one project and location.
#[derive(Debug)]
pub struct SdkContext {
    project_id: String,
    location: String,
    credentials: Option<Credentials>,
    ambient_source: Option<AmbientSource>,
    generation: u64,
}

impl SdkContext {
    /// The project used in requests.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// The location used in requests.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// The service endpoint for the location.
    ///
    /// # Example
    /// ```
    /// # use google_cloud_vertexai_auth::{PlatformConfig, Runtime};
    /// let runtime = Runtime::new();
    /// let context = runtime.init(&PlatformConfig::new("my-project", "europe-west4"), None)?;
    /// assert_eq!(context.endpoint(), "https://europe-west4-aiplatform.googleapis.com");
    /// # Ok::<(), google_cloud_vertexai_auth::errors::Error>(())
    /// ```
    pub fn endpoint(&self) -> String {
        if self.location == GLOBAL_LOCATION {
            return "https://aiplatform.googleapis.com".to_string();
        }
        format!("https://{}-aiplatform.googleapis.com", self.location)
    }

    /// The parent resource name for requests, `projects/*/locations/*`.
    pub fn parent(&self) -> String {
        format!("projects/{}/locations/{}", self.project_id, self.location)
    }

    /// The explicit credentials, if the context was initialized with them.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// The ambient credentials source, for contexts initialized without
    /// explicit credentials.
    pub fn ambient_source(&self) -> Option<&AmbientSource> {
        self.ambient_source.as_ref()
    }

    /// The value of [Runtime::generation] when this context was created.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Default)]
struct State {
    context: Option<Arc<SdkContext>>,
    generation: u64,
}

/// Holds the current [SdkContext].
///
/// Initialization is serialized, concurrent calls to [init][Runtime::init]
/// are applied one at a time.
#[derive(Debug, Default)]
pub struct Runtime {
    state: Mutex<State>,
}

impl Runtime {
    /// Creates a runtime with no context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Initializes a new context, replacing any previous one.
    ///
    /// Contexts without `credentials` use the ambient credentials of the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the project id is empty, or if the location is not
    /// a Vertex AI region (or `global`). The current context is unchanged on
    /// errors.
    pub fn init(
        &self,
        config: &PlatformConfig,
        credentials: Option<Credentials>,
    ) -> Result<Arc<SdkContext>> {
        validate(config)?;
        let ambient_source = match credentials {
            Some(_) => None,
            None => Some(AmbientSource::detect()),
        };

        let mut state = self.lock();
        state.generation += 1;
        let context = Arc::new(SdkContext {
            project_id: config.project_id().to_string(),
            location: config.location().to_string(),
            credentials,
            ambient_source,
            generation: state.generation,
        });
        state.context = Some(context.clone());
        tracing::debug!(
            project_id = context.project_id(),
            location = context.location(),
            generation = context.generation(),
            explicit_credentials = context.credentials().is_some(),
            ambient_source = ?context.ambient_source(),
            "initialized AI platform context"
        );
        Ok(context)
    }

    /// Returns the current context, if the runtime is initialized.
    pub fn current(&self) -> Option<Arc<SdkContext>> {
        self.lock().context.clone()
    }

    /// Removes the current context, returning it.
    pub fn teardown(&self) -> Option<Arc<SdkContext>> {
        self.lock().context.take()
    }

    /// The number of successful initializations.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Every update leaves the state consistent before it can panic.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn validate(config: &PlatformConfig) -> Result<()> {
    if config.project_id().trim().is_empty() {
        return Err(Error::sdk_init("the project id must not be empty"));
    }
    let location = config.location();
    if location != GLOBAL_LOCATION && !SUPPORTED_LOCATIONS.contains(&location) {
        return Err(Error::sdk_init(format!(
            "unsupported location `{location}`"
        )));
    }
    Ok(())
}
