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

//! The project and location used to initialize the runtime.

use crate::Result;
use crate::constants::{DEFAULT_LOCATION, GOOGLE_CLOUD_LOCATION_VAR, GOOGLE_CLOUD_PROJECT_VAR};
use crate::errors::Error;

/// Identifies the Vertex AI project and location the application uses.
///
/// The values are not validated here. The [Runtime][crate::Runtime] rejects
/// invalid configurations when it is initialized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformConfig {
    project_id: String,
    location: String,
}

impl PlatformConfig {
    /// Creates a new configuration.
    ///
    /// # Example
    /// ```
    /// # use google_cloud_vertexai_auth::PlatformConfig;
    /// let config = PlatformConfig::new("my-project", "europe-west4");
    /// assert_eq!(config.location(), "europe-west4");
    /// ```
    pub fn new<P, L>(project_id: P, location: L) -> Self
    where
        P: Into<String>,
        L: Into<String>,
    {
        Self {
            project_id: project_id.into(),
            location: location.into(),
        }
    }

    /// Loads the configuration from the environment.
    ///
    /// The project id is read from `GOOGLE_CLOUD_PROJECT`, which must be set.
    /// The location is read from `GOOGLE_CLOUD_LOCATION`, and defaults to
    /// `us-central1`.
    pub fn from_env() -> Result<Self> {
        let project_id = std::env::var(GOOGLE_CLOUD_PROJECT_VAR)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                Error::configuration(format!(
                    "the {GOOGLE_CLOUD_PROJECT_VAR} environment variable is not set"
                ))
            })?;
        let location = std::env::var(GOOGLE_CLOUD_LOCATION_VAR)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string());
        Ok(Self::new(project_id, location))
    }

    /// The project id.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// The location (region), for example `us-central1`.
    pub fn location(&self) -> &str {
        &self.location
    }
}
