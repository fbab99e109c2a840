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

use std::time::Duration;

pub(crate) const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
/// JWT Bearer OAuth Grant Type
pub(crate) const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
pub(crate) const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub(crate) const SERVICE_ACCOUNT_TYPE: &str = "service_account";

/// The secrets store entry holding the service account key.
pub(crate) const GOOGLE_CREDENTIALS_SECRET: &str = "google_credentials";
/// The field, inside [GOOGLE_CREDENTIALS_SECRET], with the JSON key.
pub(crate) const GOOGLE_CREDENTIALS_JSON_FIELD: &str = "json";

pub(crate) const GOOGLE_CLOUD_PROJECT_VAR: &str = "GOOGLE_CLOUD_PROJECT";
pub(crate) const GOOGLE_CLOUD_LOCATION_VAR: &str = "GOOGLE_CLOUD_LOCATION";
pub(crate) const GOOGLE_APPLICATION_CREDENTIALS_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub(crate) const DEFAULT_LOCATION: &str = "us-central1";

// Tokens are considered expired slightly before their actual expiration, so
// requests started with a token do not fail in flight.
pub(crate) const REFRESH_THRESHOLD: Duration = Duration::from_secs(225);
