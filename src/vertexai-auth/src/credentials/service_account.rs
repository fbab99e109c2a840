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

//! [Service Account] Credentials type.
//!
//! A service account is an account for an application or compute workload
//! instead of an individual end user. When you create a [service account key]
//! the key is returned as a JSON document, in the format described by
//! [aip/4112]. This document contains an id for the service account, as well
//! as the cryptographic materials (a RSA private key) required to
//! authenticate the caller.
//!
//! Service account keys should be treated as any other secret with security
//! implications. Think of them as unencrypted passwords.
//!
//! The credentials in this module exchange a signed assertion for an OAuth
//! access token, using the [JWT bearer grant].
//!
//! Example usage:
//!
//! ```no_run
//! # use google_cloud_vertexai_auth::credentials::service_account::Builder;
//! # tokio_test::block_on(async {
//! let credentials = Builder::from_file("service-account.json")?.build()?;
//! let token = credentials.token().await?;
//! println!("expires_at={:?}", token.expires_at);
//! # Ok::<(), google_cloud_vertexai_auth::errors::Error>(())
//! # });
//! ```
//!
//! [aip/4112]: https://google.aip.dev/auth/4112
//! [JWT bearer grant]: https://datatracker.ietf.org/doc/html/rfc7523
//! [Service Account]: https://cloud.google.com/iam/docs/service-account-creds
//! [service account key]: https://cloud.google.com/iam/docs/keys-create-delete#creating

use super::{Credentials, ServiceAccountCredentials};
use crate::Result;
use crate::constants::{DEFAULT_SCOPE, DEFAULT_TOKEN_URI, SERVICE_ACCOUNT_TYPE};
use crate::errors::Error;
use rustls::SignatureScheme;
use rustls::crypto::CryptoProvider;
use rustls::sign::SigningKey;
use rustls_pki_types::PrivateKeyDer;
use rustls_pki_types::pem::PemObject;
use serde::Deserialize;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Creates [Credentials] from a service account key document.
pub struct Builder {
    service_account_key: serde_json::Value,
    scopes: Option<Vec<String>>,
    client: Option<reqwest::Client>,
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field(
                "client_email",
                &self
                    .service_account_key
                    .get("client_email")
                    .and_then(serde_json::Value::as_str),
            )
            .field("service_account_key", &"[censored]")
            .field("scopes", &self.scopes)
            .field("client", &self.client.is_some())
            .finish()
    }
}

impl Builder {
    /// Creates a builder from the JSON contents of a service account key.
    pub fn new(service_account_key: serde_json::Value) -> Self {
        Self {
            service_account_key,
            scopes: None,
            client: None,
        }
    }

    /// Creates a builder from a service account key file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, or if its contents are
    /// not valid JSON.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read(path).map_err(|e| {
            Error::construction(format!(
                "cannot read service account key file {}: {e}",
                path.display()
            ))
        })?;
        let service_account_key = serde_json::from_slice(&contents).map_err(|e| {
            Error::construction(format!(
                "cannot parse service account key file {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self::new(service_account_key))
    }

    /// Sets the [scopes] for these credentials.
    ///
    /// The default is `https://www.googleapis.com/auth/cloud-platform`.
    ///
    /// [scopes]: https://developers.google.com/identity/protocols/oauth2/scopes
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the HTTP client used to contact the token endpoint.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Returns a [Credentials] instance with the configured settings.
    ///
    /// The private key is parsed here, so an unusable key is reported now
    /// and not on the first token refresh.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not a `service_account` key, if it is
    /// missing required fields, or if the private key is not an RSA key in
    /// PEM format.
    pub fn build(self) -> Result<Credentials> {
        let service_account_key =
            serde_json::from_value::<ServiceAccountKey>(self.service_account_key)
                .map_err(Error::construction)?;
        if service_account_key.key_type != SERVICE_ACCOUNT_TYPE {
            return Err(Error::construction(format!(
                "expected a `{SERVICE_ACCOUNT_TYPE}` key, found `{}`",
                service_account_key.key_type
            )));
        }
        let signing_key = signing_key(&service_account_key.private_key)?;
        let scopes = self
            .scopes
            .unwrap_or_else(|| vec![DEFAULT_SCOPE.to_string()]);

        Ok(Credentials {
            inner: Arc::new(ServiceAccountCredentials {
                service_account_key,
                signing_key,
                scopes,
                client: self.client.unwrap_or_default(),
                token: Mutex::new(None),
            }),
        })
    }
}

/// A representation of a [service account key] in the format described by
/// [aip/4112].
///
/// [aip/4112]: https://google.aip.dev/auth/4112
/// [service account key]: https://cloud.google.com/iam/docs/keys-create-delete#creating
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    /// The type of key, always `service_account`.
    #[serde(rename = "type")]
    pub key_type: String,
    /// The client email address of the service account.
    /// (e.g., "my-sa@my-project.iam.gserviceaccount.com").
    pub client_email: String,
    /// ID of the service account's private key.
    #[serde(default)]
    pub private_key_id: Option<String>,
    /// The PEM-encoded private key associated with the service account.
    pub private_key: String,
    /// The project id the service account belongs to.
    #[serde(default)]
    pub project_id: Option<String>,
    /// The OAuth client id of the service account.
    #[serde(default)]
    pub client_id: Option<String>,
    /// The endpoint used to exchange assertions for access tokens.
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    /// The universe domain this service account belongs to.
    #[serde(default)]
    pub universe_domain: Option<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("key_type", &self.key_type)
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"[censored]")
            .field("project_id", &self.project_id)
            .field("client_id", &self.client_id)
            .field("token_uri", &self.token_uri)
            .field("universe_domain", &self.universe_domain)
            .finish()
    }
}

// Loads the private key stored in the service account key.
fn signing_key(private_key: &str) -> Result<Arc<dyn SigningKey>> {
    let key_provider = CryptoProvider::get_default().map_or_else(
        || rustls::crypto::aws_lc_rs::default_provider().key_provider,
        |p| p.key_provider,
    );

    let der = PrivateKeyDer::from_pem_slice(private_key.as_bytes()).map_err(|e| {
        Error::construction(format!("cannot parse the service account private key: {e}"))
    })?;
    let key = key_provider
        .load_private_key(der)
        .map_err(Error::construction)?;
    if key
        .choose_scheme(&[SignatureScheme::RSA_PKCS1_SHA256])
        .is_none()
    {
        return Err(Error::construction(format!(
            "expected an RSA private key, found {:?}",
            key.algorithm()
        )));
    }
    Ok(key)
}
