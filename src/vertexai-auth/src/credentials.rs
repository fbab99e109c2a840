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

//! Types and functions to work with Google Cloud authentication [Credentials].
//!
//! [Credentials]: https://cloud.google.com/docs/authentication#credentials

pub mod service_account;

use crate::Result;
use crate::constants::JWT_BEARER_GRANT_TYPE;
use crate::errors::{self, Error};
use crate::jws::{CLOCK_SKEW_FUDGE, DEFAULT_TOKEN_TIMEOUT, JwsClaims, JwsHeader};
use crate::token::Token;
use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
use http::HeaderMap;
use http::header::{AUTHORIZATION, HeaderValue};
use rustls::SignatureScheme;
use rustls::sign::SigningKey;
use serde::Deserialize;
use service_account::ServiceAccountKey;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::Instant;

/// An authenticated service account identity.
///
/// `Credentials` is a cheap handle, clones share the same cached token. A
/// newly created instance holds no token: its [expiry][Credentials::expiry]
/// is absent and it does not report itself as [expired][Credentials::expired].
/// A token is obtained on the first call to [refresh][Credentials::refresh]
/// or [token][Credentials::token].
#[derive(Clone)]
pub struct Credentials {
    inner: Arc<ServiceAccountCredentials>,
}

struct ServiceAccountCredentials {
    service_account_key: ServiceAccountKey,
    signing_key: Arc<dyn SigningKey>,
    scopes: Vec<String>,
    client: reqwest::Client,
    token: Mutex<Option<Token>>,
}

impl Credentials {
    /// The service account email, used as the assertion issuer.
    pub fn client_email(&self) -> &str {
        &self.inner.service_account_key.client_email
    }

    /// The project the service account belongs to, if the key names one.
    pub fn project_id(&self) -> Option<&str> {
        self.inner.service_account_key.project_id.as_deref()
    }

    /// The scopes requested for access tokens.
    pub fn scopes(&self) -> &[String] {
        &self.inner.scopes
    }

    /// The expiration of the cached token, if any.
    pub fn expiry(&self) -> Option<Instant> {
        self.cached().as_ref().and_then(|t| t.expires_at)
    }

    /// Returns `true` if the cached token is expired, or about to expire.
    ///
    /// Credentials without a token are not expired, they are not
    /// [valid][Credentials::valid] either.
    pub fn expired(&self) -> bool {
        self.cached().as_ref().is_some_and(Token::is_expired)
    }

    /// Returns `true` if there is a cached token and it is not expired.
    pub fn valid(&self) -> bool {
        self.cached().as_ref().is_some_and(|t| !t.is_expired())
    }

    /// Exchanges a new signed assertion for an access token.
    ///
    /// The new token replaces any cached token.
    pub async fn refresh(&self) -> Result<Token> {
        let token = self.inner.fetch_token().await?;
        *self.lock() = Some(token.clone());
        tracing::debug!(
            client_email = self.client_email(),
            "refreshed service account access token"
        );
        Ok(token)
    }

    /// Returns the cached token, refreshing it first if needed.
    pub async fn token(&self) -> Result<Token> {
        match self.cached() {
            Some(token) if !token.is_expired() => Ok(token),
            _ => self.refresh().await,
        }
    }

    /// Returns the headers to authenticate a request with these credentials.
    pub async fn headers(&self) -> Result<HeaderMap> {
        let token = self.token().await?;
        let mut value = HeaderValue::from_str(&format!("{} {}", token.token_type, token.token))
            .map_err(|e| Error::refresh(false, e))?;
        value.set_sensitive(true);
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Token>> {
        // Writers only replace the whole value, a poisoned lock still holds a
        // consistent token.
        self.inner
            .token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn cached(&self) -> Option<Token> {
        self.lock().clone()
    }

    #[cfg(test)]
    pub(crate) fn set_token(&self, token: Token) {
        *self.lock() = Some(token);
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("service_account_key", &self.inner.service_account_key)
            .field("scopes", &self.inner.scopes)
            .field("token", &self.cached())
            .finish()
    }
}

impl ServiceAccountCredentials {
    // Creates the signed JWT used in the token exchange.
    fn assertion(&self) -> Result<String> {
        let key = &self.service_account_key;
        let iat = OffsetDateTime::now_utc() - CLOCK_SKEW_FUDGE;
        let claims = JwsClaims {
            iss: &key.client_email,
            scope: Some(self.scopes.join(" ")),
            aud: &key.token_uri,
            exp: iat + DEFAULT_TOKEN_TIMEOUT,
            iat,
        };
        let header = JwsHeader {
            alg: "RS256",
            typ: "JWT",
            kid: key.private_key_id.as_deref(),
        };
        let encoded = format!("{}.{}", header.encode()?, claims.encode()?);

        let signer = self
            .signing_key
            .choose_scheme(&[SignatureScheme::RSA_PKCS1_SHA256])
            .ok_or_else(|| {
                Error::refresh(false, "the private key cannot produce RS256 signatures")
            })?;
        let signature = signer
            .sign(encoded.as_bytes())
            .map_err(|e| Error::refresh(false, e))?;
        Ok(format!(
            "{encoded}.{}",
            BASE64_URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    async fn fetch_token(&self) -> Result<Token> {
        let assertion = self.assertion()?;
        let token_uri = &self.service_account_key.token_uri;
        let response = self
            .client
            .post(token_uri)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT_TYPE),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::refresh(true, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::refresh(
                errors::is_retryable(status),
                format!("token endpoint {token_uri} returned {status}: {body}"),
            ));
        }
        let response = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::refresh(false, e))?;

        let expires_at = match response.expires_in {
            None => None,
            Some(secs) => Some(
                Instant::now()
                    .checked_add(Duration::from_secs(secs))
                    .ok_or_else(|| {
                        Error::refresh(false, format!("invalid `expires_in` value: {secs}"))
                    })?,
            ),
        };
        Ok(Token {
            token: response.access_token,
            token_type: response.token_type,
            expires_at,
        })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Turns a service account key file into [Credentials].
///
/// The [Authenticator][crate::Authenticator] uses a loader for both the
/// secrets store key (after writing it to a temporary file) and the key file
/// supplied by the caller.
pub trait CredentialsLoader: std::fmt::Debug + Send + Sync {
    /// Creates credentials from the key file at `path`.
    fn load(&self, path: &Path) -> Result<Credentials>;
}

/// Loads service account keys, scoped to `cloud-platform`.
#[derive(Clone, Debug, Default)]
pub struct ServiceAccountLoader {
    client: Option<reqwest::Client>,
}

impl ServiceAccountLoader {
    /// Creates a loader where all credentials share `client`.
    pub fn with_http_client(client: reqwest::Client) -> Self {
        Self {
            client: Some(client),
        }
    }
}

impl CredentialsLoader for ServiceAccountLoader {
    fn load(&self, path: &Path) -> Result<Credentials> {
        let builder = service_account::Builder::from_file(path)?;
        match &self.client {
            Some(client) => builder.with_http_client(client.clone()).build(),
            None => builder.build(),
        }
    }
}
