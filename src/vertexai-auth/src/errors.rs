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

//! Errors created while resolving credentials and initializing the runtime.

use http::StatusCode;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type for this crate.
///
/// The [Authenticator][crate::Authenticator] recovers from all of these
/// errors, it reports them to its [Notifier][crate::notifier::Notifier] and
/// moves on to the next credential source. Applications see this type when
/// they use [Credentials][crate::Credentials] or the
/// [Runtime][crate::Runtime] directly.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    /// The secrets store entry is malformed.
    ///
    /// This includes a missing `json` field, and a `json` field that is not
    /// valid JSON.
    pub fn is_secrets_parse(&self) -> bool {
        matches!(self.0, ErrorKind::SecretsParse(_))
    }

    /// A problem loading or parsing a service account key.
    pub fn is_credentials_construction(&self) -> bool {
        matches!(self.0, ErrorKind::CredentialsConstruction(_))
    }

    /// A problem exchanging the service account assertion for a token.
    pub fn is_refresh(&self) -> bool {
        matches!(self.0, ErrorKind::Refresh { .. })
    }

    /// The runtime rejected the project, location, or credentials.
    pub fn is_sdk_init(&self) -> bool {
        matches!(self.0, ErrorKind::SdkInit(_))
    }

    /// The environment is missing required configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(self.0, ErrorKind::Configuration(_))
    }

    /// Returns `true` if a future attempt of the same operation may succeed.
    ///
    /// Only token refresh errors are ever retryable. Note that this crate
    /// never retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.0,
            ErrorKind::Refresh {
                is_retryable: true,
                ..
            }
        )
    }

    pub(crate) fn secrets_parse<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::SecretsParse(source.into()))
    }

    pub(crate) fn construction<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::CredentialsConstruction(source.into()))
    }

    pub(crate) fn refresh<T>(is_retryable: bool, source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::Refresh {
            is_retryable,
            source: source.into(),
        })
    }

    pub(crate) fn sdk_init<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::SdkInit(source.into()))
    }

    pub(crate) fn configuration<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::Configuration(source.into()))
    }
}

#[derive(thiserror::Error, Debug)]
enum ErrorKind {
    #[error("cannot parse the secrets store entry: {0}")]
    SecretsParse(#[source] BoxError),
    #[error("cannot create credentials from the service account key: {0}")]
    CredentialsConstruction(#[source] BoxError),
    #[error("cannot refresh the access token ({}): {source}", retry_message(*.is_retryable))]
    Refresh {
        is_retryable: bool,
        #[source]
        source: BoxError,
    },
    #[error("cannot initialize the AI platform runtime: {0}")]
    SdkInit(#[source] BoxError),
    #[error("invalid or missing configuration: {0}")]
    Configuration(#[source] BoxError),
}

const RETRYABLE_MSG: &str = "future attempts may succeed";
const NON_RETRYABLE_MSG: &str = "future attempts will not succeed";

fn retry_message(is_retryable: bool) -> &'static str {
    if is_retryable {
        RETRYABLE_MSG
    } else {
        NON_RETRYABLE_MSG
    }
}

pub(crate) fn is_retryable(c: StatusCode) -> bool {
    match c {
        // Internal server errors do not indicate that there is anything wrong
        // with our request, so we retry them.
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::REQUEST_TIMEOUT
        | StatusCode::TOO_MANY_REQUESTS => true,
        _ => false,
    }
}
