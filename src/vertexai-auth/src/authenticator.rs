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

//! Resolves credentials at start-up and initializes the runtime.

use crate::Result;
use crate::config::PlatformConfig;
use crate::constants::{GOOGLE_CREDENTIALS_JSON_FIELD, GOOGLE_CREDENTIALS_SECRET};
use crate::context::Runtime;
use crate::credentials::{Credentials, CredentialsLoader, ServiceAccountLoader};
use crate::errors::Error;
use crate::notifier::{Level, Notifier, TracingNotifier};
use crate::secrets::{SecretEntry, SecretsStore, TomlSecrets};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

const SECRETS_SUCCESS: &str = "Authenticated using secrets store";
const AUTHENTICATION_FAILED: &str = "Authentication failed. Please check your credentials.";

/// The credential source that initialized the runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialSource {
    /// The `google_credentials` entry of the secrets store.
    SecretsStore,
    /// A service account key file supplied by the caller.
    FilePath(PathBuf),
    /// The ambient credentials of the environment.
    AmbientDefault,
}

/// Authenticates the application and initializes a [Runtime].
///
/// Three credential sources are tried, in order:
///
/// 1. The `google_credentials` entry in the secrets store, if there is a
///    store and it has that entry.
/// 2. The key file passed to [authenticate][Authenticator::authenticate], if
///    any.
/// 3. The ambient credentials of the environment.
///
/// The first source that initializes the runtime wins. A failing source is
/// reported to the [Notifier] and the next source is tried.
pub struct Authenticator {
    runtime: Arc<Runtime>,
    config: PlatformConfig,
    secrets: Option<Arc<dyn SecretsStore>>,
    notifier: Arc<dyn Notifier>,
    loader: Arc<dyn CredentialsLoader>,
    temp_dir: Option<PathBuf>,
    last_source: Mutex<Option<CredentialSource>>,
}

impl Authenticator {
    /// Creates an authenticator without a secrets store.
    ///
    /// Diagnostics are logged with [TracingNotifier].
    pub fn new(runtime: Arc<Runtime>, config: PlatformConfig) -> Self {
        Self {
            runtime,
            config,
            secrets: None,
            notifier: Arc::new(TracingNotifier),
            loader: Arc::new(ServiceAccountLoader::default()),
            temp_dir: None,
            last_source: Mutex::new(None),
        }
    }

    /// Creates an authenticator configured from the environment.
    ///
    /// The configuration is loaded with [PlatformConfig::from_env], and the
    /// secrets store with [TomlSecrets::discover].
    ///
    /// # Errors
    ///
    /// Returns an error if the project is not configured, or if a
    /// `secrets.toml` file exists but cannot be parsed.
    pub fn from_env(runtime: Arc<Runtime>) -> Result<Self> {
        let config = PlatformConfig::from_env()?;
        let authenticator = Self::new(runtime, config);
        Ok(match TomlSecrets::discover()? {
            Some(secrets) => authenticator.with_secrets(secrets),
            None => authenticator,
        })
    }

    /// Sets the secrets store consulted first.
    pub fn with_secrets<S: SecretsStore + 'static>(mut self, secrets: S) -> Self {
        self.secrets = Some(Arc::new(secrets));
        self
    }

    /// Sets the sink for user-visible diagnostics.
    pub fn with_notifier<N: Notifier + 'static>(mut self, notifier: N) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    /// Sets the directory for the transient key file.
    ///
    /// The key from the secrets store is written to a file in this directory
    /// while the credentials are created. The default is the system
    /// temporary directory.
    pub fn with_temp_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Sets how key files are turned into [Credentials].
    pub fn with_loader<L: CredentialsLoader + 'static>(mut self, loader: L) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    /// Resolves credentials and initializes the runtime.
    ///
    /// Returns the credentials from the secrets store or from `key_path`.
    /// Returns `None` if the runtime was initialized with the ambient
    /// credentials, or if no source could initialize it. Use
    /// [last_source][Authenticator::last_source] to tell these apart.
    pub async fn authenticate(&self, key_path: Option<&Path>) -> Option<Credentials> {
        self.set_last_source(None);

        if let Some(entry) = self
            .secrets
            .as_ref()
            .and_then(|s| s.get(GOOGLE_CREDENTIALS_SECRET))
        {
            tracing::debug!("trying credentials from the secrets store");
            match self.use_secret(&entry) {
                Ok(credentials) => {
                    self.notifier.notify(Level::Success, SECRETS_SUCCESS);
                    self.set_last_source(Some(CredentialSource::SecretsStore));
                    return Some(credentials);
                }
                Err(e) => self
                    .notifier
                    .notify(Level::Error, &format!("Error using secret credentials: {e}")),
            }
        }

        if let Some(path) = key_path.filter(|p| !p.as_os_str().is_empty()) {
            tracing::debug!(path = %path.display(), "trying credentials file");
            match self.use_key_file(path).await {
                Ok(credentials) => {
                    self.set_last_source(Some(CredentialSource::FilePath(path.to_path_buf())));
                    return Some(credentials);
                }
                Err(e) => self
                    .notifier
                    .notify(Level::Error, &format!("Error using credentials file: {e}")),
            }
        }

        tracing::debug!("trying ambient credentials");
        match self.runtime.init(&self.config, None) {
            Ok(_) => self.set_last_source(Some(CredentialSource::AmbientDefault)),
            Err(e) => {
                self.notifier
                    .notify(Level::Error, &format!("Failed to authenticate: {e}"));
                self.notifier.notify(Level::Blocking, AUTHENTICATION_FAILED);
            }
        }
        None
    }

    /// The source used by the last call to
    /// [authenticate][Authenticator::authenticate].
    ///
    /// `None` before the first call, and after a call where every source
    /// failed.
    pub fn last_source(&self) -> Option<CredentialSource> {
        self.lock_last_source().clone()
    }

    fn use_secret(&self, entry: &SecretEntry) -> Result<Credentials> {
        let json = entry.field(GOOGLE_CREDENTIALS_JSON_FIELD)?;
        let key = serde_json::from_str::<serde_json::Value>(json).map_err(Error::secrets_parse)?;

        let file = self.write_key_file(&key)?;
        let credentials = self.loader.load(file.path());
        let path = file.path().to_path_buf();
        if let Err(e) = file.close() {
            tracing::warn!(path = %path.display(), "cannot remove transient key file: {e}");
        }
        let credentials = credentials?;

        self.runtime.init(&self.config, Some(credentials.clone()))?;
        Ok(credentials)
    }

    async fn use_key_file(&self, path: &Path) -> Result<Credentials> {
        let credentials = self.loader.load(path)?;
        if credentials.expired() {
            credentials.refresh().await?;
        }
        self.runtime.init(&self.config, Some(credentials.clone()))?;
        Ok(credentials)
    }

    // The file is removed when the returned value is dropped.
    fn write_key_file(&self, key: &serde_json::Value) -> Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("vertexai-key-").suffix(".json");
        let mut file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| Error::construction(format!("cannot create transient key file: {e}")))?;
        serde_json::to_writer(&mut file, key).map_err(Error::construction)?;
        file.flush()
            .map_err(|e| Error::construction(format!("cannot write transient key file: {e}")))?;
        Ok(file)
    }

    fn set_last_source(&self, source: Option<CredentialSource>) {
        *self.lock_last_source() = source;
    }

    fn lock_last_source(&self) -> std::sync::MutexGuard<'_, Option<CredentialSource>> {
        self.last_source
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("runtime", &self.runtime)
            .field("config", &self.config)
            .field("has_secrets", &self.secrets.is_some())
            .field("loader", &self.loader)
            .field("temp_dir", &self.temp_dir)
            .field("last_source", &self.last_source())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::tests::{expect_token_exchange, service_account_json};
    use crate::secrets::StaticSecrets;
    use crate::token::Token;
    use httptest::Server;
    use tokio::time::Instant;

    type Diagnostics = Arc<Mutex<Vec<(Level, String)>>>;

    const TOKEN_URI: &str = "https://oauth2.example.com/token";

    fn recorder() -> (Diagnostics, impl Notifier + 'static) {
        let diagnostics = Diagnostics::default();
        let sink = diagnostics.clone();
        let notifier = move |level: Level, message: &str| {
            sink.lock().unwrap().push((level, message.to_string()));
        };
        (diagnostics, notifier)
    }

    fn levels(diagnostics: &Diagnostics) -> Vec<Level> {
        diagnostics.lock().unwrap().iter().map(|(l, _)| *l).collect()
    }

    fn secrets(json: &str) -> StaticSecrets {
        StaticSecrets::new().with_entry(
            GOOGLE_CREDENTIALS_SECRET,
            SecretEntry::new().with_field(GOOGLE_CREDENTIALS_JSON_FIELD, json),
        )
    }

    fn key_file(dir: &Path, token_uri: &str) -> anyhow::Result<PathBuf> {
        let path = dir.join("service-account.json");
        std::fs::write(&path, service_account_json(token_uri).to_string())?;
        Ok(path)
    }

    fn is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    // Records the files it loads, and optionally marks the credentials as
    // holding an expired token.
    #[derive(Debug, Default)]
    struct RecordingLoader {
        expire: bool,
        loaded: Arc<Mutex<Vec<(PathBuf, bool)>>>,
    }

    impl CredentialsLoader for RecordingLoader {
        fn load(&self, path: &Path) -> Result<Credentials> {
            self.loaded
                .lock()
                .unwrap()
                .push((path.to_path_buf(), path.exists()));
            let credentials = ServiceAccountLoader::default().load(path)?;
            if self.expire {
                credentials.set_token(Token {
                    token: "expired-token".to_string(),
                    token_type: "Bearer".to_string(),
                    expires_at: Some(Instant::now()),
                });
            }
            Ok(credentials)
        }
    }

    #[tokio::test]
    async fn secrets_store_success() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let loader = RecordingLoader::default();
        let loaded = loader.loaded.clone();
        let (diagnostics, notifier) = recorder();
        let runtime = Arc::new(Runtime::new());
        let authenticator =
            Authenticator::new(runtime.clone(), PlatformConfig::new("test-project", "us-central1"))
                .with_secrets(secrets(&service_account_json(TOKEN_URI).to_string()))
                .with_notifier(notifier)
                .with_loader(loader)
                .with_temp_dir(temp_dir.path());

        let credentials = authenticator.authenticate(None).await.unwrap();
        assert_eq!(credentials.client_email(), "test-sa@test-project.iam.gserviceaccount.com");
        assert_eq!(
            credentials.scopes(),
            &["https://www.googleapis.com/auth/cloud-platform".to_string()]
        );
        assert_eq!(authenticator.last_source(), Some(CredentialSource::SecretsStore));

        // The runtime is initialized exactly once, with these credentials.
        assert_eq!(runtime.generation(), 1);
        let context = runtime.current().unwrap();
        assert_eq!(context.project_id(), "test-project");
        assert_eq!(context.location(), "us-central1");
        assert_eq!(
            context.credentials().map(Credentials::client_email),
            Some(credentials.client_email())
        );

        assert_eq!(
            *diagnostics.lock().unwrap(),
            vec![(Level::Success, SECRETS_SUCCESS.to_string())]
        );

        // The key was loaded from a `.json` file in the temp dir, which is
        // now gone.
        let loaded = loaded.lock().unwrap();
        assert_eq!(loaded.len(), 1, "{loaded:?}");
        let (path, existed) = &loaded[0];
        assert!(*existed, "{path:?}");
        assert_eq!(path.parent(), Some(temp_dir.path()));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("json"));
        assert!(!path.exists(), "{path:?}");
        assert!(is_empty(temp_dir.path()));
        Ok(())
    }

    #[tokio::test]
    async fn key_file_success() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = key_file(dir.path(), TOKEN_URI)?;
        let (diagnostics, notifier) = recorder();
        let runtime = Arc::new(Runtime::new());
        let authenticator =
            Authenticator::new(runtime.clone(), PlatformConfig::new("test-project", "us-central1"))
                .with_notifier(notifier);

        let credentials = authenticator.authenticate(Some(path.as_path())).await.unwrap();
        // Fresh credentials are not expired, no token exchange happens.
        assert!(!credentials.valid());
        assert_eq!(authenticator.last_source(), Some(CredentialSource::FilePath(path)));
        assert_eq!(runtime.generation(), 1);
        assert!(runtime.current().unwrap().credentials().is_some());
        assert!(diagnostics.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn key_file_expired_is_refreshed() -> anyhow::Result<()> {
        let server = Server::run();
        expect_token_exchange(&server, 1);
        let dir = tempfile::tempdir()?;
        let path = key_file(dir.path(), &server.url_str("/token"))?;
        let runtime = Arc::new(Runtime::new());
        let authenticator =
            Authenticator::new(runtime.clone(), PlatformConfig::new("test-project", "us-central1"))
                .with_loader(RecordingLoader {
                    expire: true,
                    ..Default::default()
                });

        let credentials = authenticator.authenticate(Some(path.as_path())).await.unwrap();
        assert!(credentials.valid());
        assert_eq!(credentials.token().await?.token, "test-access-token");
        let context = runtime.current().unwrap();
        assert!(context.credentials().is_some_and(Credentials::valid));
        Ok(())
    }

    #[tokio::test]
    async fn key_file_refresh_error_falls_through() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            httptest::Expectation::matching(httptest::matchers::request::method_path(
                "POST", "/token",
            ))
            .respond_with(httptest::responders::status_code(401)),
        );
        let dir = tempfile::tempdir()?;
        let path = key_file(dir.path(), &server.url_str("/token"))?;
        let (diagnostics, notifier) = recorder();
        let runtime = Arc::new(Runtime::new());
        let authenticator =
            Authenticator::new(runtime.clone(), PlatformConfig::new("test-project", "us-central1"))
                .with_notifier(notifier)
                .with_loader(RecordingLoader {
                    expire: true,
                    ..Default::default()
                });

        assert!(authenticator.authenticate(Some(path.as_path())).await.is_none());
        assert_eq!(authenticator.last_source(), Some(CredentialSource::AmbientDefault));
        assert_eq!(levels(&diagnostics), vec![Level::Error]);
        assert!(
            diagnostics.lock().unwrap()[0]
                .1
                .starts_with("Error using credentials file: "),
            "{diagnostics:?}"
        );
        assert!(runtime.current().unwrap().credentials().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn ambient_default() {
        let (diagnostics, notifier) = recorder();
        let runtime = Arc::new(Runtime::new());
        let authenticator =
            Authenticator::new(runtime.clone(), PlatformConfig::new("test-project", "us-central1"))
                .with_secrets(StaticSecrets::new())
                .with_notifier(notifier);

        assert!(authenticator.authenticate(None).await.is_none());
        assert_eq!(authenticator.last_source(), Some(CredentialSource::AmbientDefault));
        let context = runtime.current().unwrap();
        assert_eq!(context.project_id(), "test-project");
        assert_eq!(context.location(), "us-central1");
        assert!(context.credentials().is_none());
        assert!(context.ambient_source().is_some());
        assert!(diagnostics.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_key_path_is_skipped() {
        let loader = RecordingLoader::default();
        let loaded = loader.loaded.clone();
        let (diagnostics, notifier) = recorder();
        let runtime = Arc::new(Runtime::new());
        let authenticator =
            Authenticator::new(runtime.clone(), PlatformConfig::new("test-project", "us-central1"))
                .with_notifier(notifier)
                .with_loader(loader);

        assert!(authenticator.authenticate(Some(Path::new(""))).await.is_none());
        assert!(loaded.lock().unwrap().is_empty());
        assert!(diagnostics.lock().unwrap().is_empty());
        assert_eq!(authenticator.last_source(), Some(CredentialSource::AmbientDefault));
    }

    #[tokio::test]
    async fn bad_secret_falls_through_to_key_file() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let dir = tempfile::tempdir()?;
        let path = key_file(dir.path(), TOKEN_URI)?;
        let (diagnostics, notifier) = recorder();
        let runtime = Arc::new(Runtime::new());
        let authenticator =
            Authenticator::new(runtime.clone(), PlatformConfig::new("test-project", "us-central1"))
                .with_secrets(secrets("{ this is not json"))
                .with_notifier(notifier)
                .with_temp_dir(temp_dir.path());

        let credentials = authenticator.authenticate(Some(path.as_path())).await;
        assert!(credentials.is_some());
        assert_eq!(authenticator.last_source(), Some(CredentialSource::FilePath(path)));
        assert_eq!(runtime.generation(), 1);

        let diagnostics = diagnostics.lock().unwrap();
        assert_eq!(diagnostics.len(), 1, "{diagnostics:?}");
        assert_eq!(diagnostics[0].0, Level::Error);
        assert!(
            diagnostics[0].1.starts_with("Error using secret credentials: "),
            "{diagnostics:?}"
        );
        assert!(is_empty(temp_dir.path()));
        Ok(())
    }

    #[tokio::test]
    async fn secret_without_json_field() {
        let (diagnostics, notifier) = recorder();
        let authenticator = Authenticator::new(
            Arc::new(Runtime::new()),
            PlatformConfig::new("test-project", "us-central1"),
        )
        .with_secrets(StaticSecrets::new().with_entry(
            GOOGLE_CREDENTIALS_SECRET,
            SecretEntry::new().with_field("unrelated", "value"),
        ))
        .with_notifier(notifier);

        assert!(authenticator.authenticate(None).await.is_none());
        let diagnostics = diagnostics.lock().unwrap();
        assert_eq!(diagnostics.len(), 1, "{diagnostics:?}");
        assert!(diagnostics[0].1.contains("`json` field is missing"), "{diagnostics:?}");
    }

    #[tokio::test]
    async fn scalar_secret_is_reported() -> anyhow::Result<()> {
        let (diagnostics, notifier) = recorder();
        let authenticator = Authenticator::new(
            Arc::new(Runtime::new()),
            PlatformConfig::new("test-project", "us-central1"),
        )
        .with_secrets(crate::secrets::TomlSecrets::from_toml_str(
            r#"google_credentials = "{\"type\": \"service_account\"}""#,
        )?)
        .with_notifier(notifier);

        assert!(authenticator.authenticate(None).await.is_none());
        assert_eq!(authenticator.last_source(), Some(CredentialSource::AmbientDefault));
        let diagnostics = diagnostics.lock().unwrap();
        assert_eq!(diagnostics.len(), 1, "{diagnostics:?}");
        assert_eq!(diagnostics[0].0, Level::Error);
        assert!(
            diagnostics[0].1.starts_with("Error using secret credentials: "),
            "{diagnostics:?}"
        );
        assert!(
            diagnostics[0]
                .1
                .contains("google_credentials must be a table, found string"),
            "{diagnostics:?}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn bad_key_in_secret_leaves_no_file() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let (diagnostics, notifier) = recorder();
        let authenticator = Authenticator::new(
            Arc::new(Runtime::new()),
            PlatformConfig::new("test-project", "us-central1"),
        )
        .with_secrets(secrets(r#"{"type": "authorized_user"}"#))
        .with_notifier(notifier)
        .with_temp_dir(temp_dir.path());

        assert!(authenticator.authenticate(None).await.is_none());
        assert_eq!(levels(&diagnostics), vec![Level::Error]);
        assert!(is_empty(temp_dir.path()));
        Ok(())
    }

    #[tokio::test]
    async fn all_sources_fail() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let dir = tempfile::tempdir()?;
        let path = key_file(dir.path(), TOKEN_URI)?;
        let (diagnostics, notifier) = recorder();
        let runtime = Arc::new(Runtime::new());
        // The runtime rejects this location, so every source fails.
        let authenticator =
            Authenticator::new(runtime.clone(), PlatformConfig::new("test-project", "nowhere-1"))
                .with_secrets(secrets(&service_account_json(TOKEN_URI).to_string()))
                .with_notifier(notifier)
                .with_temp_dir(temp_dir.path());

        assert!(authenticator.authenticate(Some(path.as_path())).await.is_none());
        assert_eq!(authenticator.last_source(), None);
        assert!(runtime.current().is_none());
        assert_eq!(
            levels(&diagnostics),
            vec![Level::Error, Level::Error, Level::Error, Level::Blocking]
        );
        let diagnostics = diagnostics.lock().unwrap();
        assert!(diagnostics[0].1.starts_with("Error using secret credentials: "));
        assert!(diagnostics[1].1.starts_with("Error using credentials file: "));
        assert!(diagnostics[2].1.starts_with("Failed to authenticate: "));
        assert_eq!(diagnostics[3].1, AUTHENTICATION_FAILED);
        assert!(is_empty(temp_dir.path()));
        Ok(())
    }

    #[tokio::test]
    async fn last_source_resets() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = key_file(dir.path(), TOKEN_URI)?;
        let runtime = Arc::new(Runtime::new());
        let authenticator =
            Authenticator::new(runtime.clone(), PlatformConfig::new("test-project", "us-central1"));
        assert_eq!(authenticator.last_source(), None);

        authenticator.authenticate(Some(path.as_path())).await;
        assert!(matches!(
            authenticator.last_source(),
            Some(CredentialSource::FilePath(_))
        ));
        authenticator.authenticate(None).await;
        assert_eq!(authenticator.last_source(), Some(CredentialSource::AmbientDefault));
        assert_eq!(runtime.generation(), 2);
        Ok(())
    }

    #[test]
    fn debug() {
        let authenticator = Authenticator::new(
            Arc::new(Runtime::new()),
            PlatformConfig::new("test-project", "us-central1"),
        )
        .with_secrets(secrets("super-secret-json"));
        let fmt = format!("{authenticator:?}");
        assert!(fmt.contains("test-project"), "{fmt}");
        assert!(fmt.contains("has_secrets: true"), "{fmt}");
        assert!(!fmt.contains("super-secret-json"), "{fmt}");
    }
}
