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

//! Secrets stores consulted before any other credential source.
//!
//! A secrets store maps names to entries, each entry is a table of fields.
//! The [Authenticator][crate::Authenticator] looks for a `google_credentials`
//! entry whose `json` field holds a service account key:
//!
//! ```toml
//! [google_credentials]
//! json = '''
//! { "type": "service_account", "client_email": "...", "private_key": "..." }
//! '''
//! ```

use crate::Result;
use crate::errors::Error;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use toml_edit::{DocumentMut, Item};

const SECRETS_DIR: &str = ".streamlit";
const SECRETS_FILE: &str = "secrets.toml";

/// A source of named secrets.
pub trait SecretsStore: Send + Sync {
    /// Returns the entry named `key`, if the store has one.
    fn get(&self, key: &str) -> Option<SecretEntry>;
}

#[derive(Clone, PartialEq)]
enum Field {
    Text(String),
    Other(&'static str),
}

/// A table of fields in a [SecretsStore].
#[derive(Clone, Default, PartialEq)]
pub struct SecretEntry {
    fields: BTreeMap<String, Field>,
    // Set for entries that are not tables: the entry name and its type.
    scalar: Option<(String, &'static str)>,
}

impl SecretEntry {
    /// Creates an empty entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a string field.
    pub fn with_field<K, V>(mut self, name: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.fields.insert(name.into(), Field::Text(value.into()));
        self
    }

    /// Returns the value of the string field `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is not a table, if the field is
    /// missing, or if it is not a string.
    pub fn field(&self, name: &str) -> Result<&str> {
        if let Some((entry, type_name)) = &self.scalar {
            return Err(Error::secrets_parse(format!(
                "{entry} must be a table, found {type_name}"
            )));
        }
        match self.fields.get(name) {
            Some(Field::Text(value)) => Ok(value),
            Some(Field::Other(type_name)) => Err(Error::secrets_parse(format!(
                "the `{name}` field must be a string, found {type_name}"
            ))),
            None => Err(Error::secrets_parse(format!(
                "the `{name}` field is missing"
            ))),
        }
    }

    fn from_item(key: &str, item: &Item) -> Self {
        let Some(table) = item.as_table_like() else {
            return Self {
                scalar: Some((key.to_string(), item.type_name())),
                ..Self::default()
            };
        };
        let fields = table
            .iter()
            .map(|(name, value)| {
                let field = match value.as_str() {
                    Some(s) => Field::Text(s.to_string()),
                    None => Field::Other(value.type_name()),
                };
                (name.to_string(), field)
            })
            .collect();
        Self {
            fields,
            scalar: None,
        }
    }
}

impl std::fmt::Debug for SecretEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.fields.keys()).finish()
    }
}

/// A [SecretsStore] backed by `secrets.toml` files.
///
/// Each top-level key is an entry. Only tables have fields, reading a field
/// from any other entry is an error.
#[derive(Clone, Debug, Default)]
pub struct TomlSecrets {
    entries: BTreeMap<String, SecretEntry>,
}

impl TomlSecrets {
    /// Parses the contents of a `secrets.toml` file.
    ///
    /// # Example
    /// ```
    /// # use google_cloud_vertexai_auth::secrets::{SecretsStore, TomlSecrets};
    /// let secrets = TomlSecrets::from_toml_str(r#"
    ///     [google_credentials]
    ///     json = "{}"
    /// "#)?;
    /// let entry = secrets.get("google_credentials").unwrap();
    /// assert_eq!(entry.field("json")?, "{}");
    /// # Ok::<(), google_cloud_vertexai_auth::errors::Error>(())
    /// ```
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let document = contents
            .parse::<DocumentMut>()
            .map_err(Error::secrets_parse)?;
        Ok(Self::from_document(&document))
    }

    /// Reads and parses a `secrets.toml` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::secrets_parse(format!("cannot read {}: {e}", path.display()))
        })?;
        let document = contents.parse::<DocumentMut>().map_err(|e| {
            Error::secrets_parse(format!("cannot parse {}: {e}", path.display()))
        })?;
        Ok(Self::from_document(&document))
    }

    fn from_document(document: &DocumentMut) -> Self {
        let entries = document
            .as_table()
            .iter()
            .map(|(key, item)| (key.to_string(), SecretEntry::from_item(key, item)))
            .collect();
        Self { entries }
    }

    /// Loads the `secrets.toml` files for the current user and directory.
    ///
    /// The files are `$HOME/.streamlit/secrets.toml` and
    /// `./.streamlit/secrets.toml`. Entries in the second file replace
    /// entries with the same name in the first.
    ///
    /// Returns `None` if neither file exists.
    pub fn discover() -> Result<Option<Self>> {
        let cwd = std::env::current_dir().map_err(Error::secrets_parse)?;
        Self::discover_in(home_dir().as_deref(), &cwd)
    }

    /// Like [discover][TomlSecrets::discover] with explicit directories.
    pub fn discover_in(home: Option<&Path>, cwd: &Path) -> Result<Option<Self>> {
        let mut paths: Vec<PathBuf> = home.map(secrets_path).into_iter().collect();
        let local = secrets_path(cwd);
        if !paths.contains(&local) {
            paths.push(local);
        }

        let mut merged: Option<Self> = None;
        for path in paths.iter().filter(|p| p.is_file()) {
            tracing::debug!(path = %path.display(), "loading secrets file");
            let secrets = Self::from_file(path)?;
            merged = Some(match merged {
                None => secrets,
                Some(mut m) => {
                    m.entries.extend(secrets.entries);
                    m
                }
            });
        }
        Ok(merged)
    }
}

impl SecretsStore for TomlSecrets {
    fn get(&self, key: &str) -> Option<SecretEntry> {
        self.entries.get(key).cloned()
    }
}

/// An in-memory [SecretsStore].
#[derive(Clone, Debug, Default)]
pub struct StaticSecrets {
    entries: BTreeMap<String, SecretEntry>,
}

impl StaticSecrets {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds, or replaces, the entry named `key`.
    pub fn with_entry<K: Into<String>>(mut self, key: K, entry: SecretEntry) -> Self {
        self.entries.insert(key.into(), entry);
        self
    }
}

impl SecretsStore for StaticSecrets {
    fn get(&self, key: &str) -> Option<SecretEntry> {
        self.entries.get(key).cloned()
    }
}

fn secrets_path(dir: &Path) -> PathBuf {
    dir.join(SECRETS_DIR).join(SECRETS_FILE)
}

#[cfg(not(target_os = "windows"))]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(target_os = "windows")]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE").map(PathBuf::from)
}
