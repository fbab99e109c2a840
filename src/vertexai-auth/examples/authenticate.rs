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

//! Authenticates against Vertex AI and prints the resulting context.
//!
//! ```sh
//! RUST_LOG=debug cargo run --example authenticate -- \
//!     --project my-project --key-file service-account.json --fetch-token
//! ```

use clap::Parser;
use google_cloud_vertexai_auth::secrets::TomlSecrets;
use google_cloud_vertexai_auth::{Authenticator, PlatformConfig, Runtime};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Resolves credentials the way an application does at start-up.
#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// The project id. Defaults to `GOOGLE_CLOUD_PROJECT`.
    #[arg(long)]
    project: Option<String>,

    /// The Vertex AI location. Defaults to `GOOGLE_CLOUD_LOCATION`, or
    /// `us-central1`.
    #[arg(long)]
    location: Option<String>,

    /// A service account key file, used if the secrets store has no key.
    #[arg(long)]
    key_file: Option<PathBuf>,

    /// A `secrets.toml` file. Defaults to the `.streamlit/secrets.toml` files
    /// in the home and current directories.
    #[arg(long)]
    secrets: Option<PathBuf>,

    /// Fetch an access token with the resolved credentials.
    #[arg(long, default_value_t = false)]
    fetch_token: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::info!("{args:?}");

    let config = match args.project {
        Some(project) => PlatformConfig::new(
            project,
            args.location.unwrap_or_else(|| "us-central1".to_string()),
        ),
        None => {
            let config = PlatformConfig::from_env()?;
            match args.location {
                Some(location) => PlatformConfig::new(config.project_id(), location),
                None => config,
            }
        }
    };
    let secrets = match args.secrets {
        Some(path) => Some(TomlSecrets::from_file(path)?),
        None => TomlSecrets::discover()?,
    };

    let runtime = Arc::new(Runtime::new());
    let mut authenticator = Authenticator::new(runtime.clone(), config);
    if let Some(secrets) = secrets {
        authenticator = authenticator.with_secrets(secrets);
    }

    let credentials = authenticator.authenticate(args.key_file.as_deref()).await;
    let Some(context) = runtime.current() else {
        anyhow::bail!("cannot authenticate, see the diagnostics above");
    };
    println!("source:   {:?}", authenticator.last_source());
    println!("endpoint: {}", context.endpoint());
    println!("parent:   {}", context.parent());
    match (&credentials, context.ambient_source()) {
        (Some(c), _) => println!("identity: {}", c.client_email()),
        (None, Some(ambient)) => println!("ambient:  {ambient:?}"),
        (None, None) => {}
    }

    if args.fetch_token {
        if let Some(credentials) = credentials {
            let token = credentials.token().await?;
            println!("token:    {token:?}");
        }
    }
    Ok(())
}
