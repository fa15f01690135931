use std::{env, path::Path, path::PathBuf, sync::Arc};

use chatrelay_core::backends::openai::OpenAiBackend;
use chatrelay_core::backends::scripted::ScriptedBackend;
use chatrelay_core::{AppConfig, GenerationBackend, InMemoryAppStore, Relay, RelayConfig};

/// Initialize the environment variables
pub fn init() {
    let _ = dotenvy::from_path(Path::new(
        format!("{}/.env", env!("CARGO_MANIFEST_DIR")).as_str(),
    ));
    dotenvy::dotenv().ok();
}

/// Get the environment variable, falling back to the type's default
pub fn get_env<T: std::str::FromStr + Default>(key: &str) -> T {
    match env::var(key) {
        Ok(s) => match s.trim().parse() {
            Ok(val) => val,
            Err(_) => {
                tracing::error!("Error parsing {}", key);
                T::default()
            }
        },
        Err(_) => T::default(),
    }
}

/// Server settings read from the environment.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// `CHATRELAY_BIND_ADDR`, default `127.0.0.1:8080`.
    pub bind_addr: String,
    /// `CHATRELAY_APPS_FILE`: JSON array of app definitions.
    pub apps_file: Option<PathBuf>,
    /// `CHATRELAY_DEFAULT_MODEL`: model of the `default` app used when no apps
    /// file is configured.
    pub default_model: String,
    /// Use the OpenAI backend (`OPENAI_API_KEY` present) or the echo backend.
    pub use_openai: bool,
    pub relay: RelayConfig,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = get_env::<String>("CHATRELAY_BIND_ADDR");
        let apps_file = get_env::<String>("CHATRELAY_APPS_FILE");
        let default_model = get_env::<String>("CHATRELAY_DEFAULT_MODEL");
        Ok(Self {
            bind_addr: non_empty(bind_addr).unwrap_or_else(|| "127.0.0.1:8080".into()),
            apps_file: non_empty(apps_file).map(PathBuf::from),
            default_model: non_empty(default_model).unwrap_or_else(|| "gpt-4o-mini".into()),
            use_openai: non_empty(get_env::<String>("OPENAI_API_KEY")).is_some(),
            relay: RelayConfig::from_env()?,
        })
    }

    /// Wires the configured backend and app store into a [`Relay`].
    pub fn build_relay(&self) -> anyhow::Result<Relay> {
        let apps = match &self.apps_file {
            Some(path) => InMemoryAppStore::from_json_file(path)?,
            None => {
                tracing::warn!(model = %self.default_model, "no CHATRELAY_APPS_FILE set, serving a single `default` app");
                InMemoryAppStore::from_apps([AppConfig::new("default", &self.default_model)])
            }
        };
        let backend: Arc<dyn GenerationBackend> = if self.use_openai {
            Arc::new(OpenAiBackend::from_env()?)
        } else {
            tracing::warn!("OPENAI_API_KEY not set, using the echo backend");
            Arc::new(ScriptedBackend::echo())
        };
        tracing::info!(apps = apps.len(), backend = %backend.id(), "relay configured");
        Ok(Relay::builder()
            .backend(backend)
            .app_store(Arc::new(apps))
            .config(self.relay.clone())
            .build()?)
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
