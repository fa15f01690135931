//! Inbound chat requests, application configuration lookup, and normalization
//! into a canonical [`GenerationRequest`].

use std::path::Path;

use dashmap::DashMap;

use crate::errors::RelayError;

/// One message of an inbound chat request.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    /// Creates a `user` message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// OpenAI-style chat request body shared by both protocols.
///
/// Unknown fields are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CompletionRequest {
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    /// Accepted for client compatibility; the model always comes from the app.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl CompletionRequest {
    /// Creates a request from a message list.
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages: Some(messages),
            ..Self::default()
        }
    }
}

/// Application configuration resolved for a caller's channel.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AppConfig {
    pub app_id: String,
    pub model_id: String,
    /// System prompt sent ahead of the user message.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Knowledge sources attached to the app, in configured order.
    #[serde(default)]
    pub knowledge_ids: Vec<String>,
}

impl AppConfig {
    pub fn new(app_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            model_id: model_id.into(),
            prompt: None,
            knowledge_ids: Vec::new(),
        }
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn knowledge_ids(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.knowledge_ids = ids.into_iter().map(Into::into).collect();
        self
    }
}

/// Lookup of application configuration by app identifier.
pub trait AppStore: Send + Sync {
    fn get(&self, app_id: &str) -> Option<AppConfig>;
}

/// Concurrent in-memory [`AppStore`].
#[derive(Default)]
pub struct InMemoryAppStore {
    apps: DashMap<String, AppConfig>,
}

impl InMemoryAppStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from app definitions. Later duplicates replace earlier ones.
    pub fn from_apps(apps: impl IntoIterator<Item = AppConfig>) -> Self {
        let store = Self::new();
        for app in apps {
            store.insert(app);
        }
        store
    }

    /// Loads a JSON array of [`AppConfig`] definitions.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("failed to read apps file {}: {e}", path.display()))
        })?;
        let apps: Vec<AppConfig> = serde_json::from_str(&raw).map_err(|e| {
            RelayError::Config(format!("invalid apps file {}: {e}", path.display()))
        })?;
        Ok(Self::from_apps(apps))
    }

    pub fn insert(&self, app: AppConfig) {
        self.apps.insert(app.app_id.clone(), app);
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

impl AppStore for InMemoryAppStore {
    fn get(&self, app_id: &str) -> Option<AppConfig> {
        self.apps.get(app_id).map(|entry| entry.value().clone())
    }
}

/// Canonical request handed to a generation backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Correlates log lines and events of one run.
    pub run_id: uuid::Uuid,
    pub message: String,
    pub role: String,
    pub model_id: String,
    pub prompt: Option<String>,
    pub knowledge_ids: Vec<String>,
}

/// Validates `request` and resolves it against the app configured for `app_id`.
///
/// The first message supplies the text and role. Nothing is started here; a
/// rejected request never reaches a backend.
pub fn normalize(
    request: &CompletionRequest,
    app_id: &str,
    store: &dyn AppStore,
) -> Result<GenerationRequest, RelayError> {
    let Some(message) = request.messages.as_ref().and_then(|m| m.first()) else {
        return Err(RelayError::validation("chat messages must not be empty"));
    };
    if app_id.trim().is_empty() {
        return Err(RelayError::validation("no application is bound to this channel"));
    }
    let app = store
        .get(app_id)
        .ok_or_else(|| RelayError::validation(format!("no application configured for {app_id}")))?;

    Ok(GenerationRequest {
        run_id: uuid::Uuid::new_v4(),
        message: message.content.clone(),
        role: message.role.clone(),
        model_id: app.model_id,
        prompt: app.prompt.filter(|p| !p.trim().is_empty()),
        knowledge_ids: app.knowledge_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn store() -> InMemoryAppStore {
        InMemoryAppStore::from_apps([AppConfig::new("demo", "gpt-4o-mini")
            .prompt("Be brief.")
            .knowledge_ids(["kb-1", "kb-2"])])
    }

    #[test]
    fn resolves_first_message_against_app() {
        let req = CompletionRequest::new(vec![
            ChatMessage::user("hi"),
            ChatMessage::user("ignored"),
        ]);
        let normalized = normalize(&req, "demo", &store()).expect("normalize");
        assert_eq!(normalized.message, "hi");
        assert_eq!(normalized.role, "user");
        assert_eq!(normalized.model_id, "gpt-4o-mini");
        assert_eq!(normalized.prompt.as_deref(), Some("Be brief."));
        assert_eq!(normalized.knowledge_ids, vec!["kb-1", "kb-2"]);
    }

    #[test]
    fn rejects_missing_and_empty_messages() {
        let missing = CompletionRequest::default();
        assert!(matches!(
            normalize(&missing, "demo", &store()),
            Err(RelayError::Validation(msg)) if msg.contains("must not be empty")
        ));
        let empty = CompletionRequest::new(Vec::new());
        assert!(matches!(
            normalize(&empty, "demo", &store()),
            Err(RelayError::Validation(_))
        ));
    }

    #[test]
    fn rejects_blank_or_unknown_app() {
        let req = CompletionRequest::new(vec![ChatMessage::user("hi")]);
        assert!(matches!(
            normalize(&req, "  ", &store()),
            Err(RelayError::Validation(msg)) if msg.contains("no application is bound")
        ));
        assert!(matches!(
            normalize(&req, "other", &store()),
            Err(RelayError::Validation(msg)) if msg.contains("other")
        ));
    }

    #[test]
    fn request_body_tolerates_unknown_fields() {
        let req: CompletionRequest = serde_json::from_value(serde_json::json!({
            "model": "ignored",
            "temperature": 0.2,
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .expect("parse");
        assert_eq!(req.messages.expect("messages").len(), 1);
    }

    #[test]
    fn loads_apps_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"[{{"app_id":"a","model_id":"m","prompt":"p"}},{{"app_id":"b","model_id":"n","knowledge_ids":["k"]}}]"#
        )
        .expect("write");
        let store = InMemoryAppStore::from_json_file(file.path()).expect("load");
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("b").expect("b").knowledge_ids, vec!["k"]);
        assert!(store.get("a").expect("a").knowledge_ids.is_empty());
    }

    #[test]
    fn invalid_apps_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, "not json").expect("write");
        assert!(matches!(
            InMemoryAppStore::from_json_file(file.path()),
            Err(RelayError::Config(_))
        ));
    }
}
