use std::fmt;

/// Stable identifier for a generation backend implementation (for example
/// `openai` or `scripted`).
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BackendId(pub String);

impl BackendId {
    /// Creates a backend id from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_inner_value() {
        assert_eq!(BackendId::from("openai").to_string(), "openai");
    }

    #[test]
    fn backend_errors_accept_plain_names() {
        let err = crate::errors::BackendError::transport("scripted", "reset");
        assert_eq!(err.backend_id(), &BackendId::new("scripted"));
    }
}
