use serde::Deserialize;

/// Application configuration. The embedder deserializes this from whatever
/// source it uses (a config file, environment variables) and passes it in
/// by reference; the core only reads it when rendering notification
/// content.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // non-secrets
    org_name: String,
    #[serde(default)]
    support_contact: Option<String>,
}

impl Config {
    /// Organization name used in notification subjects and bodies.
    pub fn org_name(&self) -> &str {
        &self.org_name
    }

    /// Optional support contact mentioned in the welcome notification.
    pub fn support_contact(&self) -> Option<&str> {
        self.support_contact.as_deref()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            org_name: "Votechain".to_string(),
            support_contact: None,
        }
    }
}
