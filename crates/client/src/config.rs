//! Runtime configuration

use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
const MIN_HISTORY_LIMIT: u32 = 1;
const MAX_HISTORY_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server base URL, without the `/api/chat` prefix.
    pub api_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Messages fetched per history reload.
    pub history_limit: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            request_timeout_secs: 60,
            connect_timeout_secs: 10,
            history_limit: 50,
        }
    }
}

impl ClientConfig {
    pub fn history_limit(&self) -> u32 {
        self.history_limit
            .clamp(MIN_HISTORY_LIMIT, MAX_HISTORY_LIMIT)
    }

    /// Base of every chat route.
    pub fn chat_base(&self) -> String {
        format!("{}/api/chat", self.api_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_limit_is_clamped() {
        let mut config = ClientConfig::default();
        assert_eq!(config.history_limit(), 50);
        config.history_limit = 0;
        assert_eq!(config.history_limit(), 1);
        config.history_limit = 500;
        assert_eq!(config.history_limit(), 100);
    }

    #[test]
    fn chat_base_tolerates_trailing_slash() {
        let config = ClientConfig {
            api_url: "https://chat.example.com/".into(),
            ..Default::default()
        };
        assert_eq!(config.chat_base(), "https://chat.example.com/api/chat");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"api_url":"http://10.0.0.2:9000"}"#).expect("deserialize");
        assert_eq!(config.api_url, "http://10.0.0.2:9000");
        assert_eq!(config.request_timeout_secs, 60);
        assert!(config.token.is_none());
    }
}
