use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The chat-completion backends a session can be pointed at.
///
/// The serialized names match what existing settings files contain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "Deepseek")]
    DeepSeek,
    #[serde(rename = "ChatGPT")]
    ChatGpt,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::DeepSeek, ProviderKind::ChatGpt];

    /// Name shown in the UI and used as the author tag on replies.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::DeepSeek => "DeepSeek",
            ProviderKind::ChatGpt => "ChatGPT",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "deepseek" => Some(ProviderKind::DeepSeek),
            "chatgpt" | "openai" | "gpt" => Some(ProviderKind::ChatGpt),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

fn default_dark_mode() -> bool {
    true
}

/// The flat settings document.
///
/// Wire keys are fixed for compatibility with settings files written by
/// earlier releases, including the one-time install flag those releases
/// maintained.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "ia_seleccionada", default, skip_serializing_if = "Option::is_none")]
    pub selected_provider: Option<ProviderKind>,

    #[serde(rename = "api_keys", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub api_keys: BTreeMap<ProviderKind, String>,

    #[serde(rename = "conversaciones_dir", default, skip_serializing_if = "Option::is_none")]
    pub conversations_dir: Option<PathBuf>,

    #[serde(rename = "dark_mode", default = "default_dark_mode")]
    pub dark_mode: bool,

    #[serde(rename = "dependencias_instaladas", default)]
    pub dependencies_installed: bool,

    /// Very old files stored a single DeepSeek key at the top level.
    #[serde(rename = "deepseek_api_key", default, skip_serializing_if = "Option::is_none")]
    legacy_deepseek_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            selected_provider: None,
            api_keys: BTreeMap::new(),
            conversations_dir: None,
            dark_mode: true,
            dependencies_installed: false,
            legacy_deepseek_key: None,
        }
    }
}

impl Settings {
    /// Fold the legacy single-key field into the per-provider map. The map
    /// wins when both are present.
    pub fn normalized(mut self) -> Self {
        if let Some(key) = self.legacy_deepseek_key.take() {
            self.api_keys.entry(ProviderKind::DeepSeek).or_insert(key);
        }
        self
    }

    /// Stored key for a provider; empty strings count as absent.
    pub fn api_key(&self, kind: ProviderKind) -> Option<&str> {
        self.api_keys
            .get(&kind)
            .map(String::as_str)
            .filter(|key| !key.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.dark_mode);
        assert!(!settings.dependencies_installed);
        assert!(settings.selected_provider.is_none());
    }

    #[test]
    fn test_wire_keys_round_trip() {
        let mut settings = Settings::default();
        settings.selected_provider = Some(ProviderKind::DeepSeek);
        settings
            .api_keys
            .insert(ProviderKind::DeepSeek, "sk-prueba".to_string());
        settings.conversations_dir = Some(PathBuf::from("/tmp/conversaciones"));
        settings.dark_mode = false;

        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["ia_seleccionada"], "Deepseek");
        assert_eq!(json["api_keys"]["Deepseek"], "sk-prueba");
        assert_eq!(json["conversaciones_dir"], "/tmp/conversaciones");
        assert_eq!(json["dark_mode"], false);
        assert_eq!(json["dependencias_instaladas"], false);

        let loaded: Settings = serde_json::from_value(json).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_dark_mode_defaults_to_dark() {
        let loaded: Settings = serde_json::from_str("{}").unwrap();
        assert!(loaded.dark_mode);
    }

    #[test]
    fn test_legacy_deepseek_key_is_folded_in() {
        let loaded: Settings =
            serde_json::from_str(r#"{"deepseek_api_key": "sk-legado"}"#).unwrap();
        let settings = loaded.normalized();
        assert_eq!(settings.api_key(ProviderKind::DeepSeek), Some("sk-legado"));
    }

    #[test]
    fn test_api_keys_map_wins_over_legacy_key() {
        let loaded: Settings = serde_json::from_str(
            r#"{"deepseek_api_key": "sk-legado", "api_keys": {"Deepseek": "sk-actual"}}"#,
        )
        .unwrap();
        let settings = loaded.normalized();
        assert_eq!(settings.api_key(ProviderKind::DeepSeek), Some("sk-actual"));
    }

    #[test]
    fn test_empty_keys_count_as_absent() {
        let mut settings = Settings::default();
        settings
            .api_keys
            .insert(ProviderKind::ChatGpt, String::new());
        assert_eq!(settings.api_key(ProviderKind::ChatGpt), None);
    }

    #[test]
    fn test_provider_parse_is_forgiving() {
        assert_eq!(ProviderKind::parse(" DeepSeek "), Some(ProviderKind::DeepSeek));
        assert_eq!(ProviderKind::parse("openai"), Some(ProviderKind::ChatGpt));
        assert_eq!(ProviderKind::parse("claude"), None);
    }
}
