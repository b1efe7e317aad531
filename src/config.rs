//! Bot configuration loaded from `foreman.toml`.

use serde::Deserialize;
use std::path::Path;

/// Top-level bot configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    /// Query used when `/build` is sent without a fragment.
    #[serde(default = "default_query")]
    pub default_query: String,

    /// How often a tracker polls its build (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// After this many consecutive not-found (or failed) polls, a tracker
    /// gives up and marks the build as lost.
    #[serde(default = "default_give_up_ticks")]
    pub give_up_ticks: u32,

    /// User IDs allowed to interact with the bot. Empty = allow all users.
    #[serde(default)]
    pub allowed_user_ids: Vec<i64>,

    /// Chat IDs the bot will respond in. Empty = allow all chats.
    #[serde(default)]
    pub allowed_chat_ids: Vec<i64>,

    /// Jenkins server configuration.
    pub jenkins: JenkinsConfig,

    /// Telegram bot configuration.
    pub telegram: TelegramConfig,
}

/// Jenkins-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JenkinsConfig {
    /// Base URL of the Jenkins server, e.g. "https://ci.example.com".
    pub url: String,

    /// Username for HTTP basic auth.
    pub user: String,

    /// API token for HTTP basic auth.
    pub token: String,
}

/// Telegram-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Bot API token from @BotFather.
    pub bot_token: String,
}

fn default_query() -> String {
    "deploy".into()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_give_up_ticks() -> u32 {
    150
}

impl BotConfig {
    /// Load config from the given path.
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                color_eyre::eyre::eyre!(
                    "No config found at {}\n\n\
                     To set up foreman, create it with:\n\n\
                     [jenkins]\n\
                     url = \"https://ci.example.com\"\n\
                     user = \"bot\"\n\
                     token = \"your-api-token\"\n\n\
                     [telegram]\n\
                     bot_token = \"your-token-from-botfather\"\n",
                    path.display()
                )
            } else {
                color_eyre::eyre::eyre!("failed to read {}: {e}", path.display())
            }
        })?;
        let config: BotConfig = toml::from_str(&content)
            .map_err(|e| color_eyre::eyre::eyre!("failed to parse {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Check if a chat ID is allowed.
    pub fn is_chat_allowed(&self, chat_id: i64) -> bool {
        self.allowed_chat_ids.is_empty() || self.allowed_chat_ids.contains(&chat_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
default_query = "release"
poll_interval_secs = 5
give_up_ticks = 30
allowed_user_ids = [111, 222]
allowed_chat_ids = [-100111]

[jenkins]
url = "https://ci.example.com"
user = "bot"
token = "secret"

[telegram]
bot_token = "7000000000:AAxxxxxxxxxxxxxxxxx"
"#;
        let config: BotConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.default_query, "release");
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.give_up_ticks, 30);
        assert_eq!(config.allowed_user_ids, vec![111, 222]);
        assert_eq!(config.allowed_chat_ids, vec![-100111]);
        assert_eq!(config.jenkins.url, "https://ci.example.com");
        assert_eq!(config.jenkins.user, "bot");
        assert_eq!(config.telegram.bot_token, "7000000000:AAxxxxxxxxxxxxxxxxx");
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
[jenkins]
url = "https://ci.example.com"
user = "bot"
token = "secret"

[telegram]
bot_token = "tok"
"#;
        let config: BotConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.default_query, "deploy");
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.give_up_ticks, 150);
        assert!(config.allowed_user_ids.is_empty());
        assert!(config.allowed_chat_ids.is_empty());
    }

    #[test]
    fn test_missing_jenkins_section_is_error() {
        let result: Result<BotConfig, _> = toml::from_str(
            r#"
[telegram]
bot_token = "tok"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_is_chat_allowed_empty_list() {
        let config = minimal();
        assert!(config.is_chat_allowed(-100999));
    }

    #[test]
    fn test_is_chat_allowed_restricted() {
        let mut config = minimal();
        config.allowed_chat_ids = vec![-100111];
        assert!(config.is_chat_allowed(-100111));
        assert!(!config.is_chat_allowed(-100222));
    }

    #[test]
    fn test_reject_unknown_fields() {
        let result: Result<BotConfig, _> = toml::from_str(
            r#"
bogus_field = true

[jenkins]
url = "u"
user = "u"
token = "t"

[telegram]
bot_token = "tok"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("foreman.toml");
        std::fs::write(
            &path,
            r#"
default_query = "nightly"

[jenkins]
url = "https://ci.example.com"
user = "bot"
token = "secret"

[telegram]
bot_token = "tok"
"#,
        )
        .unwrap();

        let config = BotConfig::load(&path).unwrap();
        assert_eq!(config.default_query, "nightly");
        assert_eq!(config.jenkins.user, "bot");
    }

    #[test]
    fn test_load_missing_file_mentions_setup() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = BotConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("To set up foreman"));
    }

    fn minimal() -> BotConfig {
        toml::from_str(
            r#"
[jenkins]
url = "https://ci.example.com"
user = "bot"
token = "secret"

[telegram]
bot_token = "tok"
"#,
        )
        .unwrap()
    }
}
