use std::path::{Path, PathBuf};

use aura_llm::{DEFAULT_GEMINI_ENDPOINT, DEFAULT_GEMINI_MODEL, GEMINI_PROVIDER_ID, ProviderConfig};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};

use crate::error::{ChatResult, ConfigSnafu, MissingCredentialSnafu};
use crate::session::{
    DEFAULT_SYSTEM_INSTRUCTION, DEFAULT_TEMPERATURE, DEFAULT_TOP_P, SessionOptions,
};

pub const SETTINGS_DIRECTORY_NAME: &str = "aura";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "AURA_";
/// Plain environment variables consulted when no key is configured.
pub const CREDENTIAL_ENV_VARS: [&str; 2] = ["API_KEY", "GEMINI_API_KEY"];

pub const DEFAULT_GREETING: &str =
    "Hey, what's on your mind? Feel free to drop any files you want me to look at.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider_id: String,
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub system_instruction: String,
    pub greeting: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider_id: GEMINI_PROVIDER_ID.to_string(),
            api_key: String::new(),
            endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}

impl AppConfig {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".aura"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    /// Layers: defaults, then the JSON file if present, then `AURA_*` variables.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn load() -> ChatResult<Self> {
        Self::load_from(&Self::default_config_path())
    }

    pub fn load_from(path: &Path) -> ChatResult<Self> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// Like [`AppConfig::load_from`] with an injectable lookup for the plain
    /// credential variables.
    pub fn load_with(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ChatResult<Self> {
        let config = Self::figment(path)
            .extract::<Self>()
            .context(ConfigSnafu {
                stage: "extract-app-config",
            })?
            .with_credential_fallback(lookup)
            .normalized();

        tracing::info!(
            path = ?path,
            provider = %config.provider_id,
            model = %config.model,
            has_api_key = !config.api_key.is_empty(),
            "loaded app config"
        );
        Ok(config)
    }

    fn with_credential_fallback(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if !self.api_key.trim().is_empty() {
            return self;
        }

        if let Some(key) = CREDENTIAL_ENV_VARS
            .iter()
            .filter_map(|name| lookup(*name))
            .find(|value| !value.trim().is_empty())
        {
            self.api_key = key;
        }
        self
    }

    fn normalized(mut self) -> Self {
        self.provider_id = self.provider_id.trim().to_string();
        self.api_key = self.api_key.trim().to_string();
        self.endpoint = self.endpoint.trim().trim_end_matches('/').to_string();
        self.model = self.model.trim().to_string();

        if self.provider_id.is_empty() {
            self.provider_id = GEMINI_PROVIDER_ID.to_string();
        }
        if self.endpoint.is_empty() {
            self.endpoint = DEFAULT_GEMINI_ENDPOINT.to_string();
        }
        if self.model.is_empty() {
            self.model = DEFAULT_GEMINI_MODEL.to_string();
        }
        self
    }

    /// Fails with the fatal missing-credential error when no key was found.
    pub fn provider_config(&self) -> ChatResult<ProviderConfig> {
        ensure!(
            !self.api_key.trim().is_empty(),
            MissingCredentialSnafu {
                stage: "provider-config",
            }
        );

        Ok(ProviderConfig::new(
            self.provider_id.clone(),
            self.api_key.clone(),
            self.endpoint.clone(),
        ))
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            model_id: self.model.clone(),
            system_instruction: self.system_instruction.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;
    use crate::error::{ChatError, ErrorKind};

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_apply_without_file() {
        Jail::expect_with(|jail| {
            let path = jail.directory().join("missing.json");
            let config = AppConfig::load_with(&path, no_env).map_err(|e| e.to_string())?;

            assert_eq!(config.model, DEFAULT_GEMINI_MODEL);
            assert_eq!(config.endpoint, DEFAULT_GEMINI_ENDPOINT);
            assert_eq!(config.temperature, 0.8);
            assert_eq!(config.top_p, 0.9);
            assert_eq!(config.greeting, DEFAULT_GREETING);
            assert!(config.api_key.is_empty());
            Ok(())
        });
    }

    #[test]
    fn file_then_env_layers_override_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                SETTINGS_FILE_NAME,
                r#"{ "model": "gemini-pro", "temperature": 0.2, "api_key": "from-file" }"#,
            )?;
            jail.set_env("AURA_MODEL", "gemini-env");

            let path = jail.directory().join(SETTINGS_FILE_NAME);
            let config = AppConfig::load_with(&path, no_env).map_err(|e| e.to_string())?;

            assert_eq!(config.model, "gemini-env");
            assert_eq!(config.temperature, 0.2);
            assert_eq!(config.top_p, 0.9);
            assert_eq!(config.api_key, "from-file");
            Ok(())
        });
    }

    #[test]
    fn plain_credential_variables_fill_an_empty_key() {
        Jail::expect_with(|jail| {
            let path = jail.directory().join(SETTINGS_FILE_NAME);
            let config = AppConfig::load_with(&path, |name| {
                (name == "GEMINI_API_KEY").then(|| " secret ".to_string())
            })
            .map_err(|e| e.to_string())?;

            assert_eq!(config.api_key, "secret");
            Ok(())
        });
    }

    #[test]
    fn configured_key_wins_over_plain_variables() {
        let config = AppConfig {
            api_key: "configured".to_string(),
            ..AppConfig::default()
        }
        .with_credential_fallback(|_| Some("ambient".to_string()));

        assert_eq!(config.api_key, "configured");
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        Jail::expect_with(|jail| {
            jail.create_file(SETTINGS_FILE_NAME, r#"{ "temperature": "hot" }"#)?;

            let path = jail.directory().join(SETTINGS_FILE_NAME);
            let error = AppConfig::load_with(&path, no_env).expect_err("bad type");
            assert!(matches!(error, ChatError::Config { .. }));
            assert_eq!(error.kind(), ErrorKind::Initialization);
            Ok(())
        });
    }

    #[test]
    fn missing_key_is_fatal_at_provider_config() {
        let error = AppConfig::default()
            .provider_config()
            .expect_err("no key configured");

        assert_eq!(error.to_string(), "API_KEY environment variable not set.");
        assert_eq!(error.kind(), ErrorKind::Initialization);
    }

    #[test]
    fn session_options_follow_config() {
        let config = AppConfig {
            model: "gemini-x".to_string(),
            temperature: 0.1,
            ..AppConfig::default()
        };
        let options = config.session_options();

        assert_eq!(options.model_id, "gemini-x");
        assert_eq!(options.temperature, 0.1);
        assert_eq!(options.system_instruction, DEFAULT_SYSTEM_INSTRUCTION);
    }
}
