//! Configuration management for agc.
//!
//! Settings are layered, lowest precedence first:
//! 1. Built-in defaults
//! 2. The TOML config file (`<config dir>/agc/config.toml`, or `--config`)
//! 3. Environment variables
//!
//! | Key | Env | Default |
//! |---|---|---|
//! | `gemini_api_key` | `GEMINI_API_KEY` | none, required to chat |
//! | `model` | `AGC_MODEL` | `gemini-2.5-flash` |
//! | `gemini_base_url` | `AGC_GEMINI_BASE_URL` | Gemini v1beta endpoint |
//! | `temperature` | `AGC_TEMPERATURE` | `0.0` |
//! | `max_steps` | `AGC_MAX_STEPS` | `10` |
//! | `model_timeout_secs` | `AGC_MODEL_TIMEOUT_SECS` | `60` |
//! | `tool_timeout_secs` | `AGC_TOOL_TIMEOUT_SECS` | `30` |
//! | `request_timeout_secs` | `AGC_REQUEST_TIMEOUT_SECS` | `120` |
//! | `host` / `port` | `HOST` / `PORT` | `127.0.0.1` / `8080` |
//! | `dev_mode` | `DEV_MODE` | `false` |
//! | `database_path` | `AGC_DATABASE_PATH` | `<data dir>/agc/agc.db` |
//! | `encryption_key` | `AGC_ENCRYPTION_KEY` | none |
//! | `google_client_id` | `GOOGLE_CLIENT_ID` | none |
//! | `google_client_secret` | `GOOGLE_CLIENT_SECRET` | none |
//! | `google_redirect_uri` | `GOOGLE_REDIRECT_URI` | `http://localhost:8080/auth/callback` |
//! | `google_access_token` | `GOOGLE_ACCESS_TOKEN` | none |
//! | `calendar_base_url` | `AGC_CALENDAR_BASE_URL` | Calendar v3 endpoint |

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::agent::DEFAULT_MAX_STEPS;
use crate::calendar::DEFAULT_CALENDAR_BASE_URL;
use crate::llm::DEFAULT_GEMINI_BASE_URL;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Unknown config key: {0}")]
    UnknownKey(String),

    #[error("Could not determine the user config directory")]
    NoConfigDir,

    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to write config file: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Str,
    Int,
    Float,
    Bool,
}

struct Key {
    name: &'static str,
    env: &'static str,
    kind: Kind,
    secret: bool,
}

const fn key(name: &'static str, env: &'static str, kind: Kind, secret: bool) -> Key {
    Key {
        name,
        env,
        kind,
        secret,
    }
}

const KEYS: &[Key] = &[
    key("gemini_api_key", "GEMINI_API_KEY", Kind::Str, true),
    key("model", "AGC_MODEL", Kind::Str, false),
    key("gemini_base_url", "AGC_GEMINI_BASE_URL", Kind::Str, false),
    key("temperature", "AGC_TEMPERATURE", Kind::Float, false),
    key("max_steps", "AGC_MAX_STEPS", Kind::Int, false),
    key("model_timeout_secs", "AGC_MODEL_TIMEOUT_SECS", Kind::Int, false),
    key("tool_timeout_secs", "AGC_TOOL_TIMEOUT_SECS", Kind::Int, false),
    key("request_timeout_secs", "AGC_REQUEST_TIMEOUT_SECS", Kind::Int, false),
    key("host", "HOST", Kind::Str, false),
    key("port", "PORT", Kind::Int, false),
    key("dev_mode", "DEV_MODE", Kind::Bool, false),
    key("database_path", "AGC_DATABASE_PATH", Kind::Str, false),
    key("encryption_key", "AGC_ENCRYPTION_KEY", Kind::Str, true),
    key("google_client_id", "GOOGLE_CLIENT_ID", Kind::Str, false),
    key("google_client_secret", "GOOGLE_CLIENT_SECRET", Kind::Str, true),
    key("google_redirect_uri", "GOOGLE_REDIRECT_URI", Kind::Str, false),
    key("google_access_token", "GOOGLE_ACCESS_TOKEN", Kind::Str, true),
    key("calendar_base_url", "AGC_CALENDAR_BASE_URL", Kind::Str, false),
];

fn lookup_key(name: &str) -> Result<&'static Key, ConfigError> {
    KEYS.iter()
        .find(|k| k.name == name)
        .ok_or_else(|| ConfigError::UnknownKey(name.to_string()))
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Gemini API key
    pub gemini_api_key: Option<String>,

    /// Default model identifier
    pub model: String,

    pub gemini_base_url: String,

    /// Sampling temperature sent with every model call
    pub temperature: f32,

    /// Step budget of one loop run
    pub max_steps: usize,

    pub model_timeout_secs: u64,
    pub tool_timeout_secs: u64,

    /// Upper bound on one HTTP chat request; the loop is cancelled after it
    pub request_timeout_secs: u64,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Development mode (requests without a session use the local identity)
    pub dev_mode: bool,

    /// SQLite database for users and sessions
    pub database_path: PathBuf,

    /// 32-byte key (hex or base64) for encrypting stored OAuth tokens
    pub encryption_key: Option<String>,

    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub google_redirect_uri: String,

    /// Fixed bearer token for the calendar API, bypassing the session store
    pub google_access_token: Option<String>,

    pub calendar_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            model: DEFAULT_MODEL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            temperature: 0.0,
            max_steps: DEFAULT_MAX_STEPS,
            model_timeout_secs: 60,
            tool_timeout_secs: 30,
            request_timeout_secs: 120,
            host: "127.0.0.1".to_string(),
            port: 8080,
            dev_mode: false,
            database_path: default_database_path(),
            encryption_key: None,
            google_client_id: None,
            google_client_secret: None,
            google_redirect_uri: "http://localhost:8080/auth/callback".to_string(),
            google_access_token: None,
            calendar_base_url: DEFAULT_CALENDAR_BASE_URL.to_string(),
        }
    }
}

impl Config {
    /// Load defaults, the default config file (if present) and the process
    /// environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Like [`Config::from_env`], reading `path` instead of the default file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path(),
        };
        Self::load_with(path.as_deref(), |name| std::env::var(name).ok())
    }

    /// Layered load with an injectable environment lookup.
    pub fn load_with(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = path.filter(|p| p.exists()) {
            tracing::debug!("Reading config file {}", path.display());
            let table = read_table(path)?;
            for (name, value) in &table {
                let raw = match value {
                    toml::Value::String(s) => s.clone(),
                    toml::Value::Integer(i) => i.to_string(),
                    toml::Value::Float(f) => f.to_string(),
                    toml::Value::Boolean(b) => b.to_string(),
                    other => {
                        return Err(ConfigError::InvalidValue(
                            name.clone(),
                            format!("unsupported value {}", other),
                        ))
                    }
                };
                config.apply(name, &raw)?;
            }
        }

        for key in KEYS {
            if let Some(raw) = env(key.env) {
                config
                    .apply(key.name, &raw)
                    .map_err(|e| match e {
                        ConfigError::InvalidValue(_, reason) => {
                            ConfigError::InvalidValue(key.env.to_string(), reason)
                        }
                        other => other,
                    })?;
            }
        }

        Ok(config)
    }

    /// Set one setting from its textual form.
    fn apply(&mut self, name: &str, raw: &str) -> Result<(), ConfigError> {
        let key = lookup_key(name)?;
        let invalid = |reason: String| ConfigError::InvalidValue(name.to_string(), reason);
        let text = raw.trim().to_string();

        match key.name {
            "gemini_api_key" => self.gemini_api_key = non_empty(&text),
            "model" => self.model = text,
            "gemini_base_url" => self.gemini_base_url = text,
            "temperature" => {
                self.temperature = text.parse().map_err(|e| invalid(format!("{}", e)))?
            }
            "max_steps" => {
                let steps: usize = text.parse().map_err(|e| invalid(format!("{}", e)))?;
                if steps == 0 {
                    return Err(invalid("must be at least 1".to_string()));
                }
                self.max_steps = steps;
            }
            "model_timeout_secs" => {
                self.model_timeout_secs = text.parse().map_err(|e| invalid(format!("{}", e)))?
            }
            "tool_timeout_secs" => {
                self.tool_timeout_secs = text.parse().map_err(|e| invalid(format!("{}", e)))?
            }
            "request_timeout_secs" => {
                self.request_timeout_secs =
                    text.parse().map_err(|e| invalid(format!("{}", e)))?
            }
            "host" => self.host = text,
            "port" => self.port = text.parse().map_err(|e| invalid(format!("{}", e)))?,
            "dev_mode" => self.dev_mode = parse_bool(&text).map_err(invalid)?,
            "database_path" => self.database_path = PathBuf::from(text),
            "encryption_key" => self.encryption_key = non_empty(&text),
            "google_client_id" => self.google_client_id = non_empty(&text),
            "google_client_secret" => self.google_client_secret = non_empty(&text),
            "google_redirect_uri" => self.google_redirect_uri = text,
            "google_access_token" => self.google_access_token = non_empty(&text),
            "calendar_base_url" => self.calendar_base_url = text,
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    /// The Gemini API key, or an error naming how to set it.
    pub fn require_gemini_key(&self) -> Result<&str, ConfigError> {
        self.gemini_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("gemini_api_key (GEMINI_API_KEY)".to_string()))
    }

    /// Google OAuth client id and secret, when both are configured.
    pub fn google_oauth(&self) -> Option<(&str, &str)> {
        Some((
            self.google_client_id.as_deref()?,
            self.google_client_secret.as_deref()?,
        ))
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `key = value` lines for every setting, with secrets masked.
    pub fn describe(&self) -> String {
        KEYS.iter()
            .map(|key| {
                let value = self.value_of(key.name);
                let shown = match value {
                    None => "(unset)".to_string(),
                    Some(_) if key.secret => "********".to_string(),
                    Some(v) => v,
                };
                format!("{} = {}\n", key.name, shown)
            })
            .collect()
    }

    fn value_of(&self, name: &str) -> Option<String> {
        match name {
            "gemini_api_key" => self.gemini_api_key.clone(),
            "model" => Some(self.model.clone()),
            "gemini_base_url" => Some(self.gemini_base_url.clone()),
            "temperature" => Some(self.temperature.to_string()),
            "max_steps" => Some(self.max_steps.to_string()),
            "model_timeout_secs" => Some(self.model_timeout_secs.to_string()),
            "tool_timeout_secs" => Some(self.tool_timeout_secs.to_string()),
            "request_timeout_secs" => Some(self.request_timeout_secs.to_string()),
            "host" => Some(self.host.clone()),
            "port" => Some(self.port.to_string()),
            "dev_mode" => Some(self.dev_mode.to_string()),
            "database_path" => Some(self.database_path.display().to_string()),
            "encryption_key" => self.encryption_key.clone(),
            "google_client_id" => self.google_client_id.clone(),
            "google_client_secret" => self.google_client_secret.clone(),
            "google_redirect_uri" => Some(self.google_redirect_uri.clone()),
            "google_access_token" => self.google_access_token.clone(),
            "calendar_base_url" => Some(self.calendar_base_url.clone()),
            _ => None,
        }
    }
}

/// `<config dir>/agc/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("agc").join("config.toml"))
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("agc").join("agc.db"))
        .unwrap_or_else(|| PathBuf::from("agc.db"))
}

fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    Ok(text.parse::<toml::Table>()?)
}

/// Write one typed setting into the config file at `path`, creating the file
/// and its directory if needed. Other settings in the file are preserved.
pub fn set_value(path: &Path, name: &str, raw: &str) -> Result<(), ConfigError> {
    let key = lookup_key(name)?;

    // Reject ill-typed values before touching the file.
    Config::default().apply(name, raw)?;

    let text = raw.trim();
    let value = match key.kind {
        Kind::Str => toml::Value::String(text.to_string()),
        Kind::Int => toml::Value::Integer(
            text.parse()
                .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e)))?,
        ),
        Kind::Float => toml::Value::Float(
            text.parse()
                .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e)))?,
        ),
        Kind::Bool => toml::Value::Boolean(
            parse_bool(text).map_err(|e| ConfigError::InvalidValue(name.to_string(), e))?,
        ),
    };

    let mut table = if path.exists() {
        read_table(path)?
    } else {
        toml::Table::new()
    };
    table.insert(name.to_string(), value);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string(&table)?)?;
    tracing::info!("Set {} in {}", name, path.display());
    Ok(())
}

fn non_empty(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected boolean-like value, got: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_without_file_or_env() {
        let config = Config::load_with(None, env(&[])).unwrap();
        assert_eq!(config.model, "gemini-2.5-flash");
        assert_eq!(config.max_steps, 10);
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.port, 8080);
        assert!(!config.dev_mode);
        assert!(config.require_gemini_key().is_err());
    }

    #[test]
    fn env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "model = \"gemini-2.5-pro\"\nmax_steps = 4\ndev_mode = true\ntemperature = 0.5\n",
        )
        .unwrap();

        let config =
            Config::load_with(Some(path.as_path()), env(&[("AGC_MAX_STEPS", "6"), ("GEMINI_API_KEY", "k")]))
                .unwrap();

        assert_eq!(config.model, "gemini-2.5-pro");
        assert_eq!(config.max_steps, 6);
        assert!(config.dev_mode);
        assert_eq!(config.temperature, 0.5);
        assert_eq!(config.require_gemini_key().unwrap(), "k");
    }

    #[test]
    fn invalid_env_value_names_the_variable() {
        let err = Config::load_with(None, env(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(name, _) if name == "PORT"));

        let err = Config::load_with(None, env(&[("AGC_MAX_STEPS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(name, _) if name == "AGC_MAX_STEPS"));
    }

    #[test]
    fn unknown_file_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "colour = \"blue\"\n").unwrap();

        assert!(matches!(
            Config::load_with(Some(path.as_path()), env(&[])),
            Err(ConfigError::UnknownKey(k)) if k == "colour"
        ));
    }

    #[test]
    fn set_value_writes_typed_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agc").join("config.toml");

        set_value(&path, "max_steps", "5").unwrap();
        set_value(&path, "dev_mode", "yes").unwrap();
        set_value(&path, "model", "gemini-2.5-pro").unwrap();

        let table = read_table(&path).unwrap();
        assert_eq!(table["max_steps"], toml::Value::Integer(5));
        assert_eq!(table["dev_mode"], toml::Value::Boolean(true));

        let config = Config::load_with(Some(path.as_path()), env(&[])).unwrap();
        assert_eq!(config.max_steps, 5);
        assert_eq!(config.model, "gemini-2.5-pro");
    }

    #[test]
    fn set_value_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        assert!(matches!(
            set_value(&path, "nope", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            set_value(&path, "port", "http"),
            Err(ConfigError::InvalidValue(..))
        ));
        assert!(!path.exists());
    }

    #[test]
    fn describe_masks_secrets() {
        let config = Config::load_with(
            None,
            env(&[("GEMINI_API_KEY", "super-secret"), ("GOOGLE_CLIENT_ID", "client")]),
        )
        .unwrap();
        let shown = config.describe();
        assert!(!shown.contains("super-secret"));
        assert!(shown.contains("gemini_api_key = ********"));
        assert!(shown.contains("google_client_id = client"));
        assert!(shown.contains("encryption_key = (unset)"));
    }

    #[test]
    fn parse_bool_accepts_common_forms() {
        assert_eq!(parse_bool("ON"), Ok(true));
        assert_eq!(parse_bool("0"), Ok(false));
        assert!(parse_bool("maybe").is_err());
    }
}
