use clap::Parser;
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

/// How long the guidance message stays on screen before exiting when the
/// config file has not been filled in yet.
pub const NOT_CONFIGURED_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[clap(
    name = "termchat",
    version = "0.1.0",
    about = "An interactive command-line chat client for OpenAI compatible APIs. Press Ctrl + C to exit."
)]
pub struct Config {
    #[clap(
        short('c'),
        long("config"),
        value_name = "PATH",
        help = "The JSON file holding 'openai_api_key' and 'openai_proxy'",
        default_value = "config.json"
    )]
    pub config_file: PathBuf,

    #[clap(
        long("model"),
        value_name = "MODEL_ID",
        help = "Sets the model to use for generating completions with the API",
        default_value = "gpt-3.5-turbo"
    )]
    pub model_id: String,

    #[clap(
        long("system"),
        value_name = "TEXT",
        help = "The system message sent ahead of every question",
        default_value = "You are a helpful assistant."
    )]
    pub system_prompt: String,

    #[clap(
        long("timeout"),
        value_name = "SECS",
        help = "Deadline for a single request in seconds; 0 waits forever",
        default_value_t = 60
    )]
    pub timeout_secs: u64,

    #[clap(
        short('v'),
        long,
        help = "Enable debug logging on stderr",
        default_value_t = false
    )]
    pub verbose: bool,
}

impl Config {
    pub fn from_cli() -> Self {
        Config::parse()
    }

    /// The per-request deadline, or `None` when disabled with `--timeout 0`.
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The file parsed but the key or the endpoint is blank.
    #[error("Please fill in config.json with your OpenAI API key and proxy address")]
    NotConfigured,
}

/// Credentials and endpoint read from the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    // Missing keys count as blank so they end up on the not-configured path
    #[serde(default)]
    pub openai_api_key: String,

    // Full URL of the chat completions endpoint, usually a proxy
    #[serde(default)]
    pub openai_proxy: String,
}

impl ApiConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: ApiConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if config.openai_api_key.is_empty() || config.openai_proxy.is_empty() {
            return Err(ConfigError::NotConfigured);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_filled_in_config() {
        let file = write_config(
            r#"{"openai_api_key": "k", "openai_proxy": "https://api.example/v1/chat"}"#,
        );

        let config = ApiConfig::load(file.path()).unwrap();
        assert_eq!(config.openai_api_key, "k");
        assert_eq!(config.openai_proxy, "https://api.example/v1/chat");
    }

    #[test]
    fn blank_key_is_not_configured() {
        let file = write_config(r#"{"openai_api_key": "", "openai_proxy": "https://x"}"#);
        assert!(matches!(
            ApiConfig::load(file.path()),
            Err(ConfigError::NotConfigured)
        ));
    }

    #[test]
    fn blank_proxy_is_not_configured() {
        let file = write_config(r#"{"openai_api_key": "k", "openai_proxy": ""}"#);
        assert!(matches!(
            ApiConfig::load(file.path()),
            Err(ConfigError::NotConfigured)
        ));
    }

    #[test]
    fn missing_keys_are_not_configured() {
        let file = write_config("{}");
        assert!(matches!(
            ApiConfig::load(file.path()),
            Err(ConfigError::NotConfigured)
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ApiConfig::load(dir.path().join("config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let file = write_config("openai_api_key = k");
        let err = ApiConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn cli_defaults() {
        let config = Config::parse_from(["termchat"]);
        assert_eq!(config.config_file, PathBuf::from("config.json"));
        assert_eq!(config.model_id, "gpt-3.5-turbo");
        assert_eq!(config.system_prompt, "You are a helpful assistant.");
        assert_eq!(config.timeout(), Some(Duration::from_secs(60)));
        assert!(!config.verbose);
    }

    #[test]
    fn zero_timeout_disables_the_deadline() {
        let config = Config::parse_from(["termchat", "--timeout", "0"]);
        assert_eq!(config.timeout(), None);
    }
}
