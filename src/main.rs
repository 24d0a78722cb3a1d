mod api;
mod config;
mod repl;

use std::{process::exit, time::Duration};

use anyhow::{Context, Result};
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use api::ApiClient;
use config::{ApiConfig, Config, ConfigError, NOT_CONFIGURED_DELAY};

#[tokio::main]
async fn main() {
    let config = Config::from_cli();

    let level = if config.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("ERROR: {}", e);
        exit(1);
    }

    if let Err(e) = start(config, NOT_CONFIGURED_DELAY).await {
        error!("{:#}", e);
        exit(1);
    }

    // stdin may still be blocked on a read, so don't wait on the runtime to wind down
    exit(0);
}

/// Loads the config file and runs the chat loop. A blank config prints the
/// setup guidance, waits `not_configured_delay` and returns without sending anything.
async fn start(config: Config, not_configured_delay: Duration) -> Result<()> {
    let api = match ApiConfig::load(&config.config_file) {
        Ok(api) => api,
        Err(ConfigError::NotConfigured) => {
            println!("{}", ConfigError::NotConfigured);
            tokio::time::sleep(not_configured_delay).await;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let client = ApiClient::new(&config, api).context("failed to build the HTTP client")?;
    repl::run(client).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use wiremock::{matchers::method, Mock, MockServer, ResponseTemplate};

    fn config_for(file: &NamedTempFile) -> Config {
        let path = file.path().to_str().unwrap();
        Config::parse_from(["termchat", "--config", path])
    }

    #[tokio::test]
    async fn blank_config_exits_cleanly_without_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"openai_api_key": "", "openai_proxy": "{}"}}"#,
            server.uri()
        )
        .unwrap();

        start(config_for(&file), Duration::ZERO).await.unwrap();
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_config_is_fatal() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = start(config_for(&file), Duration::ZERO).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Parse { .. })
        ));
    }
}
