use crate::error::{Result, TodoError};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub const APP_DIR: &str = "todo-tui";
const DEFAULT_API_URL: &str = "http://localhost:4000/api";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct Config {
    pub api_url: String,
    pub timeout: Duration,
    pub log_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            log_file: data_dir().join("todo-tui.log"),
        }
    }
}

// Shape of config.toml; every key optional
#[derive(Deserialize, Debug, Default)]
struct FileConfig {
    api_url: Option<String>,
    timeout_secs: Option<u64>,
    log_file: Option<PathBuf>,
}

impl Config {
    /// Defaults, then config.toml, then the environment (.env included).
    pub fn load() -> Result<Config> {
        dotenv::dotenv().ok();

        let path = config_dir().join("config.toml");
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => Some(contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                return Err(TodoError::Config(format!(
                    "cannot read {}: {}",
                    path.display(),
                    err
                )))
            }
        };

        Config::from_sources(contents.as_deref(), |key| env::var(key).ok())
    }

    pub fn from_sources(
        file_contents: Option<&str>,
        env_var: impl Fn(&str) -> Option<String>,
    ) -> Result<Config> {
        let mut config = Config::default();

        if let Some(contents) = file_contents {
            let file: FileConfig = toml::from_str(contents)
                .map_err(|err| TodoError::Config(format!("invalid config.toml: {}", err)))?;
            if let Some(url) = file.api_url {
                config.api_url = url;
            }
            if let Some(secs) = file.timeout_secs {
                config.timeout = Duration::from_secs(secs);
            }
            if let Some(log_file) = file.log_file {
                config.log_file = log_file;
            }
        }

        if let Some(url) = env_var("TODO_API_URL") {
            config.api_url = url;
        }
        if let Some(raw) = env_var("TODO_TIMEOUT_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|_| {
                TodoError::Config(format!("TODO_TIMEOUT_SECS is not a number: {}", raw))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(path) = env_var("TODO_LOG_FILE") {
            config.log_file = PathBuf::from(path);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let url = self.api_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(TodoError::Config(format!(
                "api_url must be an http(s) URL: {}",
                self.api_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(TodoError::Config("timeout must be positive".to_string()));
        }
        Ok(())
    }
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}
