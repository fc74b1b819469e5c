use std::path::PathBuf;

use anyhow::{Context, Result};
use url::Url;

use crate::providers::openai::adapter::DEFAULT_BASE_URL;

pub const APP_ID: &str = "com.nextstep.Mentor";
pub const APP_NAME: &str = "mentor";

const API_KEY_VAR: &str = "OPENAI_API_KEY";
const BASE_URL_VAR: &str = "OPENAI_BASE_URL";

/// Directory holding the local database: `$XDG_DATA_HOME/mentor`, falling back
/// to `$HOME/.local/share/mentor`.
pub fn data_dir() -> Result<PathBuf> {
    let base = match std::env::var("XDG_DATA_HOME") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let home = std::env::var("HOME").context("Neither XDG_DATA_HOME nor HOME is set")?;
            PathBuf::from(home).join(".local/share")
        }
    };
    Ok(base.join(APP_NAME))
}

pub fn database_path() -> Result<PathBuf> {
    Ok(data_dir()?.join(format!("{}.db", APP_NAME)))
}

/// Connection settings for the AI endpoints, read from the environment.
#[derive(Clone)]
pub struct ApiConfig {
    pub api_key: Option<String>,
    pub base_url: Url,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(API_KEY_VAR).ok().filter(|k| !k.trim().is_empty());
        let raw_base = std::env::var(BASE_URL_VAR).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&raw_base)
            .with_context(|| format!("{} is not a valid URL: {}", BASE_URL_VAR, raw_base))?;
        Ok(Self { api_key, base_url })
    }
}
