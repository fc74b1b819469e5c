use std::sync::Arc;

use anyhow::{Context, Result};
use oo7::Keyring;

use crate::config::APP_ID;

const ATTR_APP: &str = "application";
const ATTR_SERVICE: &str = "service";

/// The only secret the mentor keeps.
pub const OPENAI_SERVICE: &str = "openai";

/// API keys in the desktop Secret Service, used when the environment does
/// not provide one.
#[derive(Debug, Clone)]
pub struct KeyringService {
    keyring: Arc<Keyring>,
}

impl KeyringService {
    pub async fn new() -> Result<Self> {
        let keyring = Keyring::new()
            .await
            .context("Failed to initialize keyring")?;
        Ok(Self {
            keyring: Arc::new(keyring),
        })
    }

    pub async fn store_api_key(&self, service: &str, key: &str) -> Result<()> {
        let attributes = attributes(service);
        self.keyring
            .create_item(
                &format!("Mentor API Key ({})", service),
                &attributes,
                key.trim(),
                true, // replace
            )
            .await
            .context("Failed to store API key in keyring")?;
        tracing::info!(%service, "API key stored");
        Ok(())
    }

    pub async fn api_key(&self, service: &str) -> Result<Option<String>> {
        let items = self
            .keyring
            .search_items(&attributes(service))
            .await
            .context("Failed to search keyring")?;

        let Some(item) = items.first() else {
            return Ok(None);
        };
        let secret = item.secret().await.context("Failed to read API key")?;
        let key = String::from_utf8(secret.to_vec()).context("API key is not valid UTF-8")?;
        Ok(Some(key))
    }

    pub async fn forget_api_key(&self, service: &str) -> Result<()> {
        self.keyring
            .delete(&attributes(service))
            .await
            .context("Failed to delete API key from keyring")
    }
}

fn attributes(service: &str) -> Vec<(&'static str, &str)> {
    vec![(ATTR_APP, APP_ID), (ATTR_SERVICE, service)]
}
