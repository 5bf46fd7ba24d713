use super::Notifier;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    title: &'a str,
    message: &'a str,
}

/// Posts `{"title": .., "message": ..}` to a webhook.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, title: &str, message: &str) -> Result<()> {
        self.client
            .post(&self.url)
            .json(&WebhookPayload { title, message })
            .send()
            .with_context(|| format!("POST {}", self.url))?
            .error_for_status()
            .context("webhook rejected notification")?;
        Ok(())
    }
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) -> Result<()> {
        log::info!("[{}] {}", title, message);
        Ok(())
    }
}
