use anyhow::Context;
use async_trait::async_trait;

use super::{AppointmentEvent, Notifier};

/// POSTs each event as JSON to a configured URL.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &AppointmentEvent) -> anyhow::Result<()> {
        self.client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .context("failed to send appointment webhook")?
            .error_for_status()
            .context("webhook endpoint returned error")?;

        tracing::debug!(kind = event.kind.as_str(), url = %self.url, "webhook delivered");
        Ok(())
    }
}
