use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};

use coffee_scheduler::DeliverySink;
use coffee_types::ChatAddress;
use coffee_types::api::DeliveryPayload;

/// POSTs every reminder as JSON to the chat transport.
pub struct WebhookSink {
    client: Client,
    url: String,
    attempts: u32,
    retry_delay: Duration,
}

impl WebhookSink {
    pub fn new(url: String, attempts: u32, retry_delay: Duration) -> Self {
        Self {
            client: Client::new(),
            url,
            attempts: attempts.max(1),
            retry_delay,
        }
    }

    async fn post(&self, payload: &DeliveryPayload) -> Result<()> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        if !response.status().is_success() {
            bail!("webhook answered {}", response.status());
        }
        Ok(())
    }
}

#[async_trait]
impl DeliverySink for WebhookSink {
    async fn deliver(&self, destination: ChatAddress, body: &str) -> Result<()> {
        let payload = DeliveryPayload {
            destination,
            text: body.to_string(),
        };

        let mut last_error = None;
        for attempt in 1..=self.attempts {
            match self.post(&payload).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        "Delivery to {} failed (attempt {}/{}): {}",
                        destination, attempt, self.attempts, e
                    );
                    last_error = Some(e);
                }
            }
            if attempt < self.attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("no delivery attempt was made")))
    }
}

/// Used when no webhook is configured.
pub struct LogSink;

#[async_trait]
impl DeliverySink for LogSink {
    async fn deliver(&self, destination: ChatAddress, body: &str) -> Result<()> {
        info!("Reminder for {}: {}", destination, body);
        Ok(())
    }
}
