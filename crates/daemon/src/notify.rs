use anyhow::Result;
use async_trait::async_trait;
use dbkeeper_core::EngineError;
use dbkeeper_engine::{Notification, Notifier};
use serde::Serialize;
use tracing::debug;

/// Delivers rendered messages through an HTTP mail gateway.
///
/// Anything other than a 2xx response is a `Delivery` failure; callers
/// treat those as best-effort and never retry the backup over them.
pub struct MailGatewayNotifier {
    client: reqwest::Client,
    endpoint: String,
    credentials: String,
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    to: &'a str,
    from: &'a str,
    subject: &'a str,
    body: &'a str,
}

impl MailGatewayNotifier {
    pub fn new(endpoint: String, credentials: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            credentials,
        }
    }
}

#[async_trait]
impl Notifier for MailGatewayNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.credentials)
            .json(&OutboundMessage {
                to: &notification.recipient,
                from: &notification.sender,
                subject: &notification.subject,
                body: &notification.body,
            })
            .send()
            .await
            .map_err(|err| EngineError::Delivery(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Delivery(format!("mail gateway returned {status}")).into());
        }
        debug!(recipient = %notification.recipient, subject = %notification.subject, "notification sent");
        Ok(())
    }
}
