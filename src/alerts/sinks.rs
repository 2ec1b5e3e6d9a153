//! Notification delivery.
//!
//! Sinks post rendered alerts to external HTTP gateways. Delivery is
//! best-effort: a failed send is logged by the caller and never blocks the
//! probe pipeline. Sink kinds are a closed set constructed through the
//! factory from the rule's comma-separated service list.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::config::{EmailGateway, Notifications, SmsGateway};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Sms,
    Email,
}

impl SinkKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "sms" => Some(Self::Sms),
            "email" => Some(Self::Email),
            _ => None,
        }
    }
}

/// Delivers one rendered alert to an external channel.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn kind(&self) -> SinkKind;

    async fn send(&self, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Builds sinks from the configured gateways.
///
/// The HTTP client is shared across every sink built by one factory.
pub struct SinkFactory {
    client: reqwest::Client,
    config: Notifications,
}

impl SinkFactory {
    pub fn new(config: Notifications) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to build HTTP client"),
            config,
        }
    }

    /// Resolve a comma-separated service list (`sms,email`) into sinks.
    /// Unknown tags and unconfigured gateways are logged and skipped.
    pub fn build(&self, services: &str) -> Vec<Arc<dyn NotificationSink>> {
        let mut sinks: Vec<Arc<dyn NotificationSink>> = Vec::new();

        for tag in services.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match SinkKind::from_tag(tag) {
                Some(SinkKind::Sms) => match &self.config.sms {
                    Some(gateway) => sinks.push(Arc::new(SmsSink {
                        client: self.client.clone(),
                        gateway: gateway.clone(),
                    })),
                    None => warn!("sms notifications requested but not configured"),
                },
                Some(SinkKind::Email) => match &self.config.email {
                    Some(gateway) => sinks.push(Arc::new(EmailSink {
                        client: self.client.clone(),
                        gateway: gateway.clone(),
                    })),
                    None => warn!("email notifications requested but not configured"),
                },
                None => warn!("unknown notification service: {tag}"),
            }
        }

        sinks
    }
}

/// Text messages through an SMS gateway.
pub struct SmsSink {
    client: reqwest::Client,
    gateway: SmsGateway,
}

#[async_trait]
impl NotificationSink for SmsSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Sms
    }

    async fn send(&self, _subject: &str, body: &str) -> anyhow::Result<()> {
        let recipients: Vec<_> = self
            .gateway
            .recipients
            .iter()
            .map(|msisdn| json!({ "msisdn": msisdn }))
            .collect();

        let count = recipients.len();
        let payload = json!({
            "sender": "fleetwatch",
            "message": body,
            "recipients": recipients,
        });

        self.client
            .post(&self.gateway.gateway_url)
            .query(&[("token", &self.gateway.token)])
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        info!("sent sms alert to {count} recipients");
        Ok(())
    }
}

/// E-mail through an HTTP mail gateway.
pub struct EmailSink {
    client: reqwest::Client,
    gateway: EmailGateway,
}

#[async_trait]
impl NotificationSink for EmailSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Email
    }

    async fn send(&self, subject: &str, body: &str) -> anyhow::Result<()> {
        let payload = json!({
            "from": self.gateway.from.clone(),
            "to": self.gateway.recipients.clone(),
            "subject": subject,
            "body": body,
        });

        self.client
            .post(&self.gateway.gateway_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        info!("sent email alert to {} recipients", self.gateway.recipients.len());
        Ok(())
    }
}
