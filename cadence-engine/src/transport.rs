//! Outbound email transport.
//!
//! Transports never fail with an error: a provider problem is reported as
//! [`SendOutcome::Failed`] so callers can record it per recipient and move on.

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use cadence_common::internal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A fully rendered email ready to hand to a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

impl OutboundEmail {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            html: html.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { message_id: Option<String> },
    Failed { error: String },
}

impl SendOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Sent { .. } => None,
            Self::Failed { error } => Some(error),
        }
    }
}

#[async_trait]
pub trait EmailTransport: Send + Sync + Debug {
    async fn send(&self, email: &OutboundEmail) -> SendOutcome;
}

/// Writes every email to the log and reports success with a generated id.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

#[async_trait]
impl EmailTransport for LogTransport {
    async fn send(&self, email: &OutboundEmail) -> SendOutcome {
        let message_id = ulid::Ulid::new().to_string();
        info!(to = %email.to, subject = %email.subject, %message_id, "Email dispatched");
        internal!("Email body for {message_id}: {} bytes", email.html.len());

        SendOutcome::Sent {
            message_id: Some(message_id),
        }
    }
}

/// Stand-in used when no provider is configured. Nothing leaves the process
/// and every send reports success without a message id.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledTransport;

#[async_trait]
impl EmailTransport for DisabledTransport {
    async fn send(&self, email: &OutboundEmail) -> SendOutcome {
        warn!(to = %email.to, "Email transport disabled, skipping send");
        SendOutcome::Sent { message_id: None }
    }
}

/// Transport selection.
///
/// ```ron
/// transport: Log,
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportConfig {
    #[default]
    Log,
    Disabled,
}

impl TransportConfig {
    pub fn build(self) -> Arc<dyn EmailTransport> {
        match self {
            Self::Log => Arc::new(LogTransport),
            Self::Disabled => {
                warn!("No email transport configured, sends will be skipped");
                Arc::new(DisabledTransport)
            }
        }
    }
}
