//! Outbound notifications.
//!
//! Sending is always done through [`crate::background::BackgroundTasks`] so a
//! slow or failing notifier never holds up a response.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Unknown notification template: {0}")]
    UnknownTemplate(String),
}

/// Template sent to newly registered users.
pub const WELCOME_TEMPLATE: &str = "user_welcome";

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        template: &str,
        data: serde_json::Value,
    ) -> Result<(), NotifyError>;
}

/// Notifier that writes each message to the log instead of delivering it.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        recipient: &str,
        template: &str,
        data: serde_json::Value,
    ) -> Result<(), NotifyError> {
        let body = render(template, &data)?;
        info!(recipient = %recipient, template = %template, body = %body, "Notification sent");
        Ok(())
    }
}

fn render(template: &str, data: &serde_json::Value) -> Result<String, NotifyError> {
    match template {
        WELCOME_TEMPLATE => {
            let user_id = &data["user_id"];
            let token = data["activation_token"].as_str().unwrap_or_default();
            let expiry = data["expiry"].as_str().unwrap_or("unknown");
            Ok(format!(
                "Welcome! Your user ID is {}. Activate your account with \
                 PUT /v1/users/activated and {{\"token\": \"{}\"}}. \
                 The token can be used once and expires at {}.",
                user_id, token, expiry
            ))
        }
        other => Err(NotifyError::UnknownTemplate(other.to_string())),
    }
}
