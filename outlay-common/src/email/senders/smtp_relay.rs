use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::PoolConfig;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

use crate::email::{EmailError, EmailMessage, SendEmail};

pub struct SmtpRelay {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpRelay {
    pub fn with_credentials(
        smtp_username: &str,
        smtp_key: &str,
        smtp_address: &str,
        max_connections: u32,
        idle_timeout: Duration,
    ) -> Result<Self, EmailError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_address)
            .map_err(|e| EmailError::RelayConnectionFailed(e.to_string()))?
            .credentials(Credentials::new(
                String::from(smtp_username),
                String::from(smtp_key),
            ))
            .pool_config(
                PoolConfig::new()
                    .max_size(max_connections)
                    .idle_timeout(idle_timeout),
            )
            .build();

        Ok(Self { transport })
    }

    pub async fn test_connection(&self) -> Result<bool, EmailError> {
        self.transport
            .test_connection()
            .await
            .map_err(|e| EmailError::RelayConnectionFailed(e.to_string()))
    }
}

#[async_trait]
impl SendEmail for SmtpRelay {
    async fn send<'a>(&self, message: EmailMessage<'a>) -> Result<(), EmailError> {
        let destination: Mailbox = message
            .destination
            .parse()
            .map_err(|_| EmailError::InvalidDestination)?;

        let content_type = if message.is_html {
            ContentType::TEXT_HTML
        } else {
            ContentType::TEXT_PLAIN
        };

        let email = Message::builder()
            .from(message.from)
            .reply_to(message.reply_to)
            .to(destination)
            .subject(message.subject)
            .header(content_type)
            .body(message.body)
            .map_err(EmailError::InvalidMessage)?;

        self.transport
            .send(email)
            .await
            .map_err(EmailError::FailedToSend)?;

        Ok(())
    }
}
