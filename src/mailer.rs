use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::{error, info};

use crate::config::AppConfig;
use crate::error::AppError;

/// Outgoing mail. Without an SMTP host the mailer stays in console
/// mode and logs what it would have sent.
#[derive(Clone)]
pub struct Mailer {
    transport: Option<SmtpTransport>,
    from: String,
}

impl Mailer {
    pub fn from_config(config: &AppConfig) -> Self {
        let transport = match &config.smtp_host {
            Some(host) => match SmtpTransport::relay(host) {
                Ok(builder) => {
                    let creds = Credentials::new(
                        config.smtp_username.clone(),
                        config.smtp_password.clone(),
                    );
                    Some(builder.credentials(creds).build())
                }
                Err(e) => {
                    error!("smtp transport setup failed: {}", e);
                    None
                }
            },
            None => None,
        };
        Self {
            transport,
            from: config.email_from.clone(),
        }
    }

    pub fn disabled(from: impl Into<String>) -> Self {
        Self {
            transport: None,
            from: from.into(),
        }
    }

    pub fn send_password_reset(&self, to: &str, link: &str) -> Result<(), AppError> {
        let transport = match &self.transport {
            Some(transport) => transport,
            None => {
                info!("password reset for {}: {}", to, link);
                return Ok(());
            }
        };

        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| AppError::internal(format!("bad sender address: {}", e)))?,
            )
            .to(to
                .parse()
                .map_err(|e| AppError::internal(format!("bad recipient address: {}", e)))?)
            .subject("Password reset")
            .header(ContentType::TEXT_PLAIN)
            .body(format!(
                "You requested a password reset.\n\n\
                 Follow this link to choose a new password:\n{}\n\n\
                 If it wasn't you, ignore this message.",
                link
            ))
            .map_err(|e| AppError::internal(e.to_string()))?;

        transport
            .send(&message)
            .map_err(|e| AppError::internal(e.to_string()))?;
        Ok(())
    }
}
