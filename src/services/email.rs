use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::SmtpConfig;

/// Outbound notification capability: deliver a one-time code to an address.
/// Constructor-injected wherever it is needed; never a process-global.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_login_code(&self, to_email: &str, code: &str) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct SmtpEmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl SmtpEmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, anyhow::Error> {
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let mailer = SmtpTransport::relay(&config.host)
            .map_err(|e| anyhow::anyhow!("Failed to build SMTP transport: {}", e))?
            .credentials(creds)
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, "Email service initialized");

        Ok(Self {
            mailer,
            from_email: config.from.clone(),
        })
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailService {
    async fn send_login_code(&self, to_email: &str, code: &str) -> Result<(), anyhow::Error> {
        let html_body = format!(
            r#"<html>
  <body style="font-family: Arial, sans-serif;">
    <h2>Verification code</h2>
    <p>A sign-in to your account was requested. Your verification code is:</p>
    <div style="background: #f8f9fa; padding: 20px; text-align: center; border-radius: 8px;">
      <h1 style="letter-spacing: 5px; margin: 0;">{code}</h1>
    </div>
    <p style="color: #666; font-size: 12px;">
      This code expires in 10 minutes. If you did not request it, ignore this message.
    </p>
  </body>
</html>"#
        );

        let plain_body = format!(
            "Your verification code is: {}\n\nThis code expires in 10 minutes. \
             If you did not request it, ignore this message.",
            code
        );

        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| anyhow::Error::new(e))?,
            )
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| anyhow::Error::new(e))?)
            .subject("Your verification code")
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )
            .map_err(anyhow::Error::new)?;

        // The sync transport blocks; run it off the async runtime.
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(anyhow::Error::new)?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, "Verification code sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, to = %to_email, "Failed to send verification code");
                Err(anyhow::anyhow!("SMTP send failed: {}", e))
            }
        }
    }
}

/// In-memory provider for tests: records deliveries, optionally fails.
#[derive(Default)]
pub struct MockEmailService {
    pub sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider whose every dispatch fails, for partial-failure tests.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Last code delivered to the given address, if any.
    pub fn last_code_for(&self, to_email: &str) -> Option<String> {
        self.sent
            .lock()
            .ok()?
            .iter()
            .rev()
            .find(|(to, _)| to == to_email)
            .map(|(_, code)| code.clone())
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_login_code(&self, to_email: &str, code: &str) -> Result<(), anyhow::Error> {
        if self.fail {
            return Err(anyhow::anyhow!("mock delivery failure"));
        }
        self.sent
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock mailbox mutex poisoned: {}", e))?
            .push((to_email.to_string(), code.to_string()));
        Ok(())
    }
}
