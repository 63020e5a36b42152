//! Delivery of email verification links.

use async_trait::async_trait;

/// A verification message ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationMail {
    pub to: String,
    pub name: String,
    pub link: String,
}

#[async_trait]
pub trait VerificationMailer: Send + Sync {
    async fn send_verification(&self, mail: VerificationMail) -> anyhow::Result<()>;
}

/// Writes the verification link to the log instead of sending mail.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl VerificationMailer for LogMailer {
    async fn send_verification(&self, mail: VerificationMail) -> anyhow::Result<()> {
        tracing::info!(
            to = %mail.to,
            link = %mail.link,
            "Verification mail for {}",
            mail.name
        );
        Ok(())
    }
}

/// Build the link a user follows to verify their address.
pub fn verification_link(base_url: &str, token: &str) -> String {
    format!(
        "{}/api/auth/verify?token={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(token)
    )
}
