//! Email delivery abstraction and message templates.
//!
//! The handlers build an [`EmailMessage`] and hand it to an
//! [`EmailSender`]. The sender decides how to deliver (SMTP, API, etc.)
//! and returns `Ok`/`Err`. The default sender for local dev is
//! [`LogEmailSender`], which logs and returns `Ok(())`.

use anyhow::Result;
use tracing::info;
use url::Url;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Email delivery abstraction.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error so the caller can log it.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "email send stub"
        );
        Ok(())
    }
}

pub fn build_verify_url(base: &Url, token: &str) -> Result<Url> {
    Ok(base.join("/api/v1/verify-email/")?.join(token)?)
}

pub fn build_reset_url(base: &Url, token: &str) -> Result<Url> {
    let mut url = base.join("/reset-password")?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

#[must_use]
pub fn verification_email(to: &str, fullname: &str, verify_link: &Url) -> EmailMessage {
    let html_body = format!(
        r#"<html>
  <body style="font-family: Arial, sans-serif; line-height: 1.6;">
    <h2>Welcome</h2>
    <p>Hello {fullname},</p>
    <p>Thank you for signing up. Please verify your email address to activate your account:</p>
    <p style="text-align: center;">
      <a href="{verify_link}" style="background-color: #4CAF50; color: white; padding: 10px 20px; text-decoration: none; border-radius: 5px;">
        Verify Email
      </a>
    </p>
    <p>This link will expire in 24 hours.</p>
    <p>If you did not create this account, you can ignore this email.</p>
  </body>
</html>
"#
    );
    EmailMessage {
        to: to.to_string(),
        subject: "Email Verification".to_string(),
        html_body,
    }
}

#[must_use]
pub fn password_reset_email(to: &str, fullname: &str, reset_link: &Url) -> EmailMessage {
    let html_body = format!(
        r#"<html>
  <body style="font-family: Arial, sans-serif; line-height: 1.6;">
    <h2>Password Reset</h2>
    <p>Hello {fullname},</p>
    <p>We received a request to reset your password. Use the link below to choose a new one:</p>
    <p style="text-align: center;">
      <a href="{reset_link}" style="background-color: #4CAF50; color: white; padding: 10px 20px; text-decoration: none; border-radius: 5px;">
        Reset Password
      </a>
    </p>
    <p>This link will expire in 24 hours.</p>
    <p>If you did not request a reset, you can ignore this email.</p>
  </body>
</html>
"#
    );
    EmailMessage {
        to: to.to_string(),
        subject: "Password Reset".to_string(),
        html_body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_url_embeds_token_in_path() {
        let base = Url::parse("https://app.example.com").unwrap();
        let url = build_verify_url(&base, "UA_abc123").unwrap();
        assert_eq!(
            url.as_str(),
            "https://app.example.com/api/v1/verify-email/UA_abc123"
        );
    }

    #[test]
    fn reset_url_embeds_token_in_query() {
        let base = Url::parse("https://app.example.com").unwrap();
        let url = build_reset_url(&base, "UA_abc123").unwrap();
        assert_eq!(
            url.as_str(),
            "https://app.example.com/reset-password?token=UA_abc123"
        );
    }

    #[test]
    fn verification_email_mentions_link_and_name() {
        let base = Url::parse("https://app.example.com").unwrap();
        let link = build_verify_url(&base, "UA_tok").unwrap();
        let message = verification_email("user@example.com", "Ada Lovelace", &link);
        assert_eq!(message.to, "user@example.com");
        assert!(message.html_body.contains("Ada Lovelace"));
        assert!(message.html_body.contains(link.as_str()));
    }

    #[test]
    fn log_sender_always_succeeds() {
        let message = EmailMessage {
            to: "user@example.com".to_string(),
            subject: "x".to_string(),
            html_body: "y".to_string(),
        };
        assert!(LogEmailSender.send(&message).is_ok());
    }
}
