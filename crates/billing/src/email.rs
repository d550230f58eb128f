//! Email notifications for invoicing events
//!
//! Sends transactional emails via Resend API when invoices go out, fall
//! overdue, or get paid.

use crate::error::BillingResult;

/// Email configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Resend API key
    pub resend_api_key: String,
    /// From address for emails
    pub email_from: String,
    /// App name for branding
    pub app_name: String,
    /// Support email
    pub support_email: String,
    /// Base URL for payment links
    pub app_base_url: String,
}

impl EmailConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            resend_api_key: std::env::var("RESEND_API_KEY").unwrap_or_default(),
            email_from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "BildOut <noreply@bildout.com>".to_string()),
            app_name: std::env::var("APP_NAME").unwrap_or_else(|_| "BildOut".to_string()),
            support_email: std::env::var("SUPPORT_EMAIL")
                .unwrap_or_else(|_| "support@bildout.com".to_string()),
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "https://bildout.com".to_string()),
        }
    }

    /// Check if email sending is enabled
    pub fn is_enabled(&self) -> bool {
        !self.resend_api_key.is_empty()
    }
}

/// Invoice email notification service
#[derive(Clone)]
pub struct InvoiceEmailService {
    config: EmailConfig,
    client: reqwest::Client,
}

impl InvoiceEmailService {
    /// Create a new email service
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Self {
        Self::new(EmailConfig::from_env())
    }

    /// Send an email via Resend API
    ///
    /// Returns `Ok(true)` if the email was sent successfully,
    /// `Ok(false)` if sending failed (non-fatal - doesn't propagate error),
    /// `Err` only for critical configuration issues.
    ///
    /// The `Ok(false)` return lets callers track delivery status without an
    /// email outage failing invoice sends or webhook processing.
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> BillingResult<bool> {
        if !self.config.is_enabled() {
            tracing::warn!(
                to = %to,
                subject = %subject,
                "Email not configured, skipping"
            );
            return Ok(false);
        }

        #[allow(clippy::disallowed_methods)]
        // json! macro uses unwrap internally, safe for primitive types
        let body = serde_json::json!({
            "from": self.config.email_from,
            "to": [to],
            "subject": subject,
            "html": html
        });

        let response = self
            .client
            .post("https://api.resend.com/emails")
            .header(
                "Authorization",
                format!("Bearer {}", self.config.resend_api_key),
            )
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(to = %to, subject = %subject, "Invoice email sent");
                Ok(true)
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                tracing::error!(
                    to = %to,
                    subject = %subject,
                    status = %status,
                    body = %body,
                    "Failed to send invoice email - non-fatal"
                );
                Ok(false)
            }
            Err(e) => {
                tracing::error!(
                    to = %to,
                    subject = %subject,
                    error = %e,
                    "Failed to send invoice email - non-fatal"
                );
                Ok(false)
            }
        }
    }

    /// Public payment page URL for an invoice token
    fn payment_link(&self, token: uuid::Uuid) -> String {
        format!("{}/pay/{}", self.config.app_base_url, token)
    }

    /// Send a newly issued invoice to the client
    pub async fn send_invoice(
        &self,
        to: &str,
        org_name: &str,
        invoice_number: i64,
        amount_due_cents: i64,
        due_date: Option<&str>,
        token: uuid::Uuid,
    ) -> BillingResult<bool> {
        let amount = format!("${:.2}", amount_due_cents as f64 / 100.0);
        let pay_link = self.payment_link(token);
        let due_section = due_date
            .map(|d| format!("<p>Payment is due by <strong>{}</strong>.</p>", d))
            .unwrap_or_default();

        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2>Invoice #{invoice_number} from {org_name}</h2>
    <p>Hi there,</p>
    <p><strong>{org_name}</strong> has sent you an invoice for <strong>{amount}</strong>.</p>
    {due_section}
    <p>
        <a href="{pay_link}" style="display: inline-block; padding: 12px 24px; background-color: #6366f1; color: white; text-decoration: none; border-radius: 6px; font-weight: bold;">
            View &amp; Pay Invoice
        </a>
    </p>
    <p style="color: #666; font-size: 14px;">
        If you have any questions, please contact us at <a href="mailto:{support_email}">{support_email}</a>
    </p>
    <hr style="border: none; border-top: 1px solid #eee; margin: 20px 0;">
    <p style="color: #999; font-size: 12px;">{app_name}</p>
</body>
</html>"#,
            invoice_number = invoice_number,
            org_name = org_name,
            amount = amount,
            due_section = due_section,
            pay_link = pay_link,
            support_email = self.config.support_email,
            app_name = self.config.app_name,
        );

        self.send_email(
            to,
            &format!("Invoice #{} from {}", invoice_number, org_name),
            &html,
        )
        .await
    }

    /// Send an overdue payment reminder
    pub async fn send_overdue_reminder(
        &self,
        to: &str,
        org_name: &str,
        invoice_number: i64,
        amount_due_cents: i64,
        token: uuid::Uuid,
    ) -> BillingResult<bool> {
        let amount = format!("${:.2}", amount_due_cents as f64 / 100.0);
        let pay_link = self.payment_link(token);

        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2 style="color: #dc2626;">Payment Overdue</h2>
    <p>Hi there,</p>
    <p>This is a reminder that invoice <strong>#{invoice_number}</strong> from <strong>{org_name}</strong> is past due. The outstanding balance is <strong>{amount}</strong>.</p>
    <p>
        <a href="{pay_link}" style="display: inline-block; padding: 12px 24px; background-color: #6366f1; color: white; text-decoration: none; border-radius: 6px; font-weight: bold;">
            Pay Now
        </a>
    </p>
    <p style="color: #666; font-size: 14px;">
        If you have already paid, please disregard this reminder.
    </p>
    <hr style="border: none; border-top: 1px solid #eee; margin: 20px 0;">
    <p style="color: #999; font-size: 12px;">{app_name}</p>
</body>
</html>"#,
            invoice_number = invoice_number,
            org_name = org_name,
            amount = amount,
            pay_link = pay_link,
            app_name = self.config.app_name,
        );

        self.send_email(
            to,
            &format!("Payment reminder - Invoice #{}", invoice_number),
            &html,
        )
        .await
    }

    /// Send a payment receipt after a successful payment
    pub async fn send_payment_receipt(
        &self,
        to: &str,
        org_name: &str,
        invoice_number: i64,
        amount_cents: i64,
    ) -> BillingResult<bool> {
        let amount = format!("${:.2}", amount_cents as f64 / 100.0);

        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2 style="color: #16a34a;">Payment Received</h2>
    <p>Hi there,</p>
    <p>We received your payment of <strong>{amount}</strong> toward invoice <strong>#{invoice_number}</strong> from <strong>{org_name}</strong>.</p>
    <p>Thank you!</p>
    <hr style="border: none; border-top: 1px solid #eee; margin: 20px 0;">
    <p style="color: #999; font-size: 12px;">{app_name}</p>
</body>
</html>"#,
            amount = amount,
            invoice_number = invoice_number,
            org_name = org_name,
            app_name = self.config.app_name,
        );

        self.send_email(
            to,
            &format!("Payment received - Invoice #{}", invoice_number),
            &html,
        )
        .await
    }
}
