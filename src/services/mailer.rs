use serde::Serialize;

const RESEND_URL: &str = "https://api.resend.com/emails";
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
    pub tags: Vec<(String, String)>,
}

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("email request failed: {0}")]
    Transport(String),

    #[error("email provider rejected the message: {0}")]
    Rejected(String),
}

#[async_trait::async_trait]
pub trait EmailGateway: Send + Sync {
    async fn send(&self, email: OutboundEmail) -> Result<(), EmailError>;
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<SendTag<'a>>,
}

#[derive(Serialize)]
struct SendTag<'a> {
    name: &'a str,
    value: &'a str,
}

/// Transactional email over the Resend HTTP API.
pub struct ResendMailer {
    client: reqwest::Client,
    api_key: String,
    from: String,
}

impl ResendMailer {
    pub fn new(api_key: String, from: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            from,
        }
    }
}

#[async_trait::async_trait]
impl EmailGateway for ResendMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), EmailError> {
        let body = SendRequest {
            from: &self.from,
            to: [email.to.as_str()],
            subject: &email.subject,
            html: &email.html,
            text: email.text.as_deref(),
            tags: email
                .tags
                .iter()
                .map(|(name, value)| SendTag { name, value })
                .collect(),
        };

        let response = self
            .client
            .post(RESEND_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        Err(EmailError::Rejected(format!("{status}: {detail}")))
    }
}

/// Stand-in gateway for deployments without a provider key: logs the
/// message instead of sending it.
pub struct LogMailer;

#[async_trait::async_trait]
impl EmailGateway for LogMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), EmailError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            "mailer: no provider configured, logging instead of sending"
        );
        Ok(())
    }
}
