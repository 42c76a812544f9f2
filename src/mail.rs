use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ReportConfig;
use crate::error::ReportError;
use crate::job::Mailer;

pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub to: String,
    pub cc: Vec<String>,
    pub subject: String,
    pub html: String,
}

#[derive(Serialize)]
struct SendMailRequest<'a> {
    message: GraphMessage<'a>,
    #[serde(rename = "saveToSentItems")]
    save_to_sent_items: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage<'a> {
    subject: &'a str,
    body: GraphBody<'a>,
    to_recipients: Vec<GraphRecipient<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cc_recipients: Vec<GraphRecipient<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphBody<'a> {
    content_type: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphRecipient<'a> {
    email_address: GraphAddress<'a>,
}

#[derive(Serialize)]
struct GraphAddress<'a> {
    address: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

impl<'a> From<&'a str> for GraphRecipient<'a> {
    fn from(address: &'a str) -> Self {
        Self {
            email_address: GraphAddress { address },
        }
    }
}

impl<'a> SendMailRequest<'a> {
    fn new(mail: &'a OutgoingMail) -> Self {
        Self {
            message: GraphMessage {
                subject: &mail.subject,
                body: GraphBody {
                    content_type: "HTML",
                    content: &mail.html,
                },
                to_recipients: vec![mail.to.as_str().into()],
                cc_recipients: mail.cc.iter().map(|cc| cc.as_str().into()).collect(),
            },
            save_to_sent_items: true,
        }
    }
}

/// Sends mail through Microsoft Graph using an app-only client-credentials token.
/// A fresh token is fetched for every message.
pub struct GraphMailer {
    client: Client,
    config: Arc<ReportConfig>,
}

impl GraphMailer {
    pub fn new(config: Arc<ReportConfig>) -> Result<Self, ReportError> {
        let client = Client::builder()
            .use_rustls_tls()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| ReportError::Send(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.config.authority_host, self.config.credentials.tenant_id
        )
    }

    fn send_url(&self) -> String {
        format!(
            "{}/users/{}/sendMail",
            self.config.graph_base, self.config.sender
        )
    }

    pub async fn fetch_token(&self) -> Result<String, ReportError> {
        let credentials = &self.config.credentials;
        let form = [
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("scope", GRAPH_SCOPE),
            ("grant_type", "client_credentials"),
        ];

        let response = self
            .client
            .post(self.token_url())
            .form(&form)
            .send()
            .await
            .map_err(|e| ReportError::Auth(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            tracing::error!(status = status.as_u16(), body = %body, "Token exchange rejected");
            return Err(ReportError::Auth(format!(
                "token endpoint returned status={}, body={body}",
                status.as_u16()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ReportError::Auth(format!("unreadable token response: {e}")))?;

        token
            .access_token
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ReportError::Auth("no access_token in token response".to_string()))
    }

    pub async fn deliver(&self, token: &str, mail: &OutgoingMail) -> Result<(), ReportError> {
        let response = self
            .client
            .post(self.send_url())
            .bearer_auth(token)
            .json(&SendMailRequest::new(mail))
            .send()
            .await
            .map_err(|e| ReportError::Send(format!("sendMail request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            tracing::error!(status = status.as_u16(), body = %body, "sendMail rejected");
            return Err(ReportError::Send(format!(
                "sendMail returned status={}, body={body}",
                status.as_u16()
            )));
        }

        tracing::debug!(status = status.as_u16(), to = %mail.to, "sendMail accepted");
        Ok(())
    }
}

#[async_trait]
impl Mailer for GraphMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), ReportError> {
        let token = self.fetch_token().await?;
        self.deliver(&token, mail).await
    }
}

async fn error_body(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(text) if text.len() > MAX_ERROR_BODY => {
            let mut end = MAX_ERROR_BODY;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &text[..end])
        }
        Ok(text) => text,
        Err(_) => "<no body>".to_string(),
    }
}
