use super::Notifier;
use anyhow::Result;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::time::Duration;

/// Notifier that POSTs JSON payloads to a configured webhook endpoint.
/// Every call carries its own bounded timeout so a stalled endpoint cannot
/// hold up event processing for long.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    async fn post(&self, payload: &serde_json::Value) -> Result<()> {
        let resp = self.client.post(&self.url).json(payload).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let error_body = resp.text().await.unwrap_or_default();
            tracing::warn!(%status, "webhook rejected payload: {error_body}");
            anyhow::bail!("webhook returned {status}");
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<()> {
        self.post(&serde_json::json!({
            "kind": "notice",
            "title": title,
            "body": body,
        }))
        .await
    }

    async fn send_file(
        &self,
        bytes: &[u8],
        mime_type: &str,
        filename: &str,
        caption: &str,
    ) -> Result<()> {
        self.post(&serde_json::json!({
            "kind": "file",
            "filename": filename,
            "mime_type": mime_type,
            "caption": caption,
            "data": STANDARD.encode(bytes),
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::WebhookNotifier;
    use crate::sink::Notifier;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn notify_posts_title_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({
                "kind": "notice",
                "title": "Message deleted",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(
            format!("{}/hook", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap();

        notifier
            .notify("Message deleted", "details")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn send_file_posts_base64_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({
                "kind": "file",
                "filename": "1_m1.jpg",
                "mime_type": "image/jpeg",
                "data": "aGVsbG8=",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(
            format!("{}/hook", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap();

        notifier
            .send_file(b"hello", "image/jpeg", "1_m1.jpg", "recovered media")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failing_endpoint_yields_error_not_panic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier =
            WebhookNotifier::new(server.uri(), Duration::from_secs(5)).unwrap();

        assert!(notifier.notify("t", "b").await.is_err());
    }
}
