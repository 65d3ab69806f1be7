//! Result delivery to the evaluation server.
//!
//! Notification is fire-and-forget from the pipeline's standpoint: a failed
//! delivery is logged and the build still counts as done. The ledger hit
//! path re-delivers on resubmission, which is the retry mechanism.

use crate::request::ResultPayload;
use async_trait::async_trait;
use std::time::Duration;

const NOTIFY_TIMEOUT_SECS: u64 = 30;

/// Seam over the evaluation webhook.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, url: &str, payload: &ResultPayload) -> anyhow::Result<()>;
}

/// Plain JSON POST to the caller-supplied evaluation URL.
pub struct HttpNotifier {
    client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(NOTIFY_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, url: &str, payload: &ResultPayload) -> anyhow::Result<()> {
        let url = url::Url::parse(url)
            .map_err(|e| anyhow::anyhow!("Invalid evaluation URL {:?}: {}", url, e))?;

        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!("Evaluation server replied {}", status));
        }
        Ok(())
    }
}

/// Deliver a payload, logging any failure instead of propagating it.
pub async fn notify_best_effort(
    notifier: &dyn Notifier,
    url: &str,
    payload: &ResultPayload,
    context: &str,
) {
    if let Err(err) = notifier.notify(url, payload).await {
        tracing::warn!(task = %payload.task, context, error = %err, "Failed to notify evaluation server");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> ResultPayload {
        ResultPayload {
            email: "dev@example.com".to_string(),
            task: "demo".to_string(),
            round: 1,
            nonce: "n".to_string(),
            repo_url: "https://github.com/u/demo".to_string(),
            commit_sha: None,
            pages_url: None,
        }
    }

    #[tokio::test]
    async fn test_invalid_url_is_a_delivery_error() {
        let notifier = HttpNotifier::new().unwrap();
        let err = notifier
            .notify("not a url", &sample_payload())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid evaluation URL"));
    }

    #[tokio::test]
    async fn test_best_effort_swallows_errors() {
        let notifier = HttpNotifier::new().unwrap();
        // Must not panic or propagate.
        notify_best_effort(&notifier, "not a url", &sample_payload(), "test").await;
    }
}
