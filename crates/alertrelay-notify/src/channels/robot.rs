//! HTTP plumbing shared by the group-robot channels.

use crate::error::{NotifyError, Result};
use crate::utils::{redact_token, truncate_string, MAX_BODY_LENGTH};
use crate::{RecipientResult, SendResponse};
use serde_json::Value;
use std::time::Duration;

/// Posts JSON to robot webhooks and interprets their replies.
pub(crate) struct RobotClient {
    client: reqwest::Client,
    service: &'static str,
    max_attempts: u32,
}

impl RobotClient {
    pub(crate) fn new(service: &'static str, max_attempts: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            service,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Sends `payload` to every token's webhook. URLs come from `url_for`.
    pub(crate) async fn deliver<F>(&self, tokens: &[String], payload: &Value, url_for: F) -> SendResponse
    where
        F: Fn(&str) -> Result<String>,
    {
        if tokens.is_empty() {
            return SendResponse::skipped(format!("no {} robot tokens resolved", self.service));
        }

        let mut response = SendResponse::default();
        for token in tokens {
            let shown = redact_token(token);
            let result = match url_for(token) {
                Ok(url) => {
                    let (retries, result) = self.post_with_retry(&url, payload, &shown).await;
                    response.retry_count += retries;
                    result
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    tracing::info!(service = self.service, token = %shown, "Robot message delivered");
                    response.recipient_results.push(RecipientResult::success(shown));
                }
                Err(e) => {
                    tracing::error!(service = self.service, token = %shown, error = %e, "Robot message failed");
                    response.recipient_results.push(RecipientResult::failed(shown, e));
                }
            }
        }
        response
    }

    async fn post_with_retry(&self, url: &str, payload: &Value, shown: &str) -> (u32, Result<()>) {
        let mut last_err = None;
        let mut attempts = 0u32;
        for attempt in 0..self.max_attempts {
            attempts = attempt + 1;
            match self.post_once(url, payload).await {
                Ok(()) => return (attempts - 1, Ok(())),
                Err(e) => {
                    if attempts < self.max_attempts {
                        tracing::warn!(
                            service = self.service,
                            token = %shown,
                            attempt = attempts,
                            error = %e,
                            "Robot request failed, retrying"
                        );
                        tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempt))).await;
                    }
                    last_err = Some(e);
                }
            }
        }
        let err = last_err.unwrap_or_else(|| NotifyError::ApiRejected {
            service: self.service.to_string(),
            code: -1,
            message: "no attempt made".to_string(),
        });
        (attempts.saturating_sub(1), Err(err))
    }

    async fn post_once(&self, url: &str, payload: &Value) -> Result<()> {
        let resp = self
            .client
            .post(url)
            .header("Content-Type", "application/json;charset=utf-8")
            .json(payload)
            .send()
            .await
            // The URL carries the robot token.
            .map_err(reqwest::Error::without_url)?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(NotifyError::ApiError {
                service: self.service.to_string(),
                status: status.as_u16(),
                body: truncate_string(&text, MAX_BODY_LENGTH),
            });
        }
        tracing::debug!(service = self.service, body = %truncate_string(&text, MAX_BODY_LENGTH), "Robot response");
        check_api_code(self.service, &text)
    }
}

/// Robot APIs answer 200 with an error code in the body. DingTalk and WeCom
/// use `errcode`/`errmsg`, Feishu uses `code`/`msg` or
/// `StatusCode`/`StatusMessage`. Bodies that are not JSON are accepted.
pub(crate) fn check_api_code(service: &str, body: &str) -> Result<()> {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return Ok(());
    };
    for (code_key, msg_key) in [("errcode", "errmsg"), ("code", "msg"), ("StatusCode", "StatusMessage")] {
        if let Some(code) = json.get(code_key).and_then(Value::as_i64) {
            if code != 0 {
                let message = json
                    .get(msg_key)
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                return Err(NotifyError::ApiRejected {
                    service: service.to_string(),
                    code,
                    message,
                });
            }
        }
    }
    Ok(())
}

/// Appends a URL-encoded token to a base URL.
pub(crate) fn token_url(base: &str, token: &str) -> String {
    format!("{base}{}", urlencoding::encode(token))
}
