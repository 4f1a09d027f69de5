//! Global callback: every event is POSTed as JSON to one configured URL,
//! independently of the channels the event requested.

use crate::config::CallbackConfig;
use crate::error::{NotifyError, Result};
use crate::utils::{truncate_string, MAX_BODY_LENGTH};
use crate::{DeliveryResult, RecipientResult, SendResponse};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::time::Duration;

pub const CALLBACK_CHANNEL: &str = "callback";

pub struct CallbackClient {
    client: reqwest::Client,
    url: String,
    basic_auth: Option<(String, Option<String>)>,
}

impl CallbackClient {
    /// Header pairs are applied only when `headers` has an even length.
    pub fn new(config: &CallbackConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(NotifyError::InvalidConfig("callback.url is empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        if config.headers.len() % 2 == 0 {
            for pair in config.headers.chunks(2) {
                let name = HeaderName::from_bytes(pair[0].as_bytes())
                    .map_err(|e| NotifyError::InvalidConfig(format!("callback header '{}': {e}", pair[0])))?;
                let value = HeaderValue::from_str(&pair[1])
                    .map_err(|e| NotifyError::InvalidConfig(format!("callback header '{}': {e}", pair[0])))?;
                headers.insert(name, value);
            }
        } else {
            tracing::warn!(count = config.headers.len(), "Odd number of callback header items, ignoring them");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        let basic_auth = config
            .basic_auth_user
            .as_ref()
            .filter(|u| !u.is_empty())
            .map(|u| (u.clone(), config.basic_auth_pass.clone()));

        Ok(Self {
            client,
            url: config.url.clone(),
            basic_auth,
        })
    }

    /// Posts `event` and reports the outcome under the `callback` channel
    /// name. Never fails.
    pub async fn post(&self, event: &Value) -> DeliveryResult {
        let mut request = self.client.post(&self.url).json(event);
        if let Some((user, pass)) = &self.basic_auth {
            request = request.basic_auth(user, pass.as_ref());
        }

        let outcome = match request.send().await {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                Err(NotifyError::ApiError {
                    service: CALLBACK_CHANNEL.to_string(),
                    status,
                    body: truncate_string(&body, MAX_BODY_LENGTH),
                })
            }
            Err(e) => Err(e.into()),
        };

        let result = match outcome {
            Ok(()) => {
                tracing::info!(url = %self.url, "Callback delivered");
                RecipientResult::success(&self.url)
            }
            Err(e) => {
                tracing::error!(url = %self.url, error = %e, "Callback failed");
                RecipientResult::failed(&self.url, e)
            }
        };
        DeliveryResult::from_response(
            CALLBACK_CHANNEL,
            SendResponse {
                recipient_results: vec![result],
                ..Default::default()
            },
        )
    }
}
