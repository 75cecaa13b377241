//! reqwest-backed client for the inference server's control endpoints.

use std::time::Duration;

use async_trait::async_trait;
use murmur_core::{
    ContextList, ControlError, ControlPort, CurrentContext, InjectRequest, ParamsPatch,
    PauseStatus,
};
use serde::de::DeserializeOwned;
use url::Url;

use crate::http::{ClientBuildError, endpoint, parse_base_url};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpControlClient {
    client: reqwest::Client,
    base: Url,
}

impl HttpControlClient {
    pub fn new(server_url: &str) -> Result<Self, ClientBuildError> {
        let base = parse_base_url(server_url)?;
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, base })
    }

    fn url(&self, path: &str) -> Url {
        endpoint(&self.base, path)
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, ControlError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ControlError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ControlError> {
    check(response)
        .await?
        .json::<T>()
        .await
        .map_err(|e| ControlError::Decode(e.to_string()))
}

fn request_error(e: &reqwest::Error) -> ControlError {
    ControlError::Request(e.to_string())
}

#[async_trait]
impl ControlPort for HttpControlClient {
    async fn update_params(&self, patch: &ParamsPatch) -> Result<(), ControlError> {
        tracing::debug!(?patch, "Forwarding parameter update");
        let response = self
            .client
            .post(self.url("update-params"))
            .json(patch)
            .send()
            .await
            .map_err(|e| request_error(&e))?;
        check(response).await.map(|_| ())
    }

    async fn toggle_pause(&self) -> Result<PauseStatus, ControlError> {
        let response = self
            .client
            .get(self.url("toggle-pause"))
            .send()
            .await
            .map_err(|e| request_error(&e))?;
        decode(response).await
    }

    async fn contexts(&self) -> Result<ContextList, ControlError> {
        let response = self
            .client
            .get(self.url("contexts"))
            .send()
            .await
            .map_err(|e| request_error(&e))?;
        decode(response).await
    }

    async fn set_context(&self, index: usize) -> Result<CurrentContext, ControlError> {
        let response = self
            .client
            .post(self.url("set-context"))
            .query(&[("context_index", index)])
            .send()
            .await
            .map_err(|e| request_error(&e))?;
        decode(response).await
    }
    async fn inject_tokens(&self, text: &str) -> Result<(), ControlError> {
        tracing::debug!(chars = text.chars().count(), "Injecting text");
        let body = InjectRequest {
            text: text.to_string(),
        };
        let response = self
            .client
            .post(self.url("inject-tokens"))
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(&e))?;
        check(response).await.map(|_| ())
    }
}
