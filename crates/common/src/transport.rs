//! HTTP transport used by the executor.

use std::time::Duration;

use async_trait::async_trait;
use error_stack::{Report, ResultExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};

use crate::error::AlipayError;
use crate::params::{FileParams, ParamMap};
use crate::settings::TransportSettings;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=utf-8";

/// Sends canonical parameter sets and returns the response body.
///
/// Implementations carry no protocol knowledge and do not retry.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Posts `fields` form-encoded.
    async fn post(&self, url: &str, fields: &ParamMap) -> Result<String, Report<AlipayError>>;

    /// Posts `fields` and `files` as `multipart/form-data`.
    async fn post_multipart(
        &self,
        url: &str,
        fields: &ParamMap,
        files: &FileParams,
    ) -> Result<String, Report<AlipayError>>;
}

/// [`HttpTransport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

fn transport_error(message: impl Into<String>) -> AlipayError {
    AlipayError::Transport {
        message: message.into(),
    }
}

impl ReqwestTransport {
    /// # Errors
    ///
    /// Returns [`AlipayError::Transport`] if the HTTP client cannot be built.
    pub fn new(settings: &TransportSettings) -> Result<Self, Report<AlipayError>> {
        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(settings.timeout_secs));
        if let Some(user_agent) = &settings.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }

        let client = builder
            .build()
            .change_context(transport_error("failed to build HTTP client"))?;

        Ok(Self { client })
    }

    async fn read_body(
        url: &str,
        response: reqwest::Response,
    ) -> Result<String, Report<AlipayError>> {
        let status = response.status();
        if !status.is_success() {
            return Err(Report::new(transport_error(format!(
                "gateway returned HTTP {}",
                status
            )))
            .attach(format!("url: {}", url)));
        }

        response
            .text()
            .await
            .change_context(transport_error("failed to read response body"))
            .attach(format!("url: {}", url))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, url: &str, fields: &ParamMap) -> Result<String, Report<AlipayError>> {
        log::debug!("POST {} with {} fields", url, fields.len());

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(fields.to_query_string())
            .send()
            .await
            .change_context(transport_error("request failed"))
            .attach(format!("url: {}", url))?;

        Self::read_body(url, response).await
    }

    async fn post_multipart(
        &self,
        url: &str,
        fields: &ParamMap,
        files: &FileParams,
    ) -> Result<String, Report<AlipayError>> {
        log::debug!(
            "POST {} multipart with {} fields and {} files",
            url,
            fields.len(),
            files.len()
        );

        let mut form = Form::new();
        for (key, value) in fields.iter() {
            form = form.text(key.to_string(), value.to_string());
        }
        for (name, file) in files {
            let part = Part::bytes(file.content.clone())
                .file_name(file.file_name.clone())
                .mime_str(&file.mime_type)
                .change_context(transport_error("invalid attachment MIME type"))
                .attach(format!("field: {}", name))?;
            form = form.part(name.clone(), part);
        }

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .change_context(transport_error("request failed"))
            .attach(format!("url: {}", url))?;

        Self::read_body(url, response).await
    }
}
