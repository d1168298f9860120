//! Request executor.
//!
//! [`AlipayClient`] turns an [`AlipayRequest`] into a signed canonical
//! parameter set and runs it in one of four modes:
//!
//! - [`AlipayClient::page_execute`]: a browser redirect URL or auto-submit form.
//! - [`AlipayClient::execute`]: server-to-server, verified with the configured
//!   gateway public key.
//! - [`AlipayClient::certificate_execute`]: server-to-server, verified with the
//!   key pinned for the signer's certificate serial.
//! - [`AlipayClient::sdk_execute`]: a signed query string for a client SDK.
//!
//! All option validation happens before any signing or network work.

use std::sync::Arc;

use async_trait::async_trait;
use error_stack::{Report, ResultExt};

use crate::constants::{
    ACCESS_TOKEN, ALIPAY_CERT_SN, ALIPAY_ROOT_CERT_SN, APP_AUTH_TOKEN, APP_CERT_SN, APP_ID,
    BIZ_CONTENT, CHARSET, DATE_TIME_FORMAT, ENCRYPT_TYPE, FORMAT, METHOD, NOTIFY_URL, PROD_CODE,
    RETURN_URL, SIGN, SIGN_TYPE, TERMINAL_INFO, TERMINAL_TYPE, TIMESTAMP, VERSION,
};
use crate::domain::cert_download_request;
use crate::error::AlipayError;
use crate::key_manager::{CertificateFetcher, DownloadedCertificate, PublicKeyManager};
use crate::logging::is_debug_enabled;
use crate::params::{cleanup_file_params, ParamMap};
use crate::parser;
use crate::request::AlipayRequest;
use crate::response::AlipayResponse;
use crate::settings::{AlipayOptions, Settings};
use crate::signature::{
    aes_encrypt, ensure_charset, ensure_supported_encrypt_type, rsa_sign, sign_content, SignType,
};
use crate::templates::render_auto_submit_form;
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::verifier::{check_response_sign, verify_notify};

/// Per-call tokens that are not part of the merchant configuration.
#[derive(Debug, Clone, Default)]
pub struct ExecuteContext {
    pub access_token: Option<String>,
    pub app_auth_token: Option<String>,
}

impl ExecuteContext {
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_app_auth_token(mut self, token: impl Into<String>) -> Self {
        self.app_auth_token = Some(token.into());
        self
    }
}

/// How a page-mode request reaches the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMethod {
    /// Redirect URL with every parameter in the query string.
    Get,
    /// Auto-submitting HTML form.
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Page,
    Execute,
    Certificate,
    Sdk,
}

impl Mode {
    fn carries_return_url(self) -> bool {
        matches!(self, Mode::Page | Mode::Sdk)
    }
}

pub struct AlipayClient<T: HttpTransport = ReqwestTransport> {
    options: AlipayOptions,
    transport: T,
    key_manager: Arc<PublicKeyManager>,
}

impl AlipayClient<ReqwestTransport> {
    /// Builds a client with the default HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns [`AlipayError::Transport`] if the HTTP client cannot be built.
    pub fn from_settings(
        settings: &Settings,
        key_manager: Arc<PublicKeyManager>,
    ) -> Result<Self, Report<AlipayError>> {
        let transport = ReqwestTransport::new(&settings.transport)?;
        Ok(Self::new(settings.alipay.clone(), transport, key_manager))
    }
}

fn require(value: &str, field: &str) -> Result<(), Report<AlipayError>> {
    if value.trim().is_empty() {
        Err(Report::new(AlipayError::missing(field)))
    } else {
        Ok(())
    }
}

fn encryption_precondition(message: &str) -> Report<AlipayError> {
    Report::new(AlipayError::EncryptionPrecondition {
        message: message.to_string(),
    })
}

impl<T: HttpTransport> AlipayClient<T> {
    /// Creates a client sharing `key_manager` with other clients of the same
    /// configuration.
    pub fn new(options: AlipayOptions, transport: T, key_manager: Arc<PublicKeyManager>) -> Self {
        Self {
            options,
            transport,
            key_manager,
        }
    }

    pub fn options(&self) -> &AlipayOptions {
        &self.options
    }

    pub fn key_manager(&self) -> &Arc<PublicKeyManager> {
        &self.key_manager
    }

    fn validate_options(&self, mode: Mode) -> Result<(), Report<AlipayError>> {
        let options = &self.options;

        require(&options.app_id, "app_id")?;
        require(&options.sign_type, "sign_type")?;
        require(&options.app_private_key, "app_private_key")?;
        if mode == Mode::Execute {
            require(&options.alipay_public_key, "alipay_public_key")?;
        }
        require(&options.server_url, "server_url")?;
        if mode == Mode::Certificate {
            require(&options.app_cert, "app_cert")?;
            require(&options.alipay_public_cert, "alipay_public_cert")?;
            require(&options.root_cert, "root_cert")?;
            require(&options.app_cert_sn, "app_cert_sn")?;
            require(&options.root_cert_sn, "root_cert_sn")?;
        }

        options
            .sign_type
            .parse::<SignType>()
            .change_context(AlipayError::missing("sign_type"))?;
        ensure_charset(&options.charset)?;

        Ok(())
    }

    fn protocol_params<R: AlipayRequest>(
        &self,
        request: &R,
        context: &ExecuteContext,
        mode: Mode,
    ) -> Result<ParamMap, Report<AlipayError>> {
        let options = &self.options;
        let timestamp = chrono::Local::now().format(DATE_TIME_FORMAT).to_string();

        let mut params = ParamMap::new();
        params.insert(METHOD, request.api_name())?;
        params.insert(
            VERSION,
            request.api_version().unwrap_or(options.version.as_str()),
        )?;
        params.insert(APP_ID, options.app_id.as_str())?;
        params.insert(FORMAT, options.format.as_str())?;
        params.insert(TIMESTAMP, timestamp)?;
        params.insert_opt(ACCESS_TOKEN, context.access_token.as_deref())?;
        params.insert(SIGN_TYPE, options.sign_type.as_str())?;
        params.insert_opt(TERMINAL_TYPE, request.terminal_type())?;
        params.insert_opt(TERMINAL_INFO, request.terminal_info())?;
        params.insert_opt(PROD_CODE, request.prod_code())?;
        params.insert(CHARSET, options.charset.as_str())?;
        params.insert_opt(NOTIFY_URL, request.notify_url())?;
        if mode.carries_return_url() {
            params.insert_opt(RETURN_URL, request.return_url())?;
        }
        params.insert_opt(APP_AUTH_TOKEN, context.app_auth_token.as_deref())?;

        // Execute mode never sends serials; page and SDK modes send them when
        // the merchant runs in certificate mode.
        if mode != Mode::Execute {
            params.insert(APP_CERT_SN, options.app_cert_sn.as_str())?;
            params.insert(ALIPAY_ROOT_CERT_SN, options.root_cert_sn.as_str())?;
        }

        Ok(params)
    }

    fn business_params<R: AlipayRequest>(
        &self,
        request: &R,
        protocol: &mut ParamMap,
    ) -> Result<ParamMap, Report<AlipayError>> {
        let mut params = request.text_params()?;
        if !params.contains_key(BIZ_CONTENT) {
            params.insert_opt(BIZ_CONTENT, request.biz_content()?.as_deref())?;
        }

        if request.need_encrypt() {
            let options = &self.options;
            let plaintext = params
                .remove(BIZ_CONTENT)
                .ok_or_else(|| encryption_precondition("biz_content is empty"))?;
            if options.encrypt_key.is_empty() {
                return Err(encryption_precondition("encrypt_key is not configured"));
            }
            if options.encrypt_type.is_empty() {
                return Err(encryption_precondition("encrypt_type is not configured"));
            }
            ensure_supported_encrypt_type(&options.encrypt_type)?;

            params.insert(BIZ_CONTENT, aes_encrypt(&plaintext, &options.encrypt_key)?)?;
            protocol.insert(ENCRYPT_TYPE, options.encrypt_type.as_str())?;
        }

        Ok(params)
    }

    /// Validates options, assembles every field and appends `sign`.
    fn build_signed_params<R: AlipayRequest>(
        &self,
        request: &R,
        context: &ExecuteContext,
        mode: Mode,
    ) -> Result<ParamMap, Report<AlipayError>> {
        self.validate_options(mode)?;

        let mut params = self.protocol_params(request, context, mode)?;
        let business = self.business_params(request, &mut params)?;
        params
            .extend_from(&business)
            .attach(format!("method: {}", request.api_name()))?;

        let content = sign_content(&params);
        if is_debug_enabled() {
            log::debug!("sign content for {}: {}", request.api_name(), content);
        }

        let sign = rsa_sign(
            &content,
            &self.options.app_private_key,
            &self.options.charset,
            &self.options.sign_type,
        )?;
        params.insert(SIGN, sign)?;

        Ok(params)
    }

    /// Builds a signed page-mode request without contacting the gateway.
    ///
    /// [`PageMethod::Get`] returns the gateway URL with the parameters
    /// appended (`?` or `&` depending on the URL); [`PageMethod::Post`]
    /// returns an auto-submitting form.
    ///
    /// # Errors
    ///
    /// Returns [`AlipayError::Configuration`] for missing options or when the
    /// request carries attachments, and signing or encryption errors.
    pub fn page_execute<R: AlipayRequest>(
        &self,
        request: &R,
        context: &ExecuteContext,
        method: PageMethod,
    ) -> Result<String, Report<AlipayError>> {
        if !cleanup_file_params(&request.file_params()).is_empty() {
            return Err(Report::new(AlipayError::Configuration {
                field: "file_params (not supported in page mode)".into(),
            }));
        }

        let params = self.build_signed_params(request, context, Mode::Page)?;
        let server_url = &self.options.server_url;

        match method {
            PageMethod::Get => {
                let separator = if server_url.contains('?') { '&' } else { '?' };
                Ok(format!(
                    "{}{}{}",
                    server_url,
                    separator,
                    params.to_query_string()
                ))
            }
            PageMethod::Post => {
                let separator = if server_url.contains('?') { '&' } else { '?' };
                let action = format!(
                    "{}{}{}={}",
                    server_url, separator, CHARSET, self.options.charset
                );
                render_auto_submit_form(&action, "POST", &params)
            }
        }
    }

    /// Builds a key-sorted, signed, URL-encoded query string for a client SDK.
    ///
    /// # Errors
    ///
    /// Returns [`AlipayError::Configuration`] for missing options or when the
    /// request carries attachments, and signing or encryption errors.
    pub fn sdk_execute<R: AlipayRequest>(
        &self,
        request: &R,
        context: &ExecuteContext,
    ) -> Result<String, Report<AlipayError>> {
        if !cleanup_file_params(&request.file_params()).is_empty() {
            return Err(Report::new(AlipayError::Configuration {
                field: "file_params (not supported in SDK mode)".into(),
            }));
        }

        let params = self.build_signed_params(request, context, Mode::Sdk)?;
        Ok(params.sorted().to_query_string())
    }

    async fn send<R: AlipayRequest>(
        &self,
        request: &R,
        context: &ExecuteContext,
        mode: Mode,
    ) -> Result<String, Report<AlipayError>> {
        let params = self.build_signed_params(request, context, mode)?;
        let files = cleanup_file_params(&request.file_params());

        log::debug!(
            "sending {} with {} fields and {} files",
            request.api_name(),
            params.len(),
            files.len()
        );

        if files.is_empty() {
            self.transport.post(&self.options.server_url, &params).await
        } else {
            self.transport
                .post_multipart(&self.options.server_url, &params, &files)
                .await
        }
    }

    fn parse_response<R: AlipayRequest>(
        &self,
        request: &R,
        body: &str,
    ) -> Result<AlipayResponse<R::Response>, Report<AlipayError>> {
        let method = request.api_name();
        let content = if request.need_encrypt() {
            parser::decrypt_source_data(
                method,
                body,
                &self.options.encrypt_type,
                &self.options.encrypt_key,
            )?
        } else {
            body.to_string()
        };

        parser::parse(method, body, &content)
    }

    /// Sends a signed request and verifies the response with the configured
    /// gateway public key.
    ///
    /// # Errors
    ///
    /// Returns validation, signing and encryption errors before any network
    /// call, transport errors unchanged, [`AlipayError::Parse`] for malformed
    /// responses and [`AlipayError::Verification`] for bad signatures.
    pub async fn execute<R: AlipayRequest>(
        &self,
        request: &R,
        context: &ExecuteContext,
    ) -> Result<AlipayResponse<R::Response>, Report<AlipayError>> {
        let body = self.send(request, context, Mode::Execute).await?;
        let response = self.parse_response(request, &body)?;

        let item = parser::sign_item(request.api_name(), &body)?.ok_or_else(|| {
            Report::new(AlipayError::Verification {
                message: "response has no signable content".into(),
            })
        })?;
        check_response_sign(
            &item,
            response.is_error(),
            &self.options.alipay_public_key,
            &self.options.charset,
            &self.options.sign_type,
        )
        .attach(format!("method: {}", request.api_name()))?;

        Ok(response)
    }

    /// Sends a signed request in certificate mode and verifies the response
    /// with the key pinned for the signer's certificate, refreshing the
    /// certificate first if it is not pinned yet.
    ///
    /// # Errors
    ///
    /// As [`AlipayClient::execute`], plus
    /// [`AlipayError::UntrustedCertificate`] when the signer's certificate
    /// cannot be trusted.
    pub async fn certificate_execute<R: AlipayRequest>(
        &self,
        request: &R,
        context: &ExecuteContext,
    ) -> Result<AlipayResponse<R::Response>, Report<AlipayError>> {
        let body = self.send(request, context, Mode::Certificate).await?;
        let response = self.parse_response(request, &body)?;

        let item = parser::cert_item(request.api_name(), &body)?.ok_or_else(|| {
            Report::new(AlipayError::Verification {
                message: "response has no signable content".into(),
            })
        })?;

        if response.is_error() && item.sign.is_empty() {
            log::warn!(
                "skipping verification of unsigned error response for {}",
                request.api_name()
            );
            return Ok(response);
        }
        if item.cert_sn.is_empty() {
            return Err(Report::new(AlipayError::Verification {
                message: "response carries no certificate serial".into(),
            }));
        }

        let public_key = self
            .key_manager
            .ensure_pinned(&item.cert_sn, &self.options, self)
            .await?;

        check_response_sign(
            &item.sign_item(),
            response.is_error(),
            &public_key,
            &self.options.charset,
            &self.options.sign_type,
        )
        .attach(format!("method: {}", request.api_name()))?;

        Ok(response)
    }

    /// Verifies a notification with the configured gateway public key.
    ///
    /// # Errors
    ///
    /// Returns [`AlipayError::Verification`] on a missing or bad signature.
    pub fn verify_notify(&self, params: &ParamMap) -> Result<(), Report<AlipayError>> {
        require(&self.options.alipay_public_key, "alipay_public_key")?;
        verify_notify(
            params,
            &self.options.alipay_public_key,
            &self.options.charset,
            &self.options.sign_type,
        )
    }

    /// Verifies a notification in certificate mode.
    ///
    /// Notifications are checked against the configured gateway certificate.
    /// A notification naming another certificate in `alipay_cert_sn` is only
    /// accepted when that certificate is already pinned; the serial is
    /// unauthenticated, so it never triggers a download.
    ///
    /// # Errors
    ///
    /// Returns [`AlipayError::Verification`] on a bad signature or an
    /// unpinned signer certificate.
    pub fn certificate_verify_notify(&self, params: &ParamMap) -> Result<(), Report<AlipayError>> {
        self.validate_options(Mode::Certificate)?;
        let options = &self.options;
        require(&options.alipay_public_cert_sn, "alipay_public_cert_sn")?;
        require(&options.alipay_public_key, "alipay_public_key")?;

        let mut params = params.clone();
        let public_key = match params.remove(ALIPAY_CERT_SN) {
            Some(serial) if serial != options.alipay_public_cert_sn => {
                self.key_manager.get(&serial).ok_or_else(|| {
                    Report::new(AlipayError::Verification {
                        message: "notification is signed by an unpinned certificate".into(),
                    })
                    .attach(format!("alipay_cert_sn: {}", serial))
                })?
            }
            _ => options.alipay_public_key.clone(),
        };

        verify_notify(&params, &public_key, &options.charset, &options.sign_type)
    }
}

#[async_trait]
impl<T: HttpTransport> CertificateFetcher for AlipayClient<T> {
    /// Downloads a certificate in certificate mode using the local app
    /// credentials.
    ///
    /// The response is verified here only when its signer is already
    /// pinned; otherwise its signature is handed back for the key manager to
    /// check against the downloaded certificate.
    async fn fetch_certificate(
        &self,
        serial: &str,
    ) -> Result<DownloadedCertificate, Report<AlipayError>> {
        let request = cert_download_request(serial);
        let body = self
            .send(&request, &ExecuteContext::default(), Mode::Certificate)
            .await?;
        let response = self.parse_response(&request, &body)?;

        if response.is_error() {
            return Err(Report::new(AlipayError::UntrustedCertificate {
                serial: serial.to_string(),
                message: format!(
                    "certificate download failed: {} {}",
                    response.sub_code, response.sub_msg
                ),
            }));
        }

        let item = parser::cert_item(request.api_name(), &body)?.ok_or_else(|| {
            Report::new(AlipayError::Verification {
                message: "certificate download response has no signable content".into(),
            })
        })?;

        let unverified = match self.key_manager.get(&item.cert_sn) {
            Some(public_key) => {
                check_response_sign(
                    &item.sign_item(),
                    false,
                    &public_key,
                    &self.options.charset,
                    &self.options.sign_type,
                )?;
                None
            }
            None => Some(item),
        };

        Ok(DownloadedCertificate {
            content: response.data.alipay_cert_content,
            unverified,
        })
    }
}
