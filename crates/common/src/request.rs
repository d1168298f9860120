//! Request capabilities and the generic request carrier.
//!
//! Every gateway operation is described by an [`AlipayRequest`]: the API name,
//! its business model, and a handful of optional capabilities (explicit API
//! version, attachments, payload encryption) that the executor queries
//! instead of inspecting concrete request types.

use std::marker::PhantomData;

use error_stack::{Report, ResultExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::AlipayError;
use crate::params::{FileItem, FileParams, ParamMap};

/// A single gateway operation.
pub trait AlipayRequest: Send + Sync {
    /// Payload type of the operation's response node.
    type Response: DeserializeOwned + Send;

    /// Gateway method name, e.g. `alipay.trade.page.pay`.
    fn api_name(&self) -> &str;

    /// Overrides the configured protocol version.
    fn api_version(&self) -> Option<&str> {
        None
    }

    /// Caller-supplied text parameters, merged with protocol fields.
    ///
    /// A `biz_content` entry here takes precedence over the business model.
    ///
    /// # Errors
    ///
    /// Returns [`AlipayError::DuplicateParameter`] on colliding keys.
    fn text_params(&self) -> Result<ParamMap, Report<AlipayError>>;

    /// Serialized business model, if the request carries one.
    ///
    /// # Errors
    ///
    /// Returns [`AlipayError::Parse`] if the model cannot be serialized.
    fn biz_content(&self) -> Result<Option<String>, Report<AlipayError>>;

    fn notify_url(&self) -> Option<&str> {
        None
    }

    fn return_url(&self) -> Option<&str> {
        None
    }

    fn terminal_type(&self) -> Option<&str> {
        None
    }

    fn terminal_info(&self) -> Option<&str> {
        None
    }

    fn prod_code(&self) -> Option<&str> {
        None
    }

    /// Whether `biz_content` must be AES-encrypted before signing.
    fn need_encrypt(&self) -> bool {
        false
    }

    /// File attachments; a non-empty set switches execution to multipart.
    fn file_params(&self) -> FileParams {
        Vec::new()
    }
}

fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}

/// Serializes a business model into the `biz_content` wire form.
///
/// The output is compact JSON in field declaration order, with `null` members
/// removed at every depth. `/` and non-ASCII characters are written as-is;
/// the gateway signs exactly these bytes.
///
/// # Errors
///
/// Returns [`AlipayError::Parse`] if the model cannot be represented as JSON.
pub fn serialize_biz_model<M: Serialize + ?Sized>(model: &M) -> Result<String, Report<AlipayError>> {
    let value = serde_json::to_value(model).change_context(AlipayError::Parse {
        message: "business model is not serializable".into(),
    })?;

    serde_json::to_string(&strip_nulls(value)).change_context(AlipayError::Parse {
        message: "business model is not serializable".into(),
    })
}

/// Generic request carrying a business model `M` and expecting payload `R`.
#[derive(Debug, Clone)]
pub struct ApiRequest<M, R> {
    method: String,
    version: Option<String>,
    biz_model: Option<M>,
    extra_params: Vec<(String, String)>,
    notify_url: Option<String>,
    return_url: Option<String>,
    terminal_type: Option<String>,
    terminal_info: Option<String>,
    prod_code: Option<String>,
    need_encrypt: bool,
    files: FileParams,
    response: PhantomData<fn() -> R>,
}

impl<M, R> ApiRequest<M, R> {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            version: None,
            biz_model: None,
            extra_params: Vec::new(),
            notify_url: None,
            return_url: None,
            terminal_type: None,
            terminal_info: None,
            prod_code: None,
            need_encrypt: false,
            files: Vec::new(),
            response: PhantomData,
        }
    }

    #[must_use]
    pub fn with_biz_model(mut self, model: M) -> Self {
        self.biz_model = Some(model);
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Adds a raw text parameter. Passing `biz_content` bypasses model
    /// serialization.
    #[must_use]
    pub fn with_text_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_notify_url(mut self, url: impl Into<String>) -> Self {
        self.notify_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_return_url(mut self, url: impl Into<String>) -> Self {
        self.return_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_terminal(mut self, terminal_type: impl Into<String>, terminal_info: impl Into<String>) -> Self {
        self.terminal_type = Some(terminal_type.into());
        self.terminal_info = Some(terminal_info.into());
        self
    }

    #[must_use]
    pub fn with_prod_code(mut self, prod_code: impl Into<String>) -> Self {
        self.prod_code = Some(prod_code.into());
        self
    }

    #[must_use]
    pub fn with_encryption(mut self, need_encrypt: bool) -> Self {
        self.need_encrypt = need_encrypt;
        self
    }

    #[must_use]
    pub fn with_file(mut self, field: impl Into<String>, file: FileItem) -> Self {
        self.files.push((field.into(), file));
        self
    }

    pub fn biz_model(&self) -> Option<&M> {
        self.biz_model.as_ref()
    }
}

impl<M, R> AlipayRequest for ApiRequest<M, R>
where
    M: Serialize + Send + Sync,
    R: DeserializeOwned + Send,
{
    type Response = R;

    fn api_name(&self) -> &str {
        &self.method
    }

    fn api_version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn text_params(&self) -> Result<ParamMap, Report<AlipayError>> {
        let mut params = ParamMap::new();
        for (key, value) in &self.extra_params {
            params.insert(key.as_str(), value.as_str())?;
        }
        Ok(params)
    }

    fn biz_content(&self) -> Result<Option<String>, Report<AlipayError>> {
        self.biz_model.as_ref().map(serialize_biz_model).transpose()
    }

    fn notify_url(&self) -> Option<&str> {
        self.notify_url.as_deref()
    }

    fn return_url(&self) -> Option<&str> {
        self.return_url.as_deref()
    }

    fn terminal_type(&self) -> Option<&str> {
        self.terminal_type.as_deref()
    }

    fn terminal_info(&self) -> Option<&str> {
        self.terminal_info.as_deref()
    }

    fn prod_code(&self) -> Option<&str> {
        self.prod_code.as_deref()
    }

    fn need_encrypt(&self) -> bool {
        self.need_encrypt
    }

    fn file_params(&self) -> FileParams {
        self.files.clone()
    }
}
