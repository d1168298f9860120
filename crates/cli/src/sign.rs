//! Offline request signing: page-mode URLs and forms, SDK strings.

use std::path::Path;
use std::sync::Arc;

use alipay_gateway_common::client::{AlipayClient, ExecuteContext, PageMethod};
use alipay_gateway_common::key_manager::PublicKeyManager;
use alipay_gateway_common::request::ApiRequest;
use serde_json::Value;

use crate::config::load_settings;
use crate::error::CliError;

/// Fields shared by the signing commands.
#[derive(Debug, Clone, Default)]
pub struct SignArgs {
    pub method: String,
    pub biz: String,
    pub notify_url: Option<String>,
    pub return_url: Option<String>,
    pub app_auth_token: Option<String>,
}

fn build_request(args: &SignArgs) -> Result<ApiRequest<Value, Value>, CliError> {
    let model: Value = serde_json::from_str(&args.biz)
        .map_err(|e| CliError::Input(format!("--biz is not valid JSON: {}", e)))?;

    let mut request = ApiRequest::new(args.method.as_str()).with_biz_model(model);
    if let Some(url) = &args.notify_url {
        request = request.with_notify_url(url.as_str());
    }
    if let Some(url) = &args.return_url {
        request = request.with_return_url(url.as_str());
    }
    Ok(request)
}

fn context(args: &SignArgs) -> ExecuteContext {
    ExecuteContext {
        access_token: None,
        app_auth_token: args.app_auth_token.clone(),
    }
}

fn client(file: &Path, verbose: bool) -> Result<AlipayClient, CliError> {
    let settings = load_settings(file, verbose)?;
    Ok(AlipayClient::from_settings(
        &settings,
        Arc::new(PublicKeyManager::new()),
    )?)
}

pub(crate) fn render_page(
    file: &Path,
    args: &SignArgs,
    get: bool,
    verbose: bool,
) -> Result<String, CliError> {
    let client = client(file, verbose)?;
    let request = build_request(args)?;
    let method = if get { PageMethod::Get } else { PageMethod::Post };
    Ok(client.page_execute(&request, &context(args), method)?)
}

pub(crate) fn render_sdk(file: &Path, args: &SignArgs, verbose: bool) -> Result<String, CliError> {
    let client = client(file, verbose)?;
    let request = build_request(args)?;
    Ok(client.sdk_execute(&request, &context(args))?)
}

/// Print a signed page-mode redirect URL (`get`) or auto-submit form.
pub fn page(file: &Path, args: &SignArgs, get: bool, verbose: bool) -> Result<(), CliError> {
    println!("{}", render_page(file, args, get, verbose)?);
    Ok(())
}

/// Print a signed SDK string.
pub fn sdk(file: &Path, args: &SignArgs, verbose: bool) -> Result<(), CliError> {
    println!("{}", render_sdk(file, args, verbose)?);
    Ok(())
}
