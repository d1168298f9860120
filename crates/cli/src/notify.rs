//! Notification verification.

use std::path::Path;

use alipay_gateway_common::params::ParamMap;
use alipay_gateway_common::verifier::verify_notify;

use crate::config::load_settings;
use crate::error::CliError;

pub(crate) fn check(file: &Path, query: &str, verbose: bool) -> Result<(), CliError> {
    let settings = load_settings(file, verbose)?;
    let alipay = &settings.alipay;
    if alipay.alipay_public_key.is_empty() {
        return Err(CliError::Config(
            "alipay.alipay_public_key or alipay.alipay_public_cert is required".into(),
        ));
    }

    let params = ParamMap::from_query_string(query)
        .map_err(|e| CliError::Input(format!("--params is not a valid query string: {:?}", e)))?;
    if verbose {
        println!("Verifying {} notification parameters", params.len());
    }

    verify_notify(
        &params,
        &alipay.alipay_public_key,
        &alipay.charset,
        &alipay.sign_type,
    )?;
    Ok(())
}

/// Verify a notification given as a URL-encoded query string.
pub fn verify(file: &Path, query: &str, verbose: bool) -> Result<(), CliError> {
    check(file, query, verbose)?;
    println!("Notification signature is valid");
    Ok(())
}
