//! Response and notification signature checks.

use error_stack::{Report, ResultExt};

use crate::constants::{SIGN, SIGN_TYPE};
use crate::error::AlipayError;
use crate::params::ParamMap;
use crate::parser::SignItem;
use crate::signature::{rsa_check, sign_content};

const ESCAPED_SLASH: &str = "\\/";

fn check(
    content: &str,
    sign: &str,
    public_key: &str,
    charset: &str,
    sign_type: &str,
) -> Result<bool, Report<AlipayError>> {
    rsa_check(content, sign, public_key, charset, sign_type).change_context(
        AlipayError::Verification {
            message: "signature could not be checked".into(),
        },
    )
}

/// Verifies a response signature.
///
/// Unsigned business-error responses are accepted without verification. A
/// failed check is retried once with every `\/` in the fragment replaced by
/// `/`, covering gateways that escape slashes after signing.
///
/// # Errors
///
/// Returns [`AlipayError::Verification`] if the response is unsigned (and not
/// an error) or if both checks fail.
pub fn check_response_sign(
    item: &SignItem,
    is_error: bool,
    public_key: &str,
    charset: &str,
    sign_type: &str,
) -> Result<(), Report<AlipayError>> {
    if item.sign.is_empty() {
        if is_error {
            log::warn!("skipping verification of unsigned error response");
            return Ok(());
        }
        return Err(Report::new(AlipayError::Verification {
            message: "response carries no signature".into(),
        }));
    }

    if check(&item.sign_source, &item.sign, public_key, charset, sign_type)? {
        return Ok(());
    }

    if item.sign_source.contains(ESCAPED_SLASH) {
        log::warn!("signature mismatch, retrying with unescaped slashes");
        let unescaped = item.sign_source.replace(ESCAPED_SLASH, "/");
        if check(&unescaped, &item.sign, public_key, charset, sign_type)? {
            return Ok(());
        }
    }

    Err(Report::new(AlipayError::Verification {
        message: "response signature does not match".into(),
    })
    .attach(format!("signed content: {}", item.sign_source)))
}

/// Verifies an asynchronous notification's parameters.
///
/// `sign` and `sign_type` are excluded from the signed content; the algorithm
/// is taken from the notification's own `sign_type` when present.
///
/// # Errors
///
/// Returns [`AlipayError::Verification`] if the signature is missing or
/// does not match.
pub fn verify_notify(
    params: &ParamMap,
    public_key: &str,
    charset: &str,
    default_sign_type: &str,
) -> Result<(), Report<AlipayError>> {
    let mut params = params.clone();
    let sign = params.remove(SIGN).ok_or_else(|| {
        Report::new(AlipayError::Verification {
            message: "notification carries no signature".into(),
        })
    })?;
    let sign_type = params
        .remove(SIGN_TYPE)
        .unwrap_or_else(|| default_sign_type.to_string());

    let content = sign_content(&params);
    if check(&content, &sign, public_key, charset, &sign_type)? {
        Ok(())
    } else {
        Err(Report::new(AlipayError::Verification {
            message: "notification signature does not match".into(),
        }))
    }
}
