//! Certificate serial commands.

use std::fs;
use std::path::Path;

use alipay_gateway_common::cert::{cert_sn, root_cert_sn};

use crate::error::CliError;

/// Compute the gateway serial of a certificate, or of a root bundle with `root`.
pub(crate) fn serial(file: &Path, root: bool) -> Result<String, CliError> {
    let pem = fs::read_to_string(file)?;
    let sn = if root { root_cert_sn(&pem)? } else { cert_sn(&pem)? };
    Ok(sn)
}

pub fn print_serial(file: &Path, root: bool, verbose: bool) -> Result<(), CliError> {
    let sn = serial(file, root)?;
    if verbose {
        println!("{}: {}", file.display(), sn);
    } else {
        println!("{}", sn);
    }
    Ok(())
}
