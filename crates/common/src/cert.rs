//! X.509 helpers for certificate-mode signing.
//!
//! The gateway identifies certificates by a derived serial: the lowercase hex
//! MD5 of the issuer distinguished name (RDNs reversed so the `CN` comes
//! first, joined by `,`) followed by the decimal certificate serial number.
//! The root serial is the `_`-joined serials of every RSA-signed certificate
//! in the root bundle.

use base64::{engine::general_purpose, Engine};
use error_stack::{Report, ResultExt};
use md5::{Digest, Md5};
use x509_parser::certificate::X509Certificate;
use x509_parser::objects::{oid2abbrev, oid_registry};
use x509_parser::oid_registry::{OID_PKCS1_SHA1WITHRSA, OID_PKCS1_SHA256WITHRSA};
use x509_parser::pem::Pem;
use x509_parser::prelude::FromDer;
use x509_parser::x509::X509Name;

use crate::error::AlipayError;

/// Upper bound on issuer hops walked by [`is_trusted`].
const MAX_CHAIN_DEPTH: usize = 8;

/// Splits a PEM bundle into DER-encoded certificates, in file order.
///
/// # Errors
///
/// Returns [`AlipayError::Certificate`] if the PEM is malformed or contains no
/// certificate.
pub fn load_der_chain(pem: &str) -> Result<Vec<Vec<u8>>, Report<AlipayError>> {
    let mut ders = Vec::new();
    for block in Pem::iter_from_buffer(pem.as_bytes()) {
        let block = block.map_err(|e| {
            Report::new(AlipayError::Certificate {
                message: format!("malformed PEM block: {}", e),
            })
        })?;
        if block.label == "CERTIFICATE" {
            ders.push(block.contents);
        }
    }

    if ders.is_empty() {
        return Err(Report::new(AlipayError::Certificate {
            message: "no certificate found in PEM content".into(),
        }));
    }

    Ok(ders)
}

fn parse_der(der: &[u8]) -> Result<X509Certificate<'_>, Report<AlipayError>> {
    X509Certificate::from_der(der)
        .map(|(_, cert)| cert)
        .map_err(|e| {
            Report::new(AlipayError::Certificate {
                message: format!("X.509 parse failure: {}", e),
            })
        })
}

fn parse_all(ders: &[Vec<u8>]) -> Result<Vec<X509Certificate<'_>>, Report<AlipayError>> {
    ders.iter().map(|der| parse_der(der)).collect()
}

/// Accepts certificate content either as PEM text or as base64-encoded PEM.
///
/// The certificate download API returns the latter.
///
/// # Errors
///
/// Returns [`AlipayError::Certificate`] if the content is neither.
pub fn decode_cert_content(content: &str) -> Result<String, Report<AlipayError>> {
    let trimmed = content.trim();
    if trimmed.starts_with("-----BEGIN") {
        return Ok(trimmed.to_string());
    }

    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = general_purpose::STANDARD
        .decode(compact)
        .change_context(AlipayError::Certificate {
            message: "certificate content is neither PEM nor base64".into(),
        })?;

    let pem = String::from_utf8(bytes).change_context(AlipayError::Certificate {
        message: "decoded certificate content is not UTF-8".into(),
    })?;
    Ok(pem.trim().to_string())
}

fn issuer_dn(name: &X509Name<'_>) -> String {
    let registry = oid_registry();
    let mut parts: Vec<String> = name
        .iter()
        .flat_map(|rdn| rdn.iter())
        .map(|attr| {
            let key = oid2abbrev(attr.attr_type(), registry)
                .map(str::to_string)
                .unwrap_or_else(|_| attr.attr_type().to_id_string());
            let value = attr
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|_| hex::encode(attr.attr_value().data));
            format!("{}={}", key, value)
        })
        .collect();

    // DER order is country first; the serial uses CN-first order.
    if !parts.first().is_some_and(|p| p.starts_with("CN=")) {
        parts.reverse();
    }
    parts.join(",")
}

fn serial_of(cert: &X509Certificate<'_>) -> String {
    let input = format!("{}{}", issuer_dn(cert.issuer()), cert.tbs_certificate.serial);
    hex::encode(Md5::digest(input.as_bytes()))
}

/// Derives the gateway serial of the first certificate in `pem`.
///
/// # Errors
///
/// Returns [`AlipayError::Certificate`] if the certificate cannot be parsed.
pub fn cert_sn(pem: &str) -> Result<String, Report<AlipayError>> {
    let ders = load_der_chain(pem)?;
    let cert = parse_der(&ders[0])?;
    Ok(serial_of(&cert))
}

/// Derives the root serial for a root bundle.
///
/// Only certificates signed with SHA1withRSA or SHA256withRSA contribute.
///
/// # Errors
///
/// Returns [`AlipayError::Certificate`] if the bundle cannot be parsed or
/// contains no RSA-signed certificate.
pub fn root_cert_sn(pem: &str) -> Result<String, Report<AlipayError>> {
    let ders = load_der_chain(pem)?;
    let certs = parse_all(&ders)?;

    let serials: Vec<String> = certs
        .iter()
        .filter(|cert| {
            let alg = &cert.signature_algorithm.algorithm;
            *alg == OID_PKCS1_SHA1WITHRSA || *alg == OID_PKCS1_SHA256WITHRSA
        })
        .map(serial_of)
        .collect();

    if serials.is_empty() {
        return Err(Report::new(AlipayError::Certificate {
            message: "root bundle contains no RSA-signed certificate".into(),
        }));
    }

    Ok(serials.join("_"))
}

/// Extracts the subject public key of the first certificate as base64 SPKI DER.
///
/// # Errors
///
/// Returns [`AlipayError::Certificate`] if the certificate cannot be parsed.
pub fn public_key_base64(pem: &str) -> Result<String, Report<AlipayError>> {
    let ders = load_der_chain(pem)?;
    let cert = parse_der(&ders[0])?;
    Ok(general_purpose::STANDARD.encode(cert.public_key().raw))
}

fn issued_by(cert: &X509Certificate<'_>, issuer: &X509Certificate<'_>) -> bool {
    cert.issuer().as_raw() == issuer.subject().as_raw()
        && cert.verify_signature(Some(issuer.public_key())).is_ok()
}

/// Checks that the first certificate of `cert_pem` chains to `root_pem`.
///
/// Every certificate on the path must be within its validity period and be
/// signed by the next one; the path must end at a certificate from the root
/// bundle. Intermediates may be supplied after the leaf in `cert_pem`.
///
/// # Errors
///
/// Returns [`AlipayError::Certificate`] if either input cannot be parsed.
pub fn is_trusted(cert_pem: &str, root_pem: &str) -> Result<bool, Report<AlipayError>> {
    let chain_ders = load_der_chain(cert_pem)?;
    let root_ders = load_der_chain(root_pem)?;
    let chain = parse_all(&chain_ders)?;
    let roots = parse_all(&root_ders)?;

    let mut current = &chain[0];
    for _ in 0..MAX_CHAIN_DEPTH {
        if !current.validity().is_valid() {
            log::warn!(
                "certificate {} is outside its validity period",
                serial_of(current)
            );
            return Ok(false);
        }

        if let Some(root) = roots.iter().find(|root| issued_by(current, root)) {
            return Ok(root.validity().is_valid());
        }

        match chain
            .iter()
            .find(|next| !std::ptr::eq(*next, current) && issued_by(current, next))
        {
            Some(next) => current = next,
            None => return Ok(false),
        }
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::tests::{
        APP_CERT, APP_CERT_SN, GATEWAY_CERT, GATEWAY_CERT_SN, GATEWAY_PUBLIC_KEY,
        ROGUE_GATEWAY_CERT, ROGUE_ROOT_CERT, ROOT_CERT, ROOT_CERT_SN, ROTATED_GATEWAY_CERT,
        ROTATED_GATEWAY_CERT_SN,
    };

    #[test]
    fn test_cert_sn_matches_reference() {
        assert_eq!(cert_sn(GATEWAY_CERT).expect("should parse"), GATEWAY_CERT_SN);
        assert_eq!(
            cert_sn(ROTATED_GATEWAY_CERT).expect("should parse"),
            ROTATED_GATEWAY_CERT_SN
        );
        assert_eq!(cert_sn(APP_CERT).expect("should parse"), APP_CERT_SN);
    }

    #[test]
    fn test_root_cert_sn() {
        assert_eq!(root_cert_sn(ROOT_CERT).expect("should parse"), ROOT_CERT_SN);

        let bundle = format!("{}\n{}", ROOT_CERT, ROGUE_ROOT_CERT);
        let joined = root_cert_sn(&bundle).expect("should parse bundle");
        let parts: Vec<_> = joined.split('_').collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], ROOT_CERT_SN);
    }

    #[test]
    fn test_public_key_extraction() {
        assert_eq!(
            public_key_base64(GATEWAY_CERT).expect("should extract"),
            GATEWAY_PUBLIC_KEY
        );
    }

    #[test]
    fn test_is_trusted() {
        assert!(is_trusted(GATEWAY_CERT, ROOT_CERT).expect("should evaluate"));
        assert!(is_trusted(ROTATED_GATEWAY_CERT, ROOT_CERT).expect("should evaluate"));
        assert!(!is_trusted(ROGUE_GATEWAY_CERT, ROOT_CERT).expect("should evaluate"));

        let bundle = format!("{}\n{}", ROGUE_ROOT_CERT, ROOT_CERT);
        assert!(is_trusted(ROGUE_GATEWAY_CERT, &bundle).expect("should evaluate"));
    }

    #[test]
    fn test_decode_cert_content() {
        let encoded = general_purpose::STANDARD.encode(GATEWAY_CERT);
        assert_eq!(
            decode_cert_content(&encoded).expect("should decode"),
            GATEWAY_CERT.trim()
        );
        assert_eq!(
            decode_cert_content(GATEWAY_CERT).expect("should pass through"),
            GATEWAY_CERT.trim()
        );

        let padded = format!("\n  {}\n", encoded);
        assert_eq!(
            decode_cert_content(&padded).expect("should decode padded content"),
            GATEWAY_CERT.trim()
        );
        assert!(decode_cert_content("%%%").is_err());
    }

    #[test]
    fn test_garbage_is_certificate_error() {
        let err = cert_sn("hello").expect_err("should fail");
        assert!(matches!(
            err.current_context(),
            AlipayError::Certificate { .. }
        ));
    }
}
