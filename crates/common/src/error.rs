//! Error types for the gateway client.
//!
//! Every fallible operation returns `Result<T, Report<AlipayError>>`; the
//! [`AlipayError`] variant names the failure kind and the offending field or
//! certificate serial, while the report carries attached context.

use derive_more::Display;

/// Failure kinds surfaced by the protocol engine.
///
/// None of these are retried internally. Each one is terminal for the
/// in-flight call.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum AlipayError {
    /// A required option is missing or invalid.
    #[display("Configuration error: {field}")]
    Configuration { field: String },

    /// The same key was inserted twice into a canonical parameter set.
    #[display("Duplicate parameter: {key}")]
    DuplicateParameter { key: String },

    /// Encryption was requested but the payload, key, or type is missing.
    #[display("Encryption precondition failed: {message}")]
    EncryptionPrecondition { message: String },

    /// The encryption algorithm tag is not recognized.
    #[display("Unsupported encryption type: {encrypt_type}")]
    UnsupportedEncryption { encrypt_type: String },

    /// AES key or ciphertext is malformed.
    #[display("Encryption error: {message}")]
    Encryption { message: String },

    /// Key material could not be parsed or the signature type is unknown.
    #[display("Signing error: {message}")]
    Signing { message: String },

    /// The response signature did not verify.
    #[display("Verification failed: {message}")]
    Verification { message: String },

    /// The gateway certificate could not be trusted.
    #[display("Untrusted certificate {serial}: {message}")]
    UntrustedCertificate { serial: String, message: String },

    /// A certificate could not be decoded.
    #[display("Certificate error: {message}")]
    Certificate { message: String },

    /// The transport failed to deliver the request.
    #[display("Transport error: {message}")]
    Transport { message: String },

    /// The response body is not valid gateway JSON.
    #[display("Parse error: {message}")]
    Parse { message: String },
}

impl core::error::Error for AlipayError {}

impl AlipayError {
    /// Shorthand for a missing-option error.
    pub fn missing(field: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
        }
    }

    /// Returns the certificate serial for certificate trust failures.
    #[must_use]
    pub fn serial(&self) -> Option<&str> {
        match self {
            Self::UntrustedCertificate { serial, .. } => Some(serial),
            _ => None,
        }
    }
}
