//! Merchant configuration.
//!
//! Settings are read from TOML and merged with environment variables prefixed
//! with `ALIPAY_GATEWAY__`, e.g. `ALIPAY_GATEWAY__ALIPAY__APP_ID` overrides
//! `alipay.app_id`. Key and certificate material may be given inline or as a
//! `*_path` pointing at a file. Certificate serials and the gateway public key
//! are derived once at load time; the resulting [`AlipayOptions`] is then
//! read-only.

use std::fs;
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::cert;
use crate::constants::{DEFAULT_CHARSET, DEFAULT_FORMAT, DEFAULT_SERVER_URL, DEFAULT_VERSION};
use crate::error::AlipayError;

pub const ENVIRONMENT_VARIABLE_PREFIX: &str = "ALIPAY_GATEWAY";
pub const ENVIRONMENT_VARIABLE_SEPARATOR: &str = "__";

/// Per-merchant signing options.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct AlipayOptions {
    #[serde(default)]
    pub app_id: String,

    /// Application private key, PEM or base64 DER (PKCS#8 or PKCS#1).
    #[serde(default)]
    pub app_private_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_private_key_path: Option<String>,

    /// Gateway public key for execute mode, base64 SPKI DER or PEM.
    #[serde(default)]
    pub alipay_public_key: String,

    /// `RSA` (SHA1) or `RSA2` (SHA256).
    #[serde(default = "default_sign_type")]
    pub sign_type: String,

    #[serde(default = "default_charset")]
    pub charset: String,

    #[serde(default = "default_format")]
    pub format: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default = "default_server_url")]
    #[validate(url)]
    pub server_url: String,

    /// Base64 AES key for payload encryption.
    #[serde(default)]
    pub encrypt_key: String,

    /// Payload encryption tag; only `AES` is accepted.
    #[serde(default)]
    pub encrypt_type: String,

    /// Application certificate (PEM), certificate mode only.
    #[serde(default)]
    pub app_cert: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_cert_path: Option<String>,

    /// Gateway public certificate (PEM), certificate mode only.
    #[serde(default)]
    pub alipay_public_cert: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alipay_public_cert_path: Option<String>,

    /// Gateway root certificate bundle (PEM), certificate mode only.
    #[serde(default)]
    pub root_cert: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cert_path: Option<String>,

    #[serde(default)]
    pub app_cert_sn: String,
    #[serde(default)]
    pub alipay_public_cert_sn: String,
    #[serde(default)]
    pub root_cert_sn: String,
}

fn default_sign_type() -> String {
    "RSA2".to_string()
}

fn default_charset() -> String {
    DEFAULT_CHARSET.to_string()
}

fn default_format() -> String {
    DEFAULT_FORMAT.to_string()
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn read_material(path: &str) -> Result<String, Report<AlipayError>> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .change_context(AlipayError::Configuration {
            field: format!("unreadable key material at '{}'", path),
        })
}

fn fill_from_path(
    value: &mut String,
    path: Option<&String>,
) -> Result<(), Report<AlipayError>> {
    if value.is_empty() {
        if let Some(path) = path {
            *value = read_material(path)?;
        }
    }
    Ok(())
}

impl AlipayOptions {
    /// Minimal options for execute mode.
    pub fn new(
        app_id: impl Into<String>,
        app_private_key: impl Into<String>,
        alipay_public_key: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            app_private_key: app_private_key.into(),
            alipay_public_key: alipay_public_key.into(),
            sign_type: default_sign_type(),
            charset: default_charset(),
            format: default_format(),
            version: default_version(),
            server_url: default_server_url(),
            ..Default::default()
        }
    }

    /// Loads file-referenced material and derives certificate serials.
    ///
    /// The gateway public key is taken from the gateway certificate when the
    /// certificate is configured and no key was given explicitly.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced file cannot be read or a certificate
    /// cannot be parsed.
    pub fn resolve(mut self) -> Result<Self, Report<AlipayError>> {
        fill_from_path(&mut self.app_private_key, self.app_private_key_path.as_ref())?;
        fill_from_path(&mut self.app_cert, self.app_cert_path.as_ref())?;
        fill_from_path(
            &mut self.alipay_public_cert,
            self.alipay_public_cert_path.as_ref(),
        )?;
        fill_from_path(&mut self.root_cert, self.root_cert_path.as_ref())?;

        if !self.app_cert.is_empty() {
            self.app_cert_sn = cert::cert_sn(&self.app_cert).attach("while reading app_cert")?;
        }

        if !self.alipay_public_cert.is_empty() {
            self.alipay_public_cert_sn = cert::cert_sn(&self.alipay_public_cert)
                .attach("while reading alipay_public_cert")?;
            if self.alipay_public_key.is_empty() {
                self.alipay_public_key = cert::public_key_base64(&self.alipay_public_cert)
                    .attach("while reading alipay_public_cert")?;
            }
        }

        if !self.root_cert.is_empty() {
            self.root_cert_sn =
                cert::root_cert_sn(&self.root_cert).attach("while reading root_cert")?;
        }

        Ok(self)
    }

    /// Whether every certificate needed for certificate mode is configured.
    #[must_use]
    pub fn has_certificates(&self) -> bool {
        !self.app_cert.is_empty() && !self.alipay_public_cert.is_empty() && !self.root_cert.is_empty()
    }
}

/// Settings for the default HTTP transport.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TransportSettings {
    #[serde(default = "default_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub timeout_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct Settings {
    #[validate(nested)]
    pub alipay: AlipayOptions,

    #[serde(default)]
    #[validate(nested)]
    pub transport: TransportSettings,
}

impl Settings {
    /// Parses TOML, applies environment overrides, validates, and resolves
    /// certificate material.
    ///
    /// # Errors
    ///
    /// Returns [`AlipayError::Configuration`] on malformed TOML, missing
    /// sections, failed validation, or unreadable certificate material.
    pub fn from_toml(toml_str: &str) -> Result<Self, Report<AlipayError>> {
        let environment = Environment::default()
            .prefix(ENVIRONMENT_VARIABLE_PREFIX)
            .separator(ENVIRONMENT_VARIABLE_SEPARATOR);

        let toml = File::from_str(toml_str, FileFormat::Toml);
        let config = Config::builder()
            .add_source(toml)
            .add_source(environment)
            .build()
            .change_context(AlipayError::Configuration {
                field: "invalid settings TOML".into(),
            })?;

        let settings: Settings =
            config
                .try_deserialize()
                .change_context(AlipayError::Configuration {
                    field: "settings do not match the expected layout".into(),
                })?;

        settings
            .validate()
            .change_context(AlipayError::Configuration {
                field: "settings validation failed".into(),
            })?;

        let alipay = settings.alipay.resolve()?;

        Ok(Self {
            alipay,
            transport: settings.transport,
        })
    }

    /// Reads and parses a settings file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Report<AlipayError>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).change_context(AlipayError::Configuration {
            field: format!("unreadable settings file '{}'", path.display()),
        })?;
        Self::from_toml(&content)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::test_support::tests::{
        APP_CERT, APP_CERT_SN, GATEWAY_CERT, GATEWAY_CERT_SN, GATEWAY_PUBLIC_KEY, ROOT_CERT,
        ROOT_CERT_SN,
    };

    const MINIMAL_TOML: &str = r#"
        [alipay]
        app_id = "2021000000000001"
        app_private_key = "MIIE..."
        alipay_public_key = "MIIB..."
    "#;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::from_toml(MINIMAL_TOML).expect("should load minimal settings");

        assert_eq!(settings.alipay.app_id, "2021000000000001");
        assert_eq!(settings.alipay.sign_type, "RSA2");
        assert_eq!(settings.alipay.charset, "utf-8");
        assert_eq!(settings.alipay.format, "json");
        assert_eq!(settings.alipay.server_url, DEFAULT_SERVER_URL);
        assert!(settings.alipay.app_cert_sn.is_empty());
        assert!(!settings.alipay.has_certificates());
    }

    #[test]
    fn test_settings_empty_toml() {
        let settings = Settings::from_toml("");
        assert!(settings.is_err(), "Should fail without an [alipay] section");
    }

    #[test]
    fn test_settings_invalid_toml_syntax() {
        let settings = Settings::from_toml("[alipay\napp_id = \"x\"");
        assert!(settings.is_err(), "Should fail with invalid TOML syntax");
    }

    #[test]
    fn test_settings_invalid_server_url() {
        let toml_str = r#"
            [alipay]
            app_id = "1"
            server_url = "not a url"
        "#;
        let err = Settings::from_toml(toml_str).expect_err("should reject bad url");
        assert!(matches!(
            err.current_context(),
            AlipayError::Configuration { .. }
        ));
    }

    #[test]
    fn test_settings_timeout_range() {
        let toml_str = r#"
            [alipay]
            app_id = "1"

            [transport]
            timeout_secs = 0
        "#;
        assert!(Settings::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_certificates_are_resolved() {
        let toml_str = format!(
            "[alipay]\napp_id = \"1\"\napp_cert = '''{}'''\nalipay_public_cert = '''{}'''\nroot_cert = '''{}'''\n",
            APP_CERT, GATEWAY_CERT, ROOT_CERT
        );

        let settings = Settings::from_toml(&toml_str).expect("should load certificates");
        assert_eq!(settings.alipay.app_cert_sn, APP_CERT_SN);
        assert_eq!(settings.alipay.alipay_public_cert_sn, GATEWAY_CERT_SN);
        assert_eq!(settings.alipay.root_cert_sn, ROOT_CERT_SN);
        assert_eq!(settings.alipay.alipay_public_key, GATEWAY_PUBLIC_KEY);
        assert!(settings.alipay.has_certificates());
    }

    #[test]
    fn test_material_from_path() {
        let mut file = tempfile::NamedTempFile::new().expect("should create temp file");
        write!(file, "{}", GATEWAY_CERT).expect("should write cert");

        let toml_str = format!(
            "[alipay]\napp_id = \"1\"\nalipay_public_cert_path = \"{}\"\n",
            file.path().display()
        );
        let settings = Settings::from_toml(&toml_str).expect("should load from path");
        assert_eq!(settings.alipay.alipay_public_cert_sn, GATEWAY_CERT_SN);
    }

    #[test]
    fn test_missing_material_path_fails() {
        let toml_str = r#"
            [alipay]
            app_id = "1"
            root_cert_path = "/nonexistent/root.crt"
        "#;
        assert!(Settings::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_override_env() {
        temp_env::with_var(
            "ALIPAY_GATEWAY__ALIPAY__VERSION",
            Some("2.0"),
            || {
                let settings = Settings::from_toml(MINIMAL_TOML);

                assert!(settings.is_ok(), "Settings should load with env override");
                assert_eq!(settings.expect("checked above").alipay.version, "2.0");
            },
        );
    }
}
