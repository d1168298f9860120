//! Configuration commands.
//!
//! Configuration is loaded from TOML files and merged with environment variables
//! prefixed with `ALIPAY_GATEWAY__`. For example, `ALIPAY_GATEWAY__ALIPAY__APP_ID`
//! will override `alipay.app_id` in the TOML file.

use std::fs;
use std::path::Path;

use alipay_gateway_common::settings::Settings;
use alipay_gateway_common::signature::{parse_private_key, parse_public_key};

use crate::error::CliError;

/// Load settings from a TOML file, merged with environment variables.
pub(crate) fn load_settings(file: &Path, verbose: bool) -> Result<Settings, CliError> {
    let content = fs::read_to_string(file)?;

    if verbose {
        println!("Loading config from: {}", file.display());
        println!("Environment variables with ALIPAY_GATEWAY__ prefix will be merged");
    }

    Settings::from_toml(&content)
        .map_err(|e| CliError::Config(format!("Failed to load config: {:?}", e)))
}

fn or_unset(value: &str) -> &str {
    if value.is_empty() {
        "(not configured)"
    } else {
        value
    }
}

/// Validate a config file and print the derived certificate serials.
///
/// Key material is parsed as well, so a malformed key is caught here rather
/// than on the first signed request.
pub fn validate(file: &Path, verbose: bool) -> Result<(), CliError> {
    let settings = load_settings(file, verbose)?;
    let alipay = &settings.alipay;

    if alipay.app_id.is_empty() {
        return Err(CliError::Config("alipay.app_id is empty".into()));
    }
    if !alipay.app_private_key.is_empty() {
        parse_private_key(&alipay.app_private_key)?;
    }
    if !alipay.alipay_public_key.is_empty() {
        parse_public_key(&alipay.alipay_public_key)?;
    }

    println!("Configuration is valid: {}", file.display());
    println!("  app_id:                {}", alipay.app_id);
    println!("  server_url:            {}", alipay.server_url);
    println!("  sign_type:             {}", alipay.sign_type);
    println!("  app_cert_sn:           {}", or_unset(&alipay.app_cert_sn));
    println!("  alipay_public_cert_sn: {}", or_unset(&alipay.alipay_public_cert_sn));
    println!("  root_cert_sn:          {}", or_unset(&alipay.root_cert_sn));

    if verbose {
        println!("  certificate mode:      {}", alipay.has_certificates());
        println!("  transport timeout:     {}s", settings.transport.timeout_secs);
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    pub(crate) const APP_PRIVATE_KEY: &str =
        include_str!("../../common/tests/fixtures/app_private_pkcs8.txt");
    pub(crate) const GATEWAY_PUBLIC_KEY: &str =
        include_str!("../../common/tests/fixtures/gw1_public.txt");
    pub(crate) const GATEWAY_PRIVATE_KEY: &str =
        include_str!("../../common/tests/fixtures/gw1_private_pkcs1.txt");

    pub(crate) fn create_test_config(dir: &TempDir) -> std::path::PathBuf {
        let config_path = dir.path().join("test-config.toml");
        let mut file = fs::File::create(&config_path).expect("should create config");
        write!(
            file,
            r#"
[alipay]
app_id = "2021000000000001"
app_private_key = "{}"
alipay_public_key = "{}"
server_url = "https://openapi.example.com/gateway.do"
"#,
            APP_PRIVATE_KEY, GATEWAY_PUBLIC_KEY
        )
        .expect("should write config");
        config_path
    }

    #[test]
    fn test_validate_valid_config() {
        let dir = TempDir::new().expect("should create temp dir");
        let config_path = create_test_config(&dir);

        let result = validate(&config_path, false);
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_invalid_toml() {
        let dir = TempDir::new().expect("should create temp dir");
        let config_path = dir.path().join("invalid.toml");
        fs::write(&config_path, "invalid { toml").expect("should write");

        let result = validate(&config_path, false);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_missing_app_id() {
        let dir = TempDir::new().expect("should create temp dir");
        let config_path = dir.path().join("incomplete.toml");
        fs::write(&config_path, "[alipay]\nsign_type = \"RSA2\"\n").expect("should write");

        let result = validate(&config_path, false);
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn test_validate_malformed_key() {
        let dir = TempDir::new().expect("should create temp dir");
        let config_path = dir.path().join("bad-key.toml");
        fs::write(
            &config_path,
            "[alipay]\napp_id = \"1\"\napp_private_key = \"bm90IGEga2V5\"\n",
        )
        .expect("should write");

        let result = validate(&config_path, false);
        assert!(matches!(result, Err(CliError::Gateway(_))));
    }

    #[test]
    fn test_validate_nonexistent_file() {
        let dir = TempDir::new().expect("should create temp dir");
        let config_path = dir.path().join("nonexistent.toml");

        let result = validate(&config_path, false);
        assert!(matches!(result, Err(CliError::Io(_))));
    }
}
