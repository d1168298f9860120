//! Protocol field names and defaults shared by every execution mode.

pub const APP_ID: &str = "app_id";
pub const METHOD: &str = "method";
pub const FORMAT: &str = "format";
pub const CHARSET: &str = "charset";
pub const SIGN_TYPE: &str = "sign_type";
pub const SIGN: &str = "sign";
pub const TIMESTAMP: &str = "timestamp";
pub const VERSION: &str = "version";
pub const NOTIFY_URL: &str = "notify_url";
pub const RETURN_URL: &str = "return_url";
pub const ACCESS_TOKEN: &str = "auth_token";
pub const APP_AUTH_TOKEN: &str = "app_auth_token";
pub const TERMINAL_TYPE: &str = "terminal_type";
pub const TERMINAL_INFO: &str = "terminal_info";
pub const PROD_CODE: &str = "prod_code";
pub const BIZ_CONTENT: &str = "biz_content";
pub const ENCRYPT_TYPE: &str = "encrypt_type";
pub const APP_CERT_SN: &str = "app_cert_sn";
pub const ALIPAY_ROOT_CERT_SN: &str = "alipay_root_cert_sn";

/// Top-level response field carrying the signer's certificate serial.
pub const ALIPAY_CERT_SN: &str = "alipay_cert_sn";

/// Root node used by the gateway for protocol-level failures.
pub const ERROR_RESPONSE: &str = "error_response";
pub const RESPONSE_SUFFIX: &str = "_response";

/// Gateway timestamp layout, local wall-clock time.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const DEFAULT_FORMAT: &str = "json";
pub const DEFAULT_CHARSET: &str = "utf-8";
pub const DEFAULT_VERSION: &str = "1.0";
pub const DEFAULT_SERVER_URL: &str = "https://openapi.alipay.com/gateway.do";

/// The only payload encryption tag the gateway accepts.
pub const ENCRYPT_TYPE_AES: &str = "AES";

/// API used by the certificate refresh protocol.
pub const CERT_DOWNLOAD_METHOD: &str = "alipay.open.app.alipaycert.download";
