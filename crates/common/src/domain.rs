//! Business models used by the engine itself.

use serde::{Deserialize, Serialize};

use crate::constants::CERT_DOWNLOAD_METHOD;
use crate::request::ApiRequest;

/// Model for `alipay.open.app.alipaycert.download`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CertDownloadModel {
    pub alipay_cert_sn: String,
}

/// Payload of the certificate download response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CertDownloadPayload {
    /// Base64-encoded PEM of the requested certificate (and its chain).
    #[serde(default)]
    pub alipay_cert_content: String,
}

pub type CertDownloadRequest = ApiRequest<CertDownloadModel, CertDownloadPayload>;

/// Builds the download request for a gateway certificate serial.
#[must_use]
pub fn cert_download_request(serial: &str) -> CertDownloadRequest {
    ApiRequest::new(CERT_DOWNLOAD_METHOD).with_biz_model(CertDownloadModel {
        alipay_cert_sn: serial.to_string(),
    })
}
