//! Gateway response envelope.

use serde::{Deserialize, Serialize};

/// Common fields of every response node plus the operation payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlipayResponse<T> {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub sub_code: String,
    #[serde(default)]
    pub sub_msg: String,

    #[serde(flatten)]
    pub data: T,

    /// Raw response text as received, before any decryption.
    #[serde(skip)]
    pub body: String,
}

impl<T> AlipayResponse<T> {
    /// Business-level failure, signalled by a non-empty `sub_code`.
    #[must_use]
    pub fn is_error(&self) -> bool {
        !self.sub_code.is_empty()
    }
}
