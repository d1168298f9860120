//! Response envelope parsing.
//!
//! The gateway signs the literal text of the response node, not its parsed
//! value, so the signable fragment is cut out of the raw body byte for byte.
//! Re-serializing the node would change whitespace and escaping and break
//! verification.

use error_stack::{Report, ResultExt};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::constants::{ALIPAY_CERT_SN, ERROR_RESPONSE, RESPONSE_SUFFIX, SIGN};
use crate::error::AlipayError;
use crate::response::AlipayResponse;
use crate::signature::{aes_decrypt, ensure_supported_encrypt_type};

/// Signable fragment and its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignItem {
    pub sign_source: String,
    pub sign: String,
}

/// Signable fragment, signature and the signer's certificate serial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertItem {
    pub sign_source: String,
    pub sign: String,
    pub cert_sn: String,
}

impl CertItem {
    #[must_use]
    pub fn sign_item(&self) -> SignItem {
        SignItem {
            sign_source: self.sign_source.clone(),
            sign: self.sign.clone(),
        }
    }
}

/// Response node name for a method: dots become underscores, plus `_response`.
#[must_use]
pub fn root_node_name(method: &str) -> String {
    format!("{}{}", method.replace('.', "_"), RESPONSE_SUFFIX)
}

fn body_object(body: &str) -> Result<Map<String, Value>, Report<AlipayError>> {
    let value: Value = serde_json::from_str(body).change_context(AlipayError::Parse {
        message: "response body is not valid JSON".into(),
    })?;

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(Report::new(AlipayError::Parse {
            message: "response body is not a JSON object".into(),
        })),
    }
}

/// Length of the JSON object or string literal at the start of `s`.
fn literal_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut in_string = false;
    let mut escaped = false;

    match bytes.first()? {
        b'{' => {
            let mut depth = 0usize;
            for (i, &b) in bytes.iter().enumerate() {
                if in_string {
                    if escaped {
                        escaped = false;
                    } else if b == b'\\' {
                        escaped = true;
                    } else if b == b'"' {
                        in_string = false;
                    }
                    continue;
                }
                match b {
                    b'"' => in_string = true,
                    b'{' => depth += 1,
                    b'}' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(i + 1);
                        }
                    }
                    _ => {}
                }
            }
            None
        }
        b'"' => {
            for (i, &b) in bytes.iter().enumerate().skip(1) {
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    return Some(i + 1);
                }
            }
            None
        }
        _ => None,
    }
}

/// Literal text of the member value for `key`. Occurrences of the quoted
/// key inside string values are skipped as they are not followed by `:`.
fn literal_value<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("\"{}\"", key);
    body.match_indices(&needle).find_map(|(at, _)| {
        let rest = body[at + needle.len()..]
            .trim_start()
            .strip_prefix(':')?
            .trim_start();
        let start = body.len() - rest.len();
        let len = literal_len(rest)?;
        Some(&body[start..start + len])
    })
}

/// Finds the response node, falling back to `error_response`.
fn locate<'a>(
    object: &Map<String, Value>,
    body: &'a str,
    method: &str,
) -> Option<(String, &'a str)> {
    [root_node_name(method), ERROR_RESPONSE.to_string()]
        .into_iter()
        .filter(|root| object.contains_key(root))
        .find_map(|root| literal_value(body, &root).map(|fragment| (root, fragment)))
}

fn top_level_str(object: &Map<String, Value>, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Extracts the signed fragment and signature.
///
/// Returns `None` when the body has no node for `method` nor an
/// `error_response` node.
///
/// # Errors
///
/// Returns [`AlipayError::Parse`] if the body is not a JSON object.
pub fn sign_item(method: &str, body: &str) -> Result<Option<SignItem>, Report<AlipayError>> {
    let object = body_object(body)?;
    Ok(locate(&object, body, method).map(|(_, fragment)| SignItem {
        sign_source: fragment.to_string(),
        sign: top_level_str(&object, SIGN),
    }))
}

/// Like [`sign_item`], also returning the signer's certificate serial.
///
/// # Errors
///
/// Returns [`AlipayError::Parse`] if the body is not a JSON object.
pub fn cert_item(method: &str, body: &str) -> Result<Option<CertItem>, Report<AlipayError>> {
    let object = body_object(body)?;
    Ok(locate(&object, body, method).map(|(_, fragment)| CertItem {
        sign_source: fragment.to_string(),
        sign: top_level_str(&object, SIGN),
        cert_sn: top_level_str(&object, ALIPAY_CERT_SN),
    }))
}

/// Decrypts an encrypted response node.
///
/// When the node is a JSON string it holds base64 ciphertext; the result is
/// `{"<node>":<plaintext>}`. Unencrypted bodies (error responses included)
/// are returned unchanged.
///
/// # Errors
///
/// Returns an error for an unsupported `encrypt_type`, a malformed body, or
/// ciphertext that does not decrypt.
pub fn decrypt_source_data(
    method: &str,
    body: &str,
    encrypt_type: &str,
    encrypt_key: &str,
) -> Result<String, Report<AlipayError>> {
    ensure_supported_encrypt_type(encrypt_type)?;

    let object = body_object(body)?;
    match locate(&object, body, method) {
        Some((root, fragment)) if fragment.starts_with('"') => {
            let ciphertext: String =
                serde_json::from_str(fragment).change_context(AlipayError::Parse {
                    message: "encrypted response node is not a JSON string".into(),
                })?;
            let plaintext = aes_decrypt(&ciphertext, encrypt_key)?;
            Ok(format!("{{\"{}\":{}}}", root, plaintext))
        }
        _ => Ok(body.to_string()),
    }
}

/// Deserializes the response node of `content` and attaches the raw `body`.
///
/// # Errors
///
/// Returns [`AlipayError::Parse`] if `content` is not JSON, has no response
/// node, or the node does not match `T`.
pub fn parse<T: DeserializeOwned>(
    method: &str,
    body: &str,
    content: &str,
) -> Result<AlipayResponse<T>, Report<AlipayError>> {
    let object = body_object(content)?;
    let root = root_node_name(method);

    let node = object
        .get(&root)
        .or_else(|| object.get(ERROR_RESPONSE))
        .ok_or_else(|| {
            Report::new(AlipayError::Parse {
                message: format!("response has neither '{}' nor '{}'", root, ERROR_RESPONSE),
            })
        })?;

    if node.is_string() {
        return Err(Report::new(AlipayError::Parse {
            message: format!("'{}' is still encrypted", root),
        }));
    }

    let mut response: AlipayResponse<T> =
        serde_json::from_value(node.clone()).change_context(AlipayError::Parse {
            message: format!("'{}' does not match the expected payload", root),
        })?;
    response.body = body.to_string();

    Ok(response)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::signature::aes_encrypt;

    const METHOD: &str = "alipay.trade.query";
    const AES_KEY: &str = "AAECAwQFBgcICQoLDA0ODw==";

    #[derive(Debug, Deserialize)]
    struct QueryPayload {
        #[serde(default)]
        trade_no: String,
    }

    #[test]
    fn test_root_node_name() {
        assert_eq!(root_node_name(METHOD), "alipay_trade_query_response");
    }

    #[test]
    fn test_sign_item_is_literal_fragment() {
        let body = r#"{"alipay_trade_query_response" : {"code":"10000","msg":"Success","url":"https:\/\/a.b\/c","memo":"a } \" {"},"sign":"c2lnbg=="}"#;
        let item = sign_item(METHOD, body)
            .expect("should parse")
            .expect("should find node");

        assert_eq!(
            item.sign_source,
            r#"{"code":"10000","msg":"Success","url":"https:\/\/a.b\/c","memo":"a } \" {"}"#
        );
        assert_eq!(item.sign, "c2lnbg==");
    }

    #[test]
    fn test_sign_item_nested_objects() {
        let body = r#"{"alipay_trade_query_response":{"a":{"b":{"c":1}},"d":2},"sign":"x"}"#;
        let item = sign_item(METHOD, body)
            .expect("should parse")
            .expect("should find node");
        assert_eq!(item.sign_source, r#"{"a":{"b":{"c":1}},"d":2}"#);
    }

    #[test]
    fn test_error_response_fallback() {
        let body = r#"{"error_response":{"code":"40002","msg":"Invalid Arguments","sub_code":"isv.invalid-app-id"}}"#;
        let item = sign_item(METHOD, body)
            .expect("should parse")
            .expect("should fall back to error_response");

        assert!(item.sign.is_empty());
        assert!(item.sign_source.starts_with(r#"{"code":"40002""#));
    }

    #[test]
    fn test_missing_node() {
        assert_eq!(sign_item(METHOD, r#"{"other":{}}"#).expect("should parse"), None);
        assert!(sign_item(METHOD, "not json").is_err());
    }

    #[test]
    fn test_escaped_root_name_inside_string() {
        let body = r#"{"note":"\"alipay_trade_query_response\":{}","alipay_trade_query_response":{"code":"10000"},"sign":"s"}"#;
        let item = cert_item(METHOD, body)
            .expect("should parse")
            .expect("should find node");
        assert_eq!(item.sign_source, r#"{"code":"10000"}"#);
        assert!(item.cert_sn.is_empty());
    }

    #[test]
    fn test_root_name_closing_a_string_value() {
        let body = r#"{"memo":"\"alipay_trade_query_response","alipay_trade_query_response":{"code":"10000"},"sign":"s"}"#;
        let item = sign_item(METHOD, body)
            .expect("should parse")
            .expect("should find node");
        assert_eq!(item.sign_source, r#"{"code":"10000"}"#);
        assert_eq!(item.sign, "s");
    }

    #[test]
    fn test_cert_item() {
        let body = r#"{"alipay_trade_query_response":{"code":"10000"},"alipay_cert_sn":"abc","sign":"s"}"#;
        let item = cert_item(METHOD, body)
            .expect("should parse")
            .expect("should find node");

        assert_eq!(item.cert_sn, "abc");
        assert_eq!(item.sign_item().sign, "s");
    }

    #[test]
    fn test_decrypt_source_data() {
        let plain = r#"{"code":"10000","msg":"Success","trade_no":"2088"}"#;
        let cipher = aes_encrypt(plain, AES_KEY).expect("should encrypt");
        let body = format!(r#"{{"alipay_trade_query_response":"{}","sign":"s"}}"#, cipher);

        let item = sign_item(METHOD, &body)
            .expect("should parse")
            .expect("should find node");
        assert_eq!(item.sign_source, format!("\"{}\"", cipher));

        let content = decrypt_source_data(METHOD, &body, "AES", AES_KEY).expect("should decrypt");
        assert_eq!(content, format!(r#"{{"alipay_trade_query_response":{}}}"#, plain));

        let response: AlipayResponse<QueryPayload> =
            parse(METHOD, &body, &content).expect("should parse");
        assert_eq!(response.data.trade_no, "2088");
        assert_eq!(response.body, body);
    }

    #[test]
    fn test_decrypt_passes_through_plain_bodies() {
        let body = r#"{"error_response":{"code":"40002","sub_code":"x"}}"#;
        assert_eq!(
            decrypt_source_data(METHOD, body, "AES", AES_KEY).expect("should pass through"),
            body
        );
        assert!(decrypt_source_data(METHOD, body, "DES", AES_KEY).is_err());
    }

    #[test]
    fn test_parse_rejects_encrypted_node() {
        let body = r#"{"alipay_trade_query_response":"Y2lwaGVy"}"#;
        let err = parse::<QueryPayload>(METHOD, body, body).expect_err("should reject");
        assert!(matches!(err.current_context(), AlipayError::Parse { .. }));
    }

    #[test]
    fn test_parse_error_response() {
        let body = r#"{"error_response":{"code":"40002","msg":"Invalid Arguments","sub_code":"isv.invalid-app-id"}}"#;
        let response: AlipayResponse<QueryPayload> =
            parse(METHOD, body, body).expect("should parse error response");

        assert!(response.is_error());
        assert!(response.data.trade_no.is_empty());
    }
}
