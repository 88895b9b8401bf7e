//! # Utility Library
//!
//! Small helpers shared by the request builder and host bindings.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::warn;
use md5::{Digest, Md5};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha1::Sha1;

use worldsbase_shared::constants::WORLDSBASE_VERSION;
use worldsbase_shared::HttpStatusCode;

/// Everything except the RFC 3986 unreserved characters
const URL_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode `text` for use in a query string or form body
pub fn percent_encode(text: &str) -> String {
    utf8_percent_encode(text, URL_ENCODE_SET).to_string()
}

/// Base64 of the UTF-8 bytes of `text`
pub fn base64_encode(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// Decode base64 into text. Invalid UTF-8 is replaced, invalid base64 gives `None`.
pub fn base64_decode(source: &str) -> Option<String> {
    base64_decode_data(source).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Base64 of raw bytes. Empty input gives `None`.
pub fn base64_encode_data(data: &[u8]) -> Option<String> {
    if data.is_empty() {
        return None;
    }
    Some(STANDARD.encode(data))
}

pub fn base64_decode_data(source: &str) -> Option<Vec<u8>> {
    match STANDARD.decode(source) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!("Base64 decode failed: {}", e);
            None
        }
    }
}

/// Lowercase hex MD5 digest of `text`
pub fn string_to_md5(text: &str) -> String {
    format!("{:x}", Md5::digest(text.as_bytes()))
}

/// Lowercase hex SHA-1 digest of `text`
pub fn string_to_sha1(text: &str) -> String {
    format!("{:x}", Sha1::digest(text.as_bytes()))
}

/// Map a numeric status to the status code enum
pub fn http_status_from_code(code: i32) -> HttpStatusCode {
    HttpStatusCode::from_code(code)
}

pub fn version() -> &'static str {
    WORLDSBASE_VERSION
}
