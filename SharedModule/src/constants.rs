//! # Shared Constants
//!
//! Constants used across the shared and client crates.

/// Version of the Worldsbase client
pub const WORLDSBASE_VERSION: &str = "0.1.0";

/// Placeholder kept in the response content slot until a string is cached
pub const DEPRECATED_RESPONSE_STRING: &str =
    "DEPRECATED: Please use GetResponseContentAsString() instead";

/// Content-Type header values
pub mod content_type {
    pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

    pub const JSON: &str = "application/json";

    /// Default for binary requests unless overridden on the request
    pub const OCTET_STREAM: &str = "application/octet-stream";
}

/// Header names set by the client
pub mod header {
    pub const CONTENT_TYPE: &str = "Content-Type";

    pub const API_KEY: &str = "x-api-key";

    pub const AUTHORIZATION: &str = "Authorization";
}

/// Table backend endpoint paths, relative to the configured base URL
pub mod endpoint {
    pub const GET_TABLE: &str = "table/gettable/";

    pub const GET_TABLE_VALUE: &str = "table/gettablevalue/";

    pub const GET_FILTERED_TABLE_VALUES: &str = "table/getfilteredtablevalues/";

    pub const INSERT_DATA: &str = "table/insertdata";

    pub const UPDATE_DATA: &str = "table/updatedata/";

    pub const INCREMENT_DATA: &str = "table/incrementdata/";

    pub const DECREMENT_DATA: &str = "table/decrementdata/";
}

/// Environment variables read by `Settings::apply_env`
pub mod env {
    pub const BASE_URL: &str = "WORLDSBASE_BASE_URL";

    pub const API_KEY: &str = "WORLDSBASE_API_KEY";

    pub const EXTENDED_LOG: &str = "WORLDSBASE_EXTENDED_LOG";

    pub const CHUNKED_PARSER: &str = "WORLDSBASE_CHUNKED_PARSER";
}
