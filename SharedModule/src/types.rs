//! # Common Types
//!
//! Request verbs, content encodings and status enums shared by the client
//! crate and any host bindings.

use serde::{Serialize, Deserialize};

use crate::constants::content_type;

/// HTTP verb applied to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RequestVerb {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    /// Uses the custom verb string configured on the request
    Custom,
}

impl RequestVerb {
    /// Wire name of the verb. `Custom` has no fixed name and yields `None`.
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            Self::Get => Some("GET"),
            Self::Post => Some("POST"),
            Self::Put => Some("PUT"),
            Self::Delete => Some("DELETE"),
            Self::Custom => None,
        }
    }
}

/// How the request body (or query string) is produced from request state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RequestContentType {
    /// Scalar fields of the request object percent-encoded into the URL query
    #[default]
    UrlEncodedUrl,
    /// Scalar fields of the request object percent-encoded into the body
    UrlEncodedBody,
    /// Serialized request object as body
    Json,
    /// Opaque bytes as body
    Binary,
}

impl RequestContentType {
    /// Value of the `Content-Type` header set automatically for this encoding.
    ///
    /// Binary requests use the caller-settable override instead, so this
    /// returns the default octet-stream type for them.
    pub fn mime(&self) -> &'static str {
        match self {
            Self::UrlEncodedUrl | Self::UrlEncodedBody => content_type::FORM_URLENCODED,
            Self::Json => content_type::JSON,
            Self::Binary => content_type::OCTET_STREAM,
        }
    }
}

/// Progress of the request as seen by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RequestStatus {
    #[default]
    NotStarted,
    Processing,
    Failed,
    FailedConnectionError,
    Succeeded,
}

/// Well-known HTTP status codes, for readable branching on response codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpStatusCode {
    Unknown = 0,
    Continue = 100,
    SwitchProtocol = 101,
    Ok = 200,
    Created = 201,
    Accepted = 202,
    Partial = 203,
    NoContent = 204,
    ResetContent = 205,
    PartialContent = 206,
    Ambiguous = 300,
    Moved = 301,
    Redirect = 302,
    RedirectMethod = 303,
    NotModified = 304,
    UseProxy = 305,
    RedirectKeepVerb = 307,
    BadRequest = 400,
    Denied = 401,
    PaymentReq = 402,
    Forbidden = 403,
    NotFound = 404,
    BadMethod = 405,
    NoneAcceptable = 406,
    ProxyAuthReq = 407,
    RequestTimeout = 408,
    Conflict = 409,
    Gone = 410,
    LengthRequired = 411,
    PrecondFailed = 412,
    RequestTooLarge = 413,
    UriTooLong = 414,
    UnsupportedMedia = 415,
    TooManyRequests = 429,
    RetryWith = 449,
    ServerError = 500,
    NotSupported = 501,
    BadGateway = 502,
    ServiceUnavail = 503,
    GatewayTimeout = 504,
    VersionNotSup = 505,
}

impl HttpStatusCode {
    /// Map a raw status code. Codes without a named variant map to `Unknown`.
    pub fn from_code(code: i32) -> Self {
        match code {
            100 => Self::Continue,
            101 => Self::SwitchProtocol,
            200 => Self::Ok,
            201 => Self::Created,
            202 => Self::Accepted,
            203 => Self::Partial,
            204 => Self::NoContent,
            205 => Self::ResetContent,
            206 => Self::PartialContent,
            300 => Self::Ambiguous,
            301 => Self::Moved,
            302 => Self::Redirect,
            303 => Self::RedirectMethod,
            304 => Self::NotModified,
            305 => Self::UseProxy,
            307 => Self::RedirectKeepVerb,
            400 => Self::BadRequest,
            401 => Self::Denied,
            402 => Self::PaymentReq,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            405 => Self::BadMethod,
            406 => Self::NoneAcceptable,
            407 => Self::ProxyAuthReq,
            408 => Self::RequestTimeout,
            409 => Self::Conflict,
            410 => Self::Gone,
            411 => Self::LengthRequired,
            412 => Self::PrecondFailed,
            413 => Self::RequestTooLarge,
            414 => Self::UriTooLong,
            415 => Self::UnsupportedMedia,
            429 => Self::TooManyRequests,
            449 => Self::RetryWith,
            500 => Self::ServerError,
            501 => Self::NotSupported,
            502 => Self::BadGateway,
            503 => Self::ServiceUnavail,
            504 => Self::GatewayTimeout,
            505 => Self::VersionNotSup,
            _ => Self::Unknown,
        }
    }

    /// Numeric value of the code
    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// True for the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code())
    }
}
