/// HTTP request methods.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SimpleMethod {
    HEAD,
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    OPTIONS,
    CONNECT,
    TRACE,
    Custom(String),
}

impl core::fmt::Display for SimpleMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl From<&str> for SimpleMethod {
    fn from(value: &str) -> Self {
        match value {
            "HEAD" => Self::HEAD,
            "CONNECT" => Self::CONNECT,
            "TRACE" => Self::TRACE,
            "GET" => Self::GET,
            "POST" => Self::POST,
            "PUT" => Self::PUT,
            "DELETE" => Self::DELETE,
            "PATCH" => Self::PATCH,
            "OPTIONS" => Self::OPTIONS,
            _ => Self::Custom(value.into()),
        }
    }
}

impl From<String> for SimpleMethod {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl SimpleMethod {
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            SimpleMethod::HEAD => "HEAD",
            SimpleMethod::GET => "GET",
            SimpleMethod::POST => "POST",
            SimpleMethod::PUT => "PUT",
            SimpleMethod::DELETE => "DELETE",
            SimpleMethod::PATCH => "PATCH",
            SimpleMethod::OPTIONS => "OPTIONS",
            SimpleMethod::CONNECT => "CONNECT",
            SimpleMethod::TRACE => "TRACE",
            SimpleMethod::Custom(inner) => inner.as_str(),
        }
    }

    /// compares with string equivalent
    #[must_use]
    pub fn equal(&self, value: &str) -> bool {
        self.value() == value
    }

    /// Methods whose responses never carry a body regardless of headers.
    #[must_use]
    pub fn forbids_response_body(&self) -> bool {
        matches!(self, Self::HEAD | Self::CONNECT)
    }

    /// Methods a caller may attach a request body to.
    #[must_use]
    pub fn permits_request_body(&self) -> bool {
        matches!(self, Self::POST | Self::PUT)
    }
}

/// Protocol version spoken on the wire.
///
/// Only the HTTP/1.x family is modelled; a status line announcing anything
/// other than `HTTP/1.1` downgrades the exchange to `HTTP/1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Proto {
    HTTP10,
    #[default]
    HTTP11,
}

impl Proto {
    #[must_use]
    pub fn is_http11(&self) -> bool {
        matches!(self, Self::HTTP11)
    }
}

impl core::fmt::Display for Proto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HTTP10 => write!(f, "HTTP/1.0"),
            Self::HTTP11 => write!(f, "HTTP/1.1"),
        }
    }
}
