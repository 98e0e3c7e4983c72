/// HTTP request methods the server answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
}

impl Method {
    /// Parses an HTTP method token, ignoring ASCII case.
    ///
    /// # Example
    ///
    /// ```
    /// # use lantern::http::request::Method;
    /// assert_eq!(Method::from_bytes(b"GET"), Some(Method::GET));
    /// assert_eq!(Method::from_bytes(b"get"), Some(Method::GET));
    /// assert_eq!(Method::from_bytes(b"POST"), None);
    /// ```
    pub fn from_bytes(token: &[u8]) -> Option<Self> {
        token.eq_ignore_ascii_case(b"GET").then_some(Method::GET)
    }
}

/// A parsed request head.
///
/// Built by the parser once the request line is accepted; header fields are
/// filled in as header lines arrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Always [`Method::GET`] once parsing succeeds
    pub method: Method,
    /// Absolute path, with any `http://host` prefix removed
    pub path: String,
    /// Value of the Host header, if one was sent
    pub host: Option<String>,
    /// Declared body length, 0 when absent or unparsable
    pub content_length: usize,
    /// True only if `Connection: keep-alive` was observed
    pub keep_alive: bool,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            host: None,
            content_length: 0,
            keep_alive: false,
        }
    }

    /// Whether the parser must wait for body bytes after the header block.
    pub fn expects_body(&self) -> bool {
        self.content_length != 0
    }
}
