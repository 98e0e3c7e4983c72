use std::fmt;

use crate::files::{FileMapping, Resolution};
use crate::http::writer::Outgoing;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Body sent for a successful request on an empty file.
pub const EMPTY_FILE_BODY: &str = "<html><body></body></html>";

/// HTTP status codes the server can answer with.
///
/// - `Ok` (200): File found and sent
/// - `BadRequest` (400): Malformed request, unsupported method, or a directory
/// - `Forbidden` (403): File exists but is not world-readable
/// - `NotFound` (404): No such file under the document root
/// - `InternalError` (500): File could not be opened or mapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 400 Bad Request
    BadRequest,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 500 Internal Error
    InternalError,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use lantern::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::InternalError => 500,
        }
    }

    /// Returns the reason phrase used on the status line.
    ///
    /// # Example
    ///
    /// ```
    /// # use lantern::http::response::StatusCode;
    /// assert_eq!(StatusCode::Forbidden.reason_phrase(), "Forbidden");
    /// assert_eq!(StatusCode::InternalError.reason_phrase(), "Internal Error");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalError => "Internal Error",
        }
    }

    /// Canned one-line page sent with error statuses.
    pub fn error_page(&self) -> Option<&'static str> {
        match self {
            StatusCode::Ok => None,
            StatusCode::BadRequest => {
                Some("Your request has bad syntax or is inherently impossible to satisfy.\n")
            }
            StatusCode::Forbidden => {
                Some("You do not have permission to get file from this server.\n")
            }
            StatusCode::NotFound => Some("The requested file was not found on this server.\n"),
            StatusCode::InternalError => {
                Some("There was an unusual problem serving the requested file.\n")
            }
        }
    }
}

/// What the connection decided to answer with.
#[derive(Debug)]
pub enum Outcome {
    BadRequest,
    Forbidden,
    NotFound,
    InternalError,
    File {
        size: usize,
        mapping: Option<FileMapping>,
    },
}

impl Outcome {
    pub fn status(&self) -> StatusCode {
        match self {
            Outcome::BadRequest => StatusCode::BadRequest,
            Outcome::Forbidden => StatusCode::Forbidden,
            Outcome::NotFound => StatusCode::NotFound,
            Outcome::InternalError => StatusCode::InternalError,
            Outcome::File { .. } => StatusCode::Ok,
        }
    }
}

impl From<Resolution> for Outcome {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::File { size, mapping } => Outcome::File { size, mapping },
            Resolution::Forbidden => Outcome::Forbidden,
            Resolution::NotFound => Outcome::NotFound,
            Resolution::Directory => Outcome::BadRequest,
            Resolution::Unavailable(_) => Outcome::InternalError,
        }
    }
}

/// The response head did not fit in the write buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    Overflow { needed: usize, available: usize },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Overflow { needed, available } => write!(
                f,
                "response needs {} more bytes but only {} are free",
                needed, available
            ),
        }
    }
}

impl std::error::Error for BuildError {}

/// Appends response text to the outgoing head segment without exceeding `limit`.
pub struct ResponseBuilder<'a> {
    out: &'a mut Outgoing,
    limit: usize,
}

impl<'a> ResponseBuilder<'a> {
    pub fn new(out: &'a mut Outgoing, limit: usize) -> Self {
        Self { out, limit }
    }

    fn append(&mut self, bytes: &[u8]) -> Result<(), BuildError> {
        let available = self.limit.saturating_sub(self.out.head().len());
        if bytes.len() > available {
            return Err(BuildError::Overflow {
                needed: bytes.len(),
                available,
            });
        }
        self.out.head_mut().extend_from_slice(bytes);
        Ok(())
    }

    pub fn status_line(&mut self, status: StatusCode) -> Result<&mut Self, BuildError> {
        let line = format!(
            "{} {} {}\r\n",
            HTTP_VERSION,
            status.as_u16(),
            status.reason_phrase()
        );
        self.append(line.as_bytes())?;
        Ok(self)
    }

    /// Content-Length, Connection and the blank line ending the head.
    pub fn headers(&mut self, content_length: usize, keep_alive: bool) -> Result<&mut Self, BuildError> {
        let connection = if keep_alive { "keep-alive" } else { "close" };
        let headers = format!(
            "Content-Length: {}\r\nConnection: {}\r\n\r\n",
            content_length, connection
        );
        self.append(headers.as_bytes())?;
        Ok(self)
    }

    pub fn content(&mut self, body: &str) -> Result<&mut Self, BuildError> {
        self.append(body.as_bytes())?;
        Ok(self)
    }
}

/// Serializes `outcome` into `out`.
///
/// A non-empty file is not copied: it becomes the second segment of `out`.
/// On error nothing is attached and any mapping in `outcome` is released.
pub fn build_response(
    out: &mut Outgoing,
    outcome: Outcome,
    keep_alive: bool,
    limit: usize,
) -> Result<StatusCode, BuildError> {
    let status = outcome.status();
    let mut builder = ResponseBuilder::new(out, limit);
    builder.status_line(status)?;

    match outcome {
        Outcome::File {
            size,
            mapping: Some(mapping),
        } if size != 0 => {
            builder.headers(size, keep_alive)?;
            out.attach_file(mapping);
        }
        Outcome::File { .. } => {
            builder
                .headers(EMPTY_FILE_BODY.len(), keep_alive)?
                .content(EMPTY_FILE_BODY)?;
        }
        _ => {
            let page = status.error_page().unwrap_or_default();
            builder.headers(page.len(), keep_alive)?.content(page)?;
        }
    }

    Ok(status)
}
