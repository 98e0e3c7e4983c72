use std::mem;

use crate::http::request::{Method, Request};
use crate::http::scanner::{LineStatus, ReadBuffer};

/// Framing errors. Every variant is answered with 400 Bad Request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    MalformedLine,
    InvalidRequestLine,
    InvalidMethod,
    InvalidUrl,
    InvalidVersion,
    BodyTooLarge,
}

/// Parser state. Each variant carries exactly what has been parsed so far.
#[derive(Debug, Default)]
enum ParseState {
    #[default]
    RequestLine,
    Headers(Request),
    Body(Request),
}

/// Field-less view of the parser state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    RequestLine,
    Headers,
    Body,
}

#[derive(Debug, Default)]
pub struct Parser {
    state: ParseState,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> ParseStage {
        match self.state {
            ParseState::RequestLine => ParseStage::RequestLine,
            ParseState::Headers(_) => ParseStage::Headers,
            ParseState::Body(_) => ParseStage::Body,
        }
    }

    /// Keep-alive flag of the request being assembled, used when answering
    /// a request that failed part way through its header block.
    pub fn keep_alive(&self) -> bool {
        match &self.state {
            ParseState::RequestLine => false,
            ParseState::Headers(request) | ParseState::Body(request) => request.keep_alive,
        }
    }

    pub fn reset(&mut self) {
        self.state = ParseState::RequestLine;
    }

    /// Drives the state machine over everything buffered so far.
    ///
    /// Returns `Ok(None)` when more bytes are needed and `Ok(Some(_))` once a
    /// complete request has been seen.
    pub fn parse(&mut self, buf: &mut ReadBuffer) -> Result<Option<Request>, ParseError> {
        loop {
            let step = match mem::take(&mut self.state) {
                ParseState::Body(request) => return Ok(self.check_body(request, buf)),
                state => match buf.scan_line() {
                    LineStatus::Ready(line) => {
                        let room = buf.room_after_line_start();
                        let text = buf.slice(line);
                        tracing::debug!(line = %String::from_utf8_lossy(text), "got http line");
                        self.on_line(state, text, room)
                    }
                    LineStatus::Incomplete => {
                        self.state = state;
                        return Ok(None);
                    }
                    LineStatus::Malformed => {
                        self.state = state;
                        return Err(ParseError::MalformedLine);
                    }
                },
            };

            if let Some(request) = step? {
                return Ok(Some(request));
            }
        }
    }

    fn on_line(
        &mut self,
        state: ParseState,
        text: &[u8],
        room: usize,
    ) -> Result<Option<Request>, ParseError> {
        match state {
            ParseState::RequestLine => {
                self.state = ParseState::Headers(parse_request_line(text)?);
                Ok(None)
            }
            ParseState::Headers(mut request) => {
                if !text.is_empty() {
                    parse_header(text, &mut request);
                    self.state = ParseState::Headers(request);
                    return Ok(None);
                }
                if !request.expects_body() {
                    return Ok(Some(request));
                }
                // The body has to fit in what is left of the input buffer.
                if request.content_length > room {
                    self.state = ParseState::Headers(request);
                    return Err(ParseError::BodyTooLarge);
                }
                tracing::debug!(content_length = request.content_length, "waiting for body");
                self.state = ParseState::Body(request);
                Ok(None)
            }
            // body bytes are never scanned as lines
            ParseState::Body(request) => {
                self.state = ParseState::Body(request);
                Ok(None)
            }
        }
    }

    fn check_body(&mut self, request: Request, buf: &ReadBuffer) -> Option<Request> {
        if buf.since_line_start() >= request.content_length {
            return Some(request);
        }
        self.state = ParseState::Body(request);
        None
    }
}

fn is_blank(b: &u8) -> bool {
    *b == b' ' || *b == b'\t'
}

fn parse_request_line(text: &[u8]) -> Result<Request, ParseError> {
    let mut tokens = text.split(is_blank).filter(|t| !t.is_empty());

    let method = tokens.next().ok_or(ParseError::InvalidRequestLine)?;
    let target = tokens.next().ok_or(ParseError::InvalidRequestLine)?;
    let version = tokens.next().ok_or(ParseError::InvalidRequestLine)?;
    if tokens.next().is_some() {
        return Err(ParseError::InvalidRequestLine);
    }

    let Some(method) = Method::from_bytes(method) else {
        tracing::debug!(method = %String::from_utf8_lossy(method), "rejecting method");
        return Err(ParseError::InvalidMethod);
    };

    if !version.eq_ignore_ascii_case(b"HTTP/1.1") {
        return Err(ParseError::InvalidVersion);
    }

    let path = origin_path(target)?;
    let path = std::str::from_utf8(path).map_err(|_| ParseError::InvalidUrl)?;

    Ok(Request::new(method, path))
}

/// Reduces an absolute-form target (`http://host/path`) to its path.
fn origin_path(target: &[u8]) -> Result<&[u8], ParseError> {
    const SCHEME: &[u8] = b"http://";

    let path = match target.get(..SCHEME.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(SCHEME) => {
            let authority_and_path = &target[SCHEME.len()..];
            let slash = authority_and_path
                .iter()
                .position(|b| *b == b'/')
                .ok_or(ParseError::InvalidUrl)?;
            &authority_and_path[slash..]
        }
        _ => target,
    };

    if path.first() != Some(&b'/') {
        return Err(ParseError::InvalidUrl);
    }
    Ok(path)
}

fn parse_header(line: &[u8], request: &mut Request) {
    if let Some(value) = header_value(line, b"Connection:") {
        if value.eq_ignore_ascii_case(b"keep-alive") {
            request.keep_alive = true;
        }
    } else if let Some(value) = header_value(line, b"Content-Length:") {
        request.content_length = std::str::from_utf8(value)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
    } else if let Some(value) = header_value(line, b"Host:") {
        request.host = Some(String::from_utf8_lossy(value).into_owned());
    } else {
        tracing::debug!(header = %String::from_utf8_lossy(line), "unknown header");
    }
}

fn header_value<'a>(line: &'a [u8], name: &[u8]) -> Option<&'a [u8]> {
    let prefix = line.get(..name.len())?;
    if !prefix.eq_ignore_ascii_case(name) {
        return None;
    }
    Some(line[name.len()..].trim_ascii())
}
