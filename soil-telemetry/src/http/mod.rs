//! HTTP request engine.
//!
//! Owns the lifecycle of one request over an already-established
//! transport: formats and sends the head and body, streams the response
//! through [`ResponseParser`], and dispatches lifecycle events to an
//! [`EventSink`]. The transport is anything implementing the
//! `embedded-io-async` traits, so the TLS layer stays outside.

mod collector;
mod response;

pub use collector::{
    CollectError, EventSink, HttpEvent, MAX_UNSIZED_BODY, ResponseCollector,
};
pub use response::ResponseParser;

use core::fmt::Write as _;

use embedded_io_async::{ErrorKind, Read, Write};
use heapless::String;
use log::debug;

/// Upper bound for the serialized request head.
const MAX_HEAD: usize = 512;

/// Transport read granularity.
const READ_CHUNK: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// Pieces of an absolute URL, borrowed from the original text.
#[derive(Debug, PartialEq, Eq)]
pub struct UrlParts<'a> {
    pub scheme: Scheme,
    pub host: &'a str,
    pub port: u16,
    pub path: &'a str,
}

pub fn parse_url(url: &str) -> Result<UrlParts<'_>, HttpError> {
    let (scheme, rest) = if let Some(rest) = url.strip_prefix("https://") {
        (Scheme::Https, rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        (Scheme::Http, rest)
    } else {
        return Err(HttpError::BadUrl);
    };
    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/"),
    };
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().map_err(|_| HttpError::BadUrl)?),
        None => (authority, scheme.default_port()),
    };
    if host.is_empty() {
        return Err(HttpError::BadUrl);
    }
    Ok(UrlParts {
        scheme,
        host,
        port,
        path,
    })
}

/// Everything one request needs; constructed per request and consumed by
/// it.
pub struct RequestConfig<'a> {
    pub url: &'a str,
    pub method: Method,
    pub headers: &'a [(&'a str, &'a str)],
    pub body: Option<&'a [u8]>,
}

/// Result of a completed exchange.
#[derive(Debug, Clone, Copy)]
pub struct Outcome {
    pub status: u16,
    pub content_length: Option<usize>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum HttpError {
    /// URL missing scheme, host, or a parseable port.
    BadUrl,
    /// Request head did not fit its buffer.
    HeadOverflow,
    /// Transport read or write failed.
    Io(ErrorKind),
    /// Peer closed mid-response.
    UnexpectedEof,
    BadStatusLine,
    BadHeader,
    /// Status or header line longer than the engine accepts.
    LineTooLong,
    /// Malformed chunked framing.
    BadChunk,
    /// Response accumulation failed.
    Collect(CollectError),
}

impl HttpError {
    /// Low-level transport error kind, when there was one. Diagnostic
    /// only; nothing is retried.
    pub fn transport_kind(&self) -> Option<ErrorKind> {
        match self {
            HttpError::Io(kind) => Some(*kind),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
    Configured,
    Connecting,
    HeadersSent,
    Receiving,
    Finished,
    Disconnected,
}

/// One HTTP exchange: configuration, event dispatch, response
/// accumulation. Consumed by [`HttpRequest::perform`], so every
/// per-request resource is released when it returns, whatever the
/// outcome.
pub struct HttpRequest<'a, S> {
    config: RequestConfig<'a>,
    sink: S,
    state: RequestState,
}

impl<'a, S: EventSink> HttpRequest<'a, S> {
    pub fn new(config: RequestConfig<'a>, sink: S) -> Self {
        HttpRequest {
            config,
            sink,
            state: RequestState::Configured,
        }
    }

    /// Run the request to completion over `conn`, blocking the caller for
    /// the full round-trip.
    ///
    /// On success the sink sees `Finish`; on failure it sees `Error`
    /// followed by `Disconnected` with the transport error kind, so a
    /// collector's buffer is released on both paths.
    pub async fn perform<C>(mut self, conn: &mut C) -> Result<Outcome, HttpError>
    where
        C: Read + Write,
    {
        match self.exchange(conn).await {
            Ok(outcome) => {
                self.set_state(RequestState::Finished);
                let _ = self.sink.on_event(HttpEvent::Finish);
                Ok(outcome)
            }
            Err(err) => {
                let _ = self.sink.on_event(HttpEvent::Error);
                self.set_state(RequestState::Disconnected);
                let _ = self
                    .sink
                    .on_event(HttpEvent::Disconnected(err.transport_kind()));
                Err(err)
            }
        }
    }

    async fn exchange<C>(&mut self, conn: &mut C) -> Result<Outcome, HttpError>
    where
        C: Read + Write,
    {
        let parts = parse_url(self.config.url)?;
        self.set_state(RequestState::Connecting);
        self.sink
            .on_event(HttpEvent::Connected)
            .map_err(HttpError::Collect)?;

        let head = request_head(&parts, &self.config)?;
        conn.write_all(head.as_bytes()).await.map_err(io_error)?;
        if let Some(body) = self.config.body {
            conn.write_all(body).await.map_err(io_error)?;
        }
        conn.flush().await.map_err(io_error)?;
        self.set_state(RequestState::HeadersSent);
        self.sink
            .on_event(HttpEvent::HeadersSent)
            .map_err(HttpError::Collect)?;

        self.set_state(RequestState::Receiving);
        let mut parser = ResponseParser::new();
        let mut rx = [0u8; READ_CHUNK];
        loop {
            let n = conn.read(&mut rx).await.map_err(io_error)?;
            if n == 0 {
                parser.finish()?;
                break;
            }
            parser.advance(&rx[..n], &mut self.sink)?;
            if parser.is_done() {
                break;
            }
        }
        Ok(Outcome {
            status: parser.status(),
            content_length: parser.content_length(),
        })
    }

    fn set_state(&mut self, next: RequestState) {
        debug!("http: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

fn io_error<E: embedded_io_async::Error>(err: E) -> HttpError {
    HttpError::Io(err.kind())
}

fn request_head(
    parts: &UrlParts<'_>,
    config: &RequestConfig<'_>,
) -> Result<String<MAX_HEAD>, HttpError> {
    let mut head = String::new();
    let overflow = |_| HttpError::HeadOverflow;

    write!(
        head,
        "{} {} HTTP/1.1\r\n",
        config.method.as_str(),
        parts.path
    )
    .map_err(overflow)?;
    if parts.port == parts.scheme.default_port() {
        write!(head, "Host: {}\r\n", parts.host).map_err(overflow)?;
    } else {
        write!(head, "Host: {}:{}\r\n", parts.host, parts.port).map_err(overflow)?;
    }
    head.push_str("Connection: close\r\n")
        .map_err(|_| HttpError::HeadOverflow)?;
    for (name, value) in config.headers {
        write!(head, "{name}: {value}\r\n").map_err(overflow)?;
    }
    if let Some(body) = config.body {
        write!(head, "Content-Length: {}\r\n", body.len()).map_err(overflow)?;
    }
    head.push_str("\r\n").map_err(|_| HttpError::HeadOverflow)?;
    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_https_url_with_defaults() {
        let parts = parse_url("https://telemetry.example.com/ingest/v1").unwrap();
        assert_eq!(parts.scheme, Scheme::Https);
        assert_eq!(parts.host, "telemetry.example.com");
        assert_eq!(parts.port, 443);
        assert_eq!(parts.path, "/ingest/v1");
    }

    #[test]
    fn bare_authority_gets_root_path() {
        let parts = parse_url("http://device-sink.local:8080").unwrap();
        assert_eq!(parts.scheme, Scheme::Http);
        assert_eq!(parts.host, "device-sink.local");
        assert_eq!(parts.port, 8080);
        assert_eq!(parts.path, "/");
    }

    #[test]
    fn rejects_unknown_scheme_and_empty_host() {
        assert_eq!(parse_url("ftp://x/"), Err(HttpError::BadUrl));
        assert_eq!(parse_url("https:///path"), Err(HttpError::BadUrl));
        assert_eq!(parse_url("https://host:notaport/"), Err(HttpError::BadUrl));
    }

    #[test]
    fn request_head_matches_wire_format() {
        let parts = parse_url("https://telemetry.example.com/").unwrap();
        let config = RequestConfig {
            url: "https://telemetry.example.com/",
            method: Method::Post,
            headers: &[("Content-Type", "application/json")],
            body: Some(b"{\"moisture\":\"42.500000\"}"),
        };
        let head = request_head(&parts, &config).unwrap();
        assert_eq!(
            head.as_str(),
            "POST / HTTP/1.1\r\n\
             Host: telemetry.example.com\r\n\
             Connection: close\r\n\
             Content-Type: application/json\r\n\
             Content-Length: 24\r\n\
             \r\n"
        );
    }

    #[test]
    fn non_default_port_lands_in_host_header() {
        let parts = parse_url("http://device-sink.local:8080/up").unwrap();
        let config = RequestConfig {
            url: "http://device-sink.local:8080/up",
            method: Method::Get,
            headers: &[],
            body: None,
        };
        let head = request_head(&parts, &config).unwrap();
        assert!(head.as_str().starts_with("GET /up HTTP/1.1\r\n"));
        assert!(head.as_str().contains("Host: device-sink.local:8080\r\n"));
        assert!(!head.as_str().contains("Content-Length"));
    }
}
