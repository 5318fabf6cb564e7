//! Push parser for one HTTP/1.1 response.
//!
//! Fed with whatever the transport read, in whatever sized pieces it
//! arrived; forwards headers and body slices to an [`EventSink`] and
//! tracks which of the three body framings applies: declared content
//! length, chunked transfer encoding, or read-until-close.

use core::str;

use super::HttpError;
use super::collector::{EventSink, HttpEvent};

/// Longest accepted status or header line.
const MAX_LINE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    StatusLine,
    Headers,
    /// Counting down a declared content length.
    SizedBody,
    /// No length, not chunked: body runs until the peer closes.
    UnsizedBody,
    ChunkSize,
    ChunkData,
    /// CRLF that terminates a chunk's payload.
    ChunkEnd,
    Trailer,
    Done,
}

pub struct ResponseParser {
    phase: Phase,
    line: heapless::Vec<u8, MAX_LINE>,
    status: u16,
    chunked: bool,
    content_length: Option<usize>,
    remaining: usize,
}

impl ResponseParser {
    pub fn new() -> Self {
        ResponseParser {
            phase: Phase::StatusLine,
            line: heapless::Vec::new(),
            status: 0,
            chunked: false,
            content_length: None,
            remaining: 0,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Server-declared body length, absent for chunked and until-close
    /// responses.
    pub fn content_length(&self) -> Option<usize> {
        self.content_length
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Consume one read's worth of bytes.
    pub fn advance<S: EventSink>(
        &mut self,
        mut input: &[u8],
        sink: &mut S,
    ) -> Result<(), HttpError> {
        while !input.is_empty() {
            match self.phase {
                Phase::StatusLine => {
                    if self.take_line(&mut input)? {
                        self.parse_status_line()?;
                        self.line.clear();
                        self.phase = Phase::Headers;
                    }
                }
                Phase::Headers => {
                    if self.take_line(&mut input)? {
                        if self.line.is_empty() {
                            self.phase = self.body_phase();
                        } else {
                            self.parse_header(sink)?;
                        }
                        self.line.clear();
                    }
                }
                Phase::SizedBody => {
                    let take = input.len().min(self.remaining);
                    let (data, rest) = input.split_at(take);
                    sink.on_event(HttpEvent::Data {
                        chunked: false,
                        content_length: self.content_length,
                        data,
                    })
                    .map_err(HttpError::Collect)?;
                    input = rest;
                    self.remaining -= take;
                    if self.remaining == 0 {
                        self.phase = Phase::Done;
                    }
                }
                Phase::UnsizedBody => {
                    sink.on_event(HttpEvent::Data {
                        chunked: false,
                        content_length: None,
                        data: input,
                    })
                    .map_err(HttpError::Collect)?;
                    input = &[];
                }
                Phase::ChunkSize => {
                    if self.take_line(&mut input)? {
                        let size = self.parse_chunk_size()?;
                        self.line.clear();
                        if size == 0 {
                            self.phase = Phase::Trailer;
                        } else {
                            self.remaining = size;
                            self.phase = Phase::ChunkData;
                        }
                    }
                }
                Phase::ChunkData => {
                    let take = input.len().min(self.remaining);
                    let (data, rest) = input.split_at(take);
                    sink.on_event(HttpEvent::Data {
                        chunked: true,
                        content_length: None,
                        data,
                    })
                    .map_err(HttpError::Collect)?;
                    input = rest;
                    self.remaining -= take;
                    if self.remaining == 0 {
                        self.phase = Phase::ChunkEnd;
                    }
                }
                Phase::ChunkEnd => {
                    if self.take_line(&mut input)? {
                        if !self.line.is_empty() {
                            return Err(HttpError::BadChunk);
                        }
                        self.phase = Phase::ChunkSize;
                    }
                }
                Phase::Trailer => {
                    if self.take_line(&mut input)? {
                        if self.line.is_empty() {
                            self.phase = Phase::Done;
                        }
                        self.line.clear();
                    }
                }
                // Anything past the framed body is ignored.
                Phase::Done => break,
            }
        }
        Ok(())
    }

    /// Signal clean EOF from the transport.
    pub fn finish(&mut self) -> Result<(), HttpError> {
        match self.phase {
            Phase::Done => Ok(()),
            Phase::UnsizedBody => {
                self.phase = Phase::Done;
                Ok(())
            }
            _ => Err(HttpError::UnexpectedEof),
        }
    }

    /// Append bytes to the pending line; true once a full line is held.
    fn take_line(&mut self, input: &mut &[u8]) -> Result<bool, HttpError> {
        while let Some((&byte, rest)) = input.split_first() {
            *input = rest;
            if byte == b'\n' {
                if self.line.last() == Some(&b'\r') {
                    self.line.pop();
                }
                return Ok(true);
            }
            self.line.push(byte).map_err(|_| HttpError::LineTooLong)?;
        }
        Ok(false)
    }

    fn parse_status_line(&mut self) -> Result<(), HttpError> {
        let text = str::from_utf8(&self.line).map_err(|_| HttpError::BadStatusLine)?;
        let mut parts = text.split_whitespace();
        let version = parts.next().ok_or(HttpError::BadStatusLine)?;
        if !version.starts_with("HTTP/") {
            return Err(HttpError::BadStatusLine);
        }
        self.status = parts
            .next()
            .and_then(|code| code.parse().ok())
            .ok_or(HttpError::BadStatusLine)?;
        Ok(())
    }

    fn parse_header<S: EventSink>(&mut self, sink: &mut S) -> Result<(), HttpError> {
        let text = str::from_utf8(&self.line).map_err(|_| HttpError::BadHeader)?;
        let (name, value) = text.split_once(':').ok_or(HttpError::BadHeader)?;
        let name = name.trim();
        let value = value.trim();

        sink.on_event(HttpEvent::Header { name, value })
            .map_err(HttpError::Collect)?;

        if name.eq_ignore_ascii_case("transfer-encoding") {
            if value
                .split(',')
                .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
            {
                self.chunked = true;
            }
        } else if name.eq_ignore_ascii_case("content-length") {
            let len = value.parse().map_err(|_| HttpError::BadHeader)?;
            self.content_length = Some(len);
        }
        Ok(())
    }

    fn body_phase(&mut self) -> Phase {
        if self.chunked {
            // A chunked body carries its own framing; a content length
            // sent alongside it is ignored.
            self.content_length = None;
            Phase::ChunkSize
        } else {
            match self.content_length {
                Some(0) => Phase::Done,
                Some(len) => {
                    self.remaining = len;
                    Phase::SizedBody
                }
                None => Phase::UnsizedBody,
            }
        }
    }

    fn parse_chunk_size(&self) -> Result<usize, HttpError> {
        let text = str::from_utf8(&self.line).map_err(|_| HttpError::BadChunk)?;
        // Chunk extensions after ';' are ignored.
        let size = text.split(';').next().unwrap_or("").trim();
        usize::from_str_radix(size, 16).map_err(|_| HttpError::BadChunk)
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        ResponseParser::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::collector::CollectError;

    #[derive(Default)]
    struct Recorder {
        headers: Vec<(String, String)>,
        body: Vec<u8>,
        chunked_data: bool,
        data_events: usize,
    }

    impl EventSink for Recorder {
        fn on_event(&mut self, event: HttpEvent<'_>) -> Result<(), CollectError> {
            match event {
                HttpEvent::Header { name, value } => {
                    self.headers.push((name.into(), value.into()));
                }
                HttpEvent::Data { chunked, data, .. } => {
                    self.data_events += 1;
                    self.chunked_data |= chunked;
                    self.body.extend_from_slice(data);
                }
                _ => {}
            }
            Ok(())
        }
    }

    fn parse(response: &[u8]) -> (ResponseParser, Recorder) {
        let mut parser = ResponseParser::new();
        let mut recorder = Recorder::default();
        parser.advance(response, &mut recorder).unwrap();
        (parser, recorder)
    }

    #[test]
    fn content_length_framed_body() {
        let (parser, recorder) = parse(
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\r\nhello",
        );
        assert!(parser.is_done());
        assert_eq!(parser.status(), 200);
        assert_eq!(parser.content_length(), Some(5));
        assert!(!parser.is_chunked());
        assert_eq!(recorder.body, b"hello");
        assert_eq!(
            recorder.headers,
            vec![
                ("Content-Type".to_string(), "text/plain".to_string()),
                ("Content-Length".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn byte_at_a_time_equals_one_shot() {
        let response =
            b"HTTP/1.1 201 Created\r\nContent-Length: 10\r\nX-Id: 7\r\n\r\n0123456789";
        let (_, whole) = parse(response);

        let mut parser = ResponseParser::new();
        let mut recorder = Recorder::default();
        for byte in response {
            parser
                .advance(core::slice::from_ref(byte), &mut recorder)
                .unwrap();
        }
        assert!(parser.is_done());
        assert_eq!(parser.status(), 201);
        assert_eq!(recorder.body, whole.body);
        assert_eq!(recorder.headers, whole.headers);
    }

    #[test]
    fn zero_content_length_finishes_without_data() {
        let (parser, recorder) = parse(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
        assert!(parser.is_done());
        assert_eq!(parser.content_length(), Some(0));
        assert_eq!(recorder.data_events, 0);
    }

    #[test]
    fn chunked_body_is_delivered_and_flagged() {
        let (parser, recorder) = parse(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n",
        );
        assert!(parser.is_done());
        assert!(parser.is_chunked());
        assert_eq!(parser.content_length(), None);
        assert!(recorder.chunked_data);
        assert_eq!(recorder.body, b"Wikipedia");
    }

    #[test]
    fn chunk_size_extensions_are_ignored() {
        let (parser, recorder) = parse(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4;ext=a\r\nWiki\r\n0\r\n\r\n",
        );
        assert!(parser.is_done());
        assert_eq!(recorder.body, b"Wiki");
    }

    #[test]
    fn until_close_body_requires_eof() {
        let mut parser = ResponseParser::new();
        let mut recorder = Recorder::default();
        parser
            .advance(b"HTTP/1.1 200 OK\r\n\r\nsome bytes", &mut recorder)
            .unwrap();
        assert!(!parser.is_done());
        assert_eq!(recorder.body, b"some bytes");

        parser.finish().unwrap();
        assert!(parser.is_done());
        assert_eq!(parser.content_length(), None);
    }

    #[test]
    fn eof_inside_sized_body_is_an_error() {
        let mut parser = ResponseParser::new();
        let mut recorder = Recorder::default();
        parser
            .advance(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc", &mut recorder)
            .unwrap();
        assert!(matches!(parser.finish(), Err(HttpError::UnexpectedEof)));
    }

    #[test]
    fn malformed_status_line_is_rejected() {
        let mut parser = ResponseParser::new();
        let mut recorder = Recorder::default();
        assert!(matches!(
            parser.advance(b"ICY 200 OK\r\n", &mut recorder),
            Err(HttpError::BadStatusLine)
        ));
    }

    #[test]
    fn header_without_colon_is_rejected() {
        let mut parser = ResponseParser::new();
        let mut recorder = Recorder::default();
        assert!(matches!(
            parser.advance(b"HTTP/1.1 200 OK\r\nbogus header\r\n", &mut recorder),
            Err(HttpError::BadHeader)
        ));
    }

    #[test]
    fn bytes_after_the_framed_body_are_ignored() {
        let (parser, recorder) =
            parse(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nokTRAILING GARBAGE");
        assert!(parser.is_done());
        assert_eq!(recorder.body, b"ok");
    }
}
