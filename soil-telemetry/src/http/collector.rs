//! Event dispatch and response accumulation for one HTTP exchange.

use alloc::vec::Vec;

use embedded_io_async::ErrorKind;
use log::{debug, error, info};

/// Hard cap for the growable fallback used when the server declares no
/// content length on an unchunked response.
pub const MAX_UNSIZED_BODY: usize = 2048;

/// One step in the lifecycle of a single HTTP exchange.
///
/// `Data` carries the body framing facts alongside the bytes so a sink
/// can decide whether and how to accumulate without reaching back into
/// the request.
#[derive(Debug)]
pub enum HttpEvent<'a> {
    /// The exchange failed below the HTTP layer.
    Error,
    /// The engine took over an established connection.
    Connected,
    /// Request head and body are on the wire.
    HeadersSent,
    /// One response header, observed before any body bytes.
    Header { name: &'a str, value: &'a str },
    /// A slice of the response body, in arrival order.
    Data {
        chunked: bool,
        content_length: Option<usize>,
        data: &'a [u8],
    },
    /// The response completed cleanly.
    Finish,
    /// The connection ended; carries the transport error kind when the
    /// teardown was not a clean close.
    Disconnected(Option<ErrorKind>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectError {
    /// The dynamic buffer could not be allocated or grown.
    OutOfMemory,
    /// The caller-supplied buffer is too small for the body.
    BufferFull,
    /// An unsized body grew past [`MAX_UNSIZED_BODY`].
    BodyTooLarge,
}

/// Receiver for the event stream of one request.
pub trait EventSink {
    fn on_event(&mut self, event: HttpEvent<'_>) -> Result<(), CollectError>;
}

/// Accumulates a response body for the duration of one request.
///
/// With a caller-supplied buffer ([`ResponseCollector::with_buffer`]) the
/// body is appended into it at a running offset. Without one, a dynamic
/// buffer is allocated lazily on the first `Data` event, sized from the
/// declared content length, and released unconditionally on `Finish` or
/// `Disconnected`. After either terminal event the dynamic buffer is gone
/// and the offset is zero, however many `Data` events came before.
pub struct ResponseCollector<'b> {
    fixed: Option<&'b mut [u8]>,
    dynamic: Option<Vec<u8>>,
    offset: usize,
}

impl<'b> ResponseCollector<'b> {
    pub fn new() -> Self {
        ResponseCollector {
            fixed: None,
            dynamic: None,
            offset: 0,
        }
    }

    /// Accumulate into `buf` instead of allocating.
    pub fn with_buffer(buf: &'b mut [u8]) -> Self {
        ResponseCollector {
            fixed: Some(buf),
            dynamic: None,
            offset: 0,
        }
    }

    /// Bytes accumulated so far in the current exchange.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_dynamic_active(&self) -> bool {
        self.dynamic.is_some()
    }

    fn on_data(
        &mut self,
        chunked: bool,
        content_length: Option<usize>,
        data: &[u8],
    ) -> Result<(), CollectError> {
        // Chunked bodies are observed but not accumulated: there is no
        // declared length to size a buffer from. Known limitation.
        if chunked {
            return Ok(());
        }
        if let Some(buf) = self.fixed.as_deref_mut() {
            let end = self
                .offset
                .checked_add(data.len())
                .filter(|&end| end <= buf.len())
                .ok_or(CollectError::BufferFull)?;
            buf[self.offset..end].copy_from_slice(data);
        } else {
            let buf = match self.dynamic.as_mut() {
                Some(buf) => buf,
                None => {
                    let mut fresh = Vec::new();
                    if let Some(len) = content_length.filter(|&len| len > 0) {
                        fresh
                            .try_reserve_exact(len)
                            .map_err(|_| CollectError::OutOfMemory)?;
                    }
                    self.dynamic.insert(fresh)
                }
            };
            if content_length.is_none() && buf.len() + data.len() > MAX_UNSIZED_BODY {
                return Err(CollectError::BodyTooLarge);
            }
            buf.try_reserve(data.len())
                .map_err(|_| CollectError::OutOfMemory)?;
            buf.extend_from_slice(data);
        }
        self.offset += data.len();
        Ok(())
    }

    fn reset(&mut self) {
        // Dropping the Vec is the one and only release of the dynamic
        // buffer; runs on both terminal events, active buffer or not.
        self.dynamic = None;
        self.offset = 0;
    }
}

impl Default for ResponseCollector<'_> {
    fn default() -> Self {
        ResponseCollector::new()
    }
}

impl EventSink for ResponseCollector<'_> {
    fn on_event(&mut self, event: HttpEvent<'_>) -> Result<(), CollectError> {
        match event {
            HttpEvent::Error => {
                error!("http: transport error");
            }
            HttpEvent::Connected => {
                debug!("http: connected");
            }
            HttpEvent::HeadersSent => {
                debug!("http: request sent");
            }
            HttpEvent::Header { name, value } => {
                debug!("http: header {name}: {value}");
            }
            HttpEvent::Data {
                chunked,
                content_length,
                data,
            } => {
                debug!("http: data, len={}", data.len());
                return self.on_data(chunked, content_length, data);
            }
            HttpEvent::Finish => {
                debug!("http: finish, {} body bytes", self.offset);
                self.reset();
            }
            HttpEvent::Disconnected(err) => {
                match err {
                    Some(kind) => info!("http: disconnected, last transport error: {kind:?}"),
                    None => info!("http: disconnected"),
                }
                self.reset();
            }
        }
        Ok(())
    }
}
