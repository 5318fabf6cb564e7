//! Periodic HTTPS reporting.
//!
//! One report cycle resolves the server, opens a TCP socket, wraps it in
//! TLS, and runs a single POST through the request engine with a fixed
//! response buffer. Socket buffers are shared through mutexes: the
//! socket must be closed before the guards drop.

use core::str;

use embassy_net::{Stack, dns::DnsQueryType, tcp::TcpSocket};
use embassy_sync::{blocking_mutex::raw::NoopRawMutex, mutex::Mutex};
use embassy_time::{Duration, Timer};
use embedded_tls::{
    Aes128GcmSha256, Certificate, TlsConfig, TlsConnection, TlsContext, UnsecureProvider,
};
use esp_hal::rng::Rng;
use log::{info, warn};
use rand_chacha::ChaCha8Rng;
use rand_chacha::rand_core::SeedableRng;

use soil_telemetry::http::{
    HttpError, HttpRequest, Method, Outcome, RequestConfig, ResponseCollector, Scheme, parse_url,
};

use crate::{RESPONSE_BUFFER_SIZE, RX_BUFFER_SIZE, SERVER_URL, TLS_BUFFER_SIZE, TX_BUFFER_SIZE};

#[derive(Debug)]
pub enum Error {
    /// Reporting is HTTPS-only; a plain `http://` URL is refused.
    UnsupportedScheme,
    DnsResolveFailed,
    ConnectionFailed,
    TlsHandshakeFailed,
    Request(HttpError),
}

/// Trust bundle attached to every TLS session.
///
/// Holds the DER-encoded CA the server chain must descend from; without
/// one the session is still encrypted but the peer goes unverified, the
/// same trade the stock examples make.
pub struct TrustAnchor(Option<&'static [u8]>);

impl TrustAnchor {
    pub const fn ca_der(der: &'static [u8]) -> Self {
        TrustAnchor(Some(der))
    }

    pub const fn none() -> Self {
        TrustAnchor(None)
    }

    fn config<'a>(&'a self, server_name: &'a str) -> TlsConfig<'a> {
        let config = TlsConfig::new().with_server_name(server_name);
        match self.0 {
            Some(der) => config.with_ca(Certificate::X509(der)),
            None => config,
        }
    }
}

pub struct Reporter {
    stack: &'static Mutex<NoopRawMutex, Stack<'static>>,
    rx_buf: &'static Mutex<NoopRawMutex, [u8; RX_BUFFER_SIZE]>,
    tx_buf: &'static Mutex<NoopRawMutex, [u8; TX_BUFFER_SIZE]>,
    tls_read: &'static mut [u8; TLS_BUFFER_SIZE],
    tls_write: &'static mut [u8; TLS_BUFFER_SIZE],
    trust: TrustAnchor,
    rng: Rng,
}

impl Reporter {
    pub fn new(
        stack: &'static Mutex<NoopRawMutex, Stack<'static>>,
        rx_buf: &'static Mutex<NoopRawMutex, [u8; RX_BUFFER_SIZE]>,
        tx_buf: &'static Mutex<NoopRawMutex, [u8; TX_BUFFER_SIZE]>,
        tls_read: &'static mut [u8; TLS_BUFFER_SIZE],
        tls_write: &'static mut [u8; TLS_BUFFER_SIZE],
        trust: TrustAnchor,
        rng: Rng,
    ) -> Self {
        Reporter {
            stack,
            rx_buf,
            tx_buf,
            tls_read,
            tls_write,
            trust,
            rng,
        }
    }

    /// Post one payload and report the outcome. Exactly one attempt; a
    /// failed cycle is logged and the next period proceeds unaffected.
    pub async fn send(&mut self, payload: &[u8]) -> Result<Outcome, Error> {
        let parts = parse_url(SERVER_URL).map_err(Error::Request)?;
        if parts.scheme != Scheme::Https {
            return Err(Error::UnsupportedScheme);
        }

        let stack = self.stack.lock().await;
        let mut rx_buf = self.rx_buf.lock().await;
        let mut tx_buf = self.tx_buf.lock().await;

        let addr = stack
            .dns_query(parts.host, DnsQueryType::A)
            .await
            .map_err(|_| Error::DnsResolveFailed)?
            .first()
            .copied()
            .ok_or(Error::DnsResolveFailed)?;

        let mut socket = TcpSocket::new(*stack, &mut *rx_buf, &mut *tx_buf);
        socket.set_timeout(Some(Duration::from_secs(10)));
        socket
            .connect((addr, parts.port))
            .await
            .map_err(|_| Error::ConnectionFailed)?;

        let seed = (self.rng.random() as u64) << 32 | self.rng.random() as u64;
        let tls_config = self.trust.config(parts.host);
        let mut tls: TlsConnection<'_, _, Aes128GcmSha256> = TlsConnection::new(
            socket,
            &mut self.tls_read[..],
            &mut self.tls_write[..],
        );
        tls.open(TlsContext::new(
            &tls_config,
            UnsecureProvider::new::<Aes128GcmSha256>(ChaCha8Rng::seed_from_u64(seed)),
        ))
        .await
        .map_err(|e| {
            warn!("tls: handshake failed: {:?}", e);
            Error::TlsHandshakeFailed
        })?;

        let mut response = [0u8; RESPONSE_BUFFER_SIZE];
        let request = HttpRequest::new(
            RequestConfig {
                url: SERVER_URL,
                method: Method::Post,
                headers: &[("Content-Type", "application/json")],
                body: Some(payload),
            },
            ResponseCollector::with_buffer(&mut response),
        );

        let result = request.perform(&mut tls).await;

        match tls.close().await {
            Ok(mut socket) => socket.close(),
            Err((mut socket, _)) => socket.close(),
        }
        // Give stack some time to process the socket closure
        Timer::after(Duration::from_millis(100)).await;

        let outcome = result.map_err(Error::Request)?;
        info!(
            "https: status = {}, content_length = {:?}",
            outcome.status, outcome.content_length
        );
        if let Some(len) = outcome.content_length {
            let len = len.min(response.len());
            if let Ok(body) = str::from_utf8(&response[..len])
                && !body.is_empty()
            {
                info!("https: response: {body}");
            }
        }
        Ok(outcome)
    }
}
