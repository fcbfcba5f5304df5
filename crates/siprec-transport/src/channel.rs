// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-recorder signalling channel.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpSocket, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::{TransportError, TransportKind};

/// Maximum bytes buffered for one framed message before the peer is
/// considered hostile and the session dropped.
const MAX_FRAME_SIZE: usize = 256 * 1024;

/// Client-side TLS material for `sips` channels.
#[derive(Clone)]
pub struct TlsSettings {
    server_name: String,
    config: Arc<tokio_rustls::rustls::ClientConfig>,
}

impl TlsSettings {
    pub fn new(server_name: impl Into<String>, config: Arc<tokio_rustls::rustls::ClientConfig>) -> Self {
        Self {
            server_name: server_name.into(),
            config,
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}

enum Outbound {
    Udp(Arc<UdpSocket>),
    Stream(mpsc::Sender<Bytes>),
}

/// A bound signalling channel toward one SRS.
///
/// Inbound messages (requests and responses alike) arrive on the mpsc
/// sender handed to [`SipChannel::bind`]; the channel does not interpret
/// them.
pub struct SipChannel {
    kind: TransportKind,
    local: SocketAddr,
    peer: SocketAddr,
    outbound: Outbound,
    tasks: Vec<JoinHandle<()>>,
}

impl SipChannel {
    /// Binds the local endpoint and, for stream transports, connects to
    /// the SRS. Fails with [`TransportError::BindFailed`] when the local
    /// endpoint cannot be acquired.
    pub async fn bind(
        kind: TransportKind,
        local: SocketAddr,
        peer: SocketAddr,
        tls: Option<TlsSettings>,
        inbound: mpsc::Sender<Bytes>,
    ) -> Result<Self, TransportError> {
        match kind {
            TransportKind::Udp => Self::bind_udp(local, peer, inbound).await,
            TransportKind::Tcp => Self::bind_tcp(local, peer, inbound).await,
            TransportKind::Tls => {
                let tls = tls.ok_or(TransportError::TlsSettingsMissing)?;
                Self::bind_tls(local, peer, tls, inbound).await
            }
        }
    }

    async fn bind_udp(
        local: SocketAddr,
        peer: SocketAddr,
        inbound: mpsc::Sender<Bytes>,
    ) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| TransportError::BindFailed {
                addr: local,
                source,
            })?;
        socket
            .connect(peer)
            .await
            .map_err(TransportError::ConnectFailed)?;
        let local = socket.local_addr().map_err(TransportError::ConnectFailed)?;
        let socket = Arc::new(socket);

        let reader = socket.clone();
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                match reader.recv(&mut buf).await {
                    Ok(n) => {
                        let payload = Bytes::copy_from_slice(&buf[..n]);
                        if inbound.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        debug!(%err, "udp receive failed");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            kind: TransportKind::Udp,
            local,
            peer,
            outbound: Outbound::Udp(socket),
            tasks: vec![task],
        })
    }

    async fn bind_tcp(
        local: SocketAddr,
        peer: SocketAddr,
        inbound: mpsc::Sender<Bytes>,
    ) -> Result<Self, TransportError> {
        let stream = Self::connect_tcp(local, peer).await?;
        let local = stream.local_addr().map_err(TransportError::ConnectFailed)?;
        let (tx, tasks) = spawn_stream_io(stream, inbound);
        Ok(Self {
            kind: TransportKind::Tcp,
            local,
            peer,
            outbound: Outbound::Stream(tx),
            tasks,
        })
    }

    async fn bind_tls(
        local: SocketAddr,
        peer: SocketAddr,
        tls: TlsSettings,
        inbound: mpsc::Sender<Bytes>,
    ) -> Result<Self, TransportError> {
        let stream = Self::connect_tcp(local, peer).await?;
        let local = stream.local_addr().map_err(TransportError::ConnectFailed)?;

        let server_name = ServerName::try_from(tls.server_name.clone()).map_err(|_| {
            TransportError::TlsHandshake(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "invalid TLS server name",
            ))
        })?;
        let connector = TlsConnector::from(tls.config.clone());
        let stream = connector
            .connect(server_name, stream)
            .await
            .map_err(TransportError::TlsHandshake)?;

        let (tx, tasks) = spawn_stream_io(stream, inbound);
        Ok(Self {
            kind: TransportKind::Tls,
            local,
            peer,
            outbound: Outbound::Stream(tx),
            tasks,
        })
    }

    async fn connect_tcp(
        local: SocketAddr,
        peer: SocketAddr,
    ) -> Result<tokio::net::TcpStream, TransportError> {
        let socket = if local.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(|source| TransportError::BindFailed {
            addr: local,
            source,
        })?;
        socket
            .bind(local)
            .map_err(|source| TransportError::BindFailed {
                addr: local,
                source,
            })?;
        socket
            .connect(peer)
            .await
            .map_err(TransportError::ConnectFailed)
    }

    /// Sends one serialized SIP message to the SRS.
    pub async fn send(&self, payload: Bytes) -> Result<(), TransportError> {
        match &self.outbound {
            Outbound::Udp(socket) => {
                socket
                    .send(&payload)
                    .await
                    .map_err(TransportError::Send)?;
                Ok(())
            }
            Outbound::Stream(tx) => tx
                .send(payload)
                .await
                .map_err(|_| TransportError::Closed),
        }
    }

    /// Stops the channel's tasks and releases the socket.
    pub fn close(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Drop for SipChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Starts the read/write tasks of a stream transport. The reader frames
/// messages by `Content-Length`; the writer drains the outbound queue.
fn spawn_stream_io<S>(
    stream: S,
    inbound: mpsc::Sender<Bytes>,
) -> (mpsc::Sender<Bytes>, Vec<JoinHandle<()>>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let (tx, mut rx) = mpsc::channel::<Bytes>(64);

    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if let Err(err) = write_half.write_all(&payload).await {
                warn!(%err, "stream write failed");
                break;
            }
        }
    });

    let reader = tokio::spawn(async move {
        let mut read_half = read_half;
        let mut buf = BytesMut::with_capacity(8 * 1024);
        loop {
            match read_half.read_buf(&mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    while let Some(message) = extract_message(&mut buf) {
                        if inbound.send(message).await.is_err() {
                            return;
                        }
                    }
                    if buf.len() > MAX_FRAME_SIZE {
                        warn!(buffered = buf.len(), "oversized frame, dropping session");
                        break;
                    }
                }
                Err(err) => {
                    debug!(%err, "stream read failed");
                    break;
                }
            }
        }
    });

    (tx, vec![writer, reader])
}

/// Extracts one complete SIP message from the buffer, if present.
fn extract_message(buf: &mut BytesMut) -> Option<Bytes> {
    // Peers may send CRLF keep-alives between messages.
    while buf.starts_with(b"\r\n") {
        let _ = buf.split_to(2);
    }
    if buf.is_empty() {
        return None;
    }

    let head_end = buf
        .windows(4)
        .position(|window| window == b"\r\n\r\n")?;

    let content_length = content_length_of(&buf[..head_end]).unwrap_or(0);
    let total = head_end + 4 + content_length;
    if buf.len() < total {
        return None;
    }
    Some(buf.split_to(total).freeze())
}

/// Scans header text for `Content-Length` (or compact `l`).
fn content_length_of(head: &[u8]) -> Option<usize> {
    let text = std::str::from_utf8(head).ok()?;
    for line in text.split("\r\n") {
        let (name, value) = match line.split_once(':') {
            Some(pair) => pair,
            None => continue,
        };
        let name = name.trim();
        if name.eq_ignore_ascii_case("Content-Length") || name.eq_ignore_ascii_case("l") {
            return value.trim().parse().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_complete_message() {
        let mut buf = BytesMut::from(
            &b"OPTIONS sip:a@b SIP/2.0\r\nContent-Length: 4\r\n\r\nbodyEXTRA"[..],
        );
        let message = extract_message(&mut buf).expect("framed");
        assert!(message.ends_with(b"body"));
        assert_eq!(&buf[..], b"EXTRA");
    }

    #[test]
    fn waits_for_full_body() {
        let mut buf = BytesMut::from(&b"OPTIONS sip:a@b SIP/2.0\r\nContent-Length: 10\r\n\r\nbo"[..]);
        assert!(extract_message(&mut buf).is_none());
        buf.extend_from_slice(b"dy-filled!");
        assert!(extract_message(&mut buf).is_some());
    }

    #[test]
    fn skips_keepalive_crlf() {
        let mut buf = BytesMut::from(&b"\r\n\r\nBYE sip:a@b SIP/2.0\r\nContent-Length: 0\r\n\r\n"[..]);
        let message = extract_message(&mut buf).expect("framed");
        assert!(message.starts_with(b"BYE"));
    }

    #[test]
    fn missing_content_length_means_empty_body() {
        let mut buf = BytesMut::from(&b"ACK sip:a@b SIP/2.0\r\nVia: x\r\n\r\n"[..]);
        let message = extract_message(&mut buf).expect("framed");
        assert!(message.ends_with(b"\r\n\r\n"));
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn udp_channel_round_trips() {
        let srs = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let srs_addr = srs.local_addr().unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let channel = SipChannel::bind(
            TransportKind::Udp,
            "127.0.0.1:0".parse().unwrap(),
            srs_addr,
            None,
            tx,
        )
        .await
        .expect("bind");

        channel.send(Bytes::from_static(b"OPTIONS ...")).await.unwrap();
        let mut buf = [0u8; 64];
        let (n, from) = srs.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"OPTIONS ...");
        assert_eq!(from, channel.local_addr());

        srs.send_to(b"SIP/2.0 200 OK\r\n\r\n", channel.local_addr())
            .await
            .unwrap();
        let inbound = rx.recv().await.expect("inbound");
        assert!(inbound.starts_with(b"SIP/2.0 200 OK"));
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let (tx1, _rx1) = mpsc::channel(1);
        let first = SipChannel::bind(
            TransportKind::Udp,
            "127.0.0.1:0".parse().unwrap(),
            "127.0.0.1:5060".parse().unwrap(),
            None,
            tx1,
        )
        .await
        .expect("first bind");

        let (tx2, _rx2) = mpsc::channel(1);
        let clash = SipChannel::bind(
            TransportKind::Udp,
            first.local_addr(),
            "127.0.0.1:5060".parse().unwrap(),
            None,
            tx2,
        )
        .await;
        assert!(matches!(clash, Err(TransportError::BindFailed { .. })));
    }

    #[tokio::test]
    async fn tls_without_settings_is_rejected() {
        let (tx, _rx) = mpsc::channel(1);
        let result = SipChannel::bind(
            TransportKind::Tls,
            "127.0.0.1:0".parse().unwrap(),
            "127.0.0.1:5061".parse().unwrap(),
            None,
            tx,
        )
        .await;
        assert!(matches!(result, Err(TransportError::TlsSettingsMissing)));
    }
}
