//! Terminal transport: owns the actual TCP/TLS socket (spec.md §5.2 "IoTransport").
//!
//! Grounded on `hdbconnect_impl`'s `AsyncPlainTcpClient`/`AsyncTlsTcpClient`
//! (a thin struct wrapping a `TcpStream`, split into read/write halves) and
//! on `activemq-cpp/src/main/activemq/transport/tcp/TcpTransport.cpp` for the
//! reader-task shape: a background task loops reading frames and handing
//! decoded commands to the installed listener until the socket closes.

use crate::codec::frame::Frame;
use crate::command::codec;
use crate::error::{OpenWireError, OpenWireResult};
use crate::transport::broker_url::{BrokerEndpoint, TransportScheme};
use crate::transport::envelope::CommandEnvelope;
use crate::transport::filter::{Transport, TransportListener};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Either side of a plain or TLS-wrapped socket, split for independent
/// concurrent read/write (the reader task owns the read half; `oneway` calls
/// take the write half's mutex).
enum Socket {
    Plain(TcpStream),
    #[cfg(feature = "tls")]
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
}

pub struct IoTransport {
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    reader_handle: StdMutex<Option<JoinHandle<()>>>,
    reader: StdMutex<Option<Box<dyn AsyncRead + Send + Unpin>>>,
    listener: StdMutex<Option<Arc<dyn TransportListener>>>,
    closed: AtomicBool,
    /// Flipped once by the wire format handshake (spec.md §5.1); every frame
    /// sent or decoded afterward uses whichever encoding was negotiated.
    /// Shared (not owned) so the reader task spawned by `start()` can read
    /// it without borrowing `self`.
    tight_encoding: Arc<AtomicBool>,
}

impl IoTransport {
    pub async fn connect(endpoint: &BrokerEndpoint) -> OpenWireResult<Self> {
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| OpenWireError::transport(format!("connect to {}:{} failed: {e}", endpoint.host, endpoint.port)))?;
        stream.set_nodelay(true).ok();
        let socket = match endpoint.scheme {
            TransportScheme::Tcp => Socket::Plain(stream),
            #[cfg(feature = "tls")]
            TransportScheme::Ssl => {
                let connector = tls_connector();
                let server_name = tokio_rustls::rustls::ServerName::try_from(endpoint.host.as_str())
                    .map_err(|_| OpenWireError::transport("invalid TLS server name"))?;
                let tls_stream = connector
                    .connect(server_name, stream)
                    .await
                    .map_err(|e| OpenWireError::transport(format!("TLS handshake failed: {e}")))?;
                Socket::Tls(tls_stream)
            }
            #[cfg(not(feature = "tls"))]
            TransportScheme::Ssl => {
                return Err(OpenWireError::transport(
                    "ssl:// endpoints require the \"tls\" feature",
                ))
            }
        };
        let (read_half, write_half): (
            Box<dyn AsyncRead + Send + Unpin>,
            Box<dyn AsyncWrite + Send + Unpin>,
        ) = match socket {
            Socket::Plain(stream) => {
                let (r, w): (ReadHalf<TcpStream>, WriteHalf<TcpStream>) = tokio::io::split(stream);
                (Box::new(r), Box::new(w))
            }
            #[cfg(feature = "tls")]
            Socket::Tls(stream) => {
                let (r, w) = tokio::io::split(stream);
                (Box::new(r), Box::new(w))
            }
        };
        Ok(Self {
            writer: Mutex::new(write_half),
            reader_handle: StdMutex::new(None),
            reader: StdMutex::new(Some(read_half)),
            listener: StdMutex::new(None),
            closed: AtomicBool::new(false),
            tight_encoding: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Called once the handshake negotiates tight encoding (spec.md §5.1);
    /// every frame after this point is marshaled/unmarshaled accordingly.
    pub fn set_tight_encoding(&self, tight: bool) {
        self.tight_encoding.store(tight, Ordering::SeqCst);
    }
}

#[cfg(feature = "tls")]
fn tls_connector() -> tokio_rustls::TlsConnector {
    let mut root_store = tokio_rustls::rustls::RootCertStore::empty();
    root_store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
        tokio_rustls::rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));
    let config = tokio_rustls::rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    tokio_rustls::TlsConnector::from(Arc::new(config))
}

#[async_trait]
impl Transport for IoTransport {
    async fn oneway(&self, envelope: CommandEnvelope) -> OpenWireResult<()> {
        let tight = self.tight_encoding.load(Ordering::SeqCst);
        let body = codec::marshal_command(
            envelope.command_id,
            envelope.response_required,
            &envelope.command,
            tight,
        )?;
        let frame = Frame::new(envelope.command.data_structure_type(), body);
        let mut writer = self.writer.lock().await;
        frame.write(&mut *writer).await
    }

    async fn request(&self, _envelope: CommandEnvelope) -> OpenWireResult<crate::command::Command> {
        Err(OpenWireError::Unsupported(
            "IoTransport has no request correlation; stack it under ResponseCorrelator".to_string(),
        ))
    }

    async fn start(&self) -> OpenWireResult<()> {
        let mut reader = self
            .reader
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| OpenWireError::IllegalState("transport already started".to_string()))?;
        let listener = self
            .listener
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| OpenWireError::IllegalState("no listener installed before start".to_string()))?;
        let tight_encoding = self.tight_encoding.clone();
        let handle = tokio::spawn(async move {
            loop {
                match Frame::read(&mut reader).await {
                    Ok(frame) => match codec::unmarshal_command(
                        frame.data_type,
                        &frame.body,
                        tight_encoding.load(Ordering::SeqCst),
                    ) {
                        Ok((_command_id, _response_required, command)) => {
                            listener.on_command(command).await
                        }
                        Err(err) => {
                            listener.on_exception(err).await;
                            break;
                        }
                    },
                    Err(err) => {
                        listener.on_exception(err).await;
                        break;
                    }
                }
            }
        });
        *self.reader_handle.lock().unwrap() = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> OpenWireResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.reader_handle.lock().unwrap().take() {
            handle.abort();
        }
        Ok(())
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        *self.listener.lock().unwrap() = Some(listener);
    }
}
