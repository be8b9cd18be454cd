//! The single-connection protocol driver: a length-framed binary protocol
//! over TCP, optionally wrapped in TLS.
//!
//! This is the thinnest possible shell over the wire: the codec and type
//! system built on top of it are out of scope here. What it does need to do
//! is real enough that the pool above it is exercisable end to end against
//! the fixture server used in the test suite, including the
//! `suggested_pool_concurrency` handshake field.

use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::connect_config::{ConnectConfig, TlsMode};
use crate::error::{ConnectionErrorKind, Error, Result, TransactionErrorKind};
use crate::options::TransactionOptions;
use crate::session::SessionSettings;

const MSG_HELLO: u8 = 0x01;
const MSG_READY: u8 = 0x02;
const MSG_QUERY: u8 = 0x10;
const MSG_QUERY_OK: u8 = 0x11;
const MSG_QUERY_ERR: u8 = 0x12;
const MSG_BEGIN: u8 = 0x20;
const MSG_COMMIT: u8 = 0x21;
const MSG_ROLLBACK: u8 = 0x22;
const MSG_ACK: u8 = 0x23;
const MSG_ERR: u8 = 0x24;
const MSG_TERMINATE: u8 = 0x30;

trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// The raw transport underlying a single [`Connection`](super::Connection).
///
/// Owns the socket and knows how to speak the framing and handshake; it
/// does not know anything about pooling, holders, or retry.
pub(crate) struct Driver {
    stream: Box<dyn AsyncStream>,
    peer_addr: SocketAddr,
    closed: bool,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Driver {
    /// Open a TCP connection, optionally negotiate TLS, then exchange
    /// HELLO/READY. Returns the driver plus whatever settings the server
    /// advertised in its READY frame.
    pub(crate) async fn connect(config: &ConnectConfig) -> Result<(Self, SessionSettings)> {
        let addr = format!("{}:{}", config.host, config.port);
        let tcp = TcpStream::connect(&addr).await.map_err(|e| Error::Connection {
            kind: ConnectionErrorKind::FailedTemporarily,
            message: format!("connecting to {addr}: {e}"),
        })?;
        tcp.set_nodelay(true).ok();
        let peer_addr = tcp
            .peer_addr()
            .map_err(|e| Error::Io(e))?;

        let stream: Box<dyn AsyncStream> = match config.tls {
            TlsMode::Disabled => Box::new(tcp),
            #[cfg(feature = "tls")]
            TlsMode::Required => Box::new(crate::connection::tls::connect(tcp, &config.host).await?),
            #[cfg(not(feature = "tls"))]
            TlsMode::Required => {
                return Err(Error::Interface(
                    "TLS was requested but the `tls` feature is not enabled".into(),
                ))
            }
        };

        let mut driver = Driver {
            stream,
            peer_addr,
            closed: false,
        };
        let settings = driver.handshake(config).await?;
        Ok((driver, settings))
    }

    async fn handshake(&mut self, config: &ConnectConfig) -> Result<SessionSettings> {
        let mut payload = Vec::new();
        write_short_str(&mut payload, &config.user);
        write_short_str(&mut payload, &config.password);
        write_short_str(&mut payload, &config.database);
        self.write_frame(MSG_HELLO, &payload).await?;

        let (tag, body) = self.read_frame().await?;
        if tag != MSG_READY {
            return Err(Error::Connection {
                kind: ConnectionErrorKind::Failed,
                message: format!("unexpected handshake response tag {tag}"),
            });
        }
        if body.is_empty() {
            return Ok(SessionSettings::default());
        }
        let suggested = if body[0] == 1 && body.len() >= 5 {
            Some(u32::from_be_bytes([body[1], body[2], body[3], body[4]]))
        } else {
            None
        };
        Ok(SessionSettings {
            suggested_pool_concurrency: suggested,
        })
    }

    pub(crate) fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Run a single opaque query and return its raw response bytes. The
    /// shape of the data is not interpreted here.
    pub(crate) async fn execute_query(&mut self, query: &str) -> Result<Vec<u8>> {
        self.ensure_open()?;
        self.write_frame(MSG_QUERY, query.as_bytes()).await?;
        let (tag, body) = self.read_frame().await?;
        match tag {
            MSG_QUERY_OK => Ok(body),
            MSG_QUERY_ERR => Err(self.decode_error(&body)),
            other => Err(self.protocol_violation(other)),
        }
    }

    /// Send BEGIN carrying the isolation level, read-only, and deferrable
    /// flags from `options` in its payload.
    pub(crate) async fn begin(&mut self, options: &TransactionOptions) -> Result<()> {
        self.ensure_open()?;
        let mut payload = Vec::new();
        write_short_str(&mut payload, options.isolation.as_str());
        payload.push(options.read_only as u8);
        payload.push(options.deferrable as u8);
        self.write_frame(MSG_BEGIN, &payload).await?;
        let (reply, body) = self.read_frame().await?;
        match reply {
            MSG_ACK => Ok(()),
            MSG_ERR => Err(self.decode_error(&body)),
            other => Err(self.protocol_violation(other)),
        }
    }

    pub(crate) async fn commit(&mut self) -> Result<()> {
        self.send_command(MSG_COMMIT).await
    }

    pub(crate) async fn rollback(&mut self) -> Result<()> {
        self.send_command(MSG_ROLLBACK).await
    }

    async fn send_command(&mut self, tag: u8) -> Result<()> {
        self.ensure_open()?;
        self.write_frame(tag, &[]).await?;
        let (reply, body) = self.read_frame().await?;
        match reply {
            MSG_ACK => Ok(()),
            MSG_ERR => Err(self.decode_error(&body)),
            other => Err(self.protocol_violation(other)),
        }
    }

    /// Tell the server we're going away and stop accepting further use of
    /// this driver. Best-effort: I/O errors here are swallowed since the
    /// connection is being discarded either way.
    pub(crate) async fn close(&mut self) {
        if self.closed {
            return;
        }
        let _ = self.write_frame(MSG_TERMINATE, &[]).await;
        self.closed = true;
    }

    /// Drop the socket without telling the server, for use when the
    /// connection is already known to be unusable.
    pub(crate) fn terminate(&mut self) {
        self.closed = true;
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Connection {
                kind: ConnectionErrorKind::Closed,
                message: "driver was already closed".into(),
            });
        }
        Ok(())
    }

    fn protocol_violation(&mut self, tag: u8) -> Error {
        self.closed = true;
        Error::Connection {
            kind: ConnectionErrorKind::Failed,
            message: format!("unexpected frame tag {tag} from server"),
        }
    }

    fn decode_error(&mut self, body: &[u8]) -> Error {
        if body.is_empty() {
            self.closed = true;
            return Error::Server("empty error frame".into());
        }
        let kind = body[0];
        let message = String::from_utf8_lossy(&body[1..]).into_owned();
        match kind {
            0x01 => Error::Connection {
                kind: ConnectionErrorKind::FailedTemporarily,
                message,
            },
            0x02 => {
                self.closed = true;
                Error::Connection {
                    kind: ConnectionErrorKind::Failed,
                    message,
                }
            }
            0x03 => {
                self.closed = true;
                Error::Connection {
                    kind: ConnectionErrorKind::Closed,
                    message,
                }
            }
            0x10 => Error::Transaction {
                kind: TransactionErrorKind::Conflict,
                message,
            },
            0x11 => Error::Transaction {
                kind: TransactionErrorKind::Serialization,
                message,
            },
            0x12 => Error::Transaction {
                kind: TransactionErrorKind::Deadlock,
                message,
            },
            _ => Error::Server(message),
        }
    }

    async fn write_frame(&mut self, tag: u8, payload: &[u8]) -> Result<()> {
        let len = payload.len() as u32;
        let mut header = [0u8; 5];
        header[0] = tag;
        header[1..].copy_from_slice(&len.to_be_bytes());
        self.stream.write_all(&header).await.map_err(|e| self.wrap_io_err(e))?;
        if !payload.is_empty() {
            self.stream.write_all(payload).await.map_err(|e| self.wrap_io_err(e))?;
        }
        self.stream.flush().await.map_err(|e| self.wrap_io_err(e))?;
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<(u8, Vec<u8>)> {
        let mut header = [0u8; 5];
        self.stream
            .read_exact(&mut header)
            .await
            .map_err(|e| self.wrap_io_err(e))?;
        let tag = header[0];
        let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
        let mut body = vec![0u8; len];
        if len > 0 {
            self.stream
                .read_exact(&mut body)
                .await
                .map_err(|e| self.wrap_io_err(e))?;
        }
        Ok((tag, body))
    }

    /// Translate a transport I/O error, marking the driver permanently
    /// closed whenever the error means the peer is gone rather than merely
    /// slow — this is what lets a holder's release see `is_closed() == true`
    /// and skip hooks for a connection that died mid-use (S6).
    fn wrap_io_err(&mut self, e: io::Error) -> Error {
        let err = to_conn_err(e);
        if matches!(
            err,
            Error::Connection {
                kind: ConnectionErrorKind::Closed,
                ..
            }
        ) {
            self.closed = true;
        }
        err
    }
}

fn to_conn_err(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset => Error::Connection {
            kind: ConnectionErrorKind::Closed,
            message: e.to_string(),
        },
        io::ErrorKind::TimedOut => Error::Connection {
            kind: ConnectionErrorKind::Timeout,
            message: e.to_string(),
        },
        _ => Error::Io(e),
    }
}

fn write_short_str(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    buf.push(bytes.len().min(u8::MAX as usize) as u8);
    buf.extend_from_slice(&bytes[..bytes.len().min(u8::MAX as usize)]);
}
