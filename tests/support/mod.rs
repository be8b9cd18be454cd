//! A tiny stand-in "database" speaking just enough of latticedb's wire
//! protocol (HELLO/READY, BEGIN/COMMIT/ROLLBACK, QUERY) to exercise the pool
//! and transaction state machine without a live server.
//!
//! Not a test module itself (`tests/support/mod.rs` is excluded from the
//! test binary list by cargo's "foo/mod.rs" convention) — `mod support;` it
//! from each integration test file instead.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

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

/// Observed server-side activity, shared with the test so it can assert on
/// exactly how many BEGIN/COMMIT/ROLLBACK/connect events the pool drove.
#[derive(Default)]
pub struct Counters {
    pub connects: AtomicU32,
    pub begins: AtomicU32,
    pub commits: AtomicU32,
    pub rollbacks: AtomicU32,
    pub queries: AtomicU32,
}

/// Behavior knobs for the fixture server.
#[derive(Clone)]
pub struct FixtureConfig {
    /// Advertised in the READY frame's handshake body. `None` omits the
    /// suggestion entirely.
    pub suggested_pool_concurrency: Option<u32>,
    /// If set, the `n`th BEGIN the server ever receives (across every
    /// connection, 1-based) is followed by silently closing the socket
    /// instead of an ACK — simulating a connection dying mid-transaction.
    pub die_on_begin_number: Option<u32>,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            suggested_pool_concurrency: None,
            die_on_begin_number: None,
        }
    }
}

pub struct Fixture {
    pub addr: SocketAddr,
    pub counters: Arc<Counters>,
    shutdown: Arc<tokio::sync::Notify>,
}

impl Fixture {
    pub async fn start(config: FixtureConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fixture listener");
        let addr = listener.local_addr().expect("local addr");
        let counters = Arc::new(Counters::default());
        let shutdown = Arc::new(tokio::sync::Notify::new());
        let begin_seq = Arc::new(AtomicUsize::new(0));

        let accept_counters = counters.clone();
        let accept_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_shutdown.notified() => return,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { return };
                        let counters = accept_counters.clone();
                        let config = config.clone();
                        let begin_seq = begin_seq.clone();
                        tokio::spawn(async move {
                            let _ = handle_connection(stream, config, counters, begin_seq).await;
                        });
                    }
                }
            }
        });

        Fixture {
            addr,
            counters,
            shutdown,
        }
    }

    pub fn dsn(&self, database: &str) -> String {
        format!(
            "latticedb://user:pass@{}:{}/{}?tls=disabled",
            self.addr.ip(),
            self.addr.port(),
            database
        )
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        self.shutdown.notify_waiters();
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    config: FixtureConfig,
    counters: Arc<Counters>,
    begin_seq: Arc<AtomicUsize>,
) -> std::io::Result<()> {
    counters.connects.fetch_add(1, Ordering::SeqCst);

    // Handshake: read HELLO, ignore its payload, reply READY.
    let (tag, _body) = read_frame(&mut stream).await?;
    if tag != MSG_HELLO {
        return Ok(());
    }
    let mut ready_body = Vec::new();
    match config.suggested_pool_concurrency {
        Some(n) => {
            ready_body.push(1u8);
            ready_body.extend_from_slice(&n.to_be_bytes());
        }
        None => ready_body.push(0u8),
    }
    write_frame(&mut stream, MSG_READY, &ready_body).await?;

    loop {
        let (tag, body) = match read_frame(&mut stream).await {
            Ok(pair) => pair,
            Err(_) => return Ok(()), // peer went away
        };

        match tag {
            MSG_BEGIN => {
                counters.begins.fetch_add(1, Ordering::SeqCst);
                let seq = begin_seq.fetch_add(1, Ordering::SeqCst) + 1;
                if config.die_on_begin_number == Some(seq as u32) {
                    return Ok(()); // drop the socket without a reply
                }
                write_frame(&mut stream, MSG_ACK, &[]).await?;
            }
            MSG_COMMIT => {
                counters.commits.fetch_add(1, Ordering::SeqCst);
                write_frame(&mut stream, MSG_ACK, &[]).await?;
            }
            MSG_ROLLBACK => {
                counters.rollbacks.fetch_add(1, Ordering::SeqCst);
                write_frame(&mut stream, MSG_ACK, &[]).await?;
            }
            MSG_QUERY => {
                counters.queries.fetch_add(1, Ordering::SeqCst);
                let _ = body;
                write_frame(&mut stream, MSG_QUERY_OK, b"ok").await?;
            }
            MSG_TERMINATE => return Ok(()),
            other => {
                write_frame(&mut stream, MSG_ERR, &[0x02, format!("unknown tag {other}").as_bytes().len() as u8]).await.ok();
                return Ok(());
            }
        }
    }
}

async fn write_frame(stream: &mut TcpStream, tag: u8, payload: &[u8]) -> std::io::Result<()> {
    let len = payload.len() as u32;
    let mut header = [0u8; 5];
    header[0] = tag;
    header[1..].copy_from_slice(&len.to_be_bytes());
    stream.write_all(&header).await?;
    if !payload.is_empty() {
        stream.write_all(payload).await?;
    }
    stream.flush().await
}

async fn read_frame(stream: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
    let mut header = [0u8; 5];
    stream.read_exact(&mut header).await?;
    let tag = header[0];
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    let mut body = vec![0u8; len];
    if len > 0 {
        stream.read_exact(&mut body).await?;
    }
    Ok((tag, body))
}
