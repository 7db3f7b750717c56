//! Reflector answering every inbound line with a fixed reply.
//!
//! Each accepted connection gets its own task. Counters are shared through
//! [`ReflectorSharedState`] so the shutdown summary covers all peers.

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};
use tokio_util::sync::CancellationToken;

use crate::{
    configuration::Configuration,
    session::SessionManager,
    stats::ReflectorStats,
};

/// Errors that stop the reflector from serving.
#[derive(Error, Debug)]
pub enum ReflectorError {
    #[error("Cannot bind to address {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),
}

/// Aggregate message counters for the reflector.
pub struct ReflectorCounters {
    pub messages_received: AtomicU64,
    pub replies_sent: AtomicU64,
    pub replies_dropped: AtomicU64,
}

impl ReflectorCounters {
    pub fn new() -> Self {
        ReflectorCounters {
            messages_received: AtomicU64::new(0),
            replies_sent: AtomicU64::new(0),
            replies_dropped: AtomicU64::new(0),
        }
    }
}

impl Default for ReflectorCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared between the accept loop and per-connection tasks.
#[derive(Clone)]
pub struct ReflectorSharedState {
    pub counters: Arc<ReflectorCounters>,
    pub session_manager: Arc<SessionManager>,
    pub start_time: Instant,
}

impl ReflectorSharedState {
    pub fn new() -> Self {
        ReflectorSharedState {
            counters: Arc::new(ReflectorCounters::new()),
            session_manager: Arc::new(SessionManager::new()),
            start_time: Instant::now(),
        }
    }

    /// Builds the shutdown statistics from the current counters.
    pub fn stats(&self) -> ReflectorStats {
        ReflectorStats {
            total_messages_received: self.counters.messages_received.load(Ordering::Relaxed),
            total_replies_sent: self.counters.replies_sent.load(Ordering::Relaxed),
            total_replies_dropped: self.counters.replies_dropped.load(Ordering::Relaxed),
            active_sessions: self.session_manager.session_count(),
            sessions_served: self.session_manager.sessions_served(),
            uptime_seconds: self.start_time.elapsed().as_secs_f64(),
        }
    }
}

impl Default for ReflectorSharedState {
    fn default() -> Self {
        Self::new()
    }
}

/// Binds the configured address and reflects until `shutdown` is cancelled.
pub async fn run_reflector(
    conf: &Configuration,
    shutdown: CancellationToken,
) -> Result<(), ReflectorError> {
    let local_addr: SocketAddr = (conf.local_addr, conf.local_port).into();

    let listener = TcpListener::bind(local_addr)
        .await
        .map_err(|source| ReflectorError::Bind {
            addr: local_addr,
            source,
        })?;

    println!("Reflector listening on {}", local_addr);

    let state = ReflectorSharedState::new();
    let result = serve(listener, conf.reply.clone(), state.clone(), shutdown).await;

    state.stats().print(conf.output_format);
    result
}

/// Accept loop over an already bound listener.
pub async fn serve(
    listener: TcpListener,
    reply: String,
    state: ReflectorSharedState,
    shutdown: CancellationToken,
) -> Result<(), ReflectorError> {
    let reply: Arc<str> = Arc::from(reply);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.map_err(ReflectorError::Accept)?;
                log::info!("Accepted connection from {}", peer);
                tokio::spawn(handle_connection(
                    stream,
                    peer,
                    reply.clone(),
                    state.clone(),
                    shutdown.child_token(),
                ));
            }

            _ = shutdown.cancelled() => {
                log::info!("Reflector shutting down");
                return Ok(());
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    reply: Arc<str>,
    state: ReflectorSharedState,
    shutdown: CancellationToken,
) {
    if let Err(e) = stream.set_nodelay(true) {
        log::warn!("Cannot disable Nagle for {}: {}", peer, e);
    }

    let mut session = state.session_manager.open(peer);
    let (reader, mut writer) = stream.into_split();
    // Any bytes up to a newline count as one message.
    let mut messages = BufReader::new(reader).split(b'\n');

    let mut response = reply.as_bytes().to_vec();
    response.push(b'\n');

    loop {
        let message = tokio::select! {
            message = messages.next_segment() => message,
            _ = shutdown.cancelled() => break,
        };

        match message {
            Ok(Some(_)) => {
                state
                    .counters
                    .messages_received
                    .fetch_add(1, Ordering::Relaxed);
                session.record_received();

                if let Err(e) = writer.write_all(&response).await {
                    eprintln!("Failed to reply to {}: {}", peer, e);
                    state.counters.replies_dropped.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                state.counters.replies_sent.fetch_add(1, Ordering::Relaxed);
                session.record_reflected();
            }
            Ok(None) => break,
            Err(e) => {
                eprintln!("Receive error from {}: {}", peer, e);
                break;
            }
        }
    }

    state.session_manager.close(session);
}
